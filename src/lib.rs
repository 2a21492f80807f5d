//! digestcast - Turn a day of newsletters into a chaptered podcast
//!
//! digestcast collects the newsletters that arrived in a Gmail inbox,
//! extracts their article text, summarizes each one with an OpenAI chat
//! model, narrates the summaries with OpenAI text-to-speech, joins the
//! narration into a single M4A file with chapter markers and publishes it to
//! Azure Blob Storage. The download link is mailed back to the reader.
//!
//! # Quick Start
//!
//! ```bash
//! # Authorize Gmail access once
//! digestcast auth
//!
//! # Produce today's episode now
//! digestcast run
//!
//! # Keep running and produce an episode every day
//! digestcast schedule
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod gmail;
pub mod llm;
pub mod models;
pub mod parsers;
pub mod pipeline;
pub mod scheduler;
pub mod storage;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use error::{DigestError, Result};
pub use models::{Chapter, EmailContent, JobOutcome, Summary};

use audio::PodcastAssembler;
use config::Config;
use gmail::GmailClient;
use llm::OpenAiClient;
use pipeline::{DailyDigestJob, JobSettings};
use storage::{AzureBlobStore, LocalStore, MirroredStore, PodcastStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Wire a [`DailyDigestJob`] to the real services described by `config`.
///
/// With `local_output` set, episodes are also copied into that directory.
/// Without `upload` the copy is the only destination.
pub async fn build_job(config: &Config, local_output: Option<&Path>, upload: bool) -> Result<DailyDigestJob> {
    let timeout = Duration::from_secs(config.network.timeout);
    let settings = JobSettings::from_config(config)?;

    let mailbox = Arc::new(GmailClient::connect(&config.gmail, timeout).await?);
    let openai = Arc::new(OpenAiClient::new(&config.openai, timeout)?);
    let assembler: Arc<dyn PodcastAssembler> = Arc::from(audio::create_assembler(&config.podcast));
    let store: Arc<dyn PodcastStore> = match (local_output, upload) {
        (Some(dir), false) => Arc::new(LocalStore::new(dir)),
        (Some(dir), true) => {
            let copy: Arc<dyn PodcastStore> = Arc::new(LocalStore::new(dir));
            Arc::new(MirroredStore::new(
                Arc::new(AzureBlobStore::from_config(&config.storage)?),
                vec![copy],
            ))
        }
        (None, _) => Arc::new(AzureBlobStore::from_config(&config.storage)?),
    };

    Ok(DailyDigestJob::new(mailbox, openai.clone(), openai, assembler, store, settings))
}

/// Produce and publish today's episode with the services described by
/// `config`
///
/// # Example
///
/// ```no_run
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = digestcast::config::Config::load_layered(None)?;
///     let outcome = digestcast::run_daily_digest(&config).await?;
///     println!("{:?}", outcome);
///     Ok(())
/// }
/// ```
pub async fn run_daily_digest(config: &Config) -> Result<JobOutcome> {
    config.require_complete()?;
    let job = build_job(config, None, true).await?;
    job.run(chrono::Local::now().date_naive()).await
}

/// Extract the article text from a saved newsletter body
pub fn extract(plain: Option<&str>, html: Option<&str>) -> String {
    parsers::parse_content(plain, html)
}
