//! The daily digest job: collect newsletters, summarize, narrate, publish

pub mod notification;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::audio::{generate_speech_segments, PodcastAssembler};
use crate::config::Config;
use crate::error::{DigestError, Result};
use crate::gmail::Mailbox;
use crate::llm::{summarize_all, SpeechSynthesizer, Summarizer};
use crate::models::{EmailContent, JobOutcome, MessageRef};
use crate::parsers::{extract_email_body, get_sender, parse_content};
use crate::storage::PodcastStore;

/// Run parameters taken from configuration
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Recipient of notifications
    pub target_email: String,
    /// Sender addresses to collect
    pub sources: Vec<String>,
    /// Search window in days
    pub days_ago: u32,
    /// Shortest episode, minutes
    pub min_duration_mins: u32,
    /// Longest episode, minutes
    pub max_duration_mins: u32,
    /// Speaking rate used for length planning
    pub words_per_minute: u32,
    /// Gap between segments
    pub silence_ms: u64,
    /// Pause between TTS requests
    pub tts_pause: Duration,
    /// Parent of the scratch directory
    pub temp_dir: Option<PathBuf>,
}

impl JobSettings {
    /// Extract the run parameters, failing when no recipient is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let target_email = config
            .general
            .target_email
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DigestError::Config("TARGET_EMAIL_ADDRESS is not set".into()))?;

        Ok(Self {
            target_email,
            sources: config.gmail.sources.clone(),
            days_ago: config.gmail.days_ago,
            min_duration_mins: config.podcast.min_duration_mins,
            max_duration_mins: config.podcast.max_duration_mins,
            words_per_minute: config.podcast.words_per_minute,
            silence_ms: config.podcast.silence_ms,
            tts_pause: Duration::from_millis(config.podcast.tts_pause_ms),
            temp_dir: config.general.temp_dir.clone(),
        })
    }
}

/// Fetch every message and extract its article text.
///
/// Messages that cannot be fetched or yield no text are skipped. Parsing
/// runs on the rayon pool.
pub async fn fetch_contents(mailbox: &dyn Mailbox, messages: &[MessageRef]) -> Result<Vec<EmailContent>> {
    let mut raw = Vec::with_capacity(messages.len());
    for message_ref in messages {
        debug!("Processing message ID: {}", message_ref.id);
        let message = match mailbox.get_email_details(&message_ref.id).await {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to fetch message {}: {}", message_ref.id, e);
                continue;
            }
        };

        let sender = get_sender(&message).unwrap_or_else(|| {
            let short: String = message_ref.id.chars().take(10).collect();
            format!("Unknown Source <{}...>", short)
        });
        let (plain, html) = extract_email_body(&message);
        raw.push((message_ref.id.clone(), sender, plain, html));
    }

    let contents = tokio::task::spawn_blocking(move || {
        raw.into_par_iter()
            .filter_map(|(id, sender, plain, html)| {
                let text = parse_content(plain.as_deref(), html.as_deref());
                if text.is_empty() {
                    warn!("Could not parse usable content from '{}' (ID: {})", sender, id);
                    None
                } else {
                    info!("Parsed content (length: {}) from '{}'", text.len(), sender);
                    Some(EmailContent { source: sender, original_text: text })
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| DigestError::Other(format!("Content parsing task failed: {}", e)))?;

    Ok(contents)
}

/// One end-to-end digest run over pluggable services
pub struct DailyDigestJob {
    mailbox: Arc<dyn Mailbox>,
    summarizer: Arc<dyn Summarizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    assembler: Arc<dyn PodcastAssembler>,
    store: Arc<dyn PodcastStore>,
    settings: JobSettings,
}

impl DailyDigestJob {
    /// Wire a job from its services
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        summarizer: Arc<dyn Summarizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        assembler: Arc<dyn PodcastAssembler>,
        store: Arc<dyn PodcastStore>,
        settings: JobSettings,
    ) -> Self {
        Self { mailbox, summarizer, synthesizer, assembler, store, settings }
    }

    /// Run settings
    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Run the job for `date`.
    ///
    /// On failure the recipient is told by email before the error is
    /// returned; a failure to send that email is only logged.
    pub async fn run(&self, date: NaiveDate) -> Result<JobOutcome> {
        let started = Utc::now();
        info!("Daily digest started at {}", started.to_rfc3339());

        let result = self.execute(date).await;

        if let Err(e) = &result {
            error!("Workflow halted due to an error: {}", e);
            match self
                .mailbox
                .send_email(
                    &self.settings.target_email,
                    &notification::failure_subject(e),
                    &notification::failure_body(e, started),
                )
                .await
            {
                Ok(_) => info!("Sent error notification email"),
                Err(mail_err) => error!("Additionally, failed to send error notification email: {}", mail_err),
            }
        }

        info!("Daily digest finished at {}", Utc::now().to_rfc3339());
        result
    }

    async fn execute(&self, date: NaiveDate) -> Result<JobOutcome> {
        let settings = &self.settings;

        info!("Searching for recent emails");
        let messages = self
            .mailbox
            .find_recent_emails(&settings.sources, settings.days_ago)
            .await?;
        if messages.is_empty() {
            info!("No new emails found from specified sources. Exiting.");
            return Ok(JobOutcome::NoMessages);
        }
        info!("Found {} candidate emails", messages.len());

        let contents = fetch_contents(self.mailbox.as_ref(), &messages).await?;
        if contents.is_empty() {
            info!("No usable content extracted from found emails. Exiting.");
            return Ok(JobOutcome::NoContent);
        }
        info!("Successfully extracted content from {} emails", contents.len());

        let summaries = summarize_all(
            self.summarizer.as_ref(),
            &contents,
            settings.min_duration_mins,
            settings.max_duration_mins,
            settings.words_per_minute,
        )
        .await;
        if summaries.is_empty() {
            return Err(DigestError::Summarization("Summarization yielded no results".into()));
        }
        info!("Summarization complete. Generated {} summaries.", summaries.len());

        let batch = generate_speech_segments(
            self.synthesizer.as_ref(),
            self.assembler.as_ref(),
            &summaries,
            settings.temp_dir.as_deref(),
            settings.tts_pause,
        )
        .await?;
        info!(
            "TTS generation complete. Generated {} segments in {}.",
            batch.segments.len(),
            batch.path().display()
        );

        let base_name = format!("daily_digest_{}", date.format("%Y-%m-%d"));
        let episode = self
            .assembler
            .assemble(&batch.segments, &base_name, batch.path(), settings.silence_ms)
            .await?;

        let url = self.store.publish(&episode.path).await?;
        info!("Episode published");

        let article_count = batch.segments.len().saturating_sub(2);
        let subject = notification::success_subject(date);
        let body = notification::success_body(&url, article_count, &episode.chapters);
        // the episode is already public, so a lost notification does not fail the run
        match self.mailbox.send_email(&settings.target_email, &subject, &body).await {
            Ok(_) => info!("Notification email sent successfully"),
            Err(e) => error!("Failed to send notification email: {}", e),
        }

        let dir = batch.path().to_path_buf();
        match batch.dir.close() {
            Ok(()) => info!("Cleaned up temporary TTS directory: {}", dir.display()),
            Err(e) => error!("Error cleaning up temporary TTS directory {}: {}", dir.display(), e),
        }

        Ok(JobOutcome::Published { url, chapters: episode.chapters, article_count })
    }
}
