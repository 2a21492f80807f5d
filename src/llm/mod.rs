//! Language model access: article summaries and speech synthesis

mod openai;
pub mod summarizer;

pub use openai::{ChatCompletionRequest, ChatMessage, OpenAiClient, SpeechRequest};
pub use summarizer::{calculate_target_lengths, summarize_all};

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Produces a spoken-style summary of an article
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text` from `source` in roughly `target_words` words
    async fn summarize(&self, text: &str, source: &str, target_words: usize) -> Result<String>;
}

/// Turns text into an mp3 file
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and write the audio to `output`
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()>;
}
