//! Records passed between the stages of the daily digest job

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Article text extracted from one email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    /// Sender address the article came from
    pub source: String,
    /// Extracted article text
    pub original_text: String,
}

impl EmailContent {
    /// Number of whitespace separated words
    pub fn word_count(&self) -> usize {
        self.original_text.split_whitespace().count()
    }
}

/// Summary length budget for one article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLength {
    /// Sender address
    pub source: String,
    /// Desired summary length in words
    pub target_words: usize,
}

/// Summary produced for one article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Sender address
    pub source: String,
    /// Summary text
    pub summary_text: String,
}

/// Role a segment plays in the episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Opening announcement
    Intro,
    /// Spoken summary of one article
    Article,
    /// Closing announcement
    Outro,
}

/// A synthesized speech file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Segment role
    pub kind: SegmentKind,
    /// Chapter title: `Intro`, `Outro` or the article source
    pub source: String,
    /// Spoken text
    pub text: String,
    /// Path to the mp3 file
    pub audio_path: PathBuf,
    /// Duration in milliseconds, zero if unknown
    pub duration_ms: u64,
}

/// A chapter marker in the final episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title
    pub title: String,
    /// Start offset in milliseconds
    pub start_ms: u64,
    /// End offset in milliseconds
    pub end_ms: u64,
}

impl Chapter {
    /// Start offset as `MM:SS`
    pub fn start_timestamp(&self) -> String {
        let secs = self.start_ms / 1000;
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

/// What a completed run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// No message matched the search
    NoMessages,
    /// Messages were found but none yielded usable text
    NoContent,
    /// The episode was published and the notification sent
    Published {
        /// Download link
        url: String,
        /// Chapter markers of the episode
        chapters: Vec<Chapter>,
        /// Number of article segments in the episode
        article_count: usize,
    },
}
