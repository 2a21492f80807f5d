//! Audio production: speech segments, chapter planning and final assembly

mod assembler;
mod ffmpeg;
pub mod tts;

pub use assembler::{assemble_podcast, plan_chapters, ChapterPlan};
pub use ffmpeg::{escape_title, parse_ffprobe_output, render_ffmetadata, write_ffmetadata, Ffmpeg};
pub use tts::{generate_speech_segments, sanitize_filename, SpeechBatch};

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::PodcastConfig;
use crate::error::Result;
use crate::models::{AudioSegment, Chapter};

/// Default silence between segments
pub const DEFAULT_SILENCE_MS: u64 = 750;

/// Finished episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPodcast {
    /// Path of the `.m4a` file
    pub path: PathBuf,
    /// Chapters embedded in the file
    pub chapters: Vec<Chapter>,
}

/// Audio tooling the pipeline depends on
#[async_trait]
pub trait PodcastAssembler: Send + Sync {
    /// Duration of an audio file in milliseconds
    async fn duration_ms(&self, path: &Path) -> Result<u64>;

    /// Join `segments` with `silence_ms` gaps into `{base_name}.m4a` inside
    /// `out_dir`, embedding one chapter per segment
    async fn assemble(
        &self,
        segments: &[AudioSegment],
        base_name: &str,
        out_dir: &Path,
        silence_ms: u64,
    ) -> Result<AssembledPodcast>;
}

/// Create the default assembler backed by the ffmpeg command line tools
pub fn create_assembler(config: &PodcastConfig) -> Box<dyn PodcastAssembler> {
    Box::new(Ffmpeg::new(&config.ffmpeg_path, &config.ffprobe_path, &config.title))
}
