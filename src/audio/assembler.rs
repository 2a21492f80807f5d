//! Episode assembly: chapter planning and the ffmpeg concat run

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::ffmpeg::{concat_entry, write_ffmetadata, Ffmpeg};
use super::{AssembledPodcast, PodcastAssembler};
use crate::error::{DigestError, Result};
use crate::models::{AudioSegment, Chapter};

/// Segments that make it into the episode and where each one lands
#[derive(Debug)]
pub struct ChapterPlan<'a> {
    /// Segments in playback order
    pub segments: Vec<&'a AudioSegment>,
    /// One chapter per entry of `segments`
    pub chapters: Vec<Chapter>,
    /// Total episode length in milliseconds
    pub total_ms: u64,
}

/// Lay out `segments` back to back with `silence_ms` gaps.
///
/// Segments whose file is missing or whose duration is zero are left out.
/// Silence precedes every included segment but the first, and is not part
/// of any chapter.
pub fn plan_chapters(segments: &[AudioSegment], silence_ms: u64) -> ChapterPlan<'_> {
    let mut plan = ChapterPlan { segments: Vec::new(), chapters: Vec::new(), total_ms: 0 };

    for segment in segments {
        if !segment.audio_path.exists() {
            warn!(
                "Audio file not found for segment '{}'. Skipping: {}",
                segment.source,
                segment.audio_path.display()
            );
            continue;
        }
        if segment.duration_ms == 0 {
            warn!("Invalid duration for segment '{}'. Skipping.", segment.source);
            continue;
        }

        if !plan.segments.is_empty() {
            plan.total_ms += silence_ms;
        }
        let start_ms = plan.total_ms;
        plan.total_ms += segment.duration_ms;

        debug!("Planned '{}': {}ms - {}ms", segment.source, start_ms, plan.total_ms);
        plan.chapters.push(Chapter {
            title: segment.source.clone(),
            start_ms,
            end_ms: plan.total_ms,
        });
        plan.segments.push(segment);
    }

    plan
}

/// Join `segments` into `{base_name}.m4a` inside `out_dir` with embedded
/// chapters. Intermediate files are removed whatever the outcome; a failed
/// run also removes the partial output.
pub async fn assemble_podcast(
    tools: &Ffmpeg,
    segments: &[AudioSegment],
    base_name: &str,
    out_dir: &Path,
    silence_ms: u64,
) -> Result<AssembledPodcast> {
    if segments.is_empty() {
        return Err(DigestError::audio("No audio segments provided to assemble"));
    }
    info!("Starting podcast assembly for {} segments", segments.len());
    tokio::fs::create_dir_all(out_dir).await?;

    let mut probed = Vec::with_capacity(segments.len());
    for segment in segments {
        let mut segment = segment.clone();
        if segment.duration_ms == 0 && segment.audio_path.exists() {
            warn!("Missing duration for segment '{}'. Probing again.", segment.source);
            match tools.probe_duration_ms(&segment.audio_path).await {
                Ok(ms) => segment.duration_ms = ms,
                Err(e) => warn!("Could not get duration for '{}': {}", segment.source, e),
            }
        }
        probed.push(segment);
    }

    let plan = plan_chapters(&probed, silence_ms);
    if plan.segments.is_empty() {
        return Err(DigestError::audio("No playable audio segments to assemble"));
    }

    let silence_path = out_dir.join(format!("{}_silence.mp3", base_name));
    let list_path = out_dir.join(format!("{}_concat.txt", base_name));
    let metadata_path = out_dir.join(format!("{}_metadata.txt", base_name));
    let output = out_dir.join(format!("{}.m4a", base_name));

    let result = async {
        let with_silence = silence_ms > 0 && plan.segments.len() > 1;
        if with_silence {
            tools.make_silence(silence_ms, &silence_path).await?;
        }

        let mut list = String::new();
        for (i, segment) in plan.segments.iter().enumerate() {
            if i > 0 && with_silence {
                list.push_str(&concat_entry(&silence_path));
                list.push('\n');
            }
            list.push_str(&concat_entry(&segment.audio_path));
            list.push('\n');
        }
        tokio::fs::write(&list_path, list).await?;

        write_ffmetadata(&plan.chapters, &metadata_path, tools.title())?;
        tools.concat_with_chapters(&list_path, &metadata_path, &output).await
    }
    .await;

    debug!("Cleaning up intermediate assembly files");
    for path in [&silence_path, &list_path, &metadata_path] {
        remove_if_exists(path).await;
    }

    match result {
        Ok(()) => {
            info!(
                "Podcast assembly finished. Final file: {} ({} ms)",
                output.display(),
                plan.total_ms
            );
            Ok(AssembledPodcast { path: output, chapters: plan.chapters })
        }
        Err(e) => {
            remove_if_exists(&output).await;
            Err(e)
        }
    }
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[async_trait]
impl PodcastAssembler for Ffmpeg {
    async fn duration_ms(&self, path: &Path) -> Result<u64> {
        self.probe_duration_ms(path).await
    }

    async fn assemble(
        &self,
        segments: &[AudioSegment],
        base_name: &str,
        out_dir: &Path,
        silence_ms: u64,
    ) -> Result<AssembledPodcast> {
        assemble_podcast(self, segments, base_name, out_dir, silence_ms).await
    }
}
