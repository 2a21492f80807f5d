//! Speech segment generation

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{error, info, warn};

use super::PodcastAssembler;
use crate::error::{DigestError, Result};
use crate::llm::SpeechSynthesizer;
use crate::models::{AudioSegment, SegmentKind, Summary};

/// Prefix of the per-run scratch directory
pub const TEMP_DIR_PREFIX: &str = "podcast_tts_";

/// Opening line of every episode
pub const INTRO_TEXT: &str = "Welcome to your daily email digest.";

/// Closing line of every episode
pub const OUTRO_TEXT: &str = "This concludes your daily email digest.";

/// Longest text sent in one TTS request
pub const MAX_SEGMENT_CHARS: usize = 4000;

/// Speech files of one run together with the directory holding them.
///
/// Dropping the batch removes the directory.
#[derive(Debug)]
pub struct SpeechBatch {
    /// Scratch directory with the mp3 files
    pub dir: TempDir,
    /// Generated segments in playback order
    pub segments: Vec<AudioSegment>,
}

impl SpeechBatch {
    /// Path of the scratch directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Replace characters other than letters, digits, `-`, `_` and `.`
/// with `_` and make sure the name ends in `.mp3`
pub fn sanitize_filename(name: &str) -> String {
    let mut safe: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if !safe.to_lowercase().ends_with(".mp3") {
        safe.push_str(".mp3");
    }
    safe
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Synthesize the intro, one segment per summary and the outro into a fresh
/// `podcast_tts_*` directory under `parent` (or the system temp dir).
///
/// Segments that fail to synthesize or probe are dropped. Fails only when
/// the directory cannot be created or no segment at all was produced.
pub async fn generate_speech_segments(
    synthesizer: &dyn SpeechSynthesizer,
    probe: &dyn PodcastAssembler,
    summaries: &[Summary],
    parent: Option<&Path>,
    pause: Duration,
) -> Result<SpeechBatch> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_DIR_PREFIX);
    let dir = match parent {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            builder.tempdir_in(parent)?
        }
        None => builder.tempdir()?,
    };
    info!("Created temporary directory for audio segments: {}", dir.path().display());

    let mut segments = Vec::with_capacity(summaries.len() + 2);
    let mut index = 0usize;

    let intro = format!("{:03}_intro.mp3", index);
    match synthesize_segment(synthesizer, probe, SegmentKind::Intro, "Intro", INTRO_TEXT, &intro, dir.path()).await {
        Some(segment) => {
            segments.push(segment);
            index += 1;
        }
        None => warn!("Failed to generate intro segment"),
    }

    for summary in summaries {
        let mut text = format!("Next up, from {}. {}", summary.source, summary.summary_text);
        let chars = text.chars().count();
        if chars > MAX_SEGMENT_CHARS {
            warn!(
                "Segment text for '{}' exceeds {} chars ({}). Truncating.",
                summary.source, MAX_SEGMENT_CHARS, chars
            );
            text = truncate_chars(&text, MAX_SEGMENT_CHARS).to_string();
        }

        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let prefix: String = summary.source.chars().take(20).collect();
        let filename = format!("{:03}_{}.mp3", index, prefix);
        match synthesize_segment(synthesizer, probe, SegmentKind::Article, &summary.source, &text, &filename, dir.path()).await {
            Some(segment) => {
                segments.push(segment);
                index += 1;
            }
            None => warn!("Failed to generate TTS segment for '{}'. It will be excluded.", summary.source),
        }
    }

    let outro = format!("{:03}_outro.mp3", index);
    match synthesize_segment(synthesizer, probe, SegmentKind::Outro, "Outro", OUTRO_TEXT, &outro, dir.path()).await {
        Some(segment) => segments.push(segment),
        None => warn!("Failed to generate outro segment"),
    }

    if segments.is_empty() {
        error!("Failed to generate any speech segments");
        return Err(DigestError::Speech("Failed to generate any speech segments".into()));
    }

    info!("Generated {} speech segments in {}", segments.len(), dir.path().display());
    Ok(SpeechBatch { dir, segments })
}

async fn synthesize_segment(
    synthesizer: &dyn SpeechSynthesizer,
    probe: &dyn PodcastAssembler,
    kind: SegmentKind,
    source: &str,
    text: &str,
    filename: &str,
    dir: &Path,
) -> Option<AudioSegment> {
    if text.trim().is_empty() {
        warn!("Received empty text for TTS generation ({}). Skipping.", filename);
        return None;
    }

    let path: PathBuf = dir.join(sanitize_filename(filename));

    let duration = match synthesizer.synthesize(text, &path).await {
        Ok(()) => probe.duration_ms(&path).await,
        Err(e) => Err(e),
    };

    match duration {
        Ok(duration_ms) => Some(AudioSegment {
            kind,
            source: source.to_string(),
            text: text.to_string(),
            audio_path: path,
            duration_ms,
        }),
        Err(e) => {
            error!("Error generating speech for '{}': {}", filename, e);
            if path.exists() {
                if let Err(rm) = std::fs::remove_file(&path) {
                    error!("Error cleaning up failed TTS file {}: {}", path.display(), rm);
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AssembledPodcast;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("001_news@x.com.mp3"), "001_news_x.com.mp3");
        assert_eq!(sanitize_filename("a b/c"), "a_b_c.mp3");
        assert_eq!(sanitize_filename("LOUD.MP3"), "LOUD.MP3");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    /// Writes the text as the "audio", then rejects texts mentioning `fail`
    struct FakeTts {
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeTts {
        async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
            self.requests.lock().unwrap().push(text.to_string());
            std::fs::write(output, text)?;
            if text.contains("fail") {
                return Err(DigestError::Speech("rejected".into()));
            }
            Ok(())
        }
    }

    /// Reports the file length as its duration; files mentioning `corrupt` fail
    struct FakeProbe;

    #[async_trait]
    impl PodcastAssembler for FakeProbe {
        async fn duration_ms(&self, path: &Path) -> Result<u64> {
            let len = std::fs::metadata(path)?.len();
            if text_is_unprobeable(path) {
                return Err(DigestError::audio("corrupt"));
            }
            Ok(len)
        }

        async fn assemble(&self, _: &[AudioSegment], _: &str, _: &Path, _: u64) -> Result<AssembledPodcast> {
            unreachable!()
        }
    }

    fn text_is_unprobeable(path: &Path) -> bool {
        std::fs::read_to_string(path).map(|t| t.contains("corrupt")).unwrap_or(true)
    }

    fn summary(source: &str, text: &str) -> Summary {
        Summary { source: source.into(), summary_text: text.into() }
    }

    #[tokio::test]
    async fn test_generate_segments() {
        let parent = tempfile::tempdir().unwrap();
        let tts = FakeTts { requests: Mutex::new(Vec::new()) };
        let summaries = vec![
            summary("a@x.com", "First story."),
            summary("b@x.com", "This will fail."),
            summary("c@x.com", "Looks corrupt."),
            summary("a-very-long-sender-address@example.com", "Third story."),
        ];

        let batch = generate_speech_segments(&tts, &FakeProbe, &summaries, Some(parent.path()), Duration::ZERO)
            .await
            .unwrap();

        assert!(batch
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_DIR_PREFIX));

        let names: Vec<String> = batch
            .segments
            .iter()
            .map(|s| s.audio_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["000_intro.mp3", "001_a_x.com.mp3", "002_a-very-long-sender-a.mp3", "003_outro.mp3"]
        );

        let kinds: Vec<_> = batch.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SegmentKind::Intro, SegmentKind::Article, SegmentKind::Article, SegmentKind::Outro]
        );
        assert_eq!(batch.segments[1].text, "Next up, from a@x.com. First story.");
        assert_eq!(batch.segments[1].duration_ms, batch.segments[1].text.len() as u64);

        // failed segments leave no file behind
        let files = std::fs::read_dir(batch.path()).unwrap().count();
        assert_eq!(files, 4);
        assert_eq!(tts.requests.lock().unwrap().len(), 6);

        let dir = batch.path().to_path_buf();
        drop(batch);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_long_text_is_truncated() {
        let tts = FakeTts { requests: Mutex::new(Vec::new()) };
        let summaries = vec![summary("a@x.com", &"word ".repeat(2000))];

        let batch = generate_speech_segments(&tts, &FakeProbe, &summaries, None, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(batch.segments[1].text.chars().count(), MAX_SEGMENT_CHARS);
    }

    #[tokio::test]
    async fn test_no_segments_is_an_error() {
        let tts = FakeTts { requests: Mutex::new(Vec::new()) };
        struct BrokenProbe;

        #[async_trait]
        impl PodcastAssembler for BrokenProbe {
            async fn duration_ms(&self, _: &Path) -> Result<u64> {
                Err(DigestError::audio("no ffprobe"))
            }

            async fn assemble(&self, _: &[AudioSegment], _: &str, _: &Path, _: u64) -> Result<AssembledPodcast> {
                unreachable!()
            }
        }

        let err = generate_speech_segments(&tts, &BrokenProbe, &[], None, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Speech(_)));
    }
}
