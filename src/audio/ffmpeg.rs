//! ffmpeg and ffprobe invocation

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{DigestError, Result};
use crate::models::Chapter;

/// Sample rate of the speech returned by the TTS endpoint
const SILENCE_SAMPLE_RATE: u32 = 24_000;

/// ffmpeg command line tools
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    title: String,
}

impl Ffmpeg {
    /// Use the given binaries; `title` is embedded in every episode
    pub fn new(ffmpeg: &Path, ffprobe: &Path, title: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            ffprobe: ffprobe.to_path_buf(),
            title: title.to_string(),
        }
    }

    /// Episode title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Duration of `path` in milliseconds as reported by ffprobe
    pub async fn probe_duration_ms(&self, path: &Path) -> Result<u64> {
        if !path.exists() {
            return Err(DigestError::file_not_found(path));
        }

        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);

        let output = run(&self.ffprobe, &mut cmd).await?;
        let duration = parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "Duration of {}: {} ms",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            duration
        );
        Ok(duration)
    }

    /// Render `duration_ms` of mono silence into an mp3 at `output`
    pub async fn make_silence(&self, duration_ms: u64, output: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "warning", "-f", "lavfi", "-i"])
            .arg(format!("anullsrc=r={}:cl=mono", SILENCE_SAMPLE_RATE))
            .arg("-t")
            .arg(format!("{:.3}", duration_ms as f64 / 1000.0))
            .args(["-codec:a", "libmp3lame", "-b:a", "64k"])
            .arg(output);

        run(&self.ffmpeg, &mut cmd).await?;
        Ok(())
    }

    /// Concatenate the files listed in `concat_list`, attach the chapters in
    /// `metadata` and encode to AAC at `output`
    pub async fn concat_with_chapters(&self, concat_list: &Path, metadata: &Path, output: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "warning"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(concat_list)
            .arg("-i")
            .arg(metadata)
            .args(["-map", "0:a", "-map_metadata", "1", "-map_chapters", "1"])
            .args(["-codec:a", "aac"])
            .arg(output);

        info!("Running ffmpeg to create {}", output.display());
        run(&self.ffmpeg, &mut cmd).await?;
        info!("ffmpeg command completed successfully");
        Ok(())
    }
}

async fn run(program: &Path, cmd: &mut Command) -> Result<Output> {
    debug!("Running {:?}", cmd.as_std());

    let output = cmd.output().await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => DigestError::audio(format!(
            "{} not found. Please ensure ffmpeg is installed and in the system PATH.",
            program.display()
        )),
        _ => DigestError::audio(format!("Failed to run {}: {}", program.display(), e)),
    })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(DigestError::audio(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            stderr.trim()
        )));
    }
    if !stderr.trim().is_empty() {
        warn!("{} stderr (warnings):\n{}", program.display(), stderr.trim());
    }

    Ok(output)
}

/// Parse ffprobe's bare `format=duration` output (seconds) into milliseconds
pub fn parse_ffprobe_output(output: &str) -> Result<u64> {
    let text = output.trim();
    let secs: f64 = text
        .parse()
        .map_err(|_| DigestError::audio(format!("Unexpected ffprobe output: {:?}", text)))?;

    if !secs.is_finite() || secs < 0.0 {
        return Err(DigestError::audio(format!("Invalid duration: {}", text)));
    }
    Ok((secs * 1000.0).round() as u64)
}

/// Make a title safe for an FFMETADATA value
pub fn escape_title(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '=' | '#' | '\\' => '-',
            ';' => ',',
            '\n' => ' ',
            c => c,
        })
        .collect()
}

/// Render an FFMETADATA1 document with one `[CHAPTER]` per valid chapter
pub fn render_ffmetadata(chapters: &[Chapter], title: &str) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    let _ = writeln!(out, "title={}", escape_title(title));
    out.push_str("artist=Generated Podcast Bot\n\n");

    for chapter in chapters {
        if chapter.end_ms <= chapter.start_ms {
            warn!(
                "Chapter '{}' has invalid end time ({}ms) <= start time ({}ms). Skipping.",
                chapter.title, chapter.end_ms, chapter.start_ms
            );
            continue;
        }

        out.push_str("[CHAPTER]\nTIMEBASE=1/1000\n");
        let _ = writeln!(out, "START={}", chapter.start_ms);
        let _ = writeln!(out, "END={}", chapter.end_ms);
        let _ = writeln!(out, "title={}\n", escape_title(&chapter.title));
    }

    out
}

/// Write the FFMETADATA document for `chapters` to `path`
pub fn write_ffmetadata(chapters: &[Chapter], path: &Path, title: &str) -> Result<()> {
    info!("Creating ffmpeg metadata file at: {}", path.display());
    std::fs::write(path, render_ffmetadata(chapters, title))?;
    info!("Wrote {} chapters to metadata file", chapters.len());
    Ok(())
}

/// Quote a path for an ffmpeg concat list
pub(crate) fn concat_entry(path: &Path) -> String {
    format!("file '{}'", path.display().to_string().replace('\'', "'\\''"))
}
