//! Command execution handlers

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;

use crate::audio::tts::TEMP_DIR_PREFIX;
use crate::config::Config;
use crate::error::{DigestError, Result};
use crate::models::JobOutcome;

/// Execute the run command
pub async fn execute_run(args: &super::RunArgs, config: &Config) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let mut config = config.clone();
    if let Some(days) = args.days_ago {
        config.gmail.days_ago = days;
    }

    let missing: Vec<_> = config
        .missing_required()
        .into_iter()
        .filter(|key| !(args.no_upload && key.starts_with("AZURE_")))
        .collect();
    if !missing.is_empty() {
        return Err(DigestError::Config(format!(
            "Missing settings prevent proper operation: {}",
            missing.join(", ")
        )));
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {elapsed_precise} {msg}")
            .map_err(|e| DigestError::Other(e.to_string()))?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Connecting to Gmail and OpenAI...");

    let job = match crate::build_job(&config, args.output_dir.as_deref(), !args.no_upload).await {
        Ok(job) => job,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };

    pb.set_message(format!(
        "Producing digest from the last {} day(s) of newsletters...",
        job.settings().days_ago
    ));
    let result = job.run(chrono::Local::now().date_naive()).await;
    pb.finish_and_clear();

    match result? {
        JobOutcome::NoMessages => {
            println!("{} No new emails found from the configured sources", style("•").dim());
        }
        JobOutcome::NoContent => {
            println!("{} Emails were found but none contained usable content", style("•").yellow());
        }
        JobOutcome::Published { url, chapters, article_count } => {
            println!(
                "{} Published episode with {} articles",
                style("✓").green().bold(),
                article_count
            );
            println!("  {}", style(&url).cyan());
            for chapter in &chapters {
                println!("  {} {}", style(chapter.start_timestamp()).dim(), chapter.title);
            }
        }
    }

    Ok(())
}

/// Execute the schedule command
pub async fn execute_schedule(args: &super::ScheduleArgs, config: &Config) -> Result<()> {
    use crate::scheduler::{parse_schedule_time, run_daily};

    config.require_complete()?;
    let at = parse_schedule_time(args.at.as_deref().unwrap_or(&config.schedule.time_utc))?;
    let run_on_startup = args.run_on_startup || config.schedule.run_on_startup;

    println!(
        "{} Producing a digest every day at {} UTC (Ctrl-C to stop)",
        style("⏰").bold(),
        style(at.format("%H:%M")).cyan()
    );

    run_daily(at, run_on_startup, move || async move {
        // rebuilt per run so the Gmail token is refreshed
        let job = crate::build_job(config, None, true).await?;
        job.run(chrono::Local::now().date_naive()).await
    })
    .await
}

/// Execute the auth command
pub async fn execute_auth(args: &super::AuthArgs, config: &Config) -> Result<()> {
    use crate::gmail::{run_installed_flow, ClientSecrets};
    use dialoguer::Confirm;

    let credentials = args.credentials.clone().unwrap_or_else(|| config.gmail.credentials_path.clone());
    let token_path = args.token.clone().unwrap_or_else(|| config.gmail.token_path.clone());
    let port = args.port.unwrap_or(config.gmail.auth_port);

    if token_path.exists() && !args.yes {
        let replace = Confirm::new()
            .with_prompt(format!("A token already exists at {}. Replace it?", token_path.display()))
            .default(false)
            .interact()
            .map_err(|e| DigestError::Other(e.to_string()))?;
        if !replace {
            println!("Keeping the existing token");
            return Ok(());
        }
    }

    if !credentials.exists() {
        return Err(DigestError::oauth(format!(
            "Client secrets not found at {}. Download an OAuth client (Desktop app) from Google Cloud Console.",
            credentials.display()
        )));
    }
    let secrets = ClientSecrets::from_file(&credentials)?;

    let http = reqwest::Client::builder()
        .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
        .timeout(Duration::from_secs(config.network.timeout))
        .build()?;

    let creds = run_installed_flow(&http, &secrets, port, |url| {
        println!("{}", style("Open this URL in a browser to authorize Gmail access:").bold());
        println!("\n  {}\n", style(url).cyan());
        println!("Waiting for the authorization redirect...");
    })
    .await?;

    creds.save(&token_path)?;
    println!(
        "{} Token saved to {}",
        style("✓").green().bold(),
        token_path.display()
    );
    if creds.refresh_token.is_none() {
        println!(
            "{} No refresh token was issued; the token will stop working when it expires",
            style("!").yellow().bold()
        );
    }

    Ok(())
}

/// Whether `path` holds an HTML body rather than plain text
fn looks_like_html(path: &Path, content: &str) -> bool {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("html") | Some("htm") => true,
        Some("txt") => false,
        _ => {
            let head = content.trim_start().get(..512).unwrap_or(content.trim_start()).to_lowercase();
            head.starts_with("<!doctype html") || head.contains("<html") || head.contains("<body")
        }
    }
}

/// Execute the extract command
pub async fn execute_extract(args: &super::ExtractArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(DigestError::file_not_found(&args.input));
    }
    let content = tokio::fs::read_to_string(&args.input).await?;

    let text = if looks_like_html(&args.input, &content) {
        crate::extract(None, Some(&content))
    } else {
        crate::extract(Some(&content), None)
    };

    if args.stats {
        println!("Words:      {}", text.split_whitespace().count());
        println!("Characters: {}", text.chars().count());
    } else if text.is_empty() {
        println!("{} No usable content found", style("!").yellow().bold());
    } else {
        println!("{}", text);
    }

    Ok(())
}

/// Execute the config command
pub async fn execute_config(args: &super::ConfigArgs, path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    match &args.command {
        super::ConfigCommands::Show => {
            let config = Config::load_from(&path)?;
            println!("{}", toml::to_string_pretty(&config).map_err(|e| DigestError::Other(e.to_string()))?);
        }
        super::ConfigCommands::Reset => {
            Config::reset(&path)?;
            println!("Configuration reset to defaults");
        }
        super::ConfigCommands::Set { key, value } => {
            let mut config = Config::load_from(&path)?;
            config.set(key, value)?;
            config.save_to(&path)?;
            println!("Set {} = {}", key, config.get(key).unwrap_or_default());
        }
        super::ConfigCommands::Get { key } => {
            let config = Config::load_from(&path)?;
            if let Some(value) = config.get(key) {
                println!("{}", value);
            } else {
                println!("Key '{}' not found", key);
            }
        }
        super::ConfigCommands::Init { force } => {
            Config::init(&path, *force)?;
            println!("Configuration initialized at {}", path.display());
        }
        super::ConfigCommands::Check => {
            let config = Config::load_layered(Some(&path))?;
            let missing = config.missing_required();
            if missing.is_empty() {
                println!("{} All required settings are present", style("✓").green().bold());
            } else {
                println!("{}", style("Missing settings:").red().bold());
                for key in missing {
                    println!("  - {}", key);
                }
            }
        }
    }

    Ok(())
}

/// Scratch directories left behind in `parent` by interrupted runs
pub fn find_temp_dirs(parent: &Path) -> Result<Vec<PathBuf>> {
    if !parent.exists() {
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(parent)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_DIR_PREFIX))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Execute the clean command
pub async fn execute_clean(args: &super::CleanArgs, config: &Config) -> Result<()> {
    let parent = config.general.temp_dir.clone().unwrap_or_else(std::env::temp_dir);

    let mut cleaned = Vec::new();
    for dir in find_temp_dirs(&parent)? {
        if args.dry_run {
            println!("Would remove: {}", dir.display());
        } else {
            std::fs::remove_dir_all(&dir)?;
            cleaned.push(dir);
        }
    }

    if !args.dry_run {
        if cleaned.is_empty() {
            println!("Nothing to clean");
        } else {
            println!("Cleaned {} directories", cleaned.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html(Path::new("a.HTML"), "plain"));
        assert!(!looks_like_html(Path::new("a.txt"), "<html>"));
        assert!(looks_like_html(Path::new("mail.eml"), "  <!DOCTYPE html><html></html>"));
        assert!(!looks_like_html(Path::new("mail"), "Dear reader,"));
    }

    #[test]
    fn test_find_temp_dirs() {
        let parent = tempfile::tempdir().unwrap();
        std::fs::create_dir(parent.path().join("podcast_tts_abc")).unwrap();
        std::fs::create_dir(parent.path().join("podcast_tts_def")).unwrap();
        std::fs::create_dir(parent.path().join("other")).unwrap();
        std::fs::write(parent.path().join("podcast_tts_file"), b"x").unwrap();

        let dirs = find_temp_dirs(parent.path()).unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["podcast_tts_abc", "podcast_tts_def"]);

        assert!(find_temp_dirs(&parent.path().join("missing")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clean_removes_temp_dirs() {
        let parent = tempfile::tempdir().unwrap();
        let stale = parent.path().join("podcast_tts_old");
        std::fs::create_dir(&stale).unwrap();
        std::fs::write(stale.join("000_intro.mp3"), b"x").unwrap();

        let mut config = Config::default();
        config.general.temp_dir = Some(parent.path().to_path_buf());

        execute_clean(&super::super::CleanArgs { dry_run: true }, &config).await.unwrap();
        assert!(stale.exists());

        execute_clean(&super::super::CleanArgs { dry_run: false }, &config).await.unwrap();
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_config_init_and_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let init = super::super::ConfigArgs { command: super::super::ConfigCommands::Init { force: false } };

        execute_config(&init, Some(&path)).await.unwrap();
        assert!(execute_config(&init, Some(&path)).await.is_err());

        let set = super::super::ConfigArgs {
            command: super::super::ConfigCommands::Set {
                key: "podcast.silence_ms".into(),
                value: "500".into(),
            },
        };
        execute_config(&set, Some(&path)).await.unwrap();
        assert_eq!(Config::load_from(&path).unwrap().podcast.silence_ms, 500);
    }

    #[tokio::test]
    async fn test_extract_missing_file() {
        let args = super::super::ExtractArgs { input: PathBuf::from("/nonexistent/mail.html"), stats: false };
        assert!(matches!(execute_extract(&args).await, Err(DigestError::FileNotFound { .. })));
    }
}
