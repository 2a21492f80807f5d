//! Configuration management for digestcast
//!
//! Settings are layered: built-in defaults, then the TOML config file, then
//! the `Values` map of `local.settings.json` (skipped when running inside
//! Azure), then process environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DigestError, Result};

/// Environment variable that is only set inside an Azure App Service host
pub const AZURE_INSTANCE_VAR: &str = "WEBSITE_INSTANCE_ID";

/// Local settings file read when not running in Azure
pub const LOCAL_SETTINGS_FILE: &str = "local.settings.json";

/// Newsletter senders collected by default
pub const DEFAULT_EMAIL_SOURCES: &[&str] = &[
    "noreply@news.bloomberg.com",
    "access@interactive.wsj.com",
    "email@stratechery.com",
    "nytdirect@nytimes.com",
    "crew@morningbrew.com",
    "richardhanania+hanpod@substack.com",
    "pragmaticengineer@substack.com",
    "hello@worddaily.com",
    "hello@historyfacts.com",
    "astralcodexten@substack.com",
    "hello@snacks.robinhood.com",
    "richardhanania+nls@substack.com",
    "citrini@substack.com",
];

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Gmail settings
    #[serde(default)]
    pub gmail: GmailConfig,

    /// OpenAI settings
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Podcast generation settings
    #[serde(default)]
    pub podcast: PodcastConfig,

    /// Azure Blob Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Daily schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Address that receives the podcast link and failure notices
    pub target_email: Option<String>,
    /// Parent directory for per-run scratch directories
    pub temp_dir: Option<PathBuf>,
    /// Number of threads used for content extraction
    pub jobs: Option<usize>,
}

/// Gmail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// OAuth client secrets downloaded from Google Cloud Console
    pub credentials_path: PathBuf,
    /// Authorized user token written by `digestcast auth`
    pub token_path: PathBuf,
    /// Sender addresses to collect
    pub sources: Vec<String>,
    /// How many days back to search
    pub days_ago: u32,
    /// Loopback port for the OAuth redirect (0 picks a free port)
    pub auth_port: u16,
    /// Gmail REST API base URL
    pub api_url: String,
}

/// OpenAI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: Option<String>,
    /// API base URL
    pub base_url: String,
    /// Chat model used for summaries
    pub summarization_model: String,
    /// Text-to-speech model
    pub tts_model: String,
    /// Text-to-speech voice
    pub tts_voice: String,
}

/// Podcast generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastConfig {
    /// Shortest podcast to aim for, in minutes
    pub min_duration_mins: u32,
    /// Longest podcast to aim for, in minutes
    pub max_duration_mins: u32,
    /// Estimated speaking rate of the TTS voice
    pub words_per_minute: u32,
    /// Silence inserted between segments
    pub silence_ms: u64,
    /// Pause between consecutive TTS requests
    pub tts_pause_ms: u64,
    /// Title embedded in the audio metadata
    pub title: String,
    /// ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// ffprobe binary
    pub ffprobe_path: PathBuf,
}

/// Azure Blob Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage account connection string
    pub connection_string: Option<String>,
    /// Container receiving the podcast files
    pub container: String,
    /// Validity of the generated download link, in days
    pub sas_expiry_days: u32,
}

/// Schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily run time, `HH:MM` in UTC
    pub time_utc: String,
    /// Run once immediately when the scheduler starts
    pub run_on_startup: bool,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// HTTP timeout in seconds
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            sources: DEFAULT_EMAIL_SOURCES.iter().map(|s| s.to_string()).collect(),
            days_ago: 1,
            auth_port: 0,
            api_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            summarization_model: "gpt-4o".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
        }
    }
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            min_duration_mins: 30,
            max_duration_mins: 90,
            words_per_minute: 150,
            silence_ms: 750,
            tts_pause_ms: 500,
            title: "Daily Email Digest".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            container: "podcast-audio".to_string(),
            sas_expiry_days: 2,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time_utc: "07:00".to_string(),
            run_on_startup: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { timeout: 120 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Whether the process runs inside an Azure App Service host
pub fn is_azure_environment() -> bool {
    std::env::var_os(AZURE_INSTANCE_VAR).is_some()
}

/// Read the `Values` map of a `local.settings.json` file.
///
/// A missing or malformed file yields an empty map; the problem is logged.
pub fn read_local_settings(path: &Path) -> HashMap<String, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            warn!("{} not found, using environment variables only", path.display());
            return HashMap::new();
        }
    };

    #[derive(Deserialize)]
    struct LocalSettings {
        #[serde(rename = "Values", default)]
        values: HashMap<String, serde_json::Value>,
    }

    match serde_json::from_str::<LocalSettings>(&content) {
        Ok(settings) => settings
            .values
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect(),
        Err(e) => {
            warn!("Error decoding {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DigestError::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("digestcast").join("config.toml"))
    }

    /// Load configuration from a TOML file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load every configuration layer.
    ///
    /// `path` overrides the default config file location.
    pub fn load_layered(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };

        let mut settings = HashMap::new();
        if !is_azure_environment() {
            settings.extend(read_local_settings(Path::new(LOCAL_SETTINGS_FILE)));
        }
        for key in ENV_KEYS {
            if let Ok(value) = std::env::var(key) {
                settings.insert(key.to_string(), value);
            }
        }
        config.apply_settings(&settings)?;

        let missing = config.missing_required();
        if !missing.is_empty() {
            warn!(
                "Missing critical configuration settings: {}. Check environment variables or {}.",
                missing.join(", "),
                LOCAL_SETTINGS_FILE
            );
        }
        config.log_summary();

        Ok(config)
    }

    /// Apply settings keyed by their environment variable names
    pub fn apply_settings(&mut self, settings: &HashMap<String, String>) -> Result<()> {
        for (key, value) in settings {
            let Some(dotted) = env_key_to_config_key(key) else {
                continue;
            };
            self.set(dotted, value)?;
        }
        Ok(())
    }

    /// Names of required settings that have no value
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.openai.api_key) {
            missing.push("OPENAI_API_KEY");
        }
        if is_blank(&self.storage.connection_string) {
            missing.push("AZURE_STORAGE_CONNECTION_STRING");
        }
        if self.storage.container.trim().is_empty() {
            missing.push("AZURE_STORAGE_CONTAINER_NAME");
        }
        if is_blank(&self.general.target_email) {
            missing.push("TARGET_EMAIL_ADDRESS");
        }
        missing
    }

    /// Fail unless every required setting is present
    pub fn require_complete(&self) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DigestError::Config(format!(
                "Missing settings prevent proper operation: {}",
                missing.join(", ")
            )))
        }
    }

    fn log_summary(&self) {
        info!(
            azure = is_azure_environment(),
            level = %self.logging.level,
            "Configuration loaded"
        );
        info!(
            "Summarization model: {}, TTS model: {}, voice: {}",
            self.openai.summarization_model, self.openai.tts_model, self.openai.tts_voice
        );
        info!(
            "Target email: {}, container: {}, email sources: {}",
            self.general.target_email.as_deref().unwrap_or("<unset>"),
            self.storage.container,
            self.gmail.sources.len()
        );
        info!(
            "Gmail credentials: {}, token: {}",
            self.gmail.credentials_path.display(),
            self.gmail.token_path.display()
        );
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| DigestError::Config(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Reset the configuration file at `path` to defaults
    pub fn reset(path: &Path) -> Result<()> {
        Self::default().save_to(path)
    }

    /// Write a default configuration file to `path`
    pub fn init(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(DigestError::Config(
                "Configuration file already exists. Use --force to overwrite.".into(),
            ));
        }

        Self::default().save_to(path)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "general.target_email" => self.general.target_email.clone(),
            "general.temp_dir" => self.general.temp_dir.as_ref().map(|p| p.display().to_string()),
            "general.jobs" => self.general.jobs.map(|j| j.to_string()),

            "gmail.credentials_path" => Some(self.gmail.credentials_path.display().to_string()),
            "gmail.token_path" => Some(self.gmail.token_path.display().to_string()),
            "gmail.sources" => Some(self.gmail.sources.join(",")),
            "gmail.days_ago" => Some(self.gmail.days_ago.to_string()),
            "gmail.auth_port" => Some(self.gmail.auth_port.to_string()),
            "gmail.api_url" => Some(self.gmail.api_url.clone()),

            "openai.api_key" => self.openai.api_key.as_ref().map(|_| "********".to_string()),
            "openai.base_url" => Some(self.openai.base_url.clone()),
            "openai.summarization_model" => Some(self.openai.summarization_model.clone()),
            "openai.tts_model" => Some(self.openai.tts_model.clone()),
            "openai.tts_voice" => Some(self.openai.tts_voice.clone()),

            "podcast.min_duration_mins" => Some(self.podcast.min_duration_mins.to_string()),
            "podcast.max_duration_mins" => Some(self.podcast.max_duration_mins.to_string()),
            "podcast.words_per_minute" => Some(self.podcast.words_per_minute.to_string()),
            "podcast.silence_ms" => Some(self.podcast.silence_ms.to_string()),
            "podcast.tts_pause_ms" => Some(self.podcast.tts_pause_ms.to_string()),
            "podcast.title" => Some(self.podcast.title.clone()),
            "podcast.ffmpeg_path" => Some(self.podcast.ffmpeg_path.display().to_string()),
            "podcast.ffprobe_path" => Some(self.podcast.ffprobe_path.display().to_string()),

            "storage.connection_string" => self
                .storage
                .connection_string
                .as_ref()
                .map(|_| "********".to_string()),
            "storage.container" => Some(self.storage.container.clone()),
            "storage.sas_expiry_days" => Some(self.storage.sas_expiry_days.to_string()),

            "schedule.time_utc" => Some(self.schedule.time_utc.clone()),
            "schedule.run_on_startup" => Some(self.schedule.run_on_startup.to_string()),

            "network.timeout" => Some(self.network.timeout.to_string()),

            "logging.level" => Some(self.logging.level.clone()),

            _ => None,
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "general.target_email" => self.general.target_email = non_empty(value),
            "general.temp_dir" => self.general.temp_dir = non_empty(value).map(PathBuf::from),
            "general.jobs" => self.general.jobs = Some(parse_value(key, value)?),

            "gmail.credentials_path" => self.gmail.credentials_path = PathBuf::from(value),
            "gmail.token_path" => self.gmail.token_path = PathBuf::from(value),
            "gmail.sources" => {
                self.gmail.sources = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "gmail.days_ago" => self.gmail.days_ago = parse_value(key, value)?,
            "gmail.auth_port" => self.gmail.auth_port = parse_value(key, value)?,
            "gmail.api_url" => self.gmail.api_url = value.to_string(),

            "openai.api_key" => self.openai.api_key = non_empty(value),
            "openai.base_url" => self.openai.base_url = value.to_string(),
            "openai.summarization_model" => self.openai.summarization_model = value.to_string(),
            "openai.tts_model" => self.openai.tts_model = value.to_string(),
            "openai.tts_voice" => self.openai.tts_voice = value.to_string(),

            "podcast.min_duration_mins" => self.podcast.min_duration_mins = parse_value(key, value)?,
            "podcast.max_duration_mins" => self.podcast.max_duration_mins = parse_value(key, value)?,
            "podcast.words_per_minute" => self.podcast.words_per_minute = parse_value(key, value)?,
            "podcast.silence_ms" => self.podcast.silence_ms = parse_value(key, value)?,
            "podcast.tts_pause_ms" => self.podcast.tts_pause_ms = parse_value(key, value)?,
            "podcast.title" => self.podcast.title = value.to_string(),
            "podcast.ffmpeg_path" => self.podcast.ffmpeg_path = PathBuf::from(value),
            "podcast.ffprobe_path" => self.podcast.ffprobe_path = PathBuf::from(value),

            "storage.connection_string" => self.storage.connection_string = non_empty(value),
            "storage.container" => self.storage.container = value.to_string(),
            "storage.sas_expiry_days" => self.storage.sas_expiry_days = parse_value(key, value)?,

            "schedule.time_utc" => {
                chrono::NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
                    DigestError::Config(format!("Invalid time for {}: expected HH:MM", key))
                })?;
                self.schedule.time_utc = value.to_string();
            }
            "schedule.run_on_startup" => self.schedule.run_on_startup = parse_value(key, value)?,

            "network.timeout" => self.network.timeout = parse_value(key, value)?,

            "logging.level" => self.logging.level = value.to_lowercase(),

            _ => {
                return Err(DigestError::Config(format!("Unknown configuration key: {}", key)));
            }
        }

        Ok(())
    }
}

/// Environment variables recognised by [`Config::apply_settings`]
pub const ENV_KEYS: &[&str] = &[
    "LOG_LEVEL",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "SUMMARIZATION_MODEL",
    "AUDIO_TTS_MODEL",
    "AUDIO_TTS_VOICE",
    "AZURE_STORAGE_CONNECTION_STRING",
    "AZURE_STORAGE_CONTAINER_NAME",
    "TARGET_EMAIL_ADDRESS",
    "GMAIL_CREDENTIALS_PATH",
    "GMAIL_TOKEN_PATH",
];

fn env_key_to_config_key(key: &str) -> Option<&'static str> {
    let dotted = match key {
        "LOG_LEVEL" => "logging.level",
        "OPENAI_API_KEY" => "openai.api_key",
        "OPENAI_BASE_URL" => "openai.base_url",
        "SUMMARIZATION_MODEL" => "openai.summarization_model",
        "AUDIO_TTS_MODEL" => "openai.tts_model",
        "AUDIO_TTS_VOICE" => "openai.tts_voice",
        "AZURE_STORAGE_CONNECTION_STRING" => "storage.connection_string",
        "AZURE_STORAGE_CONTAINER_NAME" => "storage.container",
        "TARGET_EMAIL_ADDRESS" => "general.target_email",
        "GMAIL_CREDENTIALS_PATH" => "gmail.credentials_path",
        "GMAIL_TOKEN_PATH" => "gmail.token_path",
        _ => return None,
    };
    Some(dotted)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DigestError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.openai.summarization_model, "gpt-4o");
        assert_eq!(config.openai.tts_voice, "alloy");
        assert_eq!(config.storage.container, "podcast-audio");
        assert_eq!(config.gmail.sources.len(), 13);
        assert_eq!(config.podcast.words_per_minute, 150);
        assert_eq!(config.schedule.time_utc, "07:00");
    }

    #[test]
    fn test_get_set() {
        let mut config = Config::default();

        config.set("podcast.silence_ms", "500").unwrap();
        assert_eq!(config.get("podcast.silence_ms"), Some("500".to_string()));

        config.set("gmail.sources", "a@x.com, b@y.com,").unwrap();
        assert_eq!(config.gmail.sources, vec!["a@x.com", "b@y.com"]);

        assert!(config.set("network.timeout", "soon").is_err());
        assert!(config.set("schedule.time_utc", "7am").is_err());
        assert!(config.set("nope.key", "1").is_err());
    }

    #[test]
    fn test_secrets_are_masked() {
        let mut config = Config::default();
        config.set("openai.api_key", "sk-secret").unwrap();
        assert_eq!(config.get("openai.api_key"), Some("********".to_string()));
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-secret"));
    }

    #[test]
    fn test_apply_settings_uses_env_names() {
        let mut config = Config::default();
        let settings: HashMap<String, String> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("AUDIO_TTS_VOICE", "nova"),
            ("TARGET_EMAIL_ADDRESS", "me@example.com"),
            ("FUNCTIONS_WORKER_RUNTIME", "python"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_settings(&settings).unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.openai.tts_voice, "nova");
        assert_eq!(config.general.target_email.as_deref(), Some("me@example.com"));
    }

    #[test]
    fn test_missing_required() {
        let mut config = Config::default();
        assert_eq!(
            config.missing_required(),
            vec!["OPENAI_API_KEY", "AZURE_STORAGE_CONNECTION_STRING", "TARGET_EMAIL_ADDRESS"]
        );
        assert!(config.require_complete().is_err());

        config.set("openai.api_key", "sk").unwrap();
        config.set("storage.connection_string", "AccountName=a;AccountKey=b").unwrap();
        config.set("general.target_email", "me@example.com").unwrap();
        assert!(config.require_complete().is_ok());
    }

    #[test]
    fn test_read_local_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"{"IsEncrypted": false, "Values": {"OPENAI_API_KEY": "sk-local", "RETRIES": 3, "EMPTY": null}}"#,
        )
        .unwrap();

        let values = read_local_settings(&path);
        assert_eq!(values.get("OPENAI_API_KEY").map(String::as_str), Some("sk-local"));
        assert_eq!(values.get("RETRIES").map(String::as_str), Some("3"));
        assert!(!values.contains_key("EMPTY"));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(read_local_settings(&path).is_empty());
        assert!(read_local_settings(&dir.path().join("missing.json")).is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("storage.container", "daily").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.storage.container, "daily");
        assert_eq!(loaded.gmail.sources, config.gmail.sources);
    }
}
