//! OpenAI API client for chat summaries and text-to-speech

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::summarizer::{build_prompt, max_tokens_for, SYSTEM_PROMPT};
use super::{SpeechSynthesizer, Summarizer};
use crate::config::OpenAiConfig;
use crate::error::{DigestError, Result};

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self { role: role.to_string(), content: content.into() }
    }
}

/// Request to `/chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model name
    pub model: String,
    /// Conversation
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token limit
    pub max_tokens: u32,
    /// Nucleus sampling
    pub top_p: f32,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Presence penalty
    pub presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Request to `/audio/speech`
#[derive(Debug, Clone, Serialize)]
pub struct SpeechRequest {
    /// TTS model
    pub model: String,
    /// Voice name
    pub voice: String,
    /// Text to speak
    pub input: String,
    /// Audio container
    pub response_format: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for the OpenAI REST API
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    summarization_model: String,
    tts_model: String,
    tts_voice: String,
}

impl OpenAiClient {
    /// Create a client from configuration
    pub fn new(config: &OpenAiConfig, timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DigestError::Config("OPENAI_API_KEY is not set".into()))?;

        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
            .timeout(timeout)
            .build()?;

        info!("OpenAI client initialized");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            summarization_model: config.summarization_model.clone(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(DigestError::OpenAi { status: status.as_u16(), message })
    }

    /// Run a chat completion and return the first choice's text
    pub async fn chat(&self, request: &ChatCompletionRequest) -> Result<String> {
        let resp: ChatCompletionResponse = self.post("/chat/completions", request).await?.json().await?;

        if let Some(usage) = &resp.usage {
            debug!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                total = usage.total_tokens,
                "OpenAI token usage"
            );
        }

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| DigestError::OpenAi { status: 200, message: "Response contained no choices".into() })
    }

    /// Synthesize `request` and return the encoded audio
    pub async fn speech(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let bytes = self.post("/audio/speech", request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    async fn summarize(&self, text: &str, source: &str, target_words: usize) -> Result<String> {
        let max_tokens = max_tokens_for(target_words);
        info!(
            "Requesting summary for '{}' with target ~{} words using model '{}' (max_tokens {})",
            source, target_words, self.summarization_model, max_tokens
        );

        let request = ChatCompletionRequest {
            model: self.summarization_model.clone(),
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", build_prompt(text, source, target_words)),
            ],
            temperature: 0.5,
            max_tokens,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        };
        self.chat(&request).await
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        info!(
            "Requesting TTS for '{}' using model '{}', voice '{}'",
            output.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            self.tts_model,
            self.tts_voice
        );

        let request = SpeechRequest {
            model: self.tts_model.clone(),
            voice: self.tts_voice.clone(),
            input: text.to_string(),
            response_format: "mp3".to_string(),
        };
        let audio = self.speech(&request).await?;
        tokio::fs::write(output, audio).await?;

        info!("Saved TTS audio to {}", output.display());
        Ok(())
    }
}
