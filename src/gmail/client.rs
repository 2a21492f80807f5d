//! Gmail REST API client

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{Local, NaiveDate};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::auth::{load_credentials, refresh_if_expired, AuthorizedUser};
use super::Mailbox;
use crate::config::GmailConfig;
use crate::error::{DigestError, Result};
use crate::models::{GmailMessage, MessageRef};

/// `users.messages.list` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// `users.messages.send` request
#[derive(Debug, Serialize)]
struct SendRequest {
    raw: String,
}

/// `users.messages.send` response
#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Google API error envelope
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Build the Gmail search query for messages from any of `sources`
/// received after `cutoff`
pub fn build_search_query(sources: &[String], cutoff: NaiveDate) -> String {
    let from = sources
        .iter()
        .map(|s| format!("from:{}", s))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("({}) after:{}", from, cutoff.format("%Y/%m/%d"))
}

/// Build an RFC 2822 plain-text message ready for `users.messages.send`
pub fn build_raw_message(to: &str, subject: &str, body: &str) -> String {
    let mut message = String::new();
    message.push_str(&format!("To: {}\r\n", header_safe(to)));
    message.push_str("From: me\r\n");
    message.push_str(&format!("Subject: {}\r\n", encode_header(&header_safe(subject))));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n");
    let encoding = if body.is_ascii() { "7bit" } else { "8bit" };
    message.push_str(&format!("Content-Transfer-Encoding: {}\r\n", encoding));
    message.push_str("\r\n");
    message.push_str(&body.replace("\r\n", "\n").replace('\n', "\r\n"));
    message
}

/// Header values must stay on one line
fn header_safe(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// RFC 2047 encoded-word for non-ASCII header values
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!(
            "=?utf-8?b?{}?=",
            base64::engine::general_purpose::STANDARD.encode(value)
        )
    }
}

/// Client for the Gmail API of the authorized user.
///
/// The access token is refreshed before any request once it is about to
/// expire, so a long run keeps working after the token it started with.
pub struct GmailClient {
    client: Client,
    base_url: String,
    creds: Mutex<AuthorizedUser>,
    token_path: Option<PathBuf>,
}

impl GmailClient {
    /// Create a client from already loaded credentials
    pub fn new(creds: AuthorizedUser, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            creds: Mutex::new(creds),
            token_path: None,
        })
    }

    /// Write refreshed tokens back to `path`
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Load (and refresh if needed) the stored token, then build the client
    pub async fn connect(config: &GmailConfig, timeout: Duration) -> Result<Self> {
        info!("Initializing Gmail service");
        let http = Client::builder().timeout(timeout).build()?;
        let creds = load_credentials(&http, &config.token_path).await?;
        let client = Self::new(creds, config.api_url.clone(), timeout)?.with_token_path(&config.token_path);
        info!("Gmail service built successfully");
        Ok(client)
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.base_url)
    }

    /// Current access token, refreshed first when it has expired
    async fn bearer_token(&self) -> Result<String> {
        let mut creds = self.creds.lock().await;
        refresh_if_expired(&mut creds, &self.client, self.token_path.as_deref()).await?;
        Ok(creds.access_token()?.to_string())
    }

    /// Send an authorized request and decode the JSON response
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let token = self.bearer_token().await?;
        let resp = request.bearer_auth(token).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(DigestError::gmail(format!("{}: {}", status, message)));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn find_recent_emails(&self, sources: &[String], days_ago: u32) -> Result<Vec<MessageRef>> {
        if sources.is_empty() {
            warn!("No email sources configured");
            return Ok(Vec::new());
        }

        let cutoff = (Local::now() - chrono::Duration::days(i64::from(days_ago))).date_naive();
        let query = build_search_query(sources, cutoff);
        info!("Searching Gmail with query: {}", query);

        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(self.messages_url()).query(&[("q", query.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListResponse = self.execute(request).await?;
            messages.extend(page.messages);

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    debug!("Fetching next result page");
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        if messages.is_empty() {
            info!("No messages found matching the criteria");
        } else {
            info!("Found {} potential messages", messages.len());
        }
        Ok(messages)
    }

    async fn get_email_details(&self, message_id: &str) -> Result<GmailMessage> {
        let url = format!("{}/{}", self.messages_url(), message_id);
        let request = self.client.get(url).query(&[("format", "full")]);
        self.execute(request).await
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String> {
        let raw = URL_SAFE.encode(build_raw_message(to, subject, body));
        let request = self
            .client
            .post(format!("{}/send", self.messages_url()))
            .json(&SendRequest { raw });

        let sent: SendResponse = self.execute(request).await?;
        info!("Email sent successfully to {}. Message ID: {}", to, sent.id);
        Ok(sent.id)
    }
}
