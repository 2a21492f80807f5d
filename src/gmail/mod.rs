//! Gmail integration: OAuth credentials and the mailbox client

pub mod auth;
mod client;

pub use auth::{load_credentials, refresh_if_expired, run_installed_flow, AuthorizedUser, ClientSecrets, SCOPES};
pub use client::{build_raw_message, build_search_query, GmailClient};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{GmailMessage, MessageRef};

/// Mailbox the digest reads newsletters from and sends notifications through
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Messages from any of `sources` received in the last `days_ago` days
    async fn find_recent_emails(&self, sources: &[String], days_ago: u32) -> Result<Vec<MessageRef>>;

    /// Full message including the MIME payload
    async fn get_email_details(&self, message_id: &str) -> Result<GmailMessage>;

    /// Send a plain-text email, returning the sent message ID
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String>;
}
