//! Gmail API message representation

use serde::{Deserialize, Serialize};

/// A search hit returned by `users.messages.list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message ID
    pub id: String,
    /// Thread ID
    #[serde(default)]
    pub thread_id: String,
}

/// A full message returned by `users.messages.get` with `format=full`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    /// Message ID
    pub id: String,
    /// Thread ID
    #[serde(default)]
    pub thread_id: String,
    /// Short preview of the body
    #[serde(default)]
    pub snippet: String,
    /// Root MIME part
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// One node of the MIME tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    /// MIME type, e.g. `text/html` or `multipart/alternative`
    #[serde(default)]
    pub mime_type: String,
    /// Headers of this part
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Body of this part; data is absent for containers and attachments
    #[serde(default)]
    pub body: Option<PartBody>,
    /// Child parts of a multipart container
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

/// A single message header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

/// Body of a MIME part
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    /// Base64url encoded data
    #[serde(default)]
    pub data: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
}

impl GmailMessage {
    /// Headers of the root part
    pub fn headers(&self) -> &[Header] {
        self.payload.as_ref().map_or(&[], |p| p.headers.as_slice())
    }

    /// First header with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

impl MessagePart {
    /// Encoded body data, if this part carries any
    pub fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }
}
