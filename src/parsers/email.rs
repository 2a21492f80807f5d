//! Gmail message body and header extraction

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{GmailMessage, MessagePart};

/// Base64url engine that accepts data with or without padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode Gmail's base64url body data into text, replacing invalid UTF-8
pub fn decode_base64url(data: &str) -> Result<String> {
    let bytes = URL_SAFE_LENIENT.decode(data.trim())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Which body slot a MIME type fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Plain,
    Html,
}

fn body_kind(mime_type: &str) -> Option<BodyKind> {
    if mime_type.contains("text/plain") {
        Some(BodyKind::Plain)
    } else if mime_type.contains("text/html") {
        Some(BodyKind::Html)
    } else {
        None
    }
}

#[derive(Default)]
struct Bodies {
    plain: Option<String>,
    html: Option<String>,
}

impl Bodies {
    fn complete(&self) -> bool {
        self.plain.is_some() && self.html.is_some()
    }

    /// Decode a part and store it in the slot its MIME type selects
    fn absorb(&mut self, part: &MessagePart, data: &str, message_id: &str) {
        let Some(kind) = body_kind(&part.mime_type) else {
            return;
        };
        match decode_base64url(data) {
            Ok(text) => match kind {
                BodyKind::Plain => self.plain = Some(text),
                BodyKind::Html => self.html = Some(text),
            },
            Err(e) => warn!("Skipping undecodable {} part of {}: {}", part.mime_type, message_id, e),
        }
    }
}

/// Extract the plain text and HTML bodies of a message.
///
/// Single-part messages use the root body. Multipart messages are walked
/// part by part; a part without data of its own is searched one level
/// deeper. Later parts of the same type replace earlier ones, and the walk
/// stops once both bodies are known.
pub fn extract_email_body(message: &GmailMessage) -> (Option<String>, Option<String>) {
    let mut bodies = Bodies::default();

    let Some(payload) = message.payload.as_ref() else {
        warn!("Message {} has no payload", message.id);
        return (None, None);
    };

    if let (Some(data), Some(_)) = (payload.data(), body_kind(&payload.mime_type)) {
        bodies.absorb(payload, data, &message.id);
    } else if payload.mime_type.contains("multipart") {
        for part in &payload.parts {
            match part.data() {
                Some(data) => bodies.absorb(part, data, &message.id),
                None => {
                    for nested in &part.parts {
                        if let Some(data) = nested.data() {
                            bodies.absorb(nested, data, &message.id);
                        }
                        if bodies.complete() {
                            break;
                        }
                    }
                }
            }
            if bodies.complete() {
                break;
            }
        }
    }

    if let Some(html) = &bodies.html {
        debug!("Extracted HTML body (len: {}) for message {}", html.len(), message.id);
    } else if let Some(plain) = &bodies.plain {
        debug!("Extracted plain text body (len: {}) for message {}", plain.len(), message.id);
    } else {
        warn!("Could not extract text/html or text/plain body for message {}", message.id);
    }

    (bodies.plain, bodies.html)
}

/// Extract the sender address from the `From` header.
///
/// Returns the address in angle brackets when present, otherwise the whole
/// header when it looks like an address.
pub fn get_sender(message: &GmailMessage) -> Option<String> {
    lazy_static::lazy_static! {
        static ref ANGLE_ADDRESS: Regex = Regex::new(r"<(.+?)>").unwrap();
    }

    let from = message.header("from")?;
    if let Some(caps) = ANGLE_ADDRESS.captures(from) {
        return Some(caps[1].to_string());
    }
    if from.contains('@') {
        return Some(from.trim().to_string());
    }
    None
}
