//! Email parsing: MIME body extraction and article text extraction

pub mod email;
pub mod html;

use tracing::{info, warn};

pub use email::{decode_base64url, extract_email_body, get_sender};
pub use html::extract_content_from_html;

/// Collapse every whitespace run into one space and trim the ends
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the readable article from an email's bodies.
///
/// HTML is preferred. When it is absent or yields nothing, the plain body is
/// used after whitespace cleanup. Returns an empty string when neither body
/// has content.
pub fn parse_content(plain_body: Option<&str>, html_body: Option<&str>) -> String {
    let mut content = String::new();

    if let Some(html) = html_body {
        info!("Processing HTML body");
        content = extract_content_from_html(html);
    }

    if content.is_empty() {
        match plain_body {
            Some(plain) => {
                info!("HTML processing yielded no content, using plain text body");
                content = clean_text(plain);
            }
            None if html_body.is_none() => {
                warn!("No HTML or plain text body found to process");
            }
            None => {}
        }
    }

    content
}
