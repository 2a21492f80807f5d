//! Data models for messages, summaries and episodes

mod message;
mod podcast;

pub use message::*;
pub use podcast::*;
