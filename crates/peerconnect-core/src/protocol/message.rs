//! Chat message type

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// A single chat line exchanged over an established session
///
/// Immutable once built; flows one way between the codec and the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    sender_name: String,
    body: String,
    sent_at: Timestamp,
}

impl ChatMessage {
    /// Build a message stamped with the current time
    pub fn new<S: Into<String>, B: Into<String>>(sender_name: S, body: B) -> Self {
        Self::with_timestamp(sender_name, body, Timestamp::now())
    }

    pub fn with_timestamp<S: Into<String>, B: Into<String>>(
        sender_name: S,
        body: B,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            sender_name: sender_name.into(),
            body: body.into(),
            sent_at,
        }
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn sent_at(&self) -> Timestamp {
        self.sent_at
    }
}
