//! Append-only log of chat messages received during this session.
//!
//! Entries are ordered by arrival, not by their timestamp, and are never
//! evicted: the log lives only as long as the page does.
//! Readers keep an index and call [`MessageLog::since`] to pick up new
//! arrivals, or look at [`MessageLog::last`] for the tail.

use serde::{Deserialize, Serialize};

use crate::presence::SessionId;

/// One chat message as relayed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender_id: SessionId,
    pub content: String,
    /// Milliseconds since the Unix epoch, stamped by the relay.
    pub timestamp: i64,
    pub sender_name: String,
}

impl MessageRecord {
    /// Stamp a new message with the current wall-clock time.
    pub fn new(
        sender_id: SessionId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            sender_name: sender_name.into(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    entries: Vec<MessageRecord>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: MessageRecord) {
        self.entries.push(message);
    }

    /// Most recent arrival.
    pub fn last(&self) -> Option<&MessageRecord> {
        self.entries.last()
    }

    /// Entries appended after the first `index` ones. Empty if `index`
    /// is at or past the end.
    pub fn since(&self, index: usize) -> &[MessageRecord] {
        self.entries.get(index..).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
