//! Subscription types for replicated stream rows.

use crate::types::Token;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// None = the dispatcher's `subscriber_buffer_size`, or 1000.
    pub buffer_size: Option<usize>,

    /// Streams to follow (None = all streams).
    pub streams: Option<Vec<String>>,

    /// Per-stream token to catch up from. Streams without an entry start live.
    pub from_tokens: HashMap<String, Token>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: None,
            streams: None,
            from_tokens: HashMap::new(),
        }
    }
}

impl SubscriptionConfig {
    /// Subscribe to specific streams.
    pub fn streams(streams: Vec<String>) -> Self {
        Self {
            streams: Some(streams),
            ..Default::default()
        }
    }

    /// Replay `stream` from `token` before going live.
    pub fn with_from_token(mut self, stream: impl Into<String>, token: Token) -> Self {
        self.from_tokens.insert(stream.into(), token);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Whether this subscription follows `stream`.
    pub fn wants_stream(&self, stream: &str) -> bool {
        match &self.streams {
            Some(streams) => streams.iter().any(|s| s == stream),
            None => true,
        }
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// All rows of one position group, as `[type_tag, [fields...]]`.
    Rows {
        stream: String,
        token: Token,
        rows: Vec<serde_json::Value>,
    },

    /// The stream advanced without rows for this subscriber.
    Position { stream: String, token: Token },

    /// Finished historical catch-up, now streaming live.
    CaughtUp,

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Catch-up could not be completed.
    CatchUpFailed(String),
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to receive a subscription's events.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<FeedEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<FeedEvent> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_filter() {
        assert!(SubscriptionConfig::default().wants_stream("events"));

        let config = SubscriptionConfig::streams(vec!["events".to_string()]);
        assert!(config.wants_stream("events"));
        assert!(!config.wants_stream("typing"));
    }

    #[test]
    fn test_event_serialization() {
        let event = FeedEvent::Rows {
            stream: "events".to_string(),
            token: Token(3),
            rows: vec![json!(["ev", ["$a", "!r", "m.text", null, null]])],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "rows");
        assert_eq!(value["token"], 3);

        let back: FeedEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
