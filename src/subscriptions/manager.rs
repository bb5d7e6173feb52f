//! Subscription manager for broadcasting stream rows.

use crate::types::Token;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::{DropReason, FeedEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId};

/// Buffer size for subscriptions that don't set one.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<FeedEvent>,
    /// Whether catch-up is complete.
    caught_up: bool,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: FeedEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    ///
    /// The subscription receives no live rows until `mark_caught_up` is
    /// called, so a caller can replay history first.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let buffer_size = config.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (sender, receiver) = bounded(buffer_size.max(1));

        let subscription = Subscription {
            config,
            sender,
            caught_up: false,
        };

        self.subscriptions.write().insert(id, subscription);
        debug!(id = id.0, "subscribed");

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.drop_subscription(id, DropReason::Unsubscribed);
    }

    /// Remove a subscription, telling it why (best effort).
    pub fn drop_subscription(&self, id: SubscriptionId, reason: DropReason) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            debug!(id = id.0, ?reason, "subscription dropped");
            let _ = sub.sender.try_send(FeedEvent::Dropped { reason });
        }
    }

    /// Mark a subscription as caught up (finished historical replay).
    /// Returns false if it was dropped instead.
    pub fn mark_caught_up(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let Some(sub) = subs.get_mut(&id) else {
            return false;
        };
        sub.caught_up = true;
        if !sub.try_send(FeedEvent::CaughtUp) {
            subs.remove(&id);
            warn!(id = id.0, "subscriber overflowed during catch-up");
            return false;
        }
        true
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Broadcast one complete position group to caught-up subscribers.
    pub fn broadcast_rows(&self, stream: &str, token: Token, rows: Vec<serde_json::Value>) {
        let event = FeedEvent::Rows {
            stream: stream.to_string(),
            token,
            rows,
        };

        self.broadcast(|sub| sub.caught_up && sub.config.wants_stream(stream), event);
    }

    /// Broadcast that a stream advanced without rows.
    pub fn broadcast_position(&self, stream: &str, token: Token) {
        let event = FeedEvent::Position {
            stream: stream.to_string(),
            token,
        };

        self.broadcast(|sub| sub.caught_up && sub.config.wants_stream(stream), event);
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: FeedEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(id = id.0, "dropping slow subscriber");
                    // Might fail too; the subscriber is gone either way.
                    let _ = sub.sender.try_send(FeedEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }

    // --- Catch-up Helpers ---

    /// Send an event directly to a subscription (for catch-up).
    /// Returns false if the subscription is gone or its buffer is full.
    pub fn send_to(&self, id: SubscriptionId, event: FeedEvent) -> bool {
        let subs = self.subscriptions.read();
        subs.get(&id).is_some_and(|sub| sub.try_send(event))
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
