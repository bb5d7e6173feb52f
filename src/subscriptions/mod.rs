//! In-process subscriptions to replicated stream rows.
//!
//! Subscribers receive each completed position group of every stream they
//! follow, after an optional catch-up from a token of their choosing:
//! - Per-stream filtering
//! - Historical catch-up before live rows
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let handle = dispatcher.subscribe(
//!     SubscriptionConfig::streams(vec!["events".to_string()])
//!         .with_from_token("events", Token(100)),
//! )?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::Rows { token, rows, .. }) => println!("{token}: {rows:?}"),
//!         Ok(FeedEvent::CaughtUp) => println!("Now live!"),
//!         Ok(FeedEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{DropReason, FeedEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId};
