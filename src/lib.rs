//! # Replication Feed
//!
//! Typed, incremental replication streams: an authority exposes an
//! append-only log of changes addressed by monotonically increasing tokens,
//! and consumers catch up from any past token by polling batches of typed,
//! self-describing rows.
//!
//! ## Core Concepts
//!
//! - **Tokens**: Totally ordered positions in the authority's change log
//! - **Rows**: Per-stream sum types, sent positionally as `[tag, [fields...]]`
//! - **Registries**: Map wire tags back onto row variants
//! - **Streams**: Stateless pollers over `(from, to]` token ranges
//! - **Dispatcher**: Drives many streams and fans rows out to subscribers
//!
//! ## Example
//!
//! ```ignore
//! use replication_feed::{EventRow, EventsStream, MemoryAuthority, ReplicationStream, Token};
//! use std::sync::Arc;
//!
//! let authority = Arc::new(MemoryAuthority::new());
//! let stream = EventsStream::new(Arc::clone(&authority))?;
//!
//! authority.persist_event(EventRow::new("$a", "!room", "m.room.message"));
//!
//! // Catch up from the start, 100 rows at a time.
//! let batch = stream.poll_changes(Token(0), stream.current_position()?, Some(100))?;
//! for (token, envelope) in &batch.rows {
//!     println!("{token}: {}", envelope.to_json());
//! }
//! ```

pub mod authority;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod frame;
pub mod rows;
pub mod stream;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use authority::{Authority, MemoryAuthority};
pub use codec::{decode, encode, RowEnvelope};
pub use dispatch::{StreamDispatcher, TickReport};
pub use error::{FeedError, Result};
pub use events::EventsStream;
pub use frame::{frames_for_batch, FrameAssembler, FrameToken, RdataFrame, ReleasedRows};
pub use rows::{EventRow, EventsStreamRow, RowDescriptor, RowRegistry, StreamRow};
pub use stream::{poll_authority, Batch, DynStream, ReplicationStream};
pub use subscriptions::{
    DropReason, FeedEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;
