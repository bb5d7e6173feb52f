//! The authority boundary: where feeds read positions and raw changes from.

use crate::error::{FeedError, Result};
use crate::rows::{EventRow, EventsStreamRow, StreamRow};
use crate::types::{RawChange, Token};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Source of truth for a stream's current position and its change records.
///
/// Implementations return changes with positions in `(from, to]`, sorted
/// ascending, with rows sharing a position in a stable order. When `limit`
/// is set at most that many changes are returned.
pub trait Authority: Send + Sync {
    fn current_token(&self) -> Result<Token>;

    fn query_changes(&self, from: Token, to: Token, limit: Option<usize>)
        -> Result<Vec<RawChange>>;
}

impl<A: Authority + ?Sized> Authority for Arc<A> {
    fn current_token(&self) -> Result<Token> {
        (**self).current_token()
    }

    fn query_changes(
        &self,
        from: Token,
        to: Token,
        limit: Option<usize>,
    ) -> Result<Vec<RawChange>> {
        (**self).query_changes(from, to, limit)
    }
}

struct EventLog {
    /// Persisted events, sorted by position.
    entries: Vec<(Token, EventRow)>,
    head: Token,
}

/// In-memory event authority.
///
/// Positions are handed out in increasing order; several events can share
/// one position when written as a group.
pub struct MemoryAuthority {
    log: RwLock<EventLog>,
    unavailable: AtomicBool,
}

impl MemoryAuthority {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(EventLog {
                entries: Vec::new(),
                head: Token(0),
            }),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Persist one event at the next position.
    pub fn persist_event(&self, row: EventRow) -> Token {
        self.persist_events_at_same_position(vec![row])
    }

    /// Persist events atomically at a single new position. Once the head
    /// reaches `u64::MAX`, further writes join that final position.
    pub fn persist_events_at_same_position(&self, rows: Vec<EventRow>) -> Token {
        let mut log = self.log.write();
        let position = log.head.next();
        log.entries.extend(rows.into_iter().map(|row| (position, row)));
        log.head = position;
        position
    }

    /// Move the head forward without writing events, as when positions are
    /// consumed by writes other streams carry.
    pub fn advance_to(&self, token: Token) {
        let mut log = self.log.write();
        if token > log.head {
            log.head = token;
        }
    }

    /// Simulate the authority becoming (un)reachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn event_count(&self) -> usize {
        self.log.read().entries.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FeedError::TransientUnavailable(
                "memory authority marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl Authority for MemoryAuthority {
    fn current_token(&self) -> Result<Token> {
        self.check_available()?;
        Ok(self.log.read().head)
    }

    fn query_changes(
        &self,
        from: Token,
        to: Token,
        limit: Option<usize>,
    ) -> Result<Vec<RawChange>> {
        self.check_available()?;
        let log = self.log.read();
        let start = log.entries.partition_point(|(position, _)| *position <= from);
        let changes = log.entries[start..]
            .iter()
            .take_while(|(position, _)| *position <= to)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(position, row)| {
                RawChange::new(*position, EventsStreamRow::Event(row.clone()).to_positional())
            })
            .collect();
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> EventRow {
        EventRow::new(id, "!room", "m.room.message")
    }

    #[test]
    fn test_positions_increase() {
        let authority = MemoryAuthority::new();
        assert_eq!(authority.current_token().unwrap(), Token(0));
        assert_eq!(authority.persist_event(event("$1")), Token(1));
        assert_eq!(authority.persist_event(event("$2")), Token(2));
        assert_eq!(authority.current_token().unwrap(), Token(2));
        assert_eq!(authority.event_count(), 2);
    }

    #[test]
    fn test_advance_never_rewinds() {
        let authority = MemoryAuthority::new();
        authority.advance_to(Token(9));
        authority.advance_to(Token(3));
        assert_eq!(authority.persist_event(event("$a")), Token(10));
    }

    #[test]
    fn test_persist_at_max_position_does_not_overflow() {
        let authority = MemoryAuthority::new();
        authority.advance_to(Token(u64::MAX));
        assert_eq!(authority.persist_event(event("$a")), Token(u64::MAX));
        assert_eq!(authority.persist_event(event("$b")), Token(u64::MAX));
        assert_eq!(authority.current_token().unwrap(), Token(u64::MAX));
        assert_eq!(authority.event_count(), 2);
    }

    #[test]
    fn test_query_range_is_half_open() {
        let authority = MemoryAuthority::new();
        for i in 1..=5 {
            authority.persist_event(event(&format!("${i}")));
        }

        let changes = authority.query_changes(Token(1), Token(3), None).unwrap();
        let positions: Vec<_> = changes.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![Token(2), Token(3)]);

        let limited = authority.query_changes(Token(0), Token(5), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].position, Token(2));
    }

    #[test]
    fn test_group_shares_position() {
        let authority = MemoryAuthority::new();
        let position =
            authority.persist_events_at_same_position(vec![event("$a"), event("$b"), event("$c")]);
        let changes = authority.query_changes(Token(0), position, None).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.position == position));
    }

    #[test]
    fn test_unavailable() {
        let authority = MemoryAuthority::new();
        authority.set_unavailable(true);
        assert!(authority.current_token().unwrap_err().is_retryable());
        assert!(authority.query_changes(Token(0), Token(1), None).is_err());

        authority.set_unavailable(false);
        assert!(authority.current_token().is_ok());
    }
}
