//! The `events` replication stream.
//!
//! Emits an `ev` row for every event the authority persists, or whose
//! outlier status is cleared.

use crate::authority::Authority;
use crate::codec::RowEnvelope;
use crate::error::Result;
use crate::rows::{EventRow, EventsStreamRow, RowRegistry};
use crate::stream::{poll_authority, Batch, ReplicationStream};
use crate::types::Token;

/// Stream of newly persisted events.
pub struct EventsStream<A> {
    authority: A,
    registry: RowRegistry<EventsStreamRow>,
}

impl<A: Authority> EventsStream<A> {
    pub fn new(authority: A) -> Result<Self> {
        Ok(Self {
            authority,
            registry: EventsStreamRow::registry()?,
        })
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }
}

impl<A: Authority> ReplicationStream for EventsStream<A> {
    const NAME: &'static str = "events";

    type Row = EventsStreamRow;

    fn registry(&self) -> &RowRegistry<EventsStreamRow> {
        &self.registry
    }

    fn current_position(&self) -> Result<Token> {
        self.authority.current_token()
    }

    fn poll_changes(
        &self,
        from: Token,
        to: Token,
        limit: Option<usize>,
    ) -> Result<Batch<RowEnvelope<EventsStreamRow>>> {
        poll_authority(
            Self::NAME,
            &self.authority,
            &EventRow::DESCRIPTOR,
            from,
            to,
            limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::MemoryAuthority;
    use crate::error::FeedError;
    use serde_json::json;
    use std::sync::Arc;

    fn stream() -> (Arc<MemoryAuthority>, EventsStream<Arc<MemoryAuthority>>) {
        let authority = Arc::new(MemoryAuthority::new());
        let stream = EventsStream::new(Arc::clone(&authority)).unwrap();
        (authority, stream)
    }

    fn ids(batch: &Batch<RowEnvelope<EventsStreamRow>>) -> Vec<(u64, String)> {
        batch
            .rows
            .iter()
            .map(|(token, envelope)| {
                let EventsStreamRow::Event(row) = envelope.row();
                (token.0, row.event_id.clone())
            })
            .collect()
    }

    #[test]
    fn test_redaction_scenario() {
        let (authority, stream) = stream();
        authority.advance_to(Token(9));
        authority.persist_event(EventRow::new("$a", "!r1", "m.text"));
        authority.persist_event(EventRow::new("$b", "!r1", "m.redaction").with_redacts("$a"));

        let batch = stream.poll_changes(Token(5), Token(11), None).unwrap();
        assert_eq!(
            batch.rows,
            vec![
                (
                    Token(10),
                    RowEnvelope::new(EventsStreamRow::from(EventRow::new("$a", "!r1", "m.text")))
                ),
                (
                    Token(11),
                    RowEnvelope::new(EventsStreamRow::from(
                        EventRow::new("$b", "!r1", "m.redaction").with_redacts("$a")
                    ))
                ),
            ]
        );
        assert!(batch.rows.iter().all(|(_, e)| e.type_tag() == "ev"));
        assert_eq!(batch.upto_token, Token(11));
        assert!(!batch.limited);
    }

    #[test]
    fn test_current_position_tracks_authority() {
        let (authority, stream) = stream();
        assert_eq!(stream.current_position().unwrap(), Token(0));
        authority.persist_event(EventRow::new("$a", "!r", "m.text"));
        assert_eq!(stream.current_position().unwrap(), Token(1));
    }

    #[test]
    fn test_limit_keeps_position_group_together() {
        let (authority, stream) = stream();
        authority.persist_event(EventRow::new("$1", "!r", "m.text"));
        authority.persist_events_at_same_position(vec![
            EventRow::new("$2a", "!r", "m.text"),
            EventRow::new("$2b", "!r", "m.text"),
            EventRow::new("$2c", "!r", "m.text"),
        ]);
        authority.persist_event(EventRow::new("$3", "!r", "m.text"));

        let batch = stream.poll_changes(Token(0), Token(3), Some(2)).unwrap();
        assert_eq!(
            ids(&batch),
            vec![
                (1, "$1".to_string()),
                (2, "$2a".to_string()),
                (2, "$2b".to_string()),
                (2, "$2c".to_string()),
            ]
        );
        assert!(batch.limited);
        assert_eq!(batch.upto_token, Token(2));

        let rest = stream.poll_changes(batch.upto_token, Token(3), Some(2)).unwrap();
        assert_eq!(ids(&rest), vec![(3, "$3".to_string())]);
        assert!(!rest.limited);
        assert_eq!(rest.upto_token, Token(3));
    }

    #[test]
    fn test_limit_exactly_at_end_is_not_limited() {
        let (authority, stream) = stream();
        authority.persist_event(EventRow::new("$1", "!r", "m.text"));
        authority.persist_event(EventRow::new("$2", "!r", "m.text"));

        let batch = stream.poll_changes(Token(0), Token(2), Some(2)).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(!batch.limited);
        assert_eq!(batch.upto_token, Token(2));
    }

    #[test]
    fn test_unavailable_authority_is_retryable() {
        let (authority, stream) = stream();
        authority.persist_event(EventRow::new("$1", "!r", "m.text"));
        authority.set_unavailable(true);

        let err = stream.poll_changes(Token(0), Token(1), None).unwrap_err();
        assert!(matches!(err, FeedError::TransientUnavailable(_)));

        authority.set_unavailable(false);
        let batch = stream.poll_changes(Token(0), Token(1), None).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_parse_row() {
        let (_, stream) = stream();
        let envelope = stream
            .parse_row("ev", &[json!("$a"), json!("!r1"), json!("m.text"), json!(null), json!(null)])
            .unwrap();
        assert_eq!(
            envelope.into_row(),
            EventsStreamRow::Event(EventRow::new("$a", "!r1", "m.text"))
        );

        assert!(matches!(
            stream.parse_row("nonexistent_tag", &[]),
            Err(FeedError::UnknownRowType(_))
        ));
        assert!(matches!(
            stream.parse_wire_row(&json!(["ev", ["$a"]])),
            Err(FeedError::MalformedRow { .. })
        ));
    }
}
