//! The stream abstraction every replication feed implements.
//!
//! A stream has a fixed name, knows its authority's current position, and
//! can return the rows between two positions. Streams are stateless: the
//! caller owns the token it has caught up to.

use crate::authority::Authority;
use crate::codec::{self, RowEnvelope};
use crate::error::{FeedError, Result};
use crate::rows::{RowDescriptor, RowRegistry, StreamRow};
use crate::types::{RawChange, Token};
use serde_json::Value;
use tracing::{debug, trace};

/// Rows returned by one poll, sorted by position.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch<T> {
    pub rows: Vec<(Token, T)>,

    /// Position the caller has caught up to once it has consumed `rows`.
    pub upto_token: Token,

    /// True if rows remain between `upto_token` and the requested end.
    pub limited: bool,
}

impl<T> Batch<T> {
    pub fn empty(upto_token: Token) -> Self {
        Self {
            rows: Vec::new(),
            upto_token,
            limited: false,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Batch<U> {
        Batch {
            rows: self
                .rows
                .into_iter()
                .map(|(token, row)| (token, f(row)))
                .collect(),
            upto_token: self.upto_token,
            limited: self.limited,
        }
    }
}

/// A typed replication stream.
pub trait ReplicationStream: Send + Sync {
    /// Name identifying the stream on the wire.
    const NAME: &'static str;

    type Row: StreamRow;

    fn registry(&self) -> &RowRegistry<Self::Row>;

    /// The authority's latest position. Non-decreasing across calls.
    fn current_position(&self) -> Result<Token>;

    /// Rows with positions in `(from, to]`, at most roughly `limit` of them.
    fn poll_changes(
        &self,
        from: Token,
        to: Token,
        limit: Option<usize>,
    ) -> Result<Batch<RowEnvelope<Self::Row>>>;

    /// Decode a received `(tag, data)` row.
    fn parse_row(&self, tag: &str, data: &[Value]) -> Result<RowEnvelope<Self::Row>> {
        codec::decode(self.registry(), tag, data)
    }

    /// Decode a received `[tag, [data...]]` row.
    fn parse_wire_row(&self, value: &Value) -> Result<RowEnvelope<Self::Row>> {
        RowEnvelope::from_json(self.registry(), value)
    }
}

/// Object-safe view of a stream, dealing in wire rows, so a dispatcher can
/// hold streams with different row types.
pub trait DynStream: Send + Sync {
    fn name(&self) -> &'static str;

    fn latest_token(&self) -> Result<Token>;

    fn poll_wire_rows(&self, from: Token, to: Token, limit: Option<usize>) -> Result<Batch<Value>>;
}

impl<S: ReplicationStream> DynStream for S {
    fn name(&self) -> &'static str {
        S::NAME
    }

    fn latest_token(&self) -> Result<Token> {
        self.current_position()
    }

    fn poll_wire_rows(&self, from: Token, to: Token, limit: Option<usize>) -> Result<Batch<Value>> {
        Ok(self.poll_changes(from, to, limit)?.map(|envelope| envelope.to_json()))
    }
}

/// Fetch `(from, to]` from an authority whose changes are all rows of one
/// variant.
///
/// A position group is never split: when the authority fills `limit`, the
/// last position is re-read in full, so the batch may hold up to
/// `limit + k - 1` rows where `k` is the size of the largest group. A limit
/// of zero is treated as one.
pub fn poll_authority<A, R>(
    stream: &str,
    authority: &A,
    descriptor: &RowDescriptor<R>,
    from: Token,
    to: Token,
    limit: Option<usize>,
) -> Result<Batch<RowEnvelope<R>>>
where
    A: Authority + ?Sized,
    R: StreamRow,
{
    if from > to {
        return Err(FeedError::InvalidRange { from, to });
    }
    if from == to {
        return Ok(Batch::empty(to));
    }

    let limit = limit.map(|l| l.max(1));
    let mut changes = authority.query_changes(from, to, limit)?;
    check_changes(stream, &changes, from, to)?;

    let mut limited = false;
    let mut upto_token = to;
    let last_position = changes.last().map(|change| change.position);
    if let (Some(limit), Some(last)) = (limit, last_position) {
        if changes.len() >= limit {
            let group_start = last.prev().unwrap_or_default();
            let group = authority.query_changes(group_start, last, None)?;
            check_changes(stream, &group, group_start, last)?;

            changes.retain(|change| change.position < last);
            changes.extend(group);
            limited = last < to;
            upto_token = last;
        }
    }

    let rows = changes
        .into_iter()
        .map(|change| {
            let row = descriptor.from_positional(&change.data).map_err(|e| {
                FeedError::SchemaViolation(format!("{stream} stream at {}: {e}", change.position))
            })?;
            Ok((change.position, RowEnvelope::new(row)))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        stream,
        from = from.0,
        to = to.0,
        upto = upto_token.0,
        rows = rows.len(),
        limited,
        "polled changes"
    );

    Ok(Batch {
        rows,
        upto_token,
        limited,
    })
}

/// Reject authority output outside `(from, to]` or out of order.
fn check_changes(stream: &str, changes: &[RawChange], from: Token, to: Token) -> Result<()> {
    let mut previous = from;
    for change in changes {
        if change.position <= from || change.position > to {
            return Err(FeedError::SchemaViolation(format!(
                "{stream} stream: position {} outside ({from}, {to}]",
                change.position
            )));
        }
        if change.position < previous {
            return Err(FeedError::SchemaViolation(format!(
                "{stream} stream: position {} after {previous}",
                change.position
            )));
        }
        previous = change.position;
    }
    trace!(stream, count = changes.len(), "authority changes in order");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{EventRow, EventsStreamRow};
    use serde_json::json;

    /// Authority returning canned changes regardless of the request.
    struct Canned(Vec<RawChange>);

    impl Authority for Canned {
        fn current_token(&self) -> Result<Token> {
            Ok(self.0.last().map(|c| c.position).unwrap_or_default())
        }

        fn query_changes(&self, _: Token, _: Token, _: Option<usize>) -> Result<Vec<RawChange>> {
            Ok(self.0.clone())
        }
    }

    fn change(position: u64, id: &str) -> RawChange {
        RawChange::new(
            Token(position),
            vec![json!(id), json!("!r"), json!("m.text"), json!(null), json!(null)],
        )
    }

    fn poll(authority: &Canned, from: u64, to: u64) -> Result<Batch<RowEnvelope<EventsStreamRow>>> {
        poll_authority("events", authority, &EventRow::DESCRIPTOR, Token(from), Token(to), None)
    }

    #[test]
    fn test_batch_map_keeps_positions() {
        let batch = Batch {
            rows: vec![(Token(1), 1), (Token(2), 2)],
            upto_token: Token(2),
            limited: true,
        };
        let mapped = batch.map(|n| n * 10);
        assert_eq!(mapped.rows, vec![(Token(1), 10), (Token(2), 20)]);
        assert!(mapped.limited);
    }

    #[test]
    fn test_inverted_range_rejected_before_query() {
        let authority = Canned(vec![change(1, "$a")]);
        assert!(matches!(
            poll(&authority, 5, 4),
            Err(FeedError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_empty_range_skips_authority() {
        let authority = Canned(vec![change(1, "$a")]);
        let batch = poll(&authority, 3, 3).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.upto_token, Token(3));
    }

    #[test]
    fn test_out_of_range_is_schema_violation() {
        let authority = Canned(vec![change(9, "$a")]);
        assert!(matches!(
            poll(&authority, 0, 5),
            Err(FeedError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_unordered_is_schema_violation() {
        let authority = Canned(vec![change(3, "$a"), change(2, "$b")]);
        assert!(matches!(
            poll(&authority, 0, 5),
            Err(FeedError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_wrong_arity_is_schema_violation() {
        let authority = Canned(vec![RawChange::new(Token(1), vec![json!("$a")])]);
        let err = poll(&authority, 0, 5).unwrap_err();
        assert!(matches!(err, FeedError::SchemaViolation(_)));
        assert!(!err.is_retryable());
    }
}
