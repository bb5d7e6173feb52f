//! Drives any number of streams uniformly and fans their rows out to
//! subscribers.

use crate::error::{FeedError, Result};
use crate::frame::{frames_for_batch, RdataFrame};
use crate::stream::{Batch, DynStream};
use crate::subscriptions::{
    DropReason, FeedEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionManager,
};
use crate::types::{FeedConfig, Token};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Outcome of one dispatcher tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Rows broadcast, per stream.
    pub rows_sent: BTreeMap<&'static str, usize>,
    /// Streams that could not be advanced this tick.
    pub failures: Vec<(&'static str, FeedError)>,
}

impl TickReport {
    pub fn total_rows(&self) -> usize {
        self.rows_sent.values().sum()
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Holds registered streams, the last token advertised for each, and the
/// subscribers rows are broadcast to.
pub struct StreamDispatcher {
    config: FeedConfig,
    streams: BTreeMap<&'static str, Box<dyn DynStream>>,
    /// Last token whose rows were broadcast, per stream.
    tokens: Mutex<HashMap<&'static str, Token>>,
    /// Serializes ticks and catch-ups so no subscriber sees a row twice.
    dispatch_lock: Mutex<()>,
    subscriptions: SubscriptionManager,
}

impl StreamDispatcher {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            streams: BTreeMap::new(),
            tokens: Mutex::new(HashMap::new()),
            dispatch_lock: Mutex::new(()),
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Register a stream. Live broadcasting starts from its current position.
    pub fn register(&mut self, stream: impl DynStream + 'static) -> Result<()> {
        let name = stream.name();
        if self.streams.contains_key(name) {
            return Err(FeedError::DuplicateStream(name.to_string()));
        }
        let current = stream.latest_token()?;
        self.tokens.lock().insert(name, current);
        self.streams.insert(name, Box::new(stream));
        debug!(stream = name, token = current.0, "registered stream");
        Ok(())
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.streams.keys().copied()
    }

    /// Current authority position of every stream.
    pub fn current_positions(&self) -> Result<BTreeMap<&'static str, Token>> {
        self.streams
            .iter()
            .map(|(name, stream)| Ok((*name, stream.latest_token()?)))
            .collect()
    }

    /// Last token broadcast for a stream.
    pub fn last_token(&self, name: &str) -> Option<Token> {
        self.tokens.lock().get(name).copied()
    }

    /// Poll any registered stream by name.
    pub fn poll_stream(
        &self,
        name: &str,
        from: Token,
        to: Token,
        limit: Option<usize>,
    ) -> Result<Batch<Value>> {
        self.stream(name)?.poll_wire_rows(from, to, limit)
    }

    /// `RDATA` frames for all of `(from, to]` of a stream, polled in
    /// `batch_limit` sized batches.
    pub fn frames(&self, name: &str, from: Token, to: Token) -> Result<Vec<RdataFrame>> {
        let stream = self.stream(name)?;
        if from > to {
            return Err(FeedError::InvalidRange { from, to });
        }

        let mut frames = Vec::new();
        let mut token = from;
        while token < to {
            let batch = stream.poll_wire_rows(token, to, self.config.batch_limit)?;
            frames.extend(frames_for_batch(stream.name(), &batch));
            token = batch.upto_token;
            if !batch.limited {
                break;
            }
        }
        Ok(frames)
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Subscribe, replaying each stream from the configured token up to the
    /// last broadcast token before the subscription goes live.
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        let _guard = self.dispatch_lock.lock();
        let mut config = config;
        if config.buffer_size.is_none() {
            config.buffer_size = Some(self.config.subscriber_buffer_size);
        }
        let handle = self.subscriptions.subscribe(config.clone());

        for (&name, stream) in &self.streams {
            if !config.wants_stream(name) {
                continue;
            }
            let Some(&from) = config.from_tokens.get(name) else {
                continue;
            };
            let Some(to) = self.last_token(name) else {
                continue;
            };
            if from > to {
                let err = FeedError::InvalidRange { from, to };
                self.subscriptions
                    .drop_subscription(handle.id, DropReason::CatchUpFailed(err.to_string()));
                return Err(err);
            }

            let sent = self.replay(stream.as_ref(), from, to, |event| {
                self.subscriptions.send_to(handle.id, event)
            });
            match sent {
                Ok(true) => {}
                Ok(false) => {
                    self.subscriptions
                        .drop_subscription(handle.id, DropReason::BufferOverflow);
                    return Ok(handle);
                }
                Err(err) => {
                    self.subscriptions
                        .drop_subscription(handle.id, DropReason::CatchUpFailed(err.to_string()));
                    return Err(err);
                }
            }
        }

        self.subscriptions.mark_caught_up(handle.id);
        Ok(handle)
    }

    /// Advance every stream to its current position, broadcasting new rows.
    ///
    /// A stream that fails keeps its last token and is retried from there on
    /// the next tick; other streams still advance.
    pub fn tick(&self) -> TickReport {
        let _guard = self.dispatch_lock.lock();
        let mut report = TickReport::default();

        for (&name, stream) in &self.streams {
            match self.advance(name, stream.as_ref()) {
                Ok(rows) => {
                    report.rows_sent.insert(name, rows);
                }
                Err(err) => {
                    warn!(
                        stream = name,
                        error = %err,
                        retryable = err.is_retryable(),
                        "failed to advance stream"
                    );
                    report.failures.push((name, err));
                }
            }
        }

        report
    }

    fn advance(&self, name: &'static str, stream: &dyn DynStream) -> Result<usize> {
        let from = self.last_token(name).unwrap_or_default();
        let to = stream.latest_token()?;
        if to <= from {
            return Ok(0);
        }

        let mut rows = 0;
        let mut last_row_token = from;
        let mut token = from;
        while token < to {
            let batch = stream.poll_wire_rows(token, to, self.config.batch_limit)?;
            rows += batch.len();
            for (group_token, group) in group_by_token(batch.rows) {
                self.subscriptions.broadcast_rows(name, group_token, group);
                last_row_token = group_token;
            }
            token = batch.upto_token;
            self.tokens.lock().insert(name, token);
            if !batch.limited {
                break;
            }
        }

        if last_row_token < token {
            self.subscriptions.broadcast_position(name, token);
        }
        debug!(stream = name, from = from.0, to = token.0, rows, "advanced stream");
        Ok(rows)
    }

    /// Replay `(from, to]` through `send`. Returns false once `send` refuses.
    fn replay(
        &self,
        stream: &dyn DynStream,
        from: Token,
        to: Token,
        mut send: impl FnMut(FeedEvent) -> bool,
    ) -> Result<bool> {
        let name = stream.name();
        let mut token = from;
        while token < to {
            let batch = stream.poll_wire_rows(token, to, self.config.batch_limit)?;
            for (group_token, rows) in group_by_token(batch.rows) {
                let event = FeedEvent::Rows {
                    stream: name.to_string(),
                    token: group_token,
                    rows,
                };
                if !send(event) {
                    return Ok(false);
                }
            }
            token = batch.upto_token;
            if !batch.limited {
                break;
            }
        }
        Ok(true)
    }

    fn stream(&self, name: &str) -> Result<&dyn DynStream> {
        self.streams
            .get(name)
            .map(|stream| stream.as_ref())
            .ok_or_else(|| FeedError::UnknownStream(name.to_string()))
    }
}

/// Split sorted rows into consecutive runs sharing a token.
fn group_by_token(rows: Vec<(Token, Value)>) -> Vec<(Token, Vec<Value>)> {
    let mut groups: Vec<(Token, Vec<Value>)> = Vec::new();
    for (token, row) in rows {
        match groups.last_mut() {
            Some((last, group)) if *last == token => group.push(row),
            _ => groups.push((token, vec![row])),
        }
    }
    groups
}
