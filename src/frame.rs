//! `RDATA` frames carrying stream rows over a line-based transport.
//!
//! ```text
//! RDATA <stream_name> <token> <row_json>
//! ```
//!
//! `<token>` is `batch` for every row of a position group except the last,
//! which carries the group's real token. Receivers hold `batch` rows until
//! the group completes so a consumer never sees half of a position.

use crate::error::{FeedError, Result};
use crate::stream::Batch;
use crate::types::Token;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Token slot of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameToken {
    /// More rows at the same position follow.
    Batch,
    At(Token),
}

impl fmt::Display for FrameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameToken::Batch => f.write_str(RdataFrame::BATCH_TOKEN),
            FrameToken::At(token) => write!(f, "{token}"),
        }
    }
}

/// One row of one stream, as sent on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct RdataFrame {
    pub stream: String,
    pub token: FrameToken,
    /// `[type_tag, [fields...]]`
    pub row: Value,
}

impl RdataFrame {
    pub const COMMAND: &'static str = "RDATA";
    pub const BATCH_TOKEN: &'static str = "batch";

    pub fn new(stream: impl Into<String>, token: FrameToken, row: Value) -> Self {
        Self {
            stream: stream.into(),
            token,
            row,
        }
    }

    /// Parse one line, without its trailing newline.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(4, ' ');

        let command = parts.next().unwrap_or_default();
        if command != Self::COMMAND {
            return Err(FeedError::InvalidFrame(format!("unexpected command {command:?}")));
        }

        let (Some(stream), Some(token), Some(json)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(FeedError::InvalidFrame(format!("incomplete frame {line:?}")));
        };
        if stream.is_empty() {
            return Err(FeedError::InvalidFrame("empty stream name".to_string()));
        }

        let token = if token == Self::BATCH_TOKEN {
            FrameToken::Batch
        } else {
            FrameToken::At(
                token
                    .parse()
                    .map_err(|_| FeedError::InvalidFrame(format!("bad token {token:?}")))?,
            )
        };

        Ok(Self {
            stream: stream.to_string(),
            token,
            row: serde_json::from_str(json)?,
        })
    }
}

impl fmt::Display for RdataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", Self::COMMAND, self.stream, self.token, self.row)
    }
}

/// Turn a polled batch into frames, marking all but the last row of each
/// position group as `batch`.
pub fn frames_for_batch(stream: &str, batch: &Batch<Value>) -> Vec<RdataFrame> {
    batch
        .rows
        .iter()
        .enumerate()
        .map(|(i, (token, row))| {
            let continues = batch
                .rows
                .get(i + 1)
                .is_some_and(|(next, _)| next == token);
            let token = if continues {
                FrameToken::Batch
            } else {
                FrameToken::At(*token)
            };
            RdataFrame::new(stream, token, row.clone())
        })
        .collect()
}

/// Rows released by the assembler once a position group is complete.
#[derive(Clone, Debug, PartialEq)]
pub struct ReleasedRows {
    pub stream: String,
    pub token: Token,
    pub rows: Vec<Value>,
}

/// Receiving side of `batch` framing.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: HashMap<String, Vec<Value>>,
    last_tokens: HashMap<String, Token>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame. Returns the completed group when `frame` ends one.
    pub fn push(&mut self, frame: RdataFrame) -> Result<Option<ReleasedRows>> {
        let RdataFrame { stream, token, row } = frame;
        let token = match token {
            FrameToken::Batch => {
                self.pending.entry(stream).or_default().push(row);
                return Ok(None);
            }
            FrameToken::At(token) => token,
        };

        if let Some(&last) = self.last_tokens.get(&stream) {
            if token < last {
                self.pending.remove(&stream);
                return Err(FeedError::OutOfOrder {
                    stream,
                    last,
                    got: token,
                });
            }
        }

        let mut rows = self.pending.remove(&stream).unwrap_or_default();
        rows.push(row);
        self.last_tokens.insert(stream.clone(), token);
        trace!(stream = %stream, token = token.0, rows = rows.len(), "released rows");

        Ok(Some(ReleasedRows {
            stream,
            token,
            rows,
        }))
    }

    /// Rows held for a stream while waiting for its group to complete.
    pub fn pending_len(&self, stream: &str) -> usize {
        self.pending.get(stream).map_or(0, Vec::len)
    }

    /// Last token released for a stream.
    pub fn last_token(&self, stream: &str) -> Option<Token> {
        self.last_tokens.get(stream).copied()
    }

    /// Forget buffered rows and tokens, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.last_tokens.clear();
    }
}
