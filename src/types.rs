//! Core types shared by every stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position in an authority's change log.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Token(pub u64);

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Token {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Token)
    }
}

impl Token {
    /// The following position, saturating at `u64::MAX`.
    pub fn next(self) -> Self {
        Token(self.0.saturating_add(1))
    }

    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(Token(self.0 - 1))
        } else {
            None
        }
    }
}

/// A single raw change as handed over by an authority: a position plus the
/// positional field data of one row.
#[derive(Clone, Debug, PartialEq)]
pub struct RawChange {
    pub position: Token,
    pub data: Vec<serde_json::Value>,
}

impl RawChange {
    pub fn new(position: Token, data: Vec<serde_json::Value>) -> Self {
        Self { position, data }
    }
}

/// Feed configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Max rows requested from a stream per poll (None = unbounded).
    /// Default: 100
    pub batch_limit: Option<usize>,

    /// Buffered events per subscriber before it is dropped, for
    /// subscriptions that don't set their own size.
    /// Default: 1000
    pub subscriber_buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            batch_limit: Some(100),
            subscriber_buffer_size: 1000,
        }
    }
}

impl FeedConfig {
    /// Parse a configuration from JSON, filling missing keys with defaults.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
