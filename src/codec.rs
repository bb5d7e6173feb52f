//! Row envelopes and the positional wire codec.
//!
//! On the wire a row is the JSON array `[type_tag, [field, ...]]`. Fields
//! are written in declaration order and absent optionals are written as
//! `null`, so a variant's arity never changes.

use crate::error::{FeedError, Result};
use crate::rows::{RowRegistry, StreamRow};
use serde_json::Value;

/// A typed row paired with its wire tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RowEnvelope<R> {
    type_tag: &'static str,
    row: R,
}

impl<R: StreamRow> RowEnvelope<R> {
    pub fn new(row: R) -> Self {
        Self {
            type_tag: row.type_tag(),
            row,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        self.type_tag
    }

    pub fn row(&self) -> &R {
        &self.row
    }

    pub fn into_row(self) -> R {
        self.row
    }

    /// Serialize as `[type_tag, [fields...]]`.
    pub fn to_json(&self) -> Value {
        let (tag, data) = encode(self);
        Value::Array(vec![Value::String(tag.to_string()), Value::Array(data)])
    }

    /// Parse the `[type_tag, [fields...]]` shape.
    pub fn from_json(registry: &RowRegistry<R>, value: &Value) -> Result<Self> {
        let (tag, data) = split_wire_row(value)?;
        decode(registry, tag, data)
    }
}

impl<R: StreamRow> From<R> for RowEnvelope<R> {
    fn from(row: R) -> Self {
        RowEnvelope::new(row)
    }
}

/// Decompose an envelope into its tag and positional field data.
pub fn encode<R: StreamRow>(envelope: &RowEnvelope<R>) -> (&'static str, Vec<Value>) {
    (envelope.type_tag, envelope.row.to_positional())
}

/// Rebuild an envelope from a tag and positional field data.
pub fn decode<R: StreamRow>(
    registry: &RowRegistry<R>,
    tag: &str,
    data: &[Value],
) -> Result<RowEnvelope<R>> {
    let descriptor = registry.lookup(tag)?;
    let row = descriptor.from_positional(data)?;
    Ok(RowEnvelope {
        type_tag: descriptor.tag(),
        row,
    })
}

/// Split a wire row into its tag and field list without interpreting fields.
pub fn split_wire_row(value: &Value) -> Result<(&str, &[Value])> {
    match value.as_array().map(Vec::as_slice) {
        Some([Value::String(tag), Value::Array(data)]) => Ok((tag.as_str(), data.as_slice())),
        _ => Err(FeedError::InvalidFrame(format!(
            "row must be [type_tag, [fields...]], got {value}"
        ))),
    }
}
