//! Tag-to-variant registry for stream rows.

use crate::error::{FeedError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A row that can be carried on a replication stream.
pub trait StreamRow: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Wire tag of this row's variant.
    fn type_tag(&self) -> &'static str;

    /// Field values in declaration order. Absent optionals are `Value::Null`.
    fn to_positional(&self) -> Vec<Value>;
}

/// Describes one row variant: its tag, arity, and positional constructor.
pub struct RowDescriptor<R> {
    tag: &'static str,
    field_count: usize,
    construct: fn(&[Value]) -> Result<R>,
}

impl<R> Clone for RowDescriptor<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for RowDescriptor<R> {}

impl<R> fmt::Debug for RowDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowDescriptor")
            .field("tag", &self.tag)
            .field("field_count", &self.field_count)
            .finish()
    }
}

impl<R> RowDescriptor<R> {
    /// `construct` receives a slice already checked to hold `field_count` values.
    pub const fn new(
        tag: &'static str,
        field_count: usize,
        construct: fn(&[Value]) -> Result<R>,
    ) -> Self {
        Self {
            tag,
            field_count,
            construct,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Build a row by positional assignment.
    pub fn from_positional(&self, data: &[Value]) -> Result<R> {
        if data.len() != self.field_count {
            return Err(FeedError::malformed(
                self.tag,
                format!("expected {} fields, got {}", self.field_count, data.len()),
            ));
        }
        (self.construct)(data)
    }
}

/// Registry of the row variants a stream may carry.
pub struct RowRegistry<R> {
    descriptors: BTreeMap<&'static str, RowDescriptor<R>>,
}

impl<R> RowRegistry<R> {
    pub fn new() -> Self {
        Self {
            descriptors: BTreeMap::new(),
        }
    }

    /// Build a registry from a fixed list of variants.
    pub fn with_descriptors(descriptors: impl IntoIterator<Item = RowDescriptor<R>>) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Add a variant. Fails if its tag is already taken.
    pub fn register(&mut self, descriptor: RowDescriptor<R>) -> Result<()> {
        if self.descriptors.contains_key(descriptor.tag) {
            return Err(FeedError::DuplicateRowType(descriptor.tag.to_string()));
        }
        self.descriptors.insert(descriptor.tag, descriptor);
        Ok(())
    }

    pub fn lookup(&self, tag: &str) -> Result<&RowDescriptor<R>> {
        self.descriptors
            .get(tag)
            .ok_or_else(|| FeedError::UnknownRowType(tag.to_string()))
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl<R> Default for RowRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for RowRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptors.values()).finish()
    }
}

/// Read a required string field at `index`.
pub fn required_string(tag: &str, data: &[Value], index: usize, name: &str) -> Result<String> {
    match data.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(FeedError::malformed(tag, format!("{name} is required"))),
        Some(other) => Err(FeedError::malformed(
            tag,
            format!("{name} must be a string, got {other}"),
        )),
    }
}

/// Read an optional string field at `index`; `null` means absent.
pub fn optional_string(
    tag: &str,
    data: &[Value],
    index: usize,
    name: &str,
) -> Result<Option<String>> {
    match data.get(index) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Null) => Ok(None),
        None => Err(FeedError::malformed(tag, format!("{name} is missing"))),
        Some(other) => Err(FeedError::malformed(
            tag,
            format!("{name} must be a string or null, got {other}"),
        )),
    }
}
