//! Typed rows and the registries that map wire tags onto them.
//!
//! Every stream carries a closed set of row variants. In process a row is a
//! plain Rust value (usually an enum with one case per variant); the string
//! tag and the positional field list only exist at the wire boundary.

mod event;
mod registry;

pub use event::{EventRow, EventsStreamRow};
pub use registry::{optional_string, required_string, RowDescriptor, RowRegistry, StreamRow};
