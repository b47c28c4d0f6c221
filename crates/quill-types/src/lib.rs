//! Value primitives and codecs for quill.
//!
//! Two value layers exist. [`SqlValue`] is what a single SQL cell holds:
//! NULL, a 64-bit integer, a 64-bit float, or UTF-8 text. [`Value`] is the
//! richer application-side value (booleans, timestamps, JSON documents).
//! A [`Codec`] describes the mapping between the two for one column or
//! expression.

mod codec;
pub mod sql_ident;
mod value;

pub use codec::{Codec, CodecKind};
pub use value::{SqlValue, Value};

use std::collections::HashMap;

/// A flat result row as returned by a driver: result-column name → cell.
pub type Row = HashMap<String, SqlValue>;
