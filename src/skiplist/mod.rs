//! Ordered associative store backed by a skip list.
//!
//! The list knows nothing about rate limiting: it maps an ordered key type to
//! an opaque value and offers point lookup, insert-or-reject, removal and
//! ascending traversal.

mod iter;
mod list;

pub use iter::Iter;
pub use list::{InsertError, SkipList, DEFAULT_MAX_LEVEL};
