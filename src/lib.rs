//! Tollgate - Per-Client Admission Control
//!
//! This crate bounds each client's request volume with its own token bucket.
//! Buckets live in an ordered skip list keyed by client identifier and are
//! periodically compacted once idle, so memory follows the active client set
//! rather than every client ever seen.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod skiplist;
