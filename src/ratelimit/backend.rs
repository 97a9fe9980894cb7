//! Admission trait for abstracting the limiter behind the HTTP adapter.

use std::sync::Arc;

/// Anything able to make a synchronous admission decision for an identifier.
///
/// The middleware only depends on this trait, so tests and alternative
/// limiters can stand in for [`RateLimiter`](super::RateLimiter).
pub trait Admission: Send + Sync {
    /// Return `true` when a request from `identifier` may proceed.
    fn should_serve(&self, identifier: &str) -> bool;
}

impl<A: Admission + ?Sized> Admission for Arc<A> {
    fn should_serve(&self, identifier: &str) -> bool {
        (**self).should_serve(identifier)
    }
}
