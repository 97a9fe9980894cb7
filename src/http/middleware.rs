//! Tower middleware applying admission control to an inner service.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::warn;

use super::client_ip::client_ip;
use crate::ratelimit::Admission;

/// Maps a request to the identifier it is limited by.
pub type KeyExtractor = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// Body sent with every rejection.
pub const REJECTION_BODY: &str = "Too many requests";

/// Layer that checks every request against an [`Admission`] before it
/// reaches the wrapped service.
#[derive(Clone)]
pub struct RateLimitLayer {
    admission: Arc<dyn Admission>,
    extractor: KeyExtractor,
}

impl RateLimitLayer {
    /// Limit by normalized client IP, trusting `X-Forwarded-For`.
    pub fn by_ip<A: Admission + 'static>(admission: Arc<A>) -> Self {
        Self::by_ip_with(admission, true)
    }

    pub fn by_ip_with<A: Admission + 'static>(admission: Arc<A>, trust_forwarded_for: bool) -> Self {
        Self::by_custom_id(admission, move |request: &Request<Body>| {
            client_ip(request, trust_forwarded_for)
        })
    }

    /// Limit by an identifier derived from the request by `extractor`.
    ///
    /// Requests for which `extractor` returns `None` are rejected.
    pub fn by_custom_id<A, F>(admission: Arc<A>, extractor: F) -> Self
    where
        A: Admission + 'static,
        F: Fn(&Request<Body>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            admission,
            extractor: Arc::new(extractor),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            admission: Arc::clone(&self.admission),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

/// Wrap `inner` so that it is only called for admitted client IPs.
pub fn limit_by_ip<S, A>(admission: Arc<A>, inner: S) -> RateLimitService<S>
where
    A: Admission + 'static,
{
    RateLimitLayer::by_ip(admission).layer(inner)
}

/// Wrap `inner` so that it is only called for admitted identifiers.
pub fn limit_by_custom_id<S, A, F>(admission: Arc<A>, inner: S, extractor: F) -> RateLimitService<S>
where
    A: Admission + 'static,
    F: Fn(&Request<Body>) -> Option<String> + Send + Sync + 'static,
{
    RateLimitLayer::by_custom_id(admission, extractor).layer(inner)
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    admission: Arc<dyn Admission>,
    extractor: KeyExtractor,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let identifier = (self.extractor)(&request);
        let admitted = identifier
            .as_deref()
            .is_some_and(|id| self.admission.should_serve(id));

        if !admitted {
            warn!(
                path = %request.uri().path(),
                identifier = identifier.as_deref().unwrap_or("<unknown>"),
                "REQUEST BLOCKED"
            );
            return Box::pin(async { Ok(rejection()) });
        }

        // The clone may not be ready; keep the one poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}

fn rejection() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, REJECTION_BODY).into_response()
}
