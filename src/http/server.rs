//! HTTP server wiring.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::RateLimitLayer;
use crate::error::{Result, TollgateError};
use crate::ratelimit::{RateLimiter, StatsSnapshot};

/// Limiter snapshot served on `/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub rate: u64,
    pub tracked: usize,
    #[serde(flatten)]
    pub decisions: StatsSnapshot,
}

/// Build the demo router: `/health` is unlimited, everything else is
/// limited by client IP.
pub fn router(limiter: Arc<RateLimiter>, trust_forwarded_for: bool) -> Router {
    let limited = Router::new()
        .route("/", get(root))
        .route("/stats", get(stats))
        .with_state(Arc::clone(&limiter))
        .layer(RateLimitLayer::by_ip_with(limiter, trust_forwarded_for));

    Router::new().route("/health", get(health)).merge(limited)
}

async fn root() -> &'static str {
    "Hello from tollgate"
}

async fn health() -> &'static str {
    "OK"
}

async fn stats(State(limiter): State<Arc<RateLimiter>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        rate: limiter.rate(),
        tracked: limiter.len(),
        decisions: limiter.stats(),
    })
}

/// HTTP server for a rate limited router.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    router: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self { addr, router }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TollgateError::Server(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::LimiterOptions;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(rate: u64) -> (Router, Arc<RateLimiter>) {
        let limiter = Arc::new(
            RateLimiter::with_options(LimiterOptions {
                rate,
                seed: Some(5),
                ..LimiterOptions::default()
            })
            .unwrap(),
        );
        (router(Arc::clone(&limiter), true), limiter)
    }

    fn get_from(uri: &str, client: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_not_limited() {
        let (app, limiter) = app(1);
        for _ in 0..3 {
            let response = app.clone().oneshot(get_from("/health", "10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn test_root_limited() {
        let (app, _limiter) = app(2);
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = app.clone().oneshot(get_from("/", "10.0.0.1")).await.unwrap();
            statuses.push(response.status());
        }
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (app, _limiter) = app(5);
        app.clone().oneshot(get_from("/", "10.0.0.1")).await.unwrap();

        let response = app.oneshot(get_from("/stats", "10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["rate"], 5);
        assert_eq!(json["tracked"], 2);
        assert_eq!(json["admitted"], 2);
        assert_eq!(json["denied"], 0);
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:1337".parse().unwrap();
        let (app, _) = app(1);
        let _server = HttpServer::new(addr, app);
    }
}
