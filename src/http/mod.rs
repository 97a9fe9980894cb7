//! HTTP adapter: client identification, admission middleware and server.

mod client_ip;
mod middleware;
mod server;

pub use client_ip::{client_ip, normalize_ip, parse_ip, FORWARDED_FOR};
pub use middleware::{
    limit_by_custom_id, limit_by_ip, KeyExtractor, RateLimitLayer, RateLimitService, REJECTION_BODY,
};
pub use server::{router, HttpServer, StatsResponse};
