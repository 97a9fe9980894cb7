//! Client address derivation and normalization.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;

/// Header consulted before the peer address.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Derive the normalized client address for `request`.
///
/// The first `X-Forwarded-For` entry wins when `trust_forwarded_for` is set,
/// otherwise the peer address recorded by the server is used. Returns `None`
/// when neither yields a parseable address.
pub fn client_ip<B>(request: &Request<B>, trust_forwarded_for: bool) -> Option<String> {
    if trust_forwarded_for {
        if let Some(ip) = forwarded_ip(request) {
            return Some(normalize_ip(ip));
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| normalize_ip(addr.ip()))
}

fn forwarded_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    let hosts = request.headers().get(FORWARDED_FOR)?.to_str().ok()?;
    let first = hosts.split(',').next()?;
    parse_ip(first)
}

/// Parse `ip` or `ip:port` (including bracketed IPv6 with port).
pub fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    raw.parse::<IpAddr>().ok()
}

/// Render `ip` as a fully expanded IPv6 address, mapping IPv4 into
/// `::ffff:0:0/96`, so that every spelling of one address yields one key.
pub fn normalize_ip(ip: IpAddr) -> String {
    let v6 = match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    v6.segments()
        .iter()
        .map(|segment| format!("{:04x}", segment))
        .collect::<Vec<_>>()
        .join(":")
}
