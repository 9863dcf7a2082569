// src/middleware/allowed_hosts.rs
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header::HOST, StatusCode},
    middleware::Next,
    response::Response,
    Extension,
};

use crate::AppState;

/// Rejects requests whose Host header is not on the configured allow list.
/// Entries may be exact hosts, `*` for everything, or `.example.com` to
/// cover a domain and all of its subdomains.
pub async fn allowed_hosts(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_port)
        .unwrap_or_default();

    if !host_allowed(&state.config.allowed_hosts, &host) {
        tracing::warn!(host = %host, "rejected request for unlisted host");
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(next.run(request).await)
}

/// Drops any port suffix, trailing dot and casing so `Example.com:8080.`
/// compares as `example.com`. Bracketed IPv6 literals keep their colons.
fn strip_port(raw: &str) -> String {
    let host = match raw.rfind(':') {
        Some(idx) if !raw[idx + 1..].contains(']') => &raw[..idx],
        _ => raw,
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn host_allowed(allowed: &[String], host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    allowed.iter().any(|entry| match entry.strip_prefix('.') {
        Some(suffix) => host == suffix || host.ends_with(&format!(".{}", suffix)),
        None => entry == "*" || entry == host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_strip_port_handles_common_forms() {
        assert_eq!(strip_port("localhost:3000"), "localhost");
        assert_eq!(strip_port("Example.COM"), "example.com");
        assert_eq!(strip_port("example.com."), "example.com");
        assert_eq!(strip_port("[::1]:3000"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn test_exact_match_and_wildcard() {
        let allowed = hosts(&["localhost", "videoteca.example.com"]);
        assert!(host_allowed(&allowed, "localhost"));
        assert!(host_allowed(&allowed, "videoteca.example.com"));
        assert!(!host_allowed(&allowed, "evil.example.com"));

        assert!(host_allowed(&hosts(&["*"]), "anything.example.net"));
    }

    #[test]
    fn test_leading_dot_covers_subdomains_and_bare_domain() {
        let allowed = hosts(&[".example.com"]);
        assert!(host_allowed(&allowed, "example.com"));
        assert!(host_allowed(&allowed, "media.example.com"));
        assert!(!host_allowed(&allowed, "example.com.evil.net"));
    }

    #[test]
    fn test_empty_host_is_rejected() {
        assert!(!host_allowed(&hosts(&["localhost"]), ""));
    }
}
