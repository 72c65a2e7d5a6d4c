//! Rpc-Timeout-Ms parsing and computation.
//!
//! Callers set the `rpc-timeout-ms` header to say how long they are willing
//! to wait. The server may impose its own cap; the smaller of the two becomes
//! the call's deadline.

use axum::http::Request;
use std::time::Duration;

/// Header name for the client timeout in milliseconds.
pub const TIMEOUT_MS_HEADER: &str = "rpc-timeout-ms";

/// Parse the Rpc-Timeout-Ms header from a request.
///
/// Returns `Some(Duration)` if the header is present and valid,
/// or `None` if the header is missing, invalid, or zero (which means no timeout).
pub fn parse_timeout<B>(req: &Request<B>) -> Option<Duration> {
    req.headers()
        .get(TIMEOUT_MS_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timeout_ms)
}

/// Parse a timeout milliseconds string.
///
/// Returns `Some(Duration)` for valid positive values,
/// or `None` for invalid values or 0 (which means no timeout).
pub fn parse_timeout_ms(value: &str) -> Option<Duration> {
    let ms: u64 = value.trim().parse().ok()?;
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

/// Compute the effective timeout from server and client timeouts.
///
/// The smaller timeout always wins. Returns `None` if neither is set.
pub fn compute_effective_timeout(
    server_timeout: Option<Duration>,
    client_timeout: Option<Duration>,
) -> Option<Duration> {
    match (server_timeout, client_timeout) {
        (Some(server), Some(client)) => Some(server.min(client)),
        (Some(server), None) => Some(server),
        (None, Some(client)) => Some(client),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_parse_timeout_ms_valid() {
        assert_eq!(parse_timeout_ms("1000"), Some(Duration::from_millis(1000)));
        assert_eq!(parse_timeout_ms("5000"), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_parse_timeout_ms_zero() {
        assert_eq!(parse_timeout_ms("0"), None);
    }

    #[test]
    fn test_parse_timeout_ms_invalid() {
        assert_eq!(parse_timeout_ms("abc"), None);
        assert_eq!(parse_timeout_ms("-1"), None);
        assert_eq!(parse_timeout_ms(""), None);
    }

    #[test]
    fn test_parse_timeout_valid() {
        let req = Request::builder()
            .method(Method::POST)
            .header(TIMEOUT_MS_HEADER, "5000")
            .body(())
            .unwrap();
        assert_eq!(parse_timeout(&req), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_parse_timeout_missing() {
        let req = Request::builder().method(Method::POST).body(()).unwrap();
        assert_eq!(parse_timeout(&req), None);
    }

    #[test]
    fn test_parse_timeout_invalid() {
        let req = Request::builder()
            .method(Method::POST)
            .header(TIMEOUT_MS_HEADER, "not-a-number")
            .body(())
            .unwrap();
        assert_eq!(parse_timeout(&req), None);
    }

    #[test]
    fn test_compute_effective_timeout_both_set() {
        let five = Some(Duration::from_secs(5));
        let ten = Some(Duration::from_secs(10));
        assert_eq!(compute_effective_timeout(five, ten), five);
        assert_eq!(compute_effective_timeout(ten, five), five);
    }

    #[test]
    fn test_compute_effective_timeout_one_side() {
        let five = Some(Duration::from_secs(5));
        assert_eq!(compute_effective_timeout(five, None), five);
        assert_eq!(compute_effective_timeout(None, five), five);
        assert_eq!(compute_effective_timeout(None, None), None);
    }
}
