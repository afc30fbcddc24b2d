//! Failure classification and retry policy.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::error::Error;

/// Classify a completed upstream response. `None` means success.
///
/// A 504, or a 5xx whose body names a gateway timeout, is folded into
/// [`Error::UpstreamTimeout`]: some gateways report their own upstream
/// timing out as a generic 502/500 with the detail buried in the body.
pub fn classify_response(status: StatusCode, body: &Bytes) -> Option<Error> {
    if status.is_success() || status.is_redirection() || status.is_informational() {
        return None;
    }

    if status == StatusCode::GATEWAY_TIMEOUT {
        return Some(Error::UpstreamTimeout);
    }

    if status.is_server_error() && body_names_gateway_timeout(body) {
        return Some(Error::UpstreamTimeout);
    }

    if status.is_client_error() {
        return Some(Error::ClientRequest {
            status: status.as_u16(),
            body: body.clone(),
        });
    }

    Some(Error::ServerResponse {
        status: status.as_u16(),
        body: body.clone(),
    })
}

fn body_names_gateway_timeout(body: &Bytes) -> bool {
    let text = String::from_utf8_lossy(body).to_lowercase();
    text.contains("gateway timeout") || text.contains("gateway time-out")
}

/// Whether a failed attempt may be retried.
///
/// Network faults and gateway timeouts retry unconditionally (nothing
/// is known to have executed upstream). Server errors retry only when
/// the method is idempotent. Client errors never retry: the request
/// itself is wrong and will stay wrong.
pub fn is_retryable(method: &Method, error: &Error) -> bool {
    match error {
        Error::TransientNetwork { .. } | Error::UpstreamTimeout => true,
        Error::ServerResponse { .. } => method.is_idempotent(),
        Error::ClientRequest { .. } | Error::CacheBackend(_) | Error::InvalidRequest(_) => false,
    }
}

/// Per-attempt deadline, stretched for later attempts so that a
/// deadline too tight for the upstream's tail latency is not hit
/// identically on every retry.
pub fn scaled_timeout(base: Duration, coefficient: f64, attempt: u32) -> Duration {
    if attempt <= 1 {
        return base;
    }
    let factor = coefficient.max(1.0).powi(attempt as i32 - 1);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses_are_not_errors() {
        assert!(classify_response(StatusCode::OK, &Bytes::new()).is_none());
        assert!(classify_response(StatusCode::NOT_MODIFIED, &Bytes::new()).is_none());
        assert!(classify_response(StatusCode::CREATED, &Bytes::new()).is_none());
    }

    #[test]
    fn test_504_is_a_gateway_timeout() {
        assert_eq!(
            classify_response(StatusCode::GATEWAY_TIMEOUT, &Bytes::new()),
            Some(Error::UpstreamTimeout)
        );
    }

    #[test]
    fn test_5xx_body_sentinel_is_a_gateway_timeout() {
        let body = Bytes::from_static(b"<html>502 Bad Gateway: upstream Gateway Time-out</html>");
        assert_eq!(
            classify_response(StatusCode::BAD_GATEWAY, &body),
            Some(Error::UpstreamTimeout)
        );

        // Sentinel only applies to server errors.
        let body = Bytes::from_static(b"gateway timeout mentioned in a 400");
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, &body),
            Some(Error::ClientRequest { status: 400, .. })
        ));
    }

    #[test]
    fn test_4xx_and_5xx_split() {
        assert!(matches!(
            classify_response(StatusCode::NOT_FOUND, &Bytes::new()),
            Some(Error::ClientRequest { status: 404, .. })
        ));
        assert!(matches!(
            classify_response(StatusCode::SERVICE_UNAVAILABLE, &Bytes::new()),
            Some(Error::ServerResponse { status: 503, .. })
        ));
    }

    #[test]
    fn test_retryability_by_method_and_class() {
        let network = Error::TransientNetwork { message: "reset".into() };
        let server = Error::ServerResponse { status: 500, body: Bytes::new() };
        let client = Error::ClientRequest { status: 400, body: Bytes::new() };

        assert!(is_retryable(&Method::POST, &network));
        assert!(is_retryable(&Method::POST, &Error::UpstreamTimeout));
        assert!(is_retryable(&Method::GET, &server));
        assert!(is_retryable(&Method::PUT, &server));
        assert!(!is_retryable(&Method::POST, &server));
        assert!(!is_retryable(&Method::GET, &client));
    }

    #[test]
    fn test_timeout_scaling() {
        let base = Duration::from_secs(10);
        assert_eq!(scaled_timeout(base, 1.5, 1), base);
        assert_eq!(scaled_timeout(base, 1.5, 2), Duration::from_secs(15));
        assert_eq!(scaled_timeout(base, 1.0, 3), base);
    }
}
