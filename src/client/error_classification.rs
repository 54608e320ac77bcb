//! Error classification logic

/// Map an upstream HTTP status to a standard error class.
///
/// Class names follow the usual provider taxonomy so log lines stay comparable
/// across proxies.
pub(crate) fn error_class_for_status(status: u16) -> &'static str {
    match status {
        400 | 422 => "invalid_request",
        401 => "authentication",
        403 => "permission_denied",
        404 => "not_found",
        408 => "timeout",
        409 => "conflict",
        413 => "request_too_large",
        429 => "rate_limited",
        503 | 529 => "overloaded",
        500..=599 => "server_error",
        _ => "http_error",
    }
}

/// Determine if an error class is worth retrying against the same upstream.
///
/// - Transient server-side failures and rate limits are retried
/// - Every other 4xx is surfaced immediately: repeating it cannot change the answer
pub(crate) fn is_retryable_error_class(error_class: &str) -> bool {
    match error_class {
        "rate_limited" | "overloaded" | "server_error" | "timeout" => true,
        "invalid_request" | "authentication" | "permission_denied" | "not_found"
        | "conflict" | "request_too_large" => false,
        _ => false,
    }
}
