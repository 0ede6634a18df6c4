use http::StatusCode;
use serde_json::{Value, json};

/// Abstract error kind, independent of client dialect. Each variant maps to
/// a fixed HTTP status and a stable wire-level `type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    AuthenticationError,
    PermissionError,
    NotFound,
    RateLimitError,
    UpstreamError,
    ApiError,
    CircuitOpen,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::AuthenticationError => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionError => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimitError => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorKind::ApiError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn wire_type(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request_error",
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::PermissionError => "permission_error",
            ErrorKind::NotFound => "not_found_error",
            ErrorKind::RateLimitError => "rate_limit_error",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::ApiError => "api_error",
            ErrorKind::CircuitOpen => "circuit_open",
        }
    }
}

/// The single error type that crosses module boundaries on the request path.
/// Carries enough context to render either client dialect's error envelope.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProxyError {
    pub kind: ErrorKind,
    pub message: String,
    pub code: Option<String>,
    /// Overrides `kind.status()` when the upstream's own status must be forwarded verbatim.
    pub status_override: Option<StatusCode>,
}

impl ProxyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            status_override: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationError, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimitError, message)
    }

    pub fn upstream(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamError, message).with_status(status)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message)
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircuitOpen, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status_override.unwrap_or_else(|| self.kind.status())
    }

    /// `{"type": "error", "error": {"type": "<kind>", "message": "<text>"}}`
    pub fn into_anthropic_body(self) -> Value {
        json!({
            "type": "error",
            "error": {
                "type": self.kind.wire_type(),
                "message": self.message,
            }
        })
    }

    /// `{"error": {"type": "<kind>", "message": "<text>", "code": "<code?>"}}`
    pub fn into_openai_body(self) -> Value {
        json!({
            "error": {
                "type": self.kind.wire_type(),
                "message": self.message,
                "code": self.code,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_dialects() {
        let err = ProxyError::rate_limited("too many requests").with_code("slow_down");
        let status = err.status();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let body = err.into_openai_body();
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert_eq!(body["error"]["code"], "slow_down");
    }

    #[test]
    fn upstream_error_overrides_status() {
        let err = ProxyError::upstream(StatusCode::IM_A_TEAPOT, "odd status");
        assert_eq!(err.status(), StatusCode::IM_A_TEAPOT);
        let body = err.into_anthropic_body();
        assert_eq!(body["error"]["type"], "upstream_error");
    }
}
