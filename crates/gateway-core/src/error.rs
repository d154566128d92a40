use serde::Serialize;
use std::fmt;

/// The wire-visible error kind published in an error `Reply`.
///
/// Every `GatewayError` maps to exactly one of these; the mapping is total
/// (see `GatewayError::kind`), so a reply body can always be constructed for
/// an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Backpressure,
    RateLimited,
    Timeout,
    BackendTransport,
    BackendHttp,
    BackendDecode,
    PublishFailed,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Backpressure => "backpressure",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BackendTransport => "backend_transport",
            ErrorKind::BackendHttp => "backend_http",
            ErrorKind::BackendDecode => "backend_decode",
            ErrorKind::PublishFailed => "publish_failed",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Internal error type threaded through the gateway's core components.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("queue at capacity")]
    Backpressure,

    #[error("session exceeded its request quota")]
    RateLimited,

    #[error("request exceeded its deadline")]
    Timeout,

    #[error("backend transport error: {0}")]
    BackendTransport(String),

    #[error("backend returned HTTP {status}: {body}")]
    BackendHttp { status: u16, body: String },

    #[error("backend response could not be decoded: {0}")]
    BackendDecode(String),

    #[error("failed to publish reply: {0}")]
    PublishFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::BadRequest(_) => ErrorKind::BadRequest,
            GatewayError::Backpressure => ErrorKind::Backpressure,
            GatewayError::RateLimited => ErrorKind::RateLimited,
            GatewayError::Timeout => ErrorKind::Timeout,
            GatewayError::BackendTransport(_) => ErrorKind::BackendTransport,
            GatewayError::BackendHttp { .. } => ErrorKind::BackendHttp,
            GatewayError::BackendDecode(_) => ErrorKind::BackendDecode,
            GatewayError::PublishFailed(_) => ErrorKind::PublishFailed,
            GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            GatewayError::BackendTransport(err.to_string())
        } else if err.is_decode() {
            GatewayError::BackendDecode(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::BackendHttp {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            GatewayError::BackendTransport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::BackendDecode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
