//! Error types for the proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;

/// The main error type for all proxy operations.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request with middleware failed
    #[error("HTTP request failed: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// WebSocket communication error (with message)
    #[error("WebSocket error: {0}")]
    WebSocketMsg(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Binance API returned an error
    #[error("Binance API error: {0}")]
    Api(ApiError),

    /// Invalid response from the API
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Stream closed by the remote end
    #[error("Stream closed: {reason}")]
    ConnectionClosed {
        /// Reason for the closure
        reason: String,
    },

    /// The cached state can no longer be patched incrementally and must be rebuilt.
    #[error("Resync required: {0}")]
    Resync(String),

    /// The owning context was cancelled while waiting.
    #[error("Operation cancelled")]
    Cancelled,

    /// Forwarding a request upstream failed.
    #[error("Upstream unreachable: {0}")]
    Upstream(String),

    /// A listening address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested
        addr: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl ProxyError {
    /// HTTP status reported to clients.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(_)
            | ProxyError::Http(_)
            | ProxyError::HttpMiddleware(_)
            | ProxyError::WebSocket(_)
            | ProxyError::WebSocketMsg(_)
            | ProxyError::ConnectionClosed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "code": error_codes::UNKNOWN_PROXY, "msg": self.to_string() });
        (self.status(), axum::Json(body)).into_response()
    }
}

/// Binance API error payload.
///
/// Binance reports failures as `{"code": -1121, "msg": "Invalid symbol."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    /// Negative error code from Binance (e.g. -1121)
    pub code: i64,
    /// Human-readable error message
    pub msg: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.msg)
    }
}

impl ApiError {
    /// Try to parse an error payload out of a response body.
    pub fn from_body(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

/// Known Binance error codes.
pub mod error_codes {
    /// Generic code used for errors raised by the proxy itself.
    pub const UNKNOWN_PROXY: i64 = -1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_body() {
        let error = ApiError::from_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#).unwrap();
        assert_eq!(error.code, -1121);
        assert_eq!(error.msg, "Invalid symbol.");
    }

    #[test]
    fn test_api_error_from_non_error_body() {
        assert!(ApiError::from_body("[]").is_none());
        assert!(ApiError::from_body("not json").is_none());
    }

    #[test]
    fn test_api_error_display() {
        let error = ApiError {
            code: -1003,
            msg: "Too much request weight used".to_string(),
        };
        assert_eq!(error.to_string(), "-1003: Too much request weight used");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::Cancelled.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ProxyError::Upstream("refused".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::InvalidResponse("garbage".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_response_body() {
        let response = ProxyError::Upstream("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], -1);
        assert_eq!(value["msg"], "Upstream unreachable: connection refused");
    }
}
