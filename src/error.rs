use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Datastore error: {0}")]
    Datastore(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;

impl BenchError {
    /// Status code carried by a remote HTTP failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BenchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(err: reqwest::Error) -> Self {
        BenchError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for BenchError {
    fn from(err: toml::de::Error) -> Self {
        BenchError::Config(err.to_string())
    }
}

impl IntoResponse for BenchError {
    fn into_response(self) -> Response {
        let status = match &self {
            BenchError::InvalidQuery(_) | BenchError::Config(_) => StatusCode::BAD_REQUEST,
            BenchError::Network(_) | BenchError::Status { .. } => StatusCode::BAD_GATEWAY,
            // Default to 500
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, format!("{}\n", self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BenchError::Datastore("table missing".to_string());
        assert_eq!(err.to_string(), "Datastore error: table missing");

        let err = BenchError::Status {
            status: 409,
            message: "duplicate".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 409: duplicate");

        let err = BenchError::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = BenchError::Protocol("missing result".to_string());
        assert_eq!(err.to_string(), "Protocol error: missing result");

        let err = BenchError::InvalidQuery("bad property".to_string());
        assert_eq!(err.to_string(), "Invalid query: bad property");

        let err = BenchError::Config("unknown backend".to_string());
        assert_eq!(err.to_string(), "Configuration error: unknown backend");
    }

    #[test]
    fn test_status_accessor() {
        let err = BenchError::Status {
            status: 404,
            message: "gone".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(BenchError::Network("x".to_string()).status(), None);
    }

    #[test]
    fn test_into_response_status() {
        let response = BenchError::InvalidQuery("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = BenchError::Network("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = BenchError::Datastore("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_json_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BenchError = parse_err.into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
