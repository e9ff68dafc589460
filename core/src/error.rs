//! Error types for the SharePoint client.
//!
//! # Design
//! There is no not-found / conflict taxonomy: SharePoint failures on read
//! operations land in `HttpError` with the status code and the serialized
//! response (status line, headers, body), which is all a caller can inspect.
//! Boolean operations never produce `HttpError` for a bad status; they
//! report `false` instead.

use thiserror::Error;

/// Errors returned by the document store clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a status the operation cannot accept.
    /// `message` holds the serialized HTTP response.
    #[error("{message}")]
    HttpError { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("transport failure: {0}")]
    TransportError(String),

    /// The response body could not be decoded as JSON.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// The server reported an upload offset the session did not expect.
    #[error("upload offset mismatch: expected {expected}, server reported {actual}")]
    UploadOffset { expected: u64, actual: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Status code carried by an `HttpError`, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_serialized_response() {
        let err = ApiError::HttpError {
            status: 404,
            message: "HTTP/1.1 404 Not Found\r\n\r\nmissing".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP/1.1 404 Not Found\r\n\r\nmissing");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn non_http_errors_have_no_status() {
        let err = ApiError::TransportError("connection refused".to_string());
        assert!(err.status().is_none());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn offset_mismatch_mentions_both_offsets() {
        let err = ApiError::UploadOffset {
            expected: 10,
            actual: 7,
        };
        let text = err.to_string();
        assert!(text.contains("10"));
        assert!(text.contains('7'));
    }
}
