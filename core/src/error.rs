//! Error types for the WebDAV client.
//!
//! # Design
//! A server that answers with 4xx/5xx still produced a response, so
//! `Status` carries it whole and callers can read the status line and body.
//! Every other variant means no response was obtained.

use std::time::Duration;

use thiserror::Error;

use crate::http::DavResponse;

/// Errors returned by `Executor::execute` and the `WebDavClient` verb methods.
#[derive(Debug, Error)]
pub enum DavError {
    /// The request could not be assembled (bad URI, header value or method).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No response arrived: see `TransportError`.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response body could not be drained.
    #[error("failed to read response body: {0}")]
    Body(#[source] hyper::Error),

    /// The server answered with an error-class status.
    #[error("server returned {} {}", .0.status, .0.reason)]
    Status(Box<DavResponse>),
}

/// Failures that leave the caller without a response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS resolution or the TCP connect failed.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The request's timeout elapsed before the response was drained.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP/1.1 exchange failed after the connection was made.
    #[error(transparent)]
    Http(hyper::Error),

    /// The per-call runtime could not be started.
    #[error("failed to start I/O runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl DavError {
    /// The server's response, when one was obtained.
    pub fn response(&self) -> Option<&DavResponse> {
        match self {
            DavError::Status(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<DavResponse> {
        match self {
            DavError::Status(response) => Some(*response),
            _ => None,
        }
    }
}

impl From<http::Error> for DavError {
    fn from(e: http::Error) -> Self {
        DavError::InvalidRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked() -> DavResponse {
        DavResponse {
            status: 423,
            reason: "Locked".to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    #[test]
    fn status_error_exposes_response() {
        let err = DavError::Status(Box::new(locked()));
        assert_eq!(err.to_string(), "server returned 423 Locked");
        assert_eq!(err.response().map(|r| r.status), Some(423));
        assert_eq!(err.into_response(), Some(locked()));
    }

    #[test]
    fn timeout_is_a_transport_error() {
        let err = DavError::from(TransportError::Timeout(Duration::from_millis(3600)));
        assert!(err.response().is_none());
        assert_eq!(err.to_string(), "transport error: timed out after 3.6s");
    }

    #[test]
    fn non_status_errors_have_no_response() {
        let err = DavError::InvalidRequest("bad uri".to_string());
        assert!(err.response().is_none());
        assert_eq!(err.to_string(), "invalid request: bad uri");
    }
}
