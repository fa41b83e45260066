//! Error types.
//!
//! Two layers. [`Error`] surfaces infrastructure failures (binding a port,
//! accepting a connection) from [`Server::serve`](crate::Server::serve).
//! [`ApiError`] is the request-level taxonomy: every variant maps to exactly
//! one HTTP status and is turned into a response at the point of detection.

use std::fmt;

use serde_json::json;
use tracing::{debug, warn};

use crate::method::Method;
use crate::response::{IntoResponse, Json, Response};
use crate::status::Status;

/// The error type returned by shelf's fallible server operations.
#[derive(Debug)]
pub struct Error(std::io::Error);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "io: {}", self.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self(e)
    }
}

/// A failed request, rendered as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The id or path is not in the collection.
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed JSON body, or a path shape the service does not serve.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Recognized path, unsupported method.
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// The instance owning the routing key could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Storage fault or any other unexpected failure during dispatch.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::BadRequest(_) => Status::BadRequest,
            Self::MethodNotAllowed(_) => Status::MethodNotAllowed,
            Self::UpstreamUnavailable(_) => Status::BadGateway,
            Self::Internal(_) => Status::InternalServerError,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = u16::from(status), "{self}");
        } else {
            debug!(status = u16::from(status), "{self}");
        }
        Json::with_status(status, json!({ "error": self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_maps_to_its_status() {
        let cases = [
            (ApiError::NotFound("book 3".into()), 404),
            (ApiError::BadRequest("expected a JSON object".into()), 400),
            (ApiError::MethodNotAllowed(Method::Patch), 405),
            (ApiError::UpstreamUnavailable("mailbox closed".into()), 502),
            (ApiError::Internal("disk full".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(u16::from(err.status()), code);
        }
    }

    #[test]
    fn body_carries_the_message() {
        let res = ApiError::Internal("disk full".into()).into_response();
        assert_eq!(res.status_code(), 500);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "internal error: disk full");
    }
}
