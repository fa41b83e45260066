//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! You should not need to think about this module directly. Build a [`Response`]
//! in your handler and return it. That is the entire job description.

use bytes::Bytes;
use http::StatusCode;
use http::header::{HeaderName, HeaderValue};
use http_body_util::Full;
use serde::Serialize;
use tracing::{error, warn};

use crate::status::Status;

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (no custom headers needed)
///
/// ```rust
/// use shelf::{Response, Status};
///
/// Response::text("hello");
/// Response::status(Status::MethodNotAllowed);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use shelf::{Response, Status};
///
/// Response::builder()
///     .status(Status::Created)
///     .header("location", "/books/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: u16,
}

impl Response {
    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: Status) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code.into() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: Status::Ok.into() }
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the `http` response hyper writes to the wire.
    ///
    /// A header whose name or value is not valid on the wire is logged and
    /// left out; the rest of the response goes through.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = StatusCode::from_u16(self.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        for (name, value) in self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::try_from(value)) {
                (Ok(name), Ok(value)) => {
                    res.headers_mut().append(name, value);
                }
                _ => warn!(header = %name, "dropping header that is not valid on the wire"),
            }
        }
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `Status::Ok` (200).
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: Status) -> Self {
        self.status = code.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`Status`] directly from a handler: `return Status::NotFound`
impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(ok) => ok.into_response(),
            Err(err) => err.into_response(),
        }
    }
}

// ── Json ──────────────────────────────────────────────────────────────────────

/// A serde-serialisable body sent as `application/json` with a chosen status.
///
/// ```rust
/// use shelf::{IntoResponse, Json, Status};
///
/// let res = Json::with_status(Status::Created, serde_json::json!({"id": 1})).into_response();
/// assert_eq!(res.status_code(), 201);
/// ```
pub struct Json<T> {
    status: Status,
    value: T,
}

impl<T: Serialize> Json<T> {
    /// `200 OK` with `value` as the body.
    pub fn ok(value: T) -> Self {
        Self::with_status(Status::Ok, value)
    }

    pub fn with_status(status: Status, value: T) -> Self {
        Self { status, value }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.value) {
            Ok(bytes) => Response::builder().status(self.status).json(bytes),
            Err(e) => {
                error!("failed to serialise response body: {e}");
                Response::status(Status::InternalServerError)
            }
        }
    }
}
