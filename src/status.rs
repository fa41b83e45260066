//! HTTP status codes as a typed enum.
//!
//! Only the codes the collection protocol and the gateway actually emit.
//! Use [`Status`] anywhere a status code is accepted: `Response::status()`,
//! `Response::builder().status()`, or as a bare handler return value.
//!
//! ```rust
//! use shelf::{Response, Status};
//!
//! // status-only, no body
//! Response::status(Status::MethodNotAllowed);
//!
//! Response::builder()
//!     .status(Status::NotFound)
//!     .text("no such book");
//! ```

/// HTTP status codes emitted by shelf.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    Created,             // 201

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    NotFound,            // 404
    MethodNotAllowed,    // 405

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
    BadGateway,          // 502
}

impl Status {
    /// `true` for 5xx codes.
    pub fn is_server_error(self) -> bool {
        u16::from(self) >= 500
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                  => 200,
            Status::Created             => 201,
            Status::BadRequest          => 400,
            Status::NotFound            => 404,
            Status::MethodNotAllowed    => 405,
            Status::InternalServerError => 500,
            Status::BadGateway          => 502,
        }
    }
}

impl From<Status> for http::StatusCode {
    fn from(s: Status) -> Self {
        // Every variant maps to a registered code in 100..=999.
        http::StatusCode::from_u16(s.into()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}
