//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;

use crate::method::Method;

/// An incoming HTTP request with its body fully buffered.
///
/// The same value travels the whole chain: the server builds it, the
/// [`Gateway`](crate::Gateway) rewrites its path, and an instance mailbox
/// hands it to the owning [`Service`](crate::Service).
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// A request with no headers and an empty body.
    ///
    /// ```rust
    /// use shelf::{Method, Request};
    ///
    /// let req = Request::new(Method::Post, "/books")
    ///     .with_header("content-type", "application/json")
    ///     .with_body(r#"{"title":"Dune"}"#);
    /// assert_eq!(req.header("Content-Type"), Some("application/json"));
    /// ```
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            params: HashMap::new(),
        }
    }

    pub(crate) fn from_parts(
        method: Method,
        path: String,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Self {
        Self { method, path, headers, body, params: HashMap::new() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/books/{id}`, `req.param("id")` on `/books/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Path segments with empty segments dropped: `/books/42/` → `["books", "42"]`.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}
