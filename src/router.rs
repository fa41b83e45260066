//! Radix-tree request router with prefix mounts.
//!
//! One tree per HTTP method, O(path-length) lookup. Mounts sit in front of
//! the trees: every method under a mounted prefix goes to one handler. That
//! is how an API prefix gets handed to a [`Gateway`](crate::Gateway).

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::handler::{Handler, SharedHandler};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<SharedHandler>>,
    mounts: Vec<(String, SharedHandler)>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), mounts: Vec::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use shelf::{Method, Request, Response, Router, health};
    /// Router::new()
    ///     .on(Method::Get, "/healthz", health::liveness)
    ///     .on(Method::Get, "/readyz",  health::readiness);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on a malformed or conflicting route. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(handler) as SharedHandler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Send every request whose path is `prefix` or starts with `prefix/` to
    /// `handler`, whatever its method. A [`Gateway`](crate::Gateway) mounts
    /// directly. The longest matching prefix wins, and
    /// mounts take precedence over method routes.
    pub fn mount(mut self, prefix: &str, handler: impl Handler) -> Self {
        let prefix = prefix.trim_end_matches('/').to_owned();
        self.mounts.push((prefix, Arc::new(handler) as SharedHandler));
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Route one request to its handler.
    ///
    /// Unknown path → `404`; path registered under another method → `405`.
    pub async fn handle(&self, mut req: Request) -> Response {
        if let Some(handler) = self.mounted(&req.path) {
            return handler.call(req).await;
        }

        match self.lookup(req.method, &req.path) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req).await
            }
            None if self.allows_other_method(req.method, &req.path) => {
                debug!(method = %req.method, path = %req.path, "method not allowed");
                Response::status(Status::MethodNotAllowed)
            }
            None => Response::status(Status::NotFound),
        }
    }

    fn mounted(&self, path: &str) -> Option<SharedHandler> {
        self.mounts.iter()
            .find(|(prefix, _)| {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .map(|(_, handler)| Arc::clone(handler))
    }

    fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(SharedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    fn allows_other_method(&self, method: Method, path: &str) -> bool {
        self.routes.iter()
            .any(|(m, tree)| *m != method && tree.at(path).is_ok())
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_path(req: Request) -> Response {
        Response::text(req.path().to_owned())
    }

    async fn echo_param(req: Request) -> Response {
        Response::text(req.param("id").unwrap_or_default().to_owned())
    }

    fn body(res: &Response) -> &str {
        std::str::from_utf8(res.body()).unwrap()
    }

    #[tokio::test]
    async fn method_routes_capture_params() {
        let router = Router::new().on(Method::Get, "/books/{id}", echo_param);
        let res = router.handle(Request::new(Method::Get, "/books/42")).await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(body(&res), "42");
    }

    #[tokio::test]
    async fn unknown_path_is_404_and_wrong_method_is_405() {
        let router = Router::new().on(Method::Get, "/healthz", echo_path);
        let missing = router.handle(Request::new(Method::Get, "/nope")).await;
        let wrong = router.handle(Request::new(Method::Post, "/healthz")).await;
        assert_eq!(missing.status_code(), 404);
        assert_eq!(wrong.status_code(), 405);
    }

    #[tokio::test]
    async fn mounts_match_whole_segments_only() {
        let router = Router::new().mount("/api/books", echo_path);

        for path in ["/api/books", "/api/books/", "/api/books/7"] {
            let res = router.handle(Request::new(Method::Delete, path)).await;
            assert_eq!(res.status_code(), 200, "{path}");
        }
        let res = router.handle(Request::new(Method::Get, "/api/bookshelf")).await;
        assert_eq!(res.status_code(), 404);
    }

    #[tokio::test]
    async fn longest_mount_wins() {
        async fn short(_: Request) -> Response { Response::text("short") }
        async fn long(_: Request) -> Response { Response::text("long") }

        let router = Router::new().mount("/api", short).mount("/api/tasks", long);
        let res = router.handle(Request::new(Method::Get, "/api/tasks/1")).await;
        assert_eq!(body(&res), "long");
        let res = router.handle(Request::new(Method::Get, "/api/other")).await;
        assert_eq!(body(&res), "short");
    }
}
