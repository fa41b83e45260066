//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Instance tasks owned by a [`Namespace`](crate::Namespace) are not joined;
//! a request that reached a mailbox is answered before its connection closes.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::{ApiError, Error};
use crate::method::Method;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;
use crate::status::Status;

/// Request bodies larger than this are refused unless
/// [`Server::body_limit`] says otherwise.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    body_limit: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use shelf::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 8787).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr, body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Refuse request bodies over `bytes` with `400 Bad Request`.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `shutdown`
    /// resolves instead of waiting for a process signal.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);

        info!(addr = %self.addr, "shelf listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let body_limit = self.body_limit;
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, body_limit).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("shelf stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers one request (at most `body_limit` bytes of body), routes it and
/// produces one response.
///
/// Infallible: every failure becomes a status code, hyper never sees an error.
async fn dispatch<B>(
    router: Arc<Router>,
    req: hyper::Request<B>,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let Ok(method) = parts.method.as_str().parse::<Method>() else {
        debug!(method = %parts.method, "unsupported method");
        return Ok(Response::status(Status::MethodNotAllowed).into_inner());
    };

    let body = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(limit = body_limit, "request body too large");
            let res = ApiError::BadRequest(format!("body exceeds {body_limit} bytes")).into_response();
            return Ok(res.into_inner());
        }
        Err(e) => {
            let res = ApiError::BadRequest(format!("unreadable body: {e}")).into_response();
            return Ok(res.into_inner());
        }
    };

    let headers = parts.headers.iter()
        .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
        .collect();

    let request = Request::from_parts(method, parts.uri.path().to_owned(), headers, body);
    Ok(router.handle(request).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C) the process receives.
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn serves_until_shutdown_resolves() {
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = reserved.local_addr().unwrap();
        drop(reserved);

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let router = Router::new().on(Method::Get, "/healthz", health::liveness);
        let server = tokio::spawn(async move {
            Server::bind(addr)
                .serve_with_shutdown(router, async { let _ = stop_rx.await; })
                .await
        });

        let mut stream = loop {
            match tokio::net::TcpStream::connect(addr).await {
                Ok(s) => break s,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
        assert!(raw.ends_with("ok"), "{raw}");

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    async fn echo_len(req: Request) -> Response {
        Response::text(req.body().len().to_string())
    }

    fn post(body: &'static [u8]) -> hyper::Request<Full<Bytes>> {
        hyper::Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Full::new(Bytes::from_static(body)))
            .unwrap()
    }

    #[tokio::test]
    async fn oversized_body_is_400_before_routing() {
        let router = Arc::new(Router::new().on(Method::Post, "/echo", echo_len));

        let res = dispatch(Arc::clone(&router), post(b"0123456789"), 10).await.unwrap();
        assert_eq!(res.status(), http::StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"10");

        let res = dispatch(router, post(b"0123456789X"), 10).await.unwrap();
        assert_eq!(res.status(), http::StatusCode::BAD_REQUEST);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "bad request: body exceeds 10 bytes");
    }

    #[tokio::test]
    async fn unknown_method_is_405() {
        let router = Arc::new(Router::new().on(Method::Post, "/echo", echo_len));
        let req = hyper::Request::builder()
            .method("PROPFIND")
            .uri("/echo")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let res = dispatch(router, req, DEFAULT_BODY_LIMIT).await.unwrap();
        assert_eq!(res.status(), http::StatusCode::METHOD_NOT_ALLOWED);
    }
}
