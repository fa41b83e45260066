//! The [`Handler`] trait: anything the router can hand a request to.
//!
//! The router keeps handlers of different concrete types in one table as
//! `Arc<dyn Handler>`. Two kinds exist in shelf:
//!
//! ```text
//! async fn liveness(req: Request) -> Response   ← plain fn, blanket impl
//! Gateway<S>                                    ← forwards to an instance
//!        ↓ router.on(..) / router.mount(..)
//! Arc<dyn Handler>
//!        ↓
//! Arc::clone(&handler).call(req)                ← one vtable dispatch
//! ```
//!
//! `call` takes `self: Arc<Self>` so the returned future can own its
//! handler without copying the handler's state per request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A request handler shared across concurrent connections.
pub(crate) type SharedHandler = Arc<dyn Handler>;

/// Turns one [`Request`] into one [`Response`].
///
/// Implemented for every `Fn(Request) -> impl Future<Output = impl IntoResponse>`
/// (named `async fn` items and closures returning `async move` blocks) and
/// for [`Gateway`](crate::Gateway).
pub trait Handler: Send + Sync + 'static {
    fn call(self: Arc<Self>, req: Request) -> BoxFuture;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(self: Arc<Self>, req: Request) -> BoxFuture {
        let fut = (*self)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
