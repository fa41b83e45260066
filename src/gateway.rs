//! Front door for one collection: strip the API prefix, forward to the
//! instance that owns the collection.
//!
//! The routing key is fixed when the gateway is built, never read from the
//! request, so every request for a collection lands on the same instance.

use std::sync::Arc;

use tracing::warn;

use crate::error::ApiError;
use crate::handler::{BoxFuture, Handler};
use crate::namespace::{Namespace, Service};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub struct Gateway<S> {
    prefix: String,
    collection: String,
    routing_key: String,
    namespace: Namespace<S>,
}

impl<S: Service> Gateway<S> {
    /// Serves `<prefix>/<collection>` from the `routing_key` instance of
    /// `namespace`. `prefix` is normalised to a leading slash and no
    /// trailing one; an empty prefix mounts the collection at the root.
    pub fn new(
        prefix: &str,
        collection: impl Into<String>,
        routing_key: impl Into<String>,
        namespace: Namespace<S>,
    ) -> Self {
        let trimmed = prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() { String::new() } else { format!("/{trimmed}") };
        Self {
            prefix,
            collection: collection.into(),
            routing_key: routing_key.into(),
            namespace,
        }
    }

    /// The path this gateway owns, e.g. `/api/books`.
    pub fn mount_path(&self) -> String {
        format!("{}/{}", self.prefix, self.collection)
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Forward `req` with the prefix stripped; method, headers and body
    /// travel unchanged. An unreachable instance is a `502`, never retried.
    pub async fn forward(&self, mut req: Request) -> Response {
        if let Some(rest) = req.path.strip_prefix(self.prefix.as_str()) {
            req.path = if rest.is_empty() { "/".to_owned() } else { rest.to_owned() };
        }
        req.params.clear();

        let result = match self.namespace.get(&self.routing_key).await {
            Ok(stub) => stub.forward(req).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(routing_key = %self.routing_key, class = self.namespace.class(), "forward failed: {e}");
            ApiError::UpstreamUnavailable(e.to_string()).into_response()
        })
    }
}

impl<S: Service> Handler for Gateway<S> {
    fn call(self: Arc<Self>, req: Request) -> BoxFuture {
        Box::pin(async move { self.forward(req).await })
    }
}
