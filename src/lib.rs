//! # shelf
//!
//! Small JSON collections (books, tasks, a counter) served over HTTP, each
//! owned by exactly one instance that is the sole writer of its storage.
//!
//! ## The chain
//!
//! ```text
//! Server ──► Router ──► Gateway ──► Namespace ──► instance task ──► Storage
//!            /healthz   strip /api   routing key   load → mutate
//!                                    → one task    → persist → respond
//! ```
//!
//! - [`Router`]: radix-tree routing via [`matchit`], plus prefix mounts.
//! - [`Gateway`]: resolves a fixed routing key for a collection and forwards
//!   the request with the API prefix stripped. Unreachable instance → `502`.
//! - [`Namespace`]: one task per routing key owns its [`Service`] and handles
//!   its mailbox one request at a time. No locks around the read-modify-write.
//! - [`CollectionService`]: list / get / create / update / delete over one
//!   collection, with idempotent create on a natural key.
//! - [`Storage`]: get / put / delete of whole JSON snapshots, in memory or
//!   in a directory with atomic replace.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shelf::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let app = shelf::app(&config);
//!     Server::bind(config.addr).serve(app).await.unwrap();
//! }
//! ```

mod config;
mod error;
mod gateway;
mod handler;
mod method;
mod namespace;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod collection;
pub mod counter;
pub mod health;
pub mod storage;

pub use collection::{CollectionConfig, CollectionService};
pub use config::{Config, ConfigError};
pub use counter::CounterService;
pub use error::{ApiError, Error};
pub use gateway::Gateway;
pub use handler::{BoxFuture, Handler};
pub use method::Method;
pub use namespace::{ForwardError, Namespace, Service, Stub};
pub use request::Request;
pub use response::{IntoResponse, Json, Response};
pub use router::Router;
pub use server::{DEFAULT_BODY_LIMIT, Server};
pub use status::Status;
pub use storage::{Storage, StorageBackend, StorageError};

use std::sync::Arc;

use tracing::info;

/// The storage backend `config` asks for.
pub fn storage_backend(config: &Config) -> StorageBackend {
    match &config.data_dir {
        Some(dir) => StorageBackend::directory(dir),
        None => StorageBackend::memory(),
    }
}

/// The full application: the books, tasks and catalog collections, the
/// counter, and the health checks.
///
/// | Path | Routing key |
/// |---|---|
/// | `<prefix>/books` | `books` |
/// | `<prefix>/tasks` | `singleton` |
/// | `<prefix>/catalog` | `global-catalog` |
/// | `<prefix>/counter` | `global-counter` |
pub fn app(config: &Config) -> Router {
    app_with_backend(config, storage_backend(config))
}

/// [`app`] over an explicit storage backend.
pub fn app_with_backend(config: &Config, backend: StorageBackend) -> Router {
    let collections = [
        (CollectionConfig::books(), "books"),
        (CollectionConfig::tasks(), "singleton"),
        (CollectionConfig::catalog().verify_ids(config.verify_ids), "global-catalog"),
    ];

    let mut router = Router::new()
        .on(Method::Get, "/healthz", health::liveness)
        .on(Method::Get, "/readyz", health::readiness);

    for (collection, routing_key) in collections {
        let gateway = Gateway::new(
            &config.api_prefix,
            collection.name.clone(),
            routing_key,
            collection_namespace(collection, backend.clone(), config.mailbox),
        );
        let path = gateway.mount_path();
        info!(%path, routing_key, "collection mounted");
        router = router.mount(&path, gateway);
    }

    let counters = Namespace::new("counter", config.mailbox, move |name: &str| {
        Ok(CounterService::new(backend.open("counter", name)?))
    });
    let gateway = Gateway::new(&config.api_prefix, "counter", "global-counter", counters);
    router.mount(&gateway.mount_path(), gateway)
}

/// A namespace whose instances serve `collection`, each with its own
/// storage scope `<collection name>/<routing key>`.
pub fn collection_namespace(
    collection: CollectionConfig,
    backend: StorageBackend,
    mailbox: usize,
) -> Namespace<CollectionService> {
    let collection = Arc::new(collection);
    let class = collection.name.clone();
    Namespace::new(class.clone(), mailbox, move |name: &str| {
        let storage = backend.open(&class, name)?;
        Ok(CollectionService::new(Arc::clone(&collection), storage))
    })
}
