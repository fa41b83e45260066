//! Instance placement by name.
//!
//! A [`Namespace`] owns every instance of one service class. The first
//! request for a routing key builds the service and spawns a task that owns
//! it outright; later requests for the same key queue on that task's
//! mailbox and are handled one at a time, in arrival order. There is no lock
//! around a service's load → mutate → persist sequence because nothing else
//! can reach its state.
//!
//! ```text
//! Gateway ──forward──► Stub ──mpsc──► instance task ──► Service::handle
//!    ▲                                     │
//!    └──────────────── oneshot ◄───────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::request::Request;
use crate::response::Response;
use crate::storage::StorageError;

/// A single-writer request handler owning its state.
#[async_trait]
pub trait Service: Send + 'static {
    async fn handle(&mut self, req: Request) -> Response;
}

/// Why a request never got an answer from its instance.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("instance `{name}` could not be started: {source}")]
    Spawn {
        name: String,
        #[source]
        source: StorageError,
    },

    #[error("instance `{0}` is not accepting requests")]
    Closed(String),

    #[error("instance `{0}` stopped before answering")]
    Dropped(String),
}

type Envelope = (Request, oneshot::Sender<Response>);
type Factory<S> = dyn Fn(&str) -> Result<S, StorageError> + Send + Sync;

/// All instances of one service class, keyed by routing key.
pub struct Namespace<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    class: String,
    mailbox: usize,
    factory: Box<Factory<S>>,
    stubs: Mutex<HashMap<String, Stub>>,
}

impl<S> Clone for Namespace<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: Service> Namespace<S> {
    /// `factory` builds the service for a routing key; it runs once per
    /// instance start. `mailbox` bounds the requests queued per instance.
    ///
    /// # Panics
    ///
    /// Panics if `mailbox` is zero.
    pub fn new<F>(class: impl Into<String>, mailbox: usize, factory: F) -> Self
    where
        F: Fn(&str) -> Result<S, StorageError> + Send + Sync + 'static,
    {
        assert!(mailbox > 0, "mailbox capacity must be positive");
        Self {
            inner: Arc::new(Inner {
                class: class.into(),
                mailbox,
                factory: Box::new(factory),
                stubs: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn class(&self) -> &str {
        &self.inner.class
    }

    /// The stub for `name`, starting the instance if it is not running.
    ///
    /// An instance whose task has ended (a panicking handler, for instance)
    /// is replaced by a fresh one built from the factory.
    pub async fn get(&self, name: &str) -> Result<Stub, ForwardError> {
        let mut stubs = self.inner.stubs.lock().await;
        if let Some(stub) = stubs.get(name).filter(|s| !s.tx.is_closed()) {
            return Ok(stub.clone());
        }

        let service = (self.inner.factory)(name).map_err(|source| ForwardError::Spawn {
            name: name.to_owned(),
            source,
        })?;
        let stub = spawn_instance(&self.inner.class, name, self.inner.mailbox, service);
        stubs.insert(name.to_owned(), stub.clone());
        Ok(stub)
    }

    /// Number of routing keys with a live instance.
    pub async fn live(&self) -> usize {
        self.inner.stubs.lock().await.values().filter(|s| !s.tx.is_closed()).count()
    }
}

fn spawn_instance<S: Service>(class: &str, name: &str, mailbox: usize, mut service: S) -> Stub {
    let (tx, mut rx) = mpsc::channel::<Envelope>(mailbox);
    let stub = Stub { name: Arc::from(name), tx };

    let class = class.to_owned();
    let name = name.to_owned();
    info!(%class, %name, "instance started");

    tokio::spawn(async move {
        while let Some((req, reply)) = rx.recv().await {
            debug!(%class, %name, method = %req.method(), path = %req.path(), "handling");
            let res = service.handle(req).await;
            if reply.send(res).is_err() {
                debug!(%class, %name, "caller went away before the response");
            }
        }
        info!(%class, %name, "instance stopped");
    });

    stub
}

/// Handle to one running instance. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Stub {
    name: Arc<str>,
    tx: mpsc::Sender<Envelope>,
}

impl Stub {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `req` on the instance and wait for its response.
    pub async fn forward(&self, req: Request) -> Result<Response, ForwardError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((req, reply_tx))
            .await
            .map_err(|_| ForwardError::Closed(self.name.to_string()))?;
        reply_rx.await.map_err(|_| {
            warn!(name = %self.name, "instance dropped a request");
            ForwardError::Dropped(self.name.to_string())
        })
    }
}
