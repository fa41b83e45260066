use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::ids::{IdStrategy, MAX_ID_DRAWS, random_token};
use super::record::{Collection, Patch, Record, RecordId};
use super::{CollectionConfig, ListShape};
use crate::error::ApiError;
use crate::method::Method;
use crate::namespace::Service;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};
use crate::status::Status;
use crate::storage::Storage;

/// Sole writer of one collection.
///
/// Every request reloads the full snapshot from storage, applies at most one
/// mutation to that copy, and writes the whole snapshot back before
/// answering. A failed request leaves nothing behind in memory: the next
/// request starts from whatever storage holds.
pub struct CollectionService {
    config: Arc<CollectionConfig>,
    storage: Arc<dyn Storage>,
}

impl CollectionService {
    pub fn new(config: impl Into<Arc<CollectionConfig>>, storage: Arc<dyn Storage>) -> Self {
        Self { config: config.into(), storage }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Routes one request to an operation. Every failure comes back as an
    /// [`ApiError`]; [`Service::handle`] renders it.
    pub async fn dispatch(&mut self, req: &Request) -> Result<Response, ApiError> {
        let id_segment = match req.segments().as_slice() {
            [name] if *name == self.config.name => None,
            [name, id] if *name == self.config.name => Some((*id).to_owned()),
            _ => return Err(ApiError::BadRequest(format!("no route for {}", req.path()))),
        };

        match (req.method(), id_segment) {
            (Method::Get, None) => self.list().await,
            (Method::Post, None) => self.create(Patch::from_json(req.body())?).await,
            (Method::Get, Some(id)) => self.get(&id).await,
            (Method::Put, Some(id)) => self.update(&id, Patch::from_json(req.body())?).await,
            (Method::Delete, Some(id)) => self.delete(&id).await,
            (method, _) => Err(ApiError::MethodNotAllowed(method)),
        }
    }

    async fn list(&self) -> Result<Response, ApiError> {
        let collection = self.load().await?;
        let body = match self.config.list_shape {
            ListShape::Object => collection.to_value(),
            ListShape::Array => collection.to_array(),
        };
        Ok(Json::ok(body).into_response())
    }

    async fn get(&self, segment: &str) -> Result<Response, ApiError> {
        let id = self.parse_id(segment)?;
        let collection = self.load().await?;
        let record = collection.get(&id).ok_or_else(|| self.not_found(segment))?;
        Ok(Json::ok(record.to_value()).into_response())
    }

    async fn create(&self, mut patch: Patch) -> Result<Response, ApiError> {
        let mut collection = self.load().await?;

        if let Some(key) = &self.config.natural_key {
            if let Some(existing) = collection.find(|r| key.matches(r, &patch)) {
                debug!(collection = %self.config.name, id = %existing.id, "duplicate create, returning existing record");
                return Ok(Json::ok(existing.to_value()).into_response());
            }
        }

        patch.fill_defaults(&self.config.defaults);
        let id = self.allocate_id(&collection).await?;
        let record = Record::new(id, patch);
        let body = record.to_value();
        let id = record.id.to_string();
        collection.insert(record);
        self.persist(&collection).await?;

        info!(collection = %self.config.name, %id, size = collection.len(), "created");
        Ok(Json::with_status(Status::Created, body).into_response())
    }

    async fn update(&self, segment: &str, patch: Patch) -> Result<Response, ApiError> {
        let id = self.parse_id(segment)?;
        let mut collection = self.load().await?;
        let record = collection.get_mut(&id).ok_or_else(|| self.not_found(segment))?;
        record.apply(patch);
        let body = record.to_value();
        self.persist(&collection).await?;

        info!(collection = %self.config.name, %id, "updated");
        Ok(Json::ok(body).into_response())
    }

    async fn delete(&self, segment: &str) -> Result<Response, ApiError> {
        let id = self.parse_id(segment)?;
        let mut collection = self.load().await?;
        collection.remove(&id).ok_or_else(|| self.not_found(segment))?;
        self.persist(&collection).await?;

        info!(collection = %self.config.name, %id, size = collection.len(), "deleted");
        Ok(Json::ok(json!({
            "id": id,
            "message": format!("{} {id} deleted", self.config.label),
        }))
        .into_response())
    }

    async fn allocate_id(&self, collection: &Collection) -> Result<RecordId, ApiError> {
        match &self.config.id_strategy {
            IdStrategy::Random { length, verify_unique } => {
                for _ in 0..MAX_ID_DRAWS {
                    let id = RecordId::Text(random_token(*length));
                    if !*verify_unique || !collection.contains(&id) {
                        return Ok(id);
                    }
                    debug!(collection = %self.config.name, %id, "random id collision, drawing again");
                }
                warn!(collection = %self.config.name, size = collection.len(), "no free random id");
                Err(ApiError::Internal("could not allocate a unique id".to_owned()))
            }
            IdStrategy::Counter { key } => {
                let last = match self.storage.get(key).await? {
                    None => 0,
                    Some(value) => value.as_u64().ok_or_else(|| {
                        ApiError::Internal(format!("counter `{key}` holds {value}, not a count"))
                    })?,
                };

                // Skip numbers already taken by records the counter never saw.
                let mut next = last;
                loop {
                    next = next.checked_add(1).ok_or_else(|| {
                        ApiError::Internal(format!("counter `{key}` exhausted"))
                    })?;
                    if !collection.contains(&RecordId::Number(next)) {
                        break;
                    }
                }

                // Counter first: losing the collection write afterwards costs
                // a skipped number, never a reused one.
                self.storage.put(key, json!(next)).await?;
                Ok(RecordId::Number(next))
            }
        }
    }

    async fn load(&self) -> Result<Collection, ApiError> {
        match self.storage.get(&self.config.storage_key).await? {
            None => Ok(Collection::default()),
            Some(value) => Collection::from_value(value).map_err(|e| {
                ApiError::Internal(format!("stored `{}` is unreadable: {e}", self.config.storage_key))
            }),
        }
    }

    async fn persist(&self, collection: &Collection) -> Result<(), ApiError> {
        self.storage.put(&self.config.storage_key, collection.to_value()).await?;
        Ok(())
    }

    fn parse_id(&self, segment: &str) -> Result<RecordId, ApiError> {
        self.config.id_strategy.kind().parse(segment).ok_or_else(|| self.not_found(segment))
    }

    fn not_found(&self, segment: &str) -> ApiError {
        ApiError::NotFound(format!("{} {segment}", self.config.label))
    }
}

#[async_trait]
impl Service for CollectionService {
    async fn handle(&mut self, req: Request) -> Response {
        self.dispatch(&req).await.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageError};
    use serde_json::Value;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory storage that counts puts and can be told to fail them.
    #[derive(Default)]
    struct Recording {
        inner: MemoryStorage,
        puts: AtomicUsize,
        fail_puts_on: Option<&'static str>,
    }

    #[async_trait]
    impl Storage for Recording {
        async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
            if self.fail_puts_on == Some(key) {
                return Err(StorageError::Io {
                    key: key.to_owned(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<bool, StorageError> {
            self.inner.delete(key).await
        }
    }

    fn service(config: CollectionConfig) -> (CollectionService, Arc<Recording>) {
        let storage = Arc::new(Recording::default());
        (CollectionService::new(config, storage.clone()), storage)
    }

    async fn call(svc: &mut CollectionService, method: Method, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut req = Request::new(method, path);
        if let Some(body) = body {
            req = req.with_body(body.to_string());
        }
        let res = svc.handle(req).await;
        let json = serde_json::from_slice(res.body()).unwrap_or(Value::Null);
        (res.status_code(), json)
    }

    async fn stored(storage: &Recording, key: &str) -> Value {
        storage.get(key).await.unwrap().unwrap_or(Value::Null)
    }

    #[tokio::test]
    async fn create_then_duplicate_returns_the_same_record() {
        let (mut svc, storage) = service(CollectionConfig::books());

        let (status, first) = call(&mut svc, Method::Post, "/books", Some(json!({"title": "Dune", "author": "Herbert"}))).await;
        assert_eq!(status, 201);
        assert_eq!(first, json!({"id": 1, "title": "Dune", "author": "Herbert"}));

        let (status, again) = call(&mut svc, Method::Post, "/books", Some(json!({"title": "dune", "author": "HERBERT"}))).await;
        assert_eq!(status, 200);
        assert_eq!(again["id"], first["id"]);

        let (_, all) = call(&mut svc, Method::Get, "/books", None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
        assert_eq!(stored(&storage, "nextId").await, json!(1));
    }

    #[tokio::test]
    async fn new_record_is_persisted_under_its_id() {
        let (mut svc, storage) = service(CollectionConfig::catalog());

        for title in ["A", "B", "C"] {
            let (status, record) = call(&mut svc, Method::Post, "/catalog", Some(json!({"title": title}))).await;
            assert_eq!(status, 201);
            let id = record["id"].as_str().unwrap().to_owned();
            assert_eq!(stored(&storage, "catalog").await[&id]["title"], title);
        }
        assert_eq!(stored(&storage, "catalog").await.as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tasks_start_open_and_key_on_name() {
        let (mut svc, _) = service(CollectionConfig::tasks());

        let (status, task) = call(&mut svc, Method::Post, "/tasks", Some(json!({"name": "Buy milk"}))).await;
        assert_eq!(status, 201);
        assert_eq!(task, json!({"id": 1, "name": "Buy milk", "completed": false}));

        let (status, dup) = call(&mut svc, Method::Post, "/tasks", Some(json!({"name": "BUY MILK"}))).await;
        assert_eq!((status, dup), (200, task));

        let (_, all) = call(&mut svc, Method::Get, "/tasks", None).await;
        assert_eq!(all, json!({"1": {"id": 1, "name": "Buy milk", "completed": false}}));
    }

    #[tokio::test]
    async fn update_merges_and_is_idempotent() {
        let (mut svc, _) = service(CollectionConfig::books());
        call(&mut svc, Method::Post, "/books", Some(json!({"title": "A", "author": "X"}))).await;

        let (status, first) = call(&mut svc, Method::Put, "/books/1", Some(json!({"author": "Y", "id": 7}))).await;
        assert_eq!(status, 200);
        assert_eq!(first, json!({"id": 1, "title": "A", "author": "Y"}));

        let (_, second) = call(&mut svc, Method::Put, "/books/1", Some(json!({"author": "Y"}))).await;
        assert_eq!(first, second);

        let (_, fetched) = call(&mut svc, Method::Get, "/books/1", None).await;
        assert_eq!(fetched, first);
    }

    #[tokio::test]
    async fn delete_removes_exactly_one() {
        let (mut svc, _) = service(CollectionConfig::books());
        call(&mut svc, Method::Post, "/books", Some(json!({"title": "A", "author": "X"}))).await;
        call(&mut svc, Method::Post, "/books", Some(json!({"title": "B", "author": "X"}))).await;

        let (status, body) = call(&mut svc, Method::Delete, "/books/1", None).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"id": 1, "message": "Book 1 deleted"}));

        let (_, all) = call(&mut svc, Method::Get, "/books", None).await;
        assert_eq!(all, json!([{"id": 2, "title": "B", "author": "X"}]));
        assert_eq!(call(&mut svc, Method::Get, "/books/1", None).await.0, 404);
    }

    #[tokio::test]
    async fn missing_ids_are_404_without_writes() {
        let (mut svc, storage) = service(CollectionConfig::tasks());
        call(&mut svc, Method::Post, "/tasks", Some(json!({"name": "only"}))).await;
        let puts = storage.puts.load(Ordering::SeqCst);
        let before = stored(&storage, "tasks").await;

        assert_eq!(call(&mut svc, Method::Get, "/tasks/3", None).await.0, 404);
        assert_eq!(call(&mut svc, Method::Put, "/tasks/3", Some(json!({"completed": true}))).await.0, 404);
        assert_eq!(call(&mut svc, Method::Delete, "/tasks/3", None).await.0, 404);

        assert_eq!(storage.puts.load(Ordering::SeqCst), puts);
        assert_eq!(stored(&storage, "tasks").await, before);
    }

    #[tokio::test]
    async fn non_numeric_segment_is_404_for_counter_ids() {
        let (mut svc, _) = service(CollectionConfig::books());
        let (status, body) = call(&mut svc, Method::Get, "/books/abc", None).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "Book abc not found");
    }

    #[tokio::test]
    async fn client_errors_do_not_touch_storage() {
        let (mut svc, storage) = service(CollectionConfig::books());

        let mut req = Request::new(Method::Post, "/books").with_body("{not json");
        assert_eq!(svc.handle(req).await.status_code(), 400);
        req = Request::new(Method::Post, "/books").with_body("[1]");
        assert_eq!(svc.handle(req).await.status_code(), 400);

        assert_eq!(call(&mut svc, Method::Patch, "/books/1", Some(json!({}))).await.0, 405);
        assert_eq!(call(&mut svc, Method::Post, "/books/1", Some(json!({}))).await.0, 405);
        assert_eq!(call(&mut svc, Method::Put, "/books", Some(json!({}))).await.0, 405);
        assert_eq!(call(&mut svc, Method::Get, "/tasks", None).await.0, 400);
        assert_eq!(call(&mut svc, Method::Get, "/books/1/pages", None).await.0, 400);

        assert_eq!(storage.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn storage_fault_is_500_with_message() {
        let storage = Arc::new(Recording { fail_puts_on: Some("books"), ..Default::default() });
        let mut svc = CollectionService::new(CollectionConfig::books(), storage.clone());

        let (status, body) = call(&mut svc, Method::Post, "/books", Some(json!({"title": "A", "author": "X"}))).await;
        assert_eq!(status, 500);
        assert!(body["error"].as_str().unwrap().contains("disk full"), "{body}");

        // the counter advanced, the record did not land: a skipped id, no corruption
        assert_eq!(stored(&storage, "nextId").await, json!(1));
        assert_eq!(stored(&storage, "books").await, Value::Null);
    }

    #[tokio::test]
    async fn counter_skips_ids_already_present() {
        let (mut svc, storage) = service(CollectionConfig::books());
        storage.inner.put("books", json!({"1": {"id": 1, "title": "A", "author": "X"}})).await.unwrap();

        let (status, record) = call(&mut svc, Method::Post, "/books", Some(json!({"title": "B", "author": "Y"}))).await;
        assert_eq!(status, 201);
        assert_eq!(record["id"], 2);
        assert_eq!(stored(&storage, "nextId").await, json!(2));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_500() {
        let (mut svc, storage) = service(CollectionConfig::books());
        storage.inner.put("books", json!({"1": {"title": "no id"}})).await.unwrap();
        assert_eq!(call(&mut svc, Method::Get, "/books", None).await.0, 500);

        storage.inner.put("books", json!({})).await.unwrap();
        storage.inner.put("nextId", json!("seven")).await.unwrap();
        let (status, _) = call(&mut svc, Method::Post, "/books", Some(json!({"title": "A", "author": "X"}))).await;
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn verified_random_ids_are_unique() {
        let config = CollectionConfig {
            id_strategy: IdStrategy::Random { length: NonZeroUsize::new(2).unwrap(), verify_unique: true },
            ..CollectionConfig::catalog()
        };
        let (mut svc, storage) = service(config);
        for n in 0..50 {
            let (status, book) = call(&mut svc, Method::Post, "/catalog", Some(json!({"n": n}))).await;
            assert_eq!(status, 201);
            assert_eq!(book["id"].as_str().unwrap().len(), 2);
        }
        assert_eq!(stored(&storage, "catalog").await.as_object().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn exhausted_id_space_is_500_not_a_hang() {
        let config = CollectionConfig {
            id_strategy: IdStrategy::Random { length: NonZeroUsize::MIN, verify_unique: true },
            ..CollectionConfig::catalog()
        };
        let (mut svc, storage) = service(config);
        let full: serde_json::Map<String, Value> = "0123456789abcdefghijklmnopqrstuvwxyz"
            .chars()
            .map(|c| (c.to_string(), json!({"id": c.to_string()})))
            .collect();
        storage.put("catalog", Value::Object(full)).await.unwrap();
        let puts = storage.puts.load(Ordering::SeqCst);

        let create = call(&mut svc, Method::Post, "/catalog", Some(json!({"title": "Emma"})));
        let (status, body) = tokio::time::timeout(std::time::Duration::from_secs(5), create)
            .await
            .expect("create gave up instead of spinning");
        assert_eq!(status, 500);
        assert_eq!(body["error"], "internal error: could not allocate a unique id");
        assert_eq!(storage.puts.load(Ordering::SeqCst), puts);
        assert_eq!(stored(&storage, "catalog").await.as_object().unwrap().len(), 36);
    }
}
