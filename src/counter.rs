//! A persisted hit counter: the smallest single-writer service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::ApiError;
use crate::namespace::Service;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::storage::Storage;

const COUNT_KEY: &str = "count";

/// Every request bumps the stored count and answers `Count = N`.
pub struct CounterService {
    storage: Arc<dyn Storage>,
}

impl CounterService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn increment(&self) -> Result<u64, ApiError> {
        let count = match self.storage.get(COUNT_KEY).await? {
            None => 0,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| ApiError::Internal(format!("stored count {value} is not a count")))?,
        };
        let count = count.saturating_add(1);
        self.storage.put(COUNT_KEY, json!(count)).await?;
        Ok(count)
    }
}

#[async_trait]
impl Service for CounterService {
    async fn handle(&mut self, _req: Request) -> Response {
        match self.increment().await {
            Ok(count) => {
                debug!(count, "counter incremented");
                Response::text(format!("Count = {count}\n"))
            }
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn counts_every_request() {
        let storage = Arc::new(MemoryStorage::new());
        let mut counter = CounterService::new(storage.clone());
        for expected in 1..=3 {
            let res = counter.handle(Request::new(Method::Get, "/counter")).await;
            assert_eq!(res.body(), format!("Count = {expected}\n").as_bytes());
        }
        assert_eq!(storage.get(COUNT_KEY).await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn unreadable_count_is_500() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put(COUNT_KEY, json!("many")).await.unwrap();
        let mut counter = CounterService::new(storage);
        let res = counter.handle(Request::new(Method::Post, "/counter")).await;
        assert_eq!(res.status_code(), 500);
    }
}
