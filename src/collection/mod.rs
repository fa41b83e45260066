//! A named collection of JSON records behind a CRUD protocol.
//!
//! | Method | Path | Result |
//! |---|---|---|
//! | `GET` | `/<name>` | 200, every record |
//! | `GET` | `/<name>/<id>` | 200, the record; 404 if absent |
//! | `POST` | `/<name>` | 201, the new record; 200 + existing record on a natural-key duplicate |
//! | `PUT` | `/<name>/<id>` | 200, the merged record; 404 if absent |
//! | `DELETE` | `/<name>/<id>` | 200, confirmation; 404 if absent |
//!
//! Other methods on those two shapes are `405`, other shapes `400`.

mod ids;
mod record;
mod service;

pub use self::ids::{IdStrategy, MAX_ID_DRAWS, random_token};
pub use self::record::{Collection, IdKind, NaturalKey, Patch, Record, RecordId};
pub use self::service::CollectionService;

use serde_json::{Map, Value, json};

/// How `GET /<name>` renders the collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListShape {
    /// `{"<id>": record, ...}`
    Object,
    /// `[record, ...]` in id order.
    Array,
}

/// Everything that distinguishes one collection from another.
#[derive(Clone, Debug)]
pub struct CollectionConfig {
    /// First path segment after the API prefix, e.g. `books`.
    pub name: String,
    /// Singular noun used in messages, e.g. `Book`.
    pub label: String,
    /// Storage key holding the whole collection.
    pub storage_key: String,
    pub id_strategy: IdStrategy,
    pub natural_key: Option<NaturalKey>,
    /// Fields a new record gets when the create body leaves them out.
    pub defaults: Map<String, Value>,
    pub list_shape: ListShape,
}

impl CollectionConfig {
    /// A collection with random ids, no duplicate detection and an object listing.
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: label.into(),
            storage_key: name.clone(),
            name,
            id_strategy: IdStrategy::random(),
            natural_key: None,
            defaults: Map::new(),
            list_shape: ListShape::Object,
        }
    }

    /// Books with counter ids, deduplicated on title + author ignoring case.
    pub fn books() -> Self {
        Self {
            id_strategy: IdStrategy::counter("nextId"),
            natural_key: Some(NaturalKey::case_insensitive(["title", "author"])),
            list_shape: ListShape::Array,
            ..Self::new("books", "Book")
        }
    }

    /// Tasks with counter ids, deduplicated on name ignoring case, created open.
    pub fn tasks() -> Self {
        let mut defaults = Map::new();
        defaults.insert("completed".to_owned(), json!(false));
        Self {
            id_strategy: IdStrategy::counter("counter"),
            natural_key: Some(NaturalKey::case_insensitive(["name"])),
            defaults,
            ..Self::new("tasks", "Task")
        }
    }

    /// A book catalog with random ids and no duplicate detection.
    pub fn catalog() -> Self {
        Self::new("catalog", "Book")
    }

    /// Turn on (or off) the collision check for random ids. No effect on
    /// counter ids.
    pub fn verify_ids(mut self, verify: bool) -> Self {
        if let IdStrategy::Random { verify_unique, .. } = &mut self.id_strategy {
            *verify_unique = verify;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let books = CollectionConfig::books();
        assert_eq!(books.id_strategy.kind(), IdKind::Numeric);
        assert_eq!(books.list_shape, ListShape::Array);
        assert_eq!(books.storage_key, "books");

        let tasks = CollectionConfig::tasks();
        assert_eq!(tasks.defaults.get("completed"), Some(&json!(false)));
        assert_eq!(tasks.natural_key.as_ref().map(NaturalKey::fields), Some(&["name".to_owned()][..]));

        let catalog = CollectionConfig::catalog().verify_ids(true);
        assert!(matches!(
            catalog.id_strategy,
            IdStrategy::Random { length, verify_unique: true } if length.get() == 8
        ));
        assert!(catalog.natural_key.is_none());
    }

    #[test]
    fn verify_ids_leaves_counters_alone() {
        let books = CollectionConfig::books().verify_ids(true);
        assert_eq!(books.id_strategy, IdStrategy::counter("nextId"));
    }
}
