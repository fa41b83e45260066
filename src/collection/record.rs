//! Records, partial bodies, and the duplicate-detection predicate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Identity of a record. Numeric ids come from a persisted counter, text ids
/// are random tokens.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// How a path segment is read as an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Numeric,
    Text,
}

impl IdKind {
    /// `None` when a numeric collection is addressed with a non-numeric
    /// segment: such an id can never be stored, so the lookup simply misses.
    pub fn parse(self, segment: &str) -> Option<RecordId> {
        match self {
            Self::Numeric => segment.parse().ok().map(RecordId::Number),
            Self::Text => Some(RecordId::Text(segment.to_owned())),
        }
    }
}

/// One stored record: the service-assigned `id` plus schemaless fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: RecordId, patch: Patch) -> Self {
        Self { id, fields: patch.0 }
    }

    /// The record as a JSON object, `id` first.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("id".to_owned(), serde_json::json!(self.id));
        object.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(object)
    }

    /// Shallow merge: every field in `patch` overwrites, the rest stay.
    pub fn apply(&mut self, patch: Patch) {
        for (name, value) in patch.0 {
            self.fields.insert(name, value);
        }
    }
}

/// The fields of a create or update body, without `id`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch(Map<String, Value>);

impl Patch {
    /// Parses a request body. Anything but a JSON object is a bad request;
    /// an `id` key is dropped so a record's id never changes.
    pub fn from_json(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("malformed JSON body: {e}")))?;
        match value {
            Value::Object(mut fields) => {
                fields.remove("id");
                Ok(Self(fields))
            }
            other => Err(ApiError::BadRequest(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Adds each default whose field the body left out.
    pub fn fill_defaults(&mut self, defaults: &Map<String, Value>) {
        for (name, value) in defaults {
            if !self.0.contains_key(name) {
                self.0.insert(name.clone(), value.clone());
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fields that identify a record for duplicate detection on create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NaturalKey {
    fields: Vec<String>,
    case_insensitive: bool,
}

impl NaturalKey {
    pub fn exact<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fields: fields.into_iter().map(Into::into).collect(), case_insensitive: false }
    }

    /// String fields compare after lowercasing; other values compare exactly.
    pub fn case_insensitive<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { case_insensitive: true, ..Self::exact(fields) }
    }

    #[cfg(test)]
    pub(crate) fn fields(&self) -> &[String] {
        &self.fields
    }

    /// True when every key field is present on both sides and equal. A body
    /// missing a key field never matches.
    pub fn matches(&self, record: &Record, patch: &Patch) -> bool {
        !self.fields.is_empty()
            && self.fields.iter().all(|field| {
                match (record.fields.get(field), patch.get(field)) {
                    (Some(stored), Some(given)) => self.equal(stored, given),
                    _ => false,
                }
            })
    }

    fn equal(&self, stored: &Value, given: &Value) -> bool {
        match (stored, given) {
            (Value::String(a), Value::String(b)) if self.case_insensitive => {
                a.to_lowercase() == b.to_lowercase()
            }
            _ => stored == given,
        }
    }
}

/// Every record of one collection, keyed by id.
///
/// Stored as a single JSON object `{"<id>": record, ...}`; the map key is
/// always rebuilt from the record's own `id`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Collection {
    records: BTreeMap<RecordId, Record>,
}

impl Collection {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let stored: BTreeMap<String, Record> = serde_json::from_value(value)?;
        Ok(stored.into_values().collect())
    }

    pub fn to_value(&self) -> Value {
        let object = self.records.iter()
            .map(|(id, record)| (id.to_string(), record.to_value()))
            .collect();
        Value::Object(object)
    }

    /// Records in id order.
    pub fn to_array(&self) -> Value {
        Value::Array(self.records.values().map(Record::to_value).collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &RecordId) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<Record> {
        self.records.remove(id)
    }

    pub fn find(&self, mut predicate: impl FnMut(&Record) -> bool) -> Option<&Record> {
        self.records.values().find(|r| predicate(r))
    }
}

impl FromIterator<Record> for Collection {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        let mut collection = Self::default();
        for record in iter {
            collection.insert(record);
        }
        collection
    }
}
