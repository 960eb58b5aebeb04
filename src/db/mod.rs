//! Storage collaborator contract and the repository facade built over it.
//!
//! The facade never looks inside filters, patches or pipelines; it forwards
//! them to a [`Storage`] implementation and reshapes what comes back.

pub mod memory;
pub mod pool;
pub mod postgres;
pub mod repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::pagination::{PageWindow, Sort};

pub use memory::{MemoryError, MemoryPipeline, MemorySession, MemoryStore, Stage};
pub use pool::create_pool;
pub use postgres::{PgDocumentStore, PgSession, PgStoreError, SqlPipeline};
pub use repository::{Repository, SessionScope};

/// A stored record: generated metadata plus the caller's payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document<T> {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Document<T> {
    pub fn new(data: T, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            data,
        }
    }
}

/// Containment filter over a document's payload
///
/// A document matches when every key in `fields` is present with an equal
/// value (objects compare recursively, by containment). The default filter
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocFilter {
    pub id: Option<Uuid>,
    pub fields: Map<String, Value>,
}

impl DocFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            fields: Map::new(),
        }
    }

    /// Add a required field value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// Shallow merge applied to a document's payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocPatch(pub Map<String, Value>);

impl DocPatch {
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }
}

/// Options for a listing query
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub window: Option<PageWindow>,
}

/// A transaction handle supplied by the storage collaborator
#[async_trait]
pub trait Session: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    fn is_active(&self) -> bool;

    async fn abort(&mut self) -> Result<(), Self::Error>;

    async fn commit(&mut self) -> Result<(), Self::Error>;
}

/// Primitive operations a backing store exposes to [`Repository`]
///
/// Writes and the `find`/`find_one` reads accept an optional session; when
/// one is given the call must run inside it. `count`, `distinct` and
/// `start_session` take none and run outside any session.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    type Data: Send + Sync + 'static;
    type Filter: Default + Clone + std::fmt::Debug + Send + Sync;
    type Patch: Send + Sync;
    type Session: Session<Error = Self::Error>;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Entity name used in logs and not-found errors
    fn entity(&self) -> &str;

    fn id_filter(&self, id: Uuid) -> Self::Filter;

    async fn start_session(&self) -> Result<Self::Session, Self::Error>;

    async fn insert(
        &self,
        data: Vec<Self::Data>,
        session: Option<&mut Self::Session>,
    ) -> Result<Vec<Document<Self::Data>>, Self::Error>;

    async fn find(
        &self,
        filter: &Self::Filter,
        options: FindOptions,
        session: Option<&mut Self::Session>,
    ) -> Result<Vec<Document<Self::Data>>, Self::Error>;

    async fn find_one(
        &self,
        filter: &Self::Filter,
        session: Option<&mut Self::Session>,
    ) -> Result<Option<Document<Self::Data>>, Self::Error>;

    async fn count(&self, filter: &Self::Filter) -> Result<u64, Self::Error>;

    /// Distinct values of one payload field among matching documents
    async fn distinct(&self, field: &str, filter: &Self::Filter)
        -> Result<Vec<Value>, Self::Error>;

    /// Patch the first match; returns the updated document
    async fn update_one(
        &self,
        filter: &Self::Filter,
        patch: &Self::Patch,
        session: Option<&mut Self::Session>,
    ) -> Result<Option<Document<Self::Data>>, Self::Error>;

    /// Patch every match; returns how many were modified
    async fn update_many(
        &self,
        filter: &Self::Filter,
        patch: &Self::Patch,
        session: Option<&mut Self::Session>,
    ) -> Result<u64, Self::Error>;

    /// Remove the first match; returns the removed document
    async fn delete_one(
        &self,
        filter: &Self::Filter,
        session: Option<&mut Self::Session>,
    ) -> Result<Option<Document<Self::Data>>, Self::Error>;

    async fn delete_many(
        &self,
        filter: &Self::Filter,
        session: Option<&mut Self::Session>,
    ) -> Result<u64, Self::Error>;
}

/// Stores that can run a transformable query pipeline
#[async_trait]
pub trait AggregateStorage: Storage {
    type Pipeline: Clone + Send + Sync;

    /// Extend a pipeline with sort, skip and limit stages (in that order)
    fn windowed(
        &self,
        pipeline: &Self::Pipeline,
        sort: &Sort,
        window: PageWindow,
    ) -> Result<Self::Pipeline, Self::Error>;

    async fn aggregate(
        &self,
        pipeline: &Self::Pipeline,
    ) -> Result<Vec<Document<Self::Data>>, Self::Error>;

    async fn aggregate_count(&self, pipeline: &Self::Pipeline) -> Result<u64, Self::Error>;
}

/// Whether `doc` contains every key of `filter` with an equal value
pub fn json_contains(doc: &Value, filter: &Value) -> bool {
    match (doc, filter) {
        (Value::Object(doc), Value::Object(filter)) => filter
            .iter()
            .all(|(key, want)| doc.get(key).is_some_and(|have| json_contains(have, want))),
        (Value::Array(doc), Value::Array(filter)) => filter
            .iter()
            .all(|want| doc.iter().any(|have| json_contains(have, want))),
        (have, want) => have == want,
    }
}
