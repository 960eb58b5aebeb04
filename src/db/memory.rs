//! In-process document store.
//!
//! Backs the test suite and small deployments that do not need Postgres.
//! Sessions take a snapshot when they begin and put it back on abort, so a
//! session is only isolated from writers that do not interleave with it.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    json_contains, AggregateStorage, DocFilter, DocPatch, Document, FindOptions, Session, Storage,
};
use crate::pagination::{PageWindow, Sort, SortDirection};

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session is no longer active")]
    SessionClosed,
}

type Shared<T> = Arc<RwLock<Vec<Document<T>>>>;

/// Document store held in memory
pub struct MemoryStore<T> {
    entity: String,
    docs: Shared<T>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            docs: Arc::clone(&self.docs),
        }
    }
}

impl<T> MemoryStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            docs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    fn matches(doc: &Document<T>, filter: &DocFilter) -> Result<bool, MemoryError> {
        if filter.id.is_some_and(|id| id != doc.id) {
            return Ok(false);
        }
        if filter.fields.is_empty() {
            return Ok(true);
        }
        let payload = serde_json::to_value(&doc.data)?;
        Ok(json_contains(&payload, &Value::Object(filter.fields.clone())))
    }

    fn matching(docs: &[Document<T>], filter: &DocFilter) -> Result<Vec<usize>, MemoryError> {
        let mut positions = Vec::new();
        for (i, doc) in docs.iter().enumerate() {
            if Self::matches(doc, filter)? {
                positions.push(i);
            }
        }
        Ok(positions)
    }

    fn apply_patch(doc: &mut Document<T>, patch: &DocPatch) -> Result<(), MemoryError> {
        let mut payload = serde_json::to_value(&doc.data)?;
        if let Value::Object(fields) = &mut payload {
            for (key, value) in &patch.0 {
                fields.insert(key.clone(), value.clone());
            }
        }
        doc.data = serde_json::from_value(payload)?;
        doc.updated_at = Utc::now();
        Ok(())
    }

    fn check_session(session: Option<&mut MemorySession<T>>) -> Result<(), MemoryError> {
        match session {
            Some(session) if !session.is_active() => Err(MemoryError::SessionClosed),
            _ => Ok(()),
        }
    }
}

enum SortKey {
    Time(DateTime<Utc>),
    Json(Value),
}

impl SortKey {
    fn of<T: Serialize>(doc: &Document<T>, field: &str) -> Result<Self, MemoryError> {
        Ok(match field {
            "createdAt" => SortKey::Time(doc.created_at),
            "updatedAt" => SortKey::Time(doc.updated_at),
            _ => SortKey::Json(
                serde_json::to_value(doc)?
                    .get(field)
                    .cloned()
                    .unwrap_or(Value::Null),
            ),
        })
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Time(a), SortKey::Time(b)) => a.cmp(b),
            (SortKey::Json(a), SortKey::Json(b)) => compare_json(a, b),
            (SortKey::Time(_), SortKey::Json(_)) => Ordering::Greater,
            (SortKey::Json(_), SortKey::Time(_)) => Ordering::Less,
        }
    }
}

/// Sort documents by a serialized field; missing values sort first
fn sort_documents<T: Serialize>(
    docs: Vec<Document<T>>,
    sort: &Sort,
) -> Result<Vec<Document<T>>, MemoryError> {
    let mut keyed = Vec::with_capacity(docs.len());
    for doc in docs {
        keyed.push((SortKey::of(&doc, &sort.field)?, doc));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = a.compare(b);
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    Ok(keyed.into_iter().map(|(_, doc)| doc).collect())
}

fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn window<T>(docs: Vec<Document<T>>, window: PageWindow) -> Vec<Document<T>> {
    docs.into_iter()
        .skip(window.skip as usize)
        .take(window.limit as usize)
        .collect()
}

/// Snapshot-based session over a [`MemoryStore`]
pub struct MemorySession<T> {
    docs: Shared<T>,
    snapshot: Option<Vec<Document<T>>>,
}

#[async_trait]
impl<T> Session for MemorySession<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Error = MemoryError;

    fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    async fn abort(&mut self) -> Result<(), MemoryError> {
        let snapshot = self.snapshot.take().ok_or(MemoryError::SessionClosed)?;
        *self.docs.write().await = snapshot;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), MemoryError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or(MemoryError::SessionClosed)
    }
}

#[async_trait]
impl<T> Storage for MemoryStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Data = T;
    type Filter = DocFilter;
    type Patch = DocPatch;
    type Session = MemorySession<T>;
    type Error = MemoryError;

    fn entity(&self) -> &str {
        &self.entity
    }

    fn id_filter(&self, id: Uuid) -> DocFilter {
        DocFilter::by_id(id)
    }

    async fn start_session(&self) -> Result<MemorySession<T>, MemoryError> {
        let snapshot = self.docs.read().await.clone();
        Ok(MemorySession {
            docs: Arc::clone(&self.docs),
            snapshot: Some(snapshot),
        })
    }

    async fn insert(
        &self,
        data: Vec<T>,
        session: Option<&mut MemorySession<T>>,
    ) -> Result<Vec<Document<T>>, MemoryError> {
        Self::check_session(session)?;
        let now = Utc::now();
        let created: Vec<Document<T>> = data.into_iter().map(|d| Document::new(d, now)).collect();
        self.docs.write().await.extend(created.iter().cloned());
        Ok(created)
    }

    async fn find(
        &self,
        filter: &DocFilter,
        options: FindOptions,
        session: Option<&mut MemorySession<T>>,
    ) -> Result<Vec<Document<T>>, MemoryError> {
        Self::check_session(session)?;
        let docs = self.docs.read().await;
        let found: Vec<Document<T>> = Self::matching(&docs, filter)?
            .into_iter()
            .map(|i| docs[i].clone())
            .collect();
        drop(docs);

        let found = match &options.sort {
            Some(sort) => sort_documents(found, sort)?,
            None => found,
        };
        Ok(match options.window {
            Some(w) => window(found, w),
            None => found,
        })
    }

    async fn find_one(
        &self,
        filter: &DocFilter,
        session: Option<&mut MemorySession<T>>,
    ) -> Result<Option<Document<T>>, MemoryError> {
        Self::check_session(session)?;
        let docs = self.docs.read().await;
        for doc in docs.iter() {
            if Self::matches(doc, filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn count(&self, filter: &DocFilter) -> Result<u64, MemoryError> {
        let docs = self.docs.read().await;
        Ok(Self::matching(&docs, filter)?.len() as u64)
    }

    async fn distinct(&self, field: &str, filter: &DocFilter) -> Result<Vec<Value>, MemoryError> {
        let docs = self.docs.read().await;
        let mut values: Vec<Value> = Vec::new();
        for i in Self::matching(&docs, filter)? {
            let payload = serde_json::to_value(&docs[i].data)?;
            if let Some(value) = payload.get(field) {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        Ok(values)
    }

    async fn update_one(
        &self,
        filter: &DocFilter,
        patch: &DocPatch,
        session: Option<&mut MemorySession<T>>,
    ) -> Result<Option<Document<T>>, MemoryError> {
        Self::check_session(session)?;
        let mut docs = self.docs.write().await;
        let Some(&position) = Self::matching(&docs, filter)?.first() else {
            return Ok(None);
        };
        Self::apply_patch(&mut docs[position], patch)?;
        Ok(Some(docs[position].clone()))
    }

    async fn update_many(
        &self,
        filter: &DocFilter,
        patch: &DocPatch,
        session: Option<&mut MemorySession<T>>,
    ) -> Result<u64, MemoryError> {
        Self::check_session(session)?;
        let mut docs = self.docs.write().await;
        // All or nothing: patch copies, then write back
        let mut patched = Vec::new();
        for position in Self::matching(&docs, filter)? {
            let mut doc = docs[position].clone();
            Self::apply_patch(&mut doc, patch)?;
            patched.push((position, doc));
        }

        let count = patched.len() as u64;
        for (position, doc) in patched {
            docs[position] = doc;
        }
        Ok(count)
    }

    async fn delete_one(
        &self,
        filter: &DocFilter,
        session: Option<&mut MemorySession<T>>,
    ) -> Result<Option<Document<T>>, MemoryError> {
        Self::check_session(session)?;
        let mut docs = self.docs.write().await;
        let Some(&position) = Self::matching(&docs, filter)?.first() else {
            return Ok(None);
        };
        Ok(Some(docs.remove(position)))
    }

    async fn delete_many(
        &self,
        filter: &DocFilter,
        session: Option<&mut MemorySession<T>>,
    ) -> Result<u64, MemoryError> {
        Self::check_session(session)?;
        let mut docs = self.docs.write().await;
        let positions = Self::matching(&docs, filter)?;
        for &position in positions.iter().rev() {
            docs.remove(position);
        }
        Ok(positions.len() as u64)
    }
}

/// One step of a [`MemoryPipeline`]
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(DocFilter),
    Sort(Sort),
    Skip(u64),
    Limit(u64),
}

/// Ordered stages applied to the whole collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPipeline {
    pub stages: Vec<Stage>,
}

impl MemoryPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }
}

#[async_trait]
impl<T> AggregateStorage for MemoryStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Pipeline = MemoryPipeline;

    fn windowed(
        &self,
        pipeline: &MemoryPipeline,
        sort: &Sort,
        window: PageWindow,
    ) -> Result<MemoryPipeline, MemoryError> {
        Ok(pipeline
            .clone()
            .stage(Stage::Sort(sort.clone()))
            .stage(Stage::Skip(window.skip))
            .stage(Stage::Limit(window.limit)))
    }

    async fn aggregate(&self, pipeline: &MemoryPipeline) -> Result<Vec<Document<T>>, MemoryError> {
        let mut current = self.docs.read().await.clone();
        for stage in &pipeline.stages {
            current = match stage {
                Stage::Match(filter) => {
                    let mut kept = Vec::with_capacity(current.len());
                    for doc in current {
                        if Self::matches(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    kept
                }
                Stage::Sort(sort) => sort_documents(current, sort)?,
                Stage::Skip(n) => current.into_iter().skip(*n as usize).collect(),
                Stage::Limit(n) => current.into_iter().take(*n as usize).collect(),
            };
        }
        Ok(current)
    }

    async fn aggregate_count(&self, pipeline: &MemoryPipeline) -> Result<u64, MemoryError> {
        Ok(self.aggregate(pipeline).await?.len() as u64)
    }
}
