use std::fmt::Display;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::{AggregateStorage, Document, FindOptions, Session, Storage};
use crate::error::{AppError, Result};
use crate::pagination::{paginate, PageRequest, PaginationResult, Sort};

/// Uniform data access over a [`Storage`] collaborator
///
/// Tolerant methods return `Option`/`Vec`/counts on a miss; the
/// `_or_error` variants turn an empty result into [`AppError::NotFound`].
/// Storage failures become [`AppError::Repository`]: 500 on the read path,
/// 400 on the write path, keeping the store's message.
pub struct Repository<S> {
    store: Arc<S>,
}

impl<S> Clone for Repository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

type Doc<S> = Document<<S as Storage>::Data>;

impl<S: Storage> Repository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn entity(&self) -> &str {
        self.store.entity()
    }

    fn read_failure(&self, operation: &str, err: impl Display) -> AppError {
        tracing::error!(
            entity = self.store.entity(),
            operation,
            "Read failed: {}",
            err
        );
        AppError::read_failure(err)
    }

    fn write_failure(&self, operation: &str, err: impl Display) -> AppError {
        tracing::warn!(
            entity = self.store.entity(),
            operation,
            "Write failed: {}",
            err
        );
        AppError::write_failure(err)
    }

    fn not_found(&self, filter: &S::Filter) -> AppError {
        AppError::not_found(self.store.entity(), filter)
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub async fn create(&self, data: S::Data) -> Result<Doc<S>> {
        self.store
            .insert(vec![data], None)
            .await
            .map_err(|e| self.write_failure("create", e))?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("store returned no created document".into()))
    }

    pub async fn create_many(&self, data: Vec<S::Data>) -> Result<Vec<Doc<S>>> {
        self.store
            .insert(data, None)
            .await
            .map_err(|e| self.write_failure("create_many", e))
    }

    // ========================================================================
    // Read
    // ========================================================================

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Doc<S>>> {
        self.find_one(&self.store.id_filter(id)).await
    }

    pub async fn find_by_id_or_error(&self, id: Uuid) -> Result<Doc<S>> {
        self.find_one_or_error(&self.store.id_filter(id)).await
    }

    pub async fn find_one(&self, filter: &S::Filter) -> Result<Option<Doc<S>>> {
        self.store
            .find_one(filter, None)
            .await
            .map_err(|e| self.read_failure("find_one", e))
    }

    pub async fn find_one_or_error(&self, filter: &S::Filter) -> Result<Doc<S>> {
        self.find_one(filter)
            .await?
            .ok_or_else(|| self.not_found(filter))
    }

    pub async fn find_many(&self, filter: &S::Filter, sort: Option<Sort>) -> Result<Vec<Doc<S>>> {
        self.store
            .find(filter, FindOptions { sort, window: None }, None)
            .await
            .map_err(|e| self.read_failure("find_many", e))
    }

    pub async fn find_many_or_error(
        &self,
        filter: &S::Filter,
        sort: Option<Sort>,
    ) -> Result<Vec<Doc<S>>> {
        let found = self.find_many(filter, sort).await?;
        if found.is_empty() {
            return Err(self.not_found(filter));
        }
        Ok(found)
    }

    pub async fn count(&self, filter: &S::Filter) -> Result<u64> {
        self.store
            .count(filter)
            .await
            .map_err(|e| self.read_failure("count", e))
    }

    pub async fn exists(&self, filter: &S::Filter) -> Result<bool> {
        Ok(self.find_one(filter).await?.is_some())
    }

    pub async fn distinct(&self, field: &str, filter: &S::Filter) -> Result<Vec<Value>> {
        self.store
            .distinct(field, filter)
            .await
            .map_err(|e| self.read_failure("distinct", e))
    }

    /// One page of matching documents, newest first unless `sort` says otherwise
    ///
    /// The count and the windowed fetch run concurrently, so under concurrent
    /// writes the metadata may be off by the writes that landed in between.
    pub async fn paginated_list(
        &self,
        filter: &S::Filter,
        request: PageRequest,
        sort: Option<Sort>,
    ) -> Result<PaginationResult<Doc<S>>> {
        let options = FindOptions {
            sort: Some(sort.unwrap_or_default()),
            window: Some(request.window()),
        };

        let (total_count, items) = tokio::try_join!(
            self.store.count(filter),
            self.store.find(filter, options, None)
        )
        .map_err(|e| self.read_failure("paginated_list", e))?;

        let meta = paginate(request, total_count);
        tracing::debug!(
            entity = self.store.entity(),
            "Page {}/{} ({} of {} items)",
            meta.current_page,
            meta.total_pages,
            items.len(),
            meta.total_count
        );

        Ok(PaginationResult::new(items, meta))
    }

    // ========================================================================
    // Update
    // ========================================================================

    pub async fn update_by_id(&self, id: Uuid, patch: &S::Patch) -> Result<Option<Doc<S>>> {
        self.update_one(&self.store.id_filter(id), patch).await
    }

    pub async fn update_by_id_or_error(&self, id: Uuid, patch: &S::Patch) -> Result<Doc<S>> {
        self.update_one_or_error(&self.store.id_filter(id), patch)
            .await
    }

    pub async fn update_one(&self, filter: &S::Filter, patch: &S::Patch) -> Result<Option<Doc<S>>> {
        self.store
            .update_one(filter, patch, None)
            .await
            .map_err(|e| self.write_failure("update_one", e))
    }

    pub async fn update_one_or_error(&self, filter: &S::Filter, patch: &S::Patch) -> Result<Doc<S>> {
        self.update_one(filter, patch)
            .await?
            .ok_or_else(|| self.not_found(filter))
    }

    pub async fn update_many(&self, filter: &S::Filter, patch: &S::Patch) -> Result<u64> {
        self.store
            .update_many(filter, patch, None)
            .await
            .map_err(|e| self.write_failure("update_many", e))
    }

    pub async fn update_many_or_error(&self, filter: &S::Filter, patch: &S::Patch) -> Result<u64> {
        match self.update_many(filter, patch).await? {
            0 => Err(self.not_found(filter)),
            modified => Ok(modified),
        }
    }

    // ========================================================================
    // Delete
    // ========================================================================

    pub async fn delete_by_id(&self, id: Uuid) -> Result<Option<Doc<S>>> {
        self.delete_one(&self.store.id_filter(id)).await
    }

    pub async fn delete_by_id_or_error(&self, id: Uuid) -> Result<Doc<S>> {
        let filter = self.store.id_filter(id);
        self.delete_one(&filter)
            .await?
            .ok_or_else(|| self.not_found(&filter))
    }

    pub async fn delete_one(&self, filter: &S::Filter) -> Result<Option<Doc<S>>> {
        self.store
            .delete_one(filter, None)
            .await
            .map_err(|e| self.write_failure("delete_one", e))
    }

    pub async fn delete_many(&self, filter: &S::Filter) -> Result<u64> {
        self.store
            .delete_many(filter, None)
            .await
            .map_err(|e| self.write_failure("delete_many", e))
    }

    pub async fn delete_many_or_error(&self, filter: &S::Filter) -> Result<u64> {
        match self.delete_many(filter).await? {
            0 => Err(self.not_found(filter)),
            removed => Ok(removed),
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub async fn start_session(&self) -> Result<S::Session> {
        self.store
            .start_session()
            .await
            .map_err(|e| self.read_failure("start_session", e))
    }

    /// Abort the session only if it still denotes an active transaction
    pub async fn abort_if_active(&self, session: &mut S::Session) -> Result<()> {
        if !session.is_active() {
            return Ok(());
        }
        session
            .abort()
            .await
            .map_err(|e| self.write_failure("abort", e))
    }

    /// Run a group of calls inside one session
    pub fn in_session<'a>(&'a self, session: &'a mut S::Session) -> SessionScope<'a, S> {
        SessionScope {
            repo: self,
            session,
        }
    }
}

impl<S: AggregateStorage> Repository<S> {
    /// Paginate the output of a pipeline
    ///
    /// The total comes from the untouched pipeline; the items from the same
    /// pipeline extended with sort, skip and limit.
    pub async fn aggregate_paginated_list(
        &self,
        pipeline: &S::Pipeline,
        request: PageRequest,
        sort: Option<Sort>,
    ) -> Result<PaginationResult<Doc<S>>> {
        let sort = sort.unwrap_or_default();
        let windowed = self
            .store
            .windowed(pipeline, &sort, request.window())
            .map_err(|e| self.read_failure("aggregate_paginated_list", e))?;

        let (total_count, items) = tokio::try_join!(
            self.store.aggregate_count(pipeline),
            self.store.aggregate(&windowed)
        )
        .map_err(|e| self.read_failure("aggregate_paginated_list", e))?;

        Ok(PaginationResult::new(items, paginate(request, total_count)))
    }
}

/// Calls bound to one session handle
pub struct SessionScope<'a, S: Storage> {
    repo: &'a Repository<S>,
    session: &'a mut S::Session,
}

impl<'a, S: Storage> SessionScope<'a, S> {
    pub async fn create(&mut self, data: S::Data) -> Result<Doc<S>> {
        self.create_many(vec![data])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("store returned no created document".into()))
    }

    pub async fn create_many(&mut self, data: Vec<S::Data>) -> Result<Vec<Doc<S>>> {
        self.repo
            .store
            .insert(data, Some(&mut *self.session))
            .await
            .map_err(|e| self.repo.write_failure("create", e))
    }

    pub async fn find_one(&mut self, filter: &S::Filter) -> Result<Option<Doc<S>>> {
        self.repo
            .store
            .find_one(filter, Some(&mut *self.session))
            .await
            .map_err(|e| self.repo.read_failure("find_one", e))
    }

    pub async fn update_by_id(&mut self, id: Uuid, patch: &S::Patch) -> Result<Option<Doc<S>>> {
        let filter = self.repo.store.id_filter(id);
        self.update_one(&filter, patch).await
    }

    pub async fn update_one(
        &mut self,
        filter: &S::Filter,
        patch: &S::Patch,
    ) -> Result<Option<Doc<S>>> {
        self.repo
            .store
            .update_one(filter, patch, Some(&mut *self.session))
            .await
            .map_err(|e| self.repo.write_failure("update_one", e))
    }

    pub async fn update_many(&mut self, filter: &S::Filter, patch: &S::Patch) -> Result<u64> {
        self.repo
            .store
            .update_many(filter, patch, Some(&mut *self.session))
            .await
            .map_err(|e| self.repo.write_failure("update_many", e))
    }

    pub async fn delete_one(&mut self, filter: &S::Filter) -> Result<Option<Doc<S>>> {
        self.repo
            .store
            .delete_one(filter, Some(&mut *self.session))
            .await
            .map_err(|e| self.repo.write_failure("delete_one", e))
    }

    pub async fn delete_many(&mut self, filter: &S::Filter) -> Result<u64> {
        self.repo
            .store
            .delete_many(filter, Some(&mut *self.session))
            .await
            .map_err(|e| self.repo.write_failure("delete_many", e))
    }

    pub async fn commit(self) -> Result<()> {
        self.session
            .commit()
            .await
            .map_err(|e| self.repo.write_failure("commit", e))
    }
}
