//! Postgres document store.
//!
//! Each entity lives in its own table of JSONB documents:
//!
//! ```sql
//! CREATE TABLE <table> (
//!     id UUID PRIMARY KEY,
//!     doc JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! )
//! ```
//!
//! Filters become `doc @> $json`, patches `doc || $json`. Aggregate pipelines
//! are SQL sub-selects yielding those four columns.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{
    postgres::{PgConnection, PgPool, Postgres},
    types::Json,
    QueryBuilder, Transaction,
};
use thiserror::Error;
use uuid::Uuid;

use super::{AggregateStorage, DocFilter, DocPatch, Document, FindOptions, Session, Storage};
use crate::pagination::{is_field_name, PageWindow, Sort, SortDirection};

const COLUMNS: &str = "id, doc, created_at, updated_at";

type DocRow<T> = (Uuid, Json<T>, DateTime<Utc>, DateTime<Utc>);

fn into_document<T>((id, Json(data), created_at, updated_at): DocRow<T>) -> Document<T> {
    Document {
        id,
        created_at,
        updated_at,
        data,
    }
}

#[derive(Error, Debug)]
pub enum PgStoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Session is no longer active")]
    SessionClosed,

    #[error("Offset or limit out of range: {0}")]
    WindowOutOfRange(u64),
}

/// Identifiers are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is allowed
fn validate_identifier(name: &str) -> Result<&str, PgStoreError> {
    if is_field_name(name) {
        Ok(name)
    } else {
        Err(PgStoreError::InvalidIdentifier(name.to_string()))
    }
}

fn to_bigint(value: u64) -> Result<i64, PgStoreError> {
    i64::try_from(value).map_err(|_| PgStoreError::WindowOutOfRange(value))
}

/// `ORDER BY` expression for a sort key
fn order_clause(sort: &Sort) -> Result<String, PgStoreError> {
    let field = validate_identifier(&sort.field)?;
    let expression = match field {
        "id" => "id".to_string(),
        "createdAt" => "created_at".to_string(),
        "updatedAt" => "updated_at".to_string(),
        other => format!("doc->'{}'", other),
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    Ok(format!("{} {}", expression, direction))
}

fn push_where(builder: &mut QueryBuilder<'_, Postgres>, filter: &DocFilter) {
    builder.push(" WHERE TRUE");
    if let Some(id) = filter.id {
        builder.push(" AND id = ").push_bind(id);
    }
    if !filter.fields.is_empty() {
        builder
            .push(" AND doc @> ")
            .push_bind(Json(Value::Object(filter.fields.clone())));
    }
}

/// Run `$body` against the session's connection when there is one, else the pool
macro_rules! on_executor {
    ($pool:expr, $session:expr, |$executor:ident| $body:expr) => {
        match $session {
            Some(session) => {
                let $executor = session.connection()?;
                $body
            }
            None => {
                let $executor = $pool;
                $body
            }
        }
    };
}

/// A Postgres transaction
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn connection(&mut self) -> Result<&mut PgConnection, PgStoreError> {
        self.tx.as_deref_mut().ok_or(PgStoreError::SessionClosed)
    }
}

#[async_trait]
impl Session for PgSession {
    type Error = PgStoreError;

    fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    async fn abort(&mut self) -> Result<(), PgStoreError> {
        let tx = self.tx.take().ok_or(PgStoreError::SessionClosed)?;
        tx.rollback().await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PgStoreError> {
        let tx = self.tx.take().ok_or(PgStoreError::SessionClosed)?;
        tx.commit().await?;
        Ok(())
    }
}

/// A SQL sub-select plus JSON arguments bound as `$1..$n`
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPipeline {
    pub sql: String,
    pub args: Vec<Value>,
}

impl SqlPipeline {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

fn window_pipeline(
    pipeline: &SqlPipeline,
    sort: &Sort,
    window: PageWindow,
) -> Result<SqlPipeline, PgStoreError> {
    Ok(SqlPipeline {
        sql: format!(
            "SELECT {} FROM ({}) AS stage ORDER BY {} OFFSET {} LIMIT {}",
            COLUMNS,
            pipeline.sql,
            order_clause(sort)?,
            to_bigint(window.skip)?,
            to_bigint(window.limit)?
        ),
        args: pipeline.args.clone(),
    })
}

/// Document store over one Postgres table
pub struct PgDocumentStore<T> {
    pool: PgPool,
    entity: String,
    table: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PgDocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            entity: self.entity.clone(),
            table: self.table.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PgDocumentStore<T> {
    pub fn new(pool: PgPool, entity: &str, table: &str) -> Result<Self, PgStoreError> {
        Ok(Self {
            pool,
            entity: entity.to_string(),
            table: validate_identifier(table)?.to_string(),
            _marker: PhantomData,
        })
    }

    /// Create the table and its listing index if they do not exist
    pub async fn ensure_table(&self) -> Result<(), PgStoreError> {
        tracing::info!("Ensuring table {} for {}", self.table, self.entity);

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                doc JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {0}_created_at_idx ON {0} (created_at DESC)",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn select(&self) -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(format!("SELECT {} FROM {}", COLUMNS, self.table))
    }

    /// `WHERE id = (first match)` so single-row writes touch exactly one document
    fn first_match(&self, builder: &mut QueryBuilder<'_, Postgres>, filter: &DocFilter) {
        builder.push(format!(" WHERE id = (SELECT id FROM {}", self.table));
        push_where(builder, filter);
        builder.push(" LIMIT 1)");
    }
}

#[async_trait]
impl<T> Storage for PgDocumentStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static,
{
    type Data = T;
    type Filter = DocFilter;
    type Patch = DocPatch;
    type Session = PgSession;
    type Error = PgStoreError;

    fn entity(&self) -> &str {
        &self.entity
    }

    fn id_filter(&self, id: Uuid) -> DocFilter {
        DocFilter::by_id(id)
    }

    async fn start_session(&self) -> Result<PgSession, PgStoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgSession { tx: Some(tx) })
    }

    async fn insert(
        &self,
        data: Vec<T>,
        mut session: Option<&mut PgSession>,
    ) -> Result<Vec<Document<T>>, PgStoreError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $3)",
            self.table, COLUMNS
        );
        let now = Utc::now();
        let mut created = Vec::with_capacity(data.len());

        for item in data {
            let doc = Document::new(item, now);
            on_executor!(&self.pool, session.as_deref_mut(), |executor| {
                sqlx::query(&sql)
                    .bind(doc.id)
                    .bind(Json(&doc.data))
                    .bind(doc.created_at)
                    .execute(executor)
                    .await?
            });
            created.push(doc);
        }

        Ok(created)
    }

    async fn find(
        &self,
        filter: &DocFilter,
        options: FindOptions,
        session: Option<&mut PgSession>,
    ) -> Result<Vec<Document<T>>, PgStoreError> {
        let mut builder = self.select();
        push_where(&mut builder, filter);
        if let Some(sort) = &options.sort {
            builder.push(" ORDER BY ").push(order_clause(sort)?);
        }
        if let Some(window) = options.window {
            builder
                .push(" OFFSET ")
                .push_bind(to_bigint(window.skip)?)
                .push(" LIMIT ")
                .push_bind(to_bigint(window.limit)?);
        }

        let rows = on_executor!(&self.pool, session, |executor| {
            builder
                .build_query_as::<DocRow<T>>()
                .fetch_all(executor)
                .await?
        });
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn find_one(
        &self,
        filter: &DocFilter,
        session: Option<&mut PgSession>,
    ) -> Result<Option<Document<T>>, PgStoreError> {
        let mut builder = self.select();
        push_where(&mut builder, filter);
        builder.push(" LIMIT 1");

        let row = on_executor!(&self.pool, session, |executor| {
            builder
                .build_query_as::<DocRow<T>>()
                .fetch_optional(executor)
                .await?
        });
        Ok(row.map(into_document))
    }

    async fn count(&self, filter: &DocFilter) -> Result<u64, PgStoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.table));
        push_where(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn distinct(&self, field: &str, filter: &DocFilter) -> Result<Vec<Value>, PgStoreError> {
        let field = validate_identifier(field)?;
        let mut builder = QueryBuilder::new(format!(
            "SELECT DISTINCT doc->'{}' FROM {}",
            field, self.table
        ));
        push_where(&mut builder, filter);
        builder.push(format!(" AND doc->'{}' IS NOT NULL", field));

        let values: Vec<Json<Value>> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;
        Ok(values.into_iter().map(|Json(v)| v).collect())
    }

    async fn update_one(
        &self,
        filter: &DocFilter,
        patch: &DocPatch,
        session: Option<&mut PgSession>,
    ) -> Result<Option<Document<T>>, PgStoreError> {
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET doc = doc || ", self.table));
        builder
            .push_bind(Json(Value::Object(patch.0.clone())))
            .push(", updated_at = now()");
        self.first_match(&mut builder, filter);
        builder.push(format!(" RETURNING {}", COLUMNS));

        let row = on_executor!(&self.pool, session, |executor| {
            builder
                .build_query_as::<DocRow<T>>()
                .fetch_optional(executor)
                .await?
        });
        Ok(row.map(into_document))
    }

    async fn update_many(
        &self,
        filter: &DocFilter,
        patch: &DocPatch,
        session: Option<&mut PgSession>,
    ) -> Result<u64, PgStoreError> {
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET doc = doc || ", self.table));
        builder
            .push_bind(Json(Value::Object(patch.0.clone())))
            .push(", updated_at = now()");
        push_where(&mut builder, filter);

        let result = on_executor!(&self.pool, session, |executor| {
            builder.build().execute(executor).await?
        });
        Ok(result.rows_affected())
    }

    async fn delete_one(
        &self,
        filter: &DocFilter,
        session: Option<&mut PgSession>,
    ) -> Result<Option<Document<T>>, PgStoreError> {
        let mut builder = QueryBuilder::new(format!("DELETE FROM {}", self.table));
        self.first_match(&mut builder, filter);
        builder.push(format!(" RETURNING {}", COLUMNS));

        let row = on_executor!(&self.pool, session, |executor| {
            builder
                .build_query_as::<DocRow<T>>()
                .fetch_optional(executor)
                .await?
        });
        Ok(row.map(into_document))
    }

    async fn delete_many(
        &self,
        filter: &DocFilter,
        session: Option<&mut PgSession>,
    ) -> Result<u64, PgStoreError> {
        let mut builder = QueryBuilder::new(format!("DELETE FROM {}", self.table));
        push_where(&mut builder, filter);

        let result = on_executor!(&self.pool, session, |executor| {
            builder.build().execute(executor).await?
        });
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl<T> AggregateStorage for PgDocumentStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static,
{
    type Pipeline = SqlPipeline;

    fn windowed(
        &self,
        pipeline: &SqlPipeline,
        sort: &Sort,
        window: PageWindow,
    ) -> Result<SqlPipeline, PgStoreError> {
        window_pipeline(pipeline, sort, window)
    }

    async fn aggregate(&self, pipeline: &SqlPipeline) -> Result<Vec<Document<T>>, PgStoreError> {
        let mut query = sqlx::query_as::<_, DocRow<T>>(&pipeline.sql);
        for arg in &pipeline.args {
            query = query.bind(Json(arg));
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn aggregate_count(&self, pipeline: &SqlPipeline) -> Result<u64, PgStoreError> {
        let sql = format!("SELECT COUNT(*) FROM ({}) AS stage", pipeline.sql);
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for arg in &pipeline.args {
            query = query.bind(Json(arg));
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}
