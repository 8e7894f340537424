//! PostgreSQL storage adapter.
//!
//! This module implements the [`EntityStore`] and [`UnitOfWork`] ports
//! defined in `cadence-core` using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and processor state migrations
//! - [`PgEntityStore`] - Entity tables, tracked migrations, committed reads
//! - [`PgUnitOfWork`] - One transaction per block
//! - [`ddl`] / [`sql`] - Schema-driven DDL and query rendering
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_processor(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! let store = Arc::new(PgEntityStore::new(Arc::new(db)));
//! store.migrate(&migration_set).await?;
//! ```

mod cursor;
mod database;
pub mod ddl;
mod migrations;
mod row;
pub mod sql;

pub use database::{Database, DatabaseConfig};

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info, instrument};

use cadence_core::entity::Entity;
use cadence_core::error::{StorageError, StorageResult};
use cadence_core::models::ProcessorCursor;
use cadence_core::ports::{EntityStore, MigrationReport, MigrationSet, UnitOfWork};
use cadence_core::query::{FilterPlan, QueryPlan};
use cadence_core::schema::EntitySchema;

use migrations::apply_tracked;
use row::decode_entity;

// =============================================================================
// Entity Store
// =============================================================================

/// PostgreSQL implementation of [`EntityStore`].
pub struct PgEntityStore {
    db: Arc<Database>,
}

impl PgEntityStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    #[instrument(skip_all, fields(schemas = set.schemas.len(), scripts = set.scripts.len()))]
    async fn migrate(&self, set: &MigrationSet) -> StorageResult<MigrationReport> {
        self.db.migrate().await?;

        let pool = self.db.pool();
        let mut report = MigrationReport::default();

        for schema in &set.schemas {
            let owner = format!("entity:{}", schema.name());
            apply_tracked(pool, &owner, 0, &ddl::create_table_sql(schema), &mut report).await?;
        }
        for script in &set.scripts {
            apply_tracked(pool, &script.owner, script.index, &script.sql, &mut report).await?;
        }

        if !report.applied.is_empty() {
            info!(applied = report.applied.len(), "🗄️  Migrations applied");
        }
        Ok(report)
    }

    async fn load_cursor(&self, stream_id: &str) -> StorageResult<Option<ProcessorCursor>> {
        cursor::load_cursor(self.db.pool(), stream_id).await
    }

    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>> {
        let tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn select(&self, schema: &EntitySchema, plan: &QueryPlan) -> StorageResult<Vec<Entity>> {
        let rows = sql::select(schema, plan)
            .build()
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.iter().map(|row| decode_entity(schema, row)).collect()
    }

    async fn count(&self, schema: &EntitySchema, filter: &FilterPlan) -> StorageResult<u64> {
        let row = sql::count(schema, filter)
            .build()
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        read_count(&row)
    }
}

// =============================================================================
// Unit Of Work
// =============================================================================

/// A block's writes inside one PostgreSQL transaction.
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn select(
        &mut self,
        schema: &EntitySchema,
        plan: &QueryPlan,
    ) -> StorageResult<Vec<Entity>> {
        let rows = sql::select(schema, plan)
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.iter().map(|row| decode_entity(schema, row)).collect()
    }

    async fn count(&mut self, schema: &EntitySchema, filter: &FilterPlan) -> StorageResult<u64> {
        let row = sql::count(schema, filter)
            .build()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        read_count(&row)
    }

    async fn insert(&mut self, schema: &EntitySchema, entities: &[Entity]) -> StorageResult<()> {
        if entities.is_empty() {
            return Ok(());
        }

        sql::insert(schema, entities)
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;

        debug!(entity = schema.name(), rows = entities.len(), "Inserted");
        Ok(())
    }

    async fn update(&mut self, schema: &EntitySchema, entity: &Entity) -> StorageResult<()> {
        let result = sql::update(schema, entity)
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::QueryError(format!(
                "{} {} does not exist",
                schema.name(),
                entity.id()
            )));
        }
        Ok(())
    }

    async fn save_cursor(&mut self, cursor: &ProcessorCursor) -> StorageResult<()> {
        cursor::save_cursor(&mut *self.tx, cursor).await
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn read_count(row: &sqlx::postgres::PgRow) -> StorageResult<u64> {
    let count: i64 = row
        .try_get(0)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    Ok(count.max(0) as u64)
}

fn write_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::ConstraintViolation(db.message().to_string())
        }
        _ => StorageError::QueryError(e.to_string()),
    }
}
