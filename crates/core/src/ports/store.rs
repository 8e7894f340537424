//! Port traits for entity persistence.
//!
//! Implementations live in the infrastructure layer (`cadence-storage` for
//! Postgres) and in [`crate::store`] for the in-memory adapter.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::StorageResult;
use crate::models::ProcessorCursor;
use crate::query::{FilterPlan, QueryPlan};
use crate::schema::EntitySchema;

// =============================================================================
// Migrations
// =============================================================================

/// One tracked SQL migration supplied by a mapping pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Pack (or subsystem) owning the script.
    pub owner: String,
    /// Position within the owner's scripts.
    pub index: u32,
    pub sql: String,
}

impl MigrationScript {
    pub fn new(owner: impl Into<String>, index: u32, sql: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            index,
            sql: sql.into(),
        }
    }

    pub fn checksum(&self) -> String {
        compute_checksum(&self.sql)
    }
}

/// Everything a store must apply before processing starts.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    /// Entity schemas whose tables must exist.
    pub schemas: Vec<Arc<EntitySchema>>,
    /// Extra pack SQL, applied after entity tables in list order.
    pub scripts: Vec<MigrationScript>,
}

/// Outcome of [`EntityStore::migrate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `owner/index` of every step applied by this call.
    pub applied: Vec<String>,
    /// Steps that were already recorded.
    pub skipped: usize,
    /// Steps recorded with a different checksum.
    pub mismatched: Vec<String>,
}

/// Compute a checksum for migration content.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

// =============================================================================
// Store Traits
// =============================================================================

/// Durable entity and cursor storage.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Apply processor-state tables, entity tables and pack scripts.
    ///
    /// Idempotent: steps are tracked by owner, index and checksum.
    async fn migrate(&self, set: &MigrationSet) -> StorageResult<MigrationReport>;

    /// Load the cursor of a stream, if one was ever committed.
    async fn load_cursor(&self, stream_id: &str) -> StorageResult<Option<ProcessorCursor>>;

    /// Open the unit of work of one block.
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>>;

    /// Read outside any unit of work.
    async fn select(&self, schema: &EntitySchema, plan: &QueryPlan) -> StorageResult<Vec<Entity>>;

    async fn count(&self, schema: &EntitySchema, filter: &FilterPlan) -> StorageResult<u64>;
}

/// All writes of one block; nothing is visible until [`UnitOfWork::commit`].
///
/// Dropping a unit of work without committing discards it.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read, seeing this unit's own uncommitted writes.
    async fn select(&mut self, schema: &EntitySchema, plan: &QueryPlan)
    -> StorageResult<Vec<Entity>>;

    async fn count(&mut self, schema: &EntitySchema, filter: &FilterPlan) -> StorageResult<u64>;

    /// Insert new rows; an existing id is a constraint violation.
    async fn insert(&mut self, schema: &EntitySchema, entities: &[Entity]) -> StorageResult<()>;

    /// Replace an existing row by id.
    async fn update(&mut self, schema: &EntitySchema, entity: &Entity) -> StorageResult<()>;

    async fn save_cursor(&mut self, cursor: &ProcessorCursor) -> StorageResult<()>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}
