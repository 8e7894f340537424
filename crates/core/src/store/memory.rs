//! In-memory [`EntityStore`].
//!
//! Used by tests and dry runs. A unit of work holds the store lock for its
//! whole life and edits a private copy of the state; commit swaps the copy
//! in, drop or rollback throws it away. Reads evaluate plans with
//! [`crate::query::eval`], which is the reference semantics for every
//! adapter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::error::{StorageError, StorageResult};
use crate::models::ProcessorCursor;
use crate::ports::{
    EntityStore, MigrationReport, MigrationSet, UnitOfWork, compute_checksum,
};
use crate::query::{FilterPlan, QueryPlan};
use crate::schema::EntitySchema;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// entity name -> id -> row
    tables: HashMap<String, BTreeMap<String, Entity>>,
    cursors: HashMap<String, ProcessorCursor>,
    /// (owner, index) -> checksum
    migrations: BTreeMap<(String, u32), String>,
}

impl MemoryState {
    fn table(&self, schema: &EntitySchema) -> StorageResult<&BTreeMap<String, Entity>> {
        self.tables
            .get(schema.name())
            .ok_or_else(|| missing_table(schema))
    }

    fn table_mut(&mut self, schema: &EntitySchema) -> StorageResult<&mut BTreeMap<String, Entity>> {
        self.tables
            .get_mut(schema.name())
            .ok_or_else(|| missing_table(schema))
    }

    fn select(&self, schema: &EntitySchema, plan: &QueryPlan) -> StorageResult<Vec<Entity>> {
        Ok(plan.apply(self.table(schema)?.values().cloned()))
    }

    fn count(&self, schema: &EntitySchema, filter: &FilterPlan) -> StorageResult<u64> {
        Ok(self
            .table(schema)?
            .values()
            .filter(|e| filter.matches(e))
            .count() as u64)
    }

    /// Record a migration step; returns whether it was new.
    fn track(&mut self, owner: &str, index: u32, checksum: String, report: &mut MigrationReport) -> bool {
        let key = (owner.to_string(), index);
        let label = format!("{owner}/{index}");
        match self.migrations.get(&key) {
            Some(existing) if *existing != checksum => {
                warn!(
                    owner,
                    migration = index,
                    expected = %checksum,
                    found = %existing,
                    "⚠️  Migration checksum mismatch! Migration content has changed."
                );
                report.mismatched.push(label);
                report.skipped += 1;
                false
            }
            Some(_) => {
                report.skipped += 1;
                false
            }
            None => {
                self.migrations.insert(key, checksum);
                report.applied.push(label);
                true
            }
        }
    }
}

fn missing_table(schema: &EntitySchema) -> StorageError {
    StorageError::QueryError(format!("table for entity {} does not exist", schema.name()))
}

/// Shared in-memory store; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryEntityStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row of an entity, deleted ones included, ordered by id.
    pub async fn dump(&self, entity: &str) -> Vec<Entity> {
        self.state
            .lock()
            .await
            .tables
            .get(entity)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn migrate(&self, set: &MigrationSet) -> StorageResult<MigrationReport> {
        let mut state = self.state.lock().await;
        let mut report = MigrationReport::default();

        for schema in &set.schemas {
            let shape = serde_json::to_string(schema.fields())
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            if state.track(&format!("entity:{}", schema.name()), 0, compute_checksum(&shape), &mut report) {
                debug!(entity = schema.name(), "Creating table");
            }
            state.tables.entry(schema.name().to_string()).or_default();
        }

        for script in &set.scripts {
            // SQL is not interpreted here; only tracking applies.
            state.track(&script.owner, script.index, script.checksum(), &mut report);
        }

        if !report.applied.is_empty() {
            info!(applied = report.applied.len(), "🗄️  Migrations applied");
        }
        Ok(report)
    }

    async fn load_cursor(&self, stream_id: &str) -> StorageResult<Option<ProcessorCursor>> {
        Ok(self.state.lock().await.cursors.get(stream_id).cloned())
    }

    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn select(&self, schema: &EntitySchema, plan: &QueryPlan) -> StorageResult<Vec<Entity>> {
        self.state.lock().await.select(schema, plan)
    }

    async fn count(&self, schema: &EntitySchema, filter: &FilterPlan) -> StorageResult<u64> {
        self.state.lock().await.count(schema, filter)
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn select(
        &mut self,
        schema: &EntitySchema,
        plan: &QueryPlan,
    ) -> StorageResult<Vec<Entity>> {
        self.working.select(schema, plan)
    }

    async fn count(&mut self, schema: &EntitySchema, filter: &FilterPlan) -> StorageResult<u64> {
        self.working.count(schema, filter)
    }

    async fn insert(&mut self, schema: &EntitySchema, entities: &[Entity]) -> StorageResult<()> {
        let table = self.working.table_mut(schema)?;
        if let Some(dup) = entities.iter().find(|e| table.contains_key(e.id())) {
            return Err(StorageError::ConstraintViolation(format!(
                "duplicate id {} for entity {}",
                dup.id(),
                schema.name()
            )));
        }
        for entity in entities {
            table.insert(entity.id().to_string(), entity.clone());
        }
        Ok(())
    }

    async fn update(&mut self, schema: &EntitySchema, entity: &Entity) -> StorageResult<()> {
        let table = self.working.table_mut(schema)?;
        match table.get_mut(entity.id()) {
            Some(row) => {
                *row = entity.clone();
                Ok(())
            }
            None => Err(StorageError::QueryError(format!(
                "no {} row with id {}",
                schema.name(),
                entity.id()
            ))),
        }
    }

    async fn save_cursor(&mut self, cursor: &ProcessorCursor) -> StorageResult<()> {
        self.working
            .cursors
            .insert(cursor.stream_id.clone(), cursor.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
