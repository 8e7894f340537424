//! Process-wide schema registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{DomainError, DomainResult};

use super::{EntitySchema, storage_name};

/// Registry of entity schemas, keyed by entity name.
///
/// Populated during startup (`&mut self`), then wrapped in an `Arc` and only
/// read. Iteration follows registration order so generated migrations are
/// deterministic.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<EntitySchema>>,
    order: Vec<String>,
    /// Table name to the entity that owns it.
    tables: HashMap<String, String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema.
    ///
    /// Registering an identical schema twice is a no-op; registering a
    /// different shape under an existing name, or a name stored under the
    /// same table as another entity, fails with `SchemaConflict`.
    pub fn register(&mut self, schema: EntitySchema) -> DomainResult<()> {
        if let Some(existing) = self.schemas.get(schema.name()) {
            return existing
                .check_compatible(&schema)
                .map_err(|reason| DomainError::SchemaConflict {
                    entity: schema.name().to_string(),
                    reason,
                });
        }

        let table = storage_name(schema.name());
        if let Some(owner) = self.tables.get(&table) {
            return Err(DomainError::SchemaConflict {
                entity: schema.name().to_string(),
                reason: format!("table {table} already belongs to {owner}"),
            });
        }
        self.tables.insert(table, schema.name().to_string());

        debug!(entity = schema.name(), fields = schema.fields().len(), "Registering schema");
        self.order.push(schema.name().to_string());
        self.schemas
            .insert(schema.name().to_string(), Arc::new(schema));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> DomainResult<Arc<EntitySchema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::UnknownEntity(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Schemas in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.order.iter().filter_map(|name| self.schemas.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
