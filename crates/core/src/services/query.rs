//! Read service over committed entities.

use std::sync::Arc;

use tracing::instrument;

use crate::entity::Entity;
use crate::error::DomainResult;
use crate::ports::EntityStore;
use crate::query::{FilterPlan, OrderSpec, PageArgs, QueryEngine, WhereClause};
use crate::schema::SchemaRegistry;

/// Entry point for external reads (`query`, `find_by_id`, `count`).
///
/// Only committed data is visible; handlers read through their
/// [`MappingContext`](crate::services::MappingContext) instead.
pub struct EntityQueries<S: EntityStore> {
    store: Arc<S>,
    schemas: Arc<SchemaRegistry>,
    engine: QueryEngine,
}

impl<S: EntityStore> EntityQueries<S> {
    pub fn new(store: Arc<S>, schemas: Arc<SchemaRegistry>, engine: QueryEngine) -> Self {
        Self {
            store,
            schemas,
            engine,
        }
    }

    #[instrument(skip(self, filter, order, page))]
    pub async fn query(
        &self,
        entity: &str,
        filter: &WhereClause,
        order: &OrderSpec,
        page: &PageArgs,
    ) -> DomainResult<Vec<Entity>> {
        let schema = self.schemas.lookup(entity)?;
        let plan = self.engine.plan(&schema, filter, order, page)?;
        Ok(self.store.select(&schema, &plan).await?)
    }

    pub async fn find_by_id(&self, entity: &str, id: &str) -> DomainResult<Option<Entity>> {
        let schema = self.schemas.lookup(entity)?;
        let plan = self.engine.plan_by_id(&schema, id, false);
        Ok(self.store.select(&schema, &plan).await?.into_iter().next())
    }

    pub async fn count(&self, entity: &str, filter: &WhereClause) -> DomainResult<u64> {
        let schema = self.schemas.lookup(entity)?;
        let plan = FilterPlan::compile(&schema, filter)?;
        Ok(self.store.count(&schema, &plan).await?)
    }
}
