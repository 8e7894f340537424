//! Per-block handle given to mapping handlers.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::models::Block;
use crate::mutation::{MutationShaper, WriteStamp};
use crate::ports::UnitOfWork;
use crate::query::{OrderSpec, PageArgs, QueryEngine, WhereClause};
use crate::schema::{EntitySchema, SchemaRegistry};

/// Reads and writes of one block, all inside that block's unit of work.
///
/// Every write is validated by the [`MutationShaper`] before it reaches the
/// store, and every read goes through the [`QueryEngine`], so handlers see
/// exactly the semantics external queries see, including their own
/// uncommitted writes.
pub struct MappingContext<'a> {
    schemas: &'a SchemaRegistry,
    engine: QueryEngine,
    shaper: MutationShaper,
    uow: &'a mut dyn UnitOfWork,
    block: &'a Block,
    stamp: WriteStamp,
    writes: BTreeMap<String, u64>,
}

impl<'a> MappingContext<'a> {
    pub fn new(
        schemas: &'a SchemaRegistry,
        engine: QueryEngine,
        uow: &'a mut dyn UnitOfWork,
        block: &'a Block,
        stamp: WriteStamp,
    ) -> Self {
        Self {
            schemas,
            engine,
            shaper: MutationShaper,
            uow,
            block,
            stamp,
            writes: BTreeMap::new(),
        }
    }

    /// Block being processed.
    pub fn block(&self) -> &Block {
        self.block
    }

    /// Actor and time stamped on every write of this block.
    pub fn stamp(&self) -> &WriteStamp {
        &self.stamp
    }

    /// Rows written so far, per entity.
    pub fn writes(&self) -> &BTreeMap<String, u64> {
        &self.writes
    }

    pub(crate) fn into_writes(self) -> BTreeMap<String, u64> {
        self.writes
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn query(
        &mut self,
        entity: &str,
        filter: &WhereClause,
        order: &OrderSpec,
        page: &PageArgs,
    ) -> DomainResult<Vec<Entity>> {
        let schema = self.schemas.lookup(entity)?;
        let plan = self.engine.plan(&schema, filter, order, page)?;
        Ok(self.uow.select(&schema, &plan).await?)
    }

    /// Live entity by id.
    pub async fn find_by_id(&mut self, entity: &str, id: &str) -> DomainResult<Option<Entity>> {
        let schema = self.schemas.lookup(entity)?;
        self.fetch(&schema, id, false).await
    }

    /// Live entity by id, decoded into a handler model.
    pub async fn get<T: DeserializeOwned>(&mut self, entity: &str, id: &str) -> DomainResult<Option<T>> {
        self.find_by_id(entity, id)
            .await?
            .map(|e| e.decode())
            .transpose()
    }

    pub async fn count(&mut self, entity: &str, filter: &WhereClause) -> DomainResult<u64> {
        let schema = self.schemas.lookup(entity)?;
        let plan = crate::query::FilterPlan::compile(&schema, filter)?;
        Ok(self.uow.count(&schema, &plan).await?)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Create an entity with a generated id.
    pub async fn create<T>(&mut self, entity: &str, payload: &T) -> DomainResult<Entity>
    where
        T: Serialize + Sync + ?Sized,
    {
        let schema = self.schemas.lookup(entity)?;
        let payload = to_payload(&schema, payload)?;
        let created = self.shaper.create(&schema, &payload, &self.stamp)?;
        self.uow.insert(&schema, std::slice::from_ref(&created)).await?;
        self.count_write(&schema, 1);
        Ok(created)
    }

    /// Create several entities; one invalid payload writes nothing.
    pub async fn create_many<T>(&mut self, entity: &str, payloads: &[T]) -> DomainResult<Vec<Entity>>
    where
        T: Serialize + Sync,
    {
        let schema = self.schemas.lookup(entity)?;
        let payloads = payloads
            .iter()
            .map(|p| to_payload(&schema, p))
            .collect::<DomainResult<Vec<_>>>()?;
        let created = self.shaper.create_many(&schema, &payloads, &self.stamp)?;
        if !created.is_empty() {
            self.uow.insert(&schema, &created).await?;
            self.count_write(&schema, created.len() as u64);
        }
        Ok(created)
    }

    /// Partial update of a live entity.
    pub async fn update<T>(&mut self, entity: &str, id: &str, payload: &T) -> DomainResult<Entity>
    where
        T: Serialize + Sync + ?Sized,
    {
        let schema = self.schemas.lookup(entity)?;
        let payload = to_payload(&schema, payload)?;
        let existing = self
            .fetch(&schema, id, false)
            .await?
            .ok_or_else(|| not_found(&schema, id))?;
        let updated = self.shaper.update(&schema, &existing, &payload, &self.stamp)?;
        self.uow.update(&schema, &updated).await?;
        self.count_write(&schema, 1);
        Ok(updated)
    }

    /// Create or merge under a caller-chosen id.
    ///
    /// Replaying a block through an upserting handler converges to the same
    /// rows, which is what makes at-least-once processing safe.
    pub async fn upsert<T>(&mut self, entity: &str, id: &str, payload: &T) -> DomainResult<Entity>
    where
        T: Serialize + Sync + ?Sized,
    {
        let schema = self.schemas.lookup(entity)?;
        let payload = to_payload(&schema, payload)?;
        let existing = self.fetch(&schema, id, true).await?;
        let shaped = self
            .shaper
            .upsert(&schema, id, existing.as_ref(), &payload, &self.stamp)?;
        match existing {
            Some(_) => self.uow.update(&schema, &shaped).await?,
            None => self.uow.insert(&schema, std::slice::from_ref(&shaped)).await?,
        }
        self.count_write(&schema, 1);
        Ok(shaped)
    }

    /// Soft delete a live entity.
    pub async fn delete(&mut self, entity: &str, id: &str) -> DomainResult<Entity> {
        let schema = self.schemas.lookup(entity)?;
        let existing = self
            .fetch(&schema, id, false)
            .await?
            .ok_or_else(|| not_found(&schema, id))?;
        let deleted = self.shaper.delete(&schema, &existing, &self.stamp)?;
        self.uow.update(&schema, &deleted).await?;
        self.count_write(&schema, 1);
        Ok(deleted)
    }

    async fn fetch(
        &mut self,
        schema: &EntitySchema,
        id: &str,
        include_deleted: bool,
    ) -> DomainResult<Option<Entity>> {
        let plan = self.engine.plan_by_id(schema, id, include_deleted);
        Ok(self.uow.select(schema, &plan).await?.into_iter().next())
    }

    fn count_write(&mut self, schema: &EntitySchema, n: u64) {
        trace!(entity = schema.name(), rows = n, "Entity write");
        *self.writes.entry(schema.name().to_string()).or_default() += n;
    }
}

fn to_payload<T: Serialize + ?Sized>(schema: &EntitySchema, payload: &T) -> DomainResult<Value> {
    serde_json::to_value(payload).map_err(|e| {
        DomainError::DecodingError(format!("{} payload: {}", schema.name(), e))
    })
}

fn not_found(schema: &EntitySchema, id: &str) -> DomainError {
    DomainError::NotFound {
        entity: schema.name().to_string(),
        id: id.to_string(),
    }
}
