//! Create/update payload shaping.
//!
//! The shaper turns caller payloads (JSON objects keyed by field name) into
//! complete [`Entity`] records. It performs no I/O: lookups of existing rows
//! happen in the caller, which hands them in. Every check runs before the
//! store is touched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::schema::{EntitySchema, audit};
use crate::value::FieldValue;

/// Who writes, and when.
///
/// The runner captures one stamp per block so every write of that block
/// carries the same time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStamp {
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl WriteStamp {
    pub fn new(actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            at,
        }
    }
}

/// Validates payloads against a schema and stamps audit fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationShaper;

impl MutationShaper {
    /// Shape a new entity with a fresh UUID id.
    pub fn create(
        &self,
        schema: &EntitySchema,
        payload: &Value,
        stamp: &WriteStamp,
    ) -> DomainResult<Entity> {
        self.create_with_id(schema, Uuid::new_v4().to_string(), payload, stamp)
    }

    /// Shape every payload; fails on the first invalid one without
    /// returning any entity.
    pub fn create_many(
        &self,
        schema: &EntitySchema,
        payloads: &[Value],
        stamp: &WriteStamp,
    ) -> DomainResult<Vec<Entity>> {
        payloads
            .iter()
            .map(|payload| self.create(schema, payload, stamp))
            .collect()
    }

    /// Apply a partial payload onto an existing live entity.
    pub fn update(
        &self,
        schema: &EntitySchema,
        existing: &Entity,
        payload: &Value,
        stamp: &WriteStamp,
    ) -> DomainResult<Entity> {
        if existing.is_deleted() {
            return Err(DomainError::NotFound {
                entity: schema.name().to_string(),
                id: existing.id().to_string(),
            });
        }
        let changes = self.validate(schema, payload)?;

        let mut entity = existing.clone();
        for (field, value) in changes {
            entity.set(&field, value);
        }
        stamp_updated(&mut entity, stamp);
        Ok(entity)
    }

    /// Insert-or-replace keyed by a caller-chosen id.
    ///
    /// With no existing row this is a create (all required fields needed);
    /// otherwise the payload is merged like an update and a soft-deleted row
    /// is revived.
    pub fn upsert(
        &self,
        schema: &EntitySchema,
        id: &str,
        existing: Option<&Entity>,
        payload: &Value,
        stamp: &WriteStamp,
    ) -> DomainResult<Entity> {
        let Some(existing) = existing else {
            return self.create_with_id(schema, id.to_string(), payload, stamp);
        };

        let changes = self.validate(schema, payload)?;
        let mut entity = existing.clone();
        for (field, value) in changes {
            entity.set(&field, value);
        }
        entity.set(audit::DELETED_AT, FieldValue::Null);
        entity.set(audit::DELETED_BY_ID, FieldValue::Null);
        stamp_updated(&mut entity, stamp);
        Ok(entity)
    }

    /// Soft delete: stamp `deletedAt`/`deletedById` on a live entity.
    pub fn delete(
        &self,
        schema: &EntitySchema,
        existing: &Entity,
        stamp: &WriteStamp,
    ) -> DomainResult<Entity> {
        if existing.is_deleted() {
            return Err(DomainError::NotFound {
                entity: schema.name().to_string(),
                id: existing.id().to_string(),
            });
        }
        let mut entity = existing.clone();
        entity.set(audit::DELETED_AT, FieldValue::Timestamp(stamp.at));
        entity.set(audit::DELETED_BY_ID, FieldValue::Identifier(stamp.actor.clone()));
        stamp_updated(&mut entity, stamp);
        Ok(entity)
    }

    fn create_with_id(
        &self,
        schema: &EntitySchema,
        id: String,
        payload: &Value,
        stamp: &WriteStamp,
    ) -> DomainResult<Entity> {
        if id.is_empty() {
            return Err(DomainError::MissingField {
                entity: schema.name().to_string(),
                field: audit::ID.to_string(),
            });
        }

        let mut values = self.validate(schema, payload)?;
        for field in schema.domain_fields() {
            if values.contains_key(&field.name) {
                continue;
            }
            if !field.nullable {
                return Err(DomainError::MissingField {
                    entity: schema.name().to_string(),
                    field: field.name.clone(),
                });
            }
            values.insert(field.name.clone(), FieldValue::Null);
        }

        values.insert(audit::ID.to_string(), FieldValue::Identifier(id));
        values.insert(audit::CREATED_AT.to_string(), FieldValue::Timestamp(stamp.at));
        values.insert(
            audit::CREATED_BY_ID.to_string(),
            FieldValue::Identifier(stamp.actor.clone()),
        );
        values.insert(audit::DELETED_AT.to_string(), FieldValue::Null);
        values.insert(audit::DELETED_BY_ID.to_string(), FieldValue::Null);

        let mut entity = Entity::new(schema.name(), values);
        stamp_updated(&mut entity, stamp);
        Ok(entity)
    }

    /// Type-check every key of a payload object.
    fn validate(
        &self,
        schema: &EntitySchema,
        payload: &Value,
    ) -> DomainResult<BTreeMap<String, FieldValue>> {
        let object = as_object(schema, payload)?;
        let mut values = BTreeMap::new();

        for (key, raw) in object {
            if EntitySchema::is_audit_field(key) {
                return Err(DomainError::ReadOnlyField {
                    entity: schema.name().to_string(),
                    field: key.clone(),
                });
            }
            let field = schema.field(key).ok_or_else(|| DomainError::UnknownField {
                entity: schema.name().to_string(),
                field: key.clone(),
            })?;
            values.insert(key.clone(), FieldValue::coerce_nullable(field, raw)?);
        }

        Ok(values)
    }
}

fn as_object<'a>(schema: &EntitySchema, payload: &'a Value) -> DomainResult<&'a Map<String, Value>> {
    payload.as_object().ok_or_else(|| {
        DomainError::DecodingError(format!(
            "{} payload must be an object, got {}",
            schema.name(),
            payload
        ))
    })
}

fn stamp_updated(entity: &mut Entity, stamp: &WriteStamp) {
    entity.set(audit::UPDATED_AT, FieldValue::Timestamp(stamp.at));
    entity.set(
        audit::UPDATED_BY_ID,
        FieldValue::Identifier(stamp.actor.clone()),
    );
}
