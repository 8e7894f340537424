//! Entity instances as seen by the query engine and handlers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::{DomainError, DomainResult};
use crate::schema::audit;
use crate::value::FieldValue;

/// One persisted record: audit stamps plus domain fields, all as
/// [`FieldValue`]s keyed by field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    entity: String,
    values: BTreeMap<String, FieldValue>,
}

impl Entity {
    pub fn new(entity: impl Into<String>, values: BTreeMap<String, FieldValue>) -> Self {
        Self {
            entity: entity.into(),
            values,
        }
    }

    /// Name of the schema this record belongs to.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> &str {
        self.values
            .get(audit::ID)
            .and_then(FieldValue::as_str)
            .unwrap_or_default()
    }

    /// Value of a field; absent fields read as [`FieldValue::Null`].
    pub fn get(&self, field: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.get(audit::DELETED_AT).as_timestamp()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    pub(crate) fn set(&mut self, field: &str, value: FieldValue) {
        self.values.insert(field.to_string(), value);
    }

    /// JSON object of every field.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Decode into a handler-side model.
    pub fn decode<T: DeserializeOwned>(&self) -> DomainResult<T> {
        serde_json::from_value(self.to_json()).map_err(|e| {
            DomainError::DecodingError(format!("{} {}: {}", self.entity, self.id(), e))
        })
    }
}
