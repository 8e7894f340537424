//! Entity schema descriptors.
//!
//! An [`EntitySchema`] is the only thing the query engine and mutation
//! shaper know about an entity kind. Schemas are built once at startup,
//! registered in a [`SchemaRegistry`] and shared read-only afterwards.

mod field;
mod registry;

pub use field::{FieldDescriptor, Operator, SemanticType};
pub use registry::SchemaRegistry;

use std::collections::{HashMap, HashSet};

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Audit field names shared by every entity.
pub mod audit {
    pub const ID: &str = "id";
    pub const CREATED_AT: &str = "createdAt";
    pub const CREATED_BY_ID: &str = "createdById";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const UPDATED_BY_ID: &str = "updatedById";
    pub const DELETED_AT: &str = "deletedAt";
    pub const DELETED_BY_ID: &str = "deletedById";

    pub const ALL: [&str; 7] = [
        ID,
        CREATED_AT,
        CREATED_BY_ID,
        UPDATED_AT,
        UPDATED_BY_ID,
        DELETED_AT,
        DELETED_BY_ID,
    ];
}

/// snake_case name an entity or field is persisted under.
///
/// Distinct names must map to distinct storage names, so schemas are
/// checked against this mapping when built and registered.
pub fn storage_name(name: &str) -> String {
    name.to_case(Case::Snake)
}

fn audit_fields() -> Vec<FieldDescriptor> {
    use Operator::*;
    vec![
        FieldDescriptor::new(audit::ID, SemanticType::Identifier),
        FieldDescriptor::new(audit::CREATED_AT, SemanticType::Timestamp),
        FieldDescriptor::new(audit::CREATED_BY_ID, SemanticType::Identifier),
        FieldDescriptor::new(audit::UPDATED_AT, SemanticType::Timestamp),
        FieldDescriptor::new(audit::UPDATED_BY_ID, SemanticType::Identifier),
        FieldDescriptor::new(audit::DELETED_AT, SemanticType::Timestamp)
            .nullable()
            .with_operators(&[All, Eq, Gt, Gte, Lt, Lte]),
        FieldDescriptor::new(audit::DELETED_BY_ID, SemanticType::Identifier).nullable(),
    ]
}

/// Immutable description of one persisted entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl EntitySchema {
    /// Build a schema from its domain fields; audit fields are prepended.
    pub fn new(name: impl Into<String>, domain_fields: Vec<FieldDescriptor>) -> DomainResult<Self> {
        let name = name.into();
        let conflict = |reason: String| DomainError::SchemaConflict {
            entity: name.clone(),
            reason,
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(conflict(format!("invalid entity name {name:?}")));
        }

        let mut seen: HashSet<String> = audit::ALL.iter().map(|s| s.to_string()).collect();
        let mut columns: HashMap<String, String> = audit::ALL
            .iter()
            .map(|s| (storage_name(s), s.to_string()))
            .collect();
        let mut fields = audit_fields();

        for mut field in domain_fields {
            if field.name.is_empty()
                || !field.name.chars().all(|c| c.is_ascii_alphanumeric())
                || !field.name.starts_with(|c: char| c.is_ascii_lowercase())
            {
                return Err(conflict(format!(
                    "field name {:?} must be lowerCamelCase alphanumeric",
                    field.name
                )));
            }
            if !seen.insert(field.name.clone()) {
                return Err(conflict(format!("duplicate field {}", field.name)));
            }
            if let Some(other) = columns.insert(storage_name(&field.name), field.name.clone()) {
                return Err(conflict(format!(
                    "fields {other} and {} share column {}",
                    field.name,
                    storage_name(&field.name)
                )));
            }
            if field.supported_operators.is_empty() {
                field.supported_operators = field.semantic_type.default_operators().to_vec();
            }
            if let Some(op) = field
                .supported_operators
                .iter()
                .find(|op| !field.semantic_type.permits(**op) || **op == Operator::All)
            {
                return Err(conflict(format!(
                    "{} ({}) cannot support operator {op}",
                    field.name, field.semantic_type
                )));
            }
            match field.semantic_type {
                SemanticType::Enum if field.variants.is_empty() => {
                    return Err(conflict(format!("enum field {} has no variants", field.name)));
                }
                SemanticType::Reference if field.references.is_none() => {
                    return Err(conflict(format!(
                        "reference field {} has no target entity",
                        field.name
                    )));
                }
                _ => {}
            }
            fields.push(field);
        }

        Ok(Self { name, fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields, audit fields first, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn domain_fields(&self) -> &[FieldDescriptor] {
        &self.fields[audit::ALL.len()..]
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_audit_field(name: &str) -> bool {
        audit::ALL.contains(&name)
    }

    /// Check whether `other` may be registered under the same name.
    pub(crate) fn check_compatible(&self, other: &EntitySchema) -> Result<(), String> {
        if self.fields.len() != other.fields.len() {
            return Err(format!(
                "field count differs ({} vs {})",
                self.fields.len(),
                other.fields.len()
            ));
        }
        for (a, b) in self.fields.iter().zip(&other.fields) {
            if !a.same_shape(b) {
                return Err(format!("field {} differs from {}", a.name, b.name));
            }
        }
        Ok(())
    }
}

/// On-disk descriptor format (`*.entity.json`).
///
/// ```json
/// { "name": "Transfer",
///   "fields": [ { "name": "value", "type": "bigInteger" } ] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TryFrom<SchemaDescriptor> for EntitySchema {
    type Error = DomainError;

    fn try_from(descriptor: SchemaDescriptor) -> DomainResult<Self> {
        EntitySchema::new(descriptor.name, descriptor.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> EntitySchema {
        EntitySchema::new(
            "Transfer",
            vec![
                FieldDescriptor::new("from", SemanticType::Bytes),
                FieldDescriptor::new("value", SemanticType::BigInteger),
                FieldDescriptor::new("comment", SemanticType::String).nullable(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_audit_fields_prepended() {
        let schema = transfer();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(&names[..7], &audit::ALL);
        assert_eq!(schema.domain_fields().len(), 3);
        assert!(schema.field(audit::DELETED_AT).unwrap().supports(Operator::All));
    }

    #[test]
    fn test_rejects_audit_name_collision() {
        let err = EntitySchema::new(
            "Transfer",
            vec![FieldDescriptor::new("createdAt", SemanticType::Timestamp)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::SchemaConflict { .. }));
    }

    #[test]
    fn test_rejects_fields_sharing_a_column() {
        let err = EntitySchema::new(
            "Profile",
            vec![
                FieldDescriptor::new("userId", SemanticType::String),
                FieldDescriptor::new("userID", SemanticType::String),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("user_id"));

        let err = EntitySchema::new(
            "Profile",
            vec![FieldDescriptor::new("createdAT", SemanticType::Timestamp)],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::SchemaConflict { .. }));
    }

    #[test]
    fn test_storage_names() {
        assert_eq!(storage_name("HistoricalBalance"), "historical_balance");
        assert_eq!(storage_name("createdById"), "created_by_id");
        assert_eq!(storage_name("from"), "from");
    }

    #[test]
    fn test_rejects_illegal_operator() {
        let err = EntitySchema::new(
            "Account",
            vec![FieldDescriptor::new("balance", SemanticType::BigInteger)
                .with_operators(&[Operator::Contains])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("contains"));
    }

    #[test]
    fn test_enum_requires_variants() {
        let err = EntitySchema::new(
            "Proposal",
            vec![FieldDescriptor::new("status", SemanticType::Enum)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("no variants"));
    }

    #[test]
    fn test_descriptor_conversion_fills_default_operators() {
        let descriptor: SchemaDescriptor = serde_json::from_str(
            r#"{"name":"Transfer","fields":[{"name":"block","type":"integer"}]}"#,
        )
        .unwrap();
        let schema = EntitySchema::try_from(descriptor).unwrap();
        assert!(schema.field("block").unwrap().supports(Operator::Lte));
    }
}
