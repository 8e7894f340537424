//! Where-clause input and its compiled predicate form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::schema::{EntitySchema, FieldDescriptor, Operator, SemanticType, audit};
use crate::value::FieldValue;

/// Raw where-input: `fieldName_operator -> literal`.
///
/// Entries are AND-ed. A `BTreeMap` keeps compilation order (and therefore
/// the rendered SQL) independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhereClause(BTreeMap<String, Value>);

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert: `WhereClause::new().with("block_eq", 42)`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for WhereClause {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Single(FieldValue),
    List(Vec<FieldValue>),
}

/// One validated, typed constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub semantic_type: SemanticType,
    pub op: Operator,
    pub operand: Operand,
}

/// Compiled filter: conjunctive predicates plus the soft-delete toggle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterPlan {
    pub predicates: Vec<Predicate>,
    pub include_deleted: bool,
}

impl FilterPlan {
    /// Compile a where-clause against a schema.
    pub fn compile(schema: &EntitySchema, clause: &WhereClause) -> DomainResult<Self> {
        let mut plan = FilterPlan::default();

        for (key, raw) in clause.iter() {
            let (field, op) = resolve_key(schema, key)?;

            match op {
                Operator::All => {
                    plan.include_deleted = raw.as_bool().ok_or_else(|| {
                        DomainError::TypeMismatch {
                            field: key.clone(),
                            expected: SemanticType::Boolean,
                            value: raw.to_string(),
                        }
                    })?;
                }
                Operator::In => {
                    let items = raw.as_array().ok_or_else(|| DomainError::TypeMismatch {
                        field: key.clone(),
                        expected: field.semantic_type,
                        value: raw.to_string(),
                    })?;
                    let values = items
                        .iter()
                        .map(|item| FieldValue::coerce(field, item))
                        .collect::<DomainResult<Vec<_>>>()?;
                    plan.predicates.push(Predicate {
                        field: field.name.clone(),
                        semantic_type: field.semantic_type,
                        op,
                        operand: Operand::List(values),
                    });
                }
                _ => {
                    let value = FieldValue::coerce(field, raw)?;
                    plan.predicates.push(Predicate {
                        field: field.name.clone(),
                        semantic_type: field.semantic_type,
                        op,
                        operand: Operand::Single(value),
                    });
                }
            }
        }

        Ok(plan)
    }

    /// Filter matching exactly one id.
    pub fn by_id(id: &str, include_deleted: bool) -> Self {
        Self {
            predicates: vec![Predicate {
                field: audit::ID.to_string(),
                semantic_type: SemanticType::Identifier,
                op: Operator::Eq,
                operand: Operand::Single(FieldValue::Identifier(id.to_string())),
            }],
            include_deleted,
        }
    }
}

/// Split `fieldName_operator` and check it against the schema.
fn resolve_key<'s>(
    schema: &'s EntitySchema,
    key: &str,
) -> DomainResult<(&'s FieldDescriptor, Operator)> {
    let Some((field_name, suffix)) = key.rsplit_once('_') else {
        return Err(match schema.field(key) {
            Some(_) => DomainError::InvalidOperator {
                entity: schema.name().to_string(),
                field: key.to_string(),
                operator: String::new(),
            },
            None => DomainError::UnknownField {
                entity: schema.name().to_string(),
                field: key.to_string(),
            },
        });
    };

    let field = schema
        .field(field_name)
        .ok_or_else(|| DomainError::UnknownField {
            entity: schema.name().to_string(),
            field: field_name.to_string(),
        })?;

    let invalid = || DomainError::InvalidOperator {
        entity: schema.name().to_string(),
        field: field_name.to_string(),
        operator: suffix.to_string(),
    };

    let op = Operator::from_suffix(suffix).ok_or_else(invalid)?;
    if !field.supports(op) {
        return Err(invalid());
    }
    Ok((field, op))
}
