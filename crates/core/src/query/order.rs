//! Ordering arguments.

use serde::{Deserialize, Deserializer};

use crate::error::{DomainError, DomainResult};
use crate::schema::{EntitySchema, audit};

/// Ordering direction for sorted queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

impl OrderDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One `(field, direction)` term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse the `field_ASC` / `field_DESC` form.
    pub fn parse(token: &str) -> DomainResult<Self> {
        let invalid = || DomainError::InvalidOrder(token.to_string());
        let (field, dir) = token.rsplit_once('_').ok_or_else(invalid)?;
        if field.is_empty() {
            return Err(invalid());
        }
        let direction = match dir {
            "ASC" => OrderDirection::Asc,
            "DESC" => OrderDirection::Desc,
            _ => return Err(invalid()),
        };
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }
}

impl std::fmt::Display for OrderBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.field, self.direction.as_sql())
    }
}

/// Ordered sequence of sort terms; empty means "by id".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSpec(Vec<OrderBy>);

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, term: OrderBy) -> Self {
        self.0.push(term);
        self
    }

    /// Parse a list of `field_DIR` tokens.
    pub fn parse<I, S>(tokens: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| OrderBy::parse(t.as_ref()))
            .collect::<DomainResult<Vec<_>>>()
            .map(Self)
    }

    pub fn terms(&self) -> &[OrderBy] {
        &self.0
    }

    /// Validate against a schema and append the `id ASC` tie-break.
    ///
    /// A caller-supplied `id` term ends the sequence: anything after it could
    /// never influence the order.
    pub fn resolve(&self, schema: &EntitySchema) -> DomainResult<Vec<OrderBy>> {
        let mut resolved = Vec::with_capacity(self.0.len() + 1);
        for term in &self.0 {
            if schema.field(&term.field).is_none() {
                return Err(DomainError::UnknownField {
                    entity: schema.name().to_string(),
                    field: term.field.clone(),
                });
            }
            if resolved.iter().any(|t: &OrderBy| t.field == term.field) {
                continue;
            }
            resolved.push(term.clone());
            if term.field == audit::ID {
                return Ok(resolved);
            }
        }
        resolved.push(OrderBy::asc(audit::ID));
        Ok(resolved)
    }
}

impl FromIterator<OrderBy> for OrderSpec {
    fn from_iter<I: IntoIterator<Item = OrderBy>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for OrderSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tokens = Vec::<String>::deserialize(deserializer)?;
        OrderSpec::parse(tokens).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, SemanticType};

    fn schema() -> EntitySchema {
        EntitySchema::new(
            "Transfer",
            vec![
                FieldDescriptor::new("value", SemanticType::BigInteger),
                FieldDescriptor::new("block", SemanticType::Integer),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(OrderBy::parse("value_DESC").unwrap(), OrderBy::desc("value"));
        assert_eq!(OrderBy::parse("createdAt_ASC").unwrap(), OrderBy::asc("createdAt"));
        assert!(OrderBy::parse("value_desc").is_err());
        assert!(OrderBy::parse("value").is_err());
        assert!(OrderBy::parse("_ASC").is_err());
    }

    #[test]
    fn test_tie_break_appended() {
        let spec = OrderSpec::parse(["value_DESC"]).unwrap();
        let resolved = spec.resolve(&schema()).unwrap();
        assert_eq!(resolved, vec![OrderBy::desc("value"), OrderBy::asc("id")]);

        let resolved = OrderSpec::new().resolve(&schema()).unwrap();
        assert_eq!(resolved, vec![OrderBy::asc("id")]);
    }

    #[test]
    fn test_explicit_id_term_is_final() {
        let spec = OrderSpec::parse(["id_DESC", "block_ASC"]).unwrap();
        let resolved = spec.resolve(&schema()).unwrap();
        assert_eq!(resolved, vec![OrderBy::desc("id")]);
    }

    #[test]
    fn test_unknown_order_field() {
        let spec = OrderSpec::parse(["amount_ASC"]).unwrap();
        assert!(matches!(
            spec.resolve(&schema()),
            Err(DomainError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_deserialize_from_strings() {
        let spec: OrderSpec = serde_json::from_str(r#"["block_DESC","value_ASC"]"#).unwrap();
        assert_eq!(spec.terms().len(), 2);
        assert!(serde_json::from_str::<OrderSpec>(r#"["block_UP"]"#).is_err());
    }
}
