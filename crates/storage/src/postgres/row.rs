//! Shared helper functions for PostgreSQL row conversion.

use std::collections::BTreeMap;

use num_bigint::BigInt;
use sqlx::Row;
use sqlx::postgres::PgRow;

use cadence_core::entity::Entity;
use cadence_core::error::{StorageError, StorageResult};
use cadence_core::schema::{EntitySchema, SemanticType};
use cadence_core::value::FieldValue;

use super::ddl::column_name;

/// Decode a row selected with [`super::sql::select`] into an entity.
pub fn decode_entity(schema: &EntitySchema, row: &PgRow) -> StorageResult<Entity> {
    let mut values = BTreeMap::new();
    for field in schema.fields() {
        let label = format!("{}.{}", schema.name(), field.name);
        let value = decode_column(row, &column_name(&field.name), field.semantic_type, &label)?;
        values.insert(field.name.clone(), value);
    }
    Ok(Entity::new(schema.name(), values))
}

fn decode_column(
    row: &PgRow,
    column: &str,
    semantic_type: SemanticType,
    label: &str,
) -> StorageResult<FieldValue> {
    let err = |e: sqlx::Error| StorageError::SerializationError(format!("{label}: {e}"));

    let value = match semantic_type {
        SemanticType::Identifier => row
            .try_get::<Option<String>, _>(column)
            .map_err(err)?
            .map(FieldValue::Identifier),
        SemanticType::String => row
            .try_get::<Option<String>, _>(column)
            .map_err(err)?
            .map(FieldValue::String),
        SemanticType::Enum => row
            .try_get::<Option<String>, _>(column)
            .map_err(err)?
            .map(FieldValue::Enum),
        SemanticType::Reference => row
            .try_get::<Option<String>, _>(column)
            .map_err(err)?
            .map(FieldValue::Reference),
        SemanticType::Integer => row
            .try_get::<Option<i64>, _>(column)
            .map_err(err)?
            .map(FieldValue::Integer),
        SemanticType::BigInteger => row
            .try_get::<Option<String>, _>(column)
            .map_err(err)?
            .map(|text| parse_numeric(&text, label))
            .transpose()?
            .map(FieldValue::BigInteger),
        SemanticType::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(column)
            .map_err(err)?
            .map(FieldValue::Bytes),
        SemanticType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(column)
            .map_err(err)?
            .map(FieldValue::Timestamp),
        SemanticType::Boolean => row
            .try_get::<Option<bool>, _>(column)
            .map_err(err)?
            .map(FieldValue::Boolean),
    };

    Ok(value.unwrap_or(FieldValue::Null))
}

/// Parse a `NUMERIC(78, 0)` column read back as text.
pub fn parse_numeric(text: &str, field_name: &str) -> StorageResult<BigInt> {
    text.parse::<BigInt>().map_err(|e| {
        StorageError::SerializationError(format!(
            "{field_name} is not an integer ({text:?}): {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_beyond_u128() {
        let text = "340282366920938463463374607431768211456";
        let value = parse_numeric(text, "Transfer.value").unwrap();
        assert_eq!(value.to_string(), text);
    }

    #[test]
    fn test_error_includes_field_name() {
        let err = parse_numeric("12.5", "Transfer.value").unwrap_err().to_string();
        assert!(err.contains("Transfer.value"));
        assert!(err.contains("12.5"));
    }
}
