//! Table DDL and identifier mapping for entity schemas.
//!
//! Entity names map to snake_case tables (`HistoricalBalance` becomes
//! `historical_balance`) and lowerCamelCase fields to snake_case columns.
//! Identifiers are always double-quoted, so reserved words such as `from`
//! are valid column names.

use cadence_core::schema::{EntitySchema, FieldDescriptor, SemanticType, audit, storage_name};

/// Quoted table name of an entity.
pub fn table_name(schema: &EntitySchema) -> String {
    quote(&storage_name(schema.name()))
}

/// Unquoted column name of a field.
pub fn column_name(field: &str) -> String {
    storage_name(field)
}

/// Quoted column name of a field.
pub fn column(field: &str) -> String {
    quote(&column_name(field))
}

pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Postgres column type of a semantic type.
pub fn column_type(semantic_type: SemanticType) -> &'static str {
    match semantic_type {
        SemanticType::Identifier
        | SemanticType::String
        | SemanticType::Enum
        | SemanticType::Reference => "TEXT",
        SemanticType::Integer => "BIGINT",
        SemanticType::BigInteger => "NUMERIC(78, 0)",
        SemanticType::Bytes => "BYTEA",
        SemanticType::Timestamp => "TIMESTAMPTZ",
        SemanticType::Boolean => "BOOLEAN",
    }
}

/// `CREATE TABLE IF NOT EXISTS` script for an entity, with its indexes.
///
/// References are plain text columns: a handler may write a row before the
/// row it points to exists.
pub fn create_table_sql(schema: &EntitySchema) -> String {
    let table = table_name(schema);
    let bare = storage_name(schema.name());

    let columns = schema
        .fields()
        .iter()
        .map(column_definition)
        .collect::<Vec<_>>()
        .join(",\n    ");

    let mut sql = format!("CREATE TABLE IF NOT EXISTS {table} (\n    {columns}\n);\n");

    sql.push_str(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {table} ({});\n",
        quote(&format!("{bare}_deleted_at_idx")),
        column(audit::DELETED_AT),
    ));
    for field in schema
        .domain_fields()
        .iter()
        .filter(|f| f.semantic_type == SemanticType::Reference)
    {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({});\n",
            quote(&format!("{bare}_{}_idx", column_name(&field.name))),
            column(&field.name),
        ));
    }

    sql
}

fn column_definition(field: &FieldDescriptor) -> String {
    let mut def = format!(
        "{} {}",
        column(&field.name),
        column_type(field.semantic_type)
    );

    if field.name == audit::ID {
        def.push_str(" PRIMARY KEY");
    } else if !field.nullable {
        def.push_str(" NOT NULL");
    }

    if field.semantic_type == SemanticType::Enum {
        let variants = field
            .variants
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        def.push_str(&format!(" CHECK ({} IN ({variants}))", column(&field.name)));
    }

    def
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> EntitySchema {
        EntitySchema::new(
            "Transfer",
            vec![
                FieldDescriptor::new("from", SemanticType::Bytes),
                FieldDescriptor::new("to", SemanticType::Bytes),
                FieldDescriptor::new("value", SemanticType::BigInteger),
                FieldDescriptor::new("comment", SemanticType::String).nullable(),
                FieldDescriptor::new("block", SemanticType::Integer),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_identifier_mapping() {
        let schema = EntitySchema::new("HistoricalBalance", vec![]).unwrap();
        assert_eq!(table_name(&schema), "\"historical_balance\"");
        assert_eq!(column_name("createdById"), "created_by_id");
        assert_eq!(column("deletedAt"), "\"deleted_at\"");
        assert_eq!(column("from"), "\"from\"");
    }

    #[test]
    fn test_create_table_columns() {
        let sql = create_table_sql(&transfer());

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"transfer\" ("));
        assert!(sql.contains("\"id\" TEXT PRIMARY KEY"));
        assert!(sql.contains("\"created_at\" TIMESTAMPTZ NOT NULL"));
        assert!(sql.contains("\"deleted_at\" TIMESTAMPTZ,"));
        assert!(sql.contains("\"deleted_by_id\" TEXT,"));
        assert!(sql.contains("\"from\" BYTEA NOT NULL"));
        assert!(sql.contains("\"value\" NUMERIC(78, 0) NOT NULL"));
        assert!(sql.contains("\"comment\" TEXT,"));
        assert!(sql.contains("\"block\" BIGINT NOT NULL\n);"));
        assert!(sql.contains("\"transfer_deleted_at_idx\""));
    }

    #[test]
    fn test_big_integer_column_holds_every_accepted_value() {
        let precision = format!("NUMERIC({}, 0)", cadence_core::value::BIG_INTEGER_MAX_DIGITS);
        assert_eq!(column_type(SemanticType::BigInteger), precision);
    }

    #[test]
    fn test_enum_and_reference_columns() {
        let schema = EntitySchema::new(
            "Work",
            vec![
                FieldDescriptor::new("status", SemanticType::Enum)
                    .with_variants(["Draft", "Owner's"]),
                FieldDescriptor::new("creator", SemanticType::Reference).references("Account"),
            ],
        )
        .unwrap();

        let sql = create_table_sql(&schema);
        assert!(sql.contains("\"status\" TEXT NOT NULL CHECK (\"status\" IN ('Draft', 'Owner''s'))"));
        assert!(sql.contains("\"creator\" TEXT NOT NULL"));
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS \"work_creator_idx\" ON \"work\" (\"creator\");"));
    }

    #[test]
    fn test_ddl_is_stable() {
        assert_eq!(create_table_sql(&transfer()), create_table_sql(&transfer()));
    }
}
