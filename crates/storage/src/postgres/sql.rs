//! Rendering of query plans and entity writes into parameterized SQL.
//!
//! Every literal goes through `push_bind`; only identifiers derived from a
//! validated [`EntitySchema`] are interpolated. Rendering follows the same
//! semantics as the in-memory evaluator:
//!
//! - nulls never satisfy a predicate
//! - text operators are case-sensitive (`position`, `left`, `right`)
//! - text orders byte-wise (`COLLATE "C"`), nulls sort last

use sqlx::{Postgres, QueryBuilder};

use cadence_core::entity::Entity;
use cadence_core::query::{FilterPlan, Operand, OrderBy, Predicate, QueryPlan};
use cadence_core::schema::{EntitySchema, Operator, SemanticType, audit};
use cadence_core::value::FieldValue;

use super::ddl::{column, table_name};

pub(crate) type Sql = QueryBuilder<'static, Postgres>;

// =============================================================================
// Reads
// =============================================================================

/// `SELECT` for a plan; big integers are read back as text.
pub fn select(schema: &EntitySchema, plan: &QueryPlan) -> Sql {
    let columns = schema
        .fields()
        .iter()
        .map(|f| {
            let col = column(&f.name);
            if f.semantic_type == SemanticType::BigInteger {
                format!("{col}::TEXT AS {col}")
            } else {
                col
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM {}", table_name(schema)));
    push_filter(&mut qb, &plan.filter);
    push_order(&mut qb, schema, &plan.order);

    qb.push(" LIMIT ");
    qb.push_bind(i64::from(plan.limit));
    qb.push(" OFFSET ");
    qb.push_bind(i64::try_from(plan.offset).unwrap_or(i64::MAX));
    qb
}

pub fn count(schema: &EntitySchema, filter: &FilterPlan) -> Sql {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table_name(schema)));
    push_filter(&mut qb, filter);
    qb
}

fn push_filter(qb: &mut Sql, filter: &FilterPlan) {
    qb.push(" WHERE TRUE");
    if !filter.include_deleted {
        qb.push(format!(" AND {} IS NULL", column(audit::DELETED_AT)));
    }
    for predicate in &filter.predicates {
        qb.push(" AND ");
        push_predicate(qb, predicate);
    }
}

fn push_predicate(qb: &mut Sql, p: &Predicate) {
    let col = column(&p.field);
    let ty = p.semantic_type;

    match (&p.operand, p.op) {
        (Operand::List(values), Operator::In) => {
            if values.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push(format!("{col} IN ("));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, ty, value);
            }
            qb.push(")");
        }
        (Operand::Single(value), Operator::Contains) => {
            qb.push("position(");
            push_value(qb, ty, value);
            qb.push(format!(" in {col}) > 0"));
        }
        (Operand::Single(value), Operator::StartsWith) => {
            qb.push(format!("left({col}, char_length("));
            push_value(qb, ty, value);
            qb.push(")) = ");
            push_value(qb, ty, value);
        }
        (Operand::Single(value), Operator::EndsWith) => {
            qb.push(format!("right({col}, char_length("));
            push_value(qb, ty, value);
            qb.push(")) = ");
            push_value(qb, ty, value);
        }
        (Operand::Single(value), op) => match comparison(op) {
            Some(symbol) => {
                qb.push(format!("{col} {symbol} "));
                push_value(qb, ty, value);
            }
            None => {
                qb.push("FALSE");
            }
        },
        (Operand::List(_), _) => {
            qb.push("FALSE");
        }
    }
}

fn comparison(op: Operator) -> Option<&'static str> {
    match op {
        Operator::Eq => Some("="),
        Operator::Gt => Some(">"),
        Operator::Gte => Some(">="),
        Operator::Lt => Some("<"),
        Operator::Lte => Some("<="),
        _ => None,
    }
}

fn push_order(qb: &mut Sql, schema: &EntitySchema, order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }

    let terms = order
        .iter()
        .map(|term| {
            let textual = schema
                .field(&term.field)
                .is_some_and(|f| is_textual(f.semantic_type));
            let collate = if textual { " COLLATE \"C\"" } else { "" };
            format!(
                "{}{collate} {} NULLS LAST",
                column(&term.field),
                term.direction.as_sql()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    qb.push(format!(" ORDER BY {terms}"));
}

fn is_textual(ty: SemanticType) -> bool {
    matches!(
        ty,
        SemanticType::Identifier
            | SemanticType::String
            | SemanticType::Enum
            | SemanticType::Reference
    )
}

// =============================================================================
// Writes
// =============================================================================

/// Multi-row `INSERT`; every schema column is written.
pub fn insert(schema: &EntitySchema, entities: &[Entity]) -> Sql {
    let columns = schema
        .fields()
        .iter()
        .map(|f| column(&f.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {} ({columns}) VALUES ",
        table_name(schema)
    ));

    for (row, entity) in entities.iter().enumerate() {
        if row > 0 {
            qb.push(", ");
        }
        qb.push("(");
        for (i, field) in schema.fields().iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, field.semantic_type, entity.get(&field.name));
        }
        qb.push(")");
    }
    qb
}

/// `UPDATE` of every column except `id`, keyed by `id`.
pub fn update(schema: &EntitySchema, entity: &Entity) -> Sql {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", table_name(schema)));

    let assignable = schema.fields().iter().filter(|f| f.name != audit::ID);
    for (i, field) in assignable.enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(format!("{} = ", column(&field.name)));
        push_value(&mut qb, field.semantic_type, entity.get(&field.name));
    }

    qb.push(format!(" WHERE {} = ", column(audit::ID)));
    qb.push_bind(entity.id().to_string());
    qb
}

// =============================================================================
// Binding
// =============================================================================

/// Bind a value with the column's type, so typed `NULL`s bind too.
fn push_value(qb: &mut Sql, ty: SemanticType, value: &FieldValue) {
    match ty {
        SemanticType::Identifier
        | SemanticType::String
        | SemanticType::Enum
        | SemanticType::Reference => {
            qb.push_bind(value.as_str().map(str::to_owned));
        }
        SemanticType::Integer => {
            let v = match value {
                FieldValue::Integer(n) => Some(*n),
                _ => None,
            };
            qb.push_bind(v);
        }
        SemanticType::BigInteger => {
            let v = match value {
                FieldValue::BigInteger(n) => Some(n.to_string()),
                _ => None,
            };
            qb.push_bind(v);
            qb.push("::NUMERIC");
        }
        SemanticType::Bytes => {
            let v = match value {
                FieldValue::Bytes(b) => Some(b.clone()),
                _ => None,
            };
            qb.push_bind(v);
        }
        SemanticType::Timestamp => {
            qb.push_bind(value.as_timestamp());
        }
        SemanticType::Boolean => {
            let v = match value {
                FieldValue::Boolean(b) => Some(*b),
                _ => None,
            };
            qb.push_bind(v);
        }
    }
}
