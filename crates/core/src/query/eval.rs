//! In-memory evaluation of plans.
//!
//! This is the reference semantics every store adapter must agree with:
//! nulls never match a predicate, text operators are byte-wise and
//! case-sensitive, and nulls sort last in either direction.

use std::cmp::Ordering;

use super::filter::{FilterPlan, Operand, Predicate};
use super::order::{OrderBy, OrderDirection};
use super::plan::QueryPlan;
use crate::entity::Entity;
use crate::schema::Operator;
use crate::value::FieldValue;

impl Predicate {
    pub fn matches(&self, entity: &Entity) -> bool {
        let actual = entity.get(&self.field);
        if actual.is_null() {
            return false;
        }

        match (&self.operand, self.op) {
            (Operand::List(values), Operator::In) => values
                .iter()
                .any(|v| actual.compare(v) == Some(Ordering::Equal)),
            (Operand::Single(expected), op) => match op {
                Operator::Eq => actual.compare(expected) == Some(Ordering::Equal),
                Operator::Gt => actual.compare(expected) == Some(Ordering::Greater),
                Operator::Gte => matches!(
                    actual.compare(expected),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                Operator::Lt => actual.compare(expected) == Some(Ordering::Less),
                Operator::Lte => matches!(
                    actual.compare(expected),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                Operator::Contains => text_test(actual, expected, |h, n| h.contains(n)),
                Operator::StartsWith => text_test(actual, expected, |h, n| h.starts_with(n)),
                Operator::EndsWith => text_test(actual, expected, |h, n| h.ends_with(n)),
                Operator::In | Operator::All => false,
            },
            _ => false,
        }
    }
}

fn text_test(actual: &FieldValue, needle: &FieldValue, f: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), needle.as_str()) {
        (Some(h), Some(n)) => f(h, n),
        _ => false,
    }
}

impl FilterPlan {
    pub fn matches(&self, entity: &Entity) -> bool {
        (self.include_deleted || !entity.is_deleted())
            && self.predicates.iter().all(|p| p.matches(entity))
    }
}

/// Compare two entities under an order sequence.
pub fn compare_entities(order: &[OrderBy], a: &Entity, b: &Entity) -> Ordering {
    for term in order {
        let (x, y) = (a.get(&term.field), b.get(&term.field));
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = x.compare(y).unwrap_or(Ordering::Equal);
                match term.direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl QueryPlan {
    /// Filter, sort and page a set of candidate rows.
    pub fn apply<I>(&self, rows: I) -> Vec<Entity>
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut selected: Vec<Entity> = rows
            .into_iter()
            .filter(|e| self.filter.matches(e))
            .collect();
        selected.sort_by(|a, b| compare_entities(&self.order, a, b));

        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        selected
            .into_iter()
            .skip(offset)
            .take(self.limit as usize)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderSpec, PageArgs, QueryEngine, WhereClause};
    use crate::schema::{EntitySchema, FieldDescriptor, SemanticType};
    use chrono::{TimeZone, Utc};
    use num_bigint::BigInt;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn schema() -> EntitySchema {
        EntitySchema::new(
            "Transfer",
            vec![
                FieldDescriptor::new("value", SemanticType::BigInteger),
                FieldDescriptor::new("comment", SemanticType::String).nullable(),
                FieldDescriptor::new("block", SemanticType::Integer),
            ],
        )
        .unwrap()
    }

    fn transfer(id: &str, value: u128, block: i64, comment: Option<&str>, deleted: bool) -> Entity {
        let mut values = BTreeMap::from([
            ("id".to_string(), FieldValue::Identifier(id.into())),
            ("value".to_string(), FieldValue::BigInteger(BigInt::from(value))),
            ("block".to_string(), FieldValue::Integer(block)),
            (
                "comment".to_string(),
                comment.map_or(FieldValue::Null, |c| FieldValue::String(c.into())),
            ),
        ]);
        values.insert(
            "deletedAt".to_string(),
            if deleted {
                FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            } else {
                FieldValue::Null
            },
        );
        Entity::new("Transfer", values)
    }

    fn run(clause: WhereClause, order: &[&str], rows: Vec<Entity>) -> Vec<String> {
        let plan = QueryEngine::default()
            .plan(
                &schema(),
                &clause,
                &OrderSpec::parse(order).unwrap(),
                &PageArgs::default(),
            )
            .unwrap();
        plan.apply(rows).iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn test_transfer_scenario() {
        let rows = vec![
            transfer("a", 1_000_000_000_000_000_000, 42, None, false),
            transfer("b", 100, 42, None, false),
            transfer("c", 2_000_000_000_000_000_000, 41, None, false),
        ];
        let clause = WhereClause::new()
            .with("value_gte", "500000000000000000")
            .with("block_eq", 42);
        assert_eq!(run(clause, &[], rows), ["a"]);
    }

    #[test]
    fn test_soft_deleted_rows_excluded_unless_all() {
        let rows = vec![
            transfer("a", 1, 1, None, false),
            transfer("b", 1, 1, None, true),
        ];
        assert_eq!(run(WhereClause::new(), &[], rows.clone()), ["a"]);
        assert_eq!(
            run(WhereClause::new().with("deletedAt_all", true), &[], rows.clone()),
            ["a", "b"]
        );
        assert_eq!(
            run(WhereClause::new().with("deletedAt_all", false), &[], rows),
            ["a"]
        );
    }

    #[test]
    fn test_text_operators_are_case_sensitive() {
        let rows = vec![
            transfer("a", 1, 1, Some("Hello world"), false),
            transfer("b", 1, 1, Some("hello World"), false),
            transfer("c", 1, 1, None, false),
        ];
        assert_eq!(
            run(WhereClause::new().with("comment_startsWith", "Hello"), &[], rows.clone()),
            ["a"]
        );
        assert_eq!(
            run(WhereClause::new().with("comment_contains", "World"), &[], rows.clone()),
            ["b"]
        );
        assert_eq!(
            run(WhereClause::new().with("comment_endsWith", "world"), &[], rows),
            ["a"]
        );
    }

    #[test]
    fn test_nulls_sort_last_both_directions() {
        let rows = vec![
            transfer("a", 1, 1, None, false),
            transfer("b", 1, 1, Some("x"), false),
            transfer("c", 1, 1, Some("y"), false),
        ];
        assert_eq!(run(WhereClause::new(), &["comment_ASC"], rows.clone()), ["b", "c", "a"]);
        assert_eq!(run(WhereClause::new(), &["comment_DESC"], rows), ["c", "b", "a"]);
    }

    #[test]
    fn test_offset_and_limit() {
        let rows: Vec<_> = (0..10)
            .map(|i| transfer(&format!("t{i}"), 1, i, None, false))
            .collect();
        let plan = QueryEngine::default()
            .plan(
                &schema(),
                &WhereClause::new(),
                &OrderSpec::parse(["block_DESC"]).unwrap(),
                &PageArgs::new(2, 3),
            )
            .unwrap();
        let ids: Vec<_> = plan.apply(rows).iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, ["t7", "t6", "t5"]);
    }

    proptest! {
        #[test]
        fn prop_filter_is_conjunctive_and_order_is_total(
            rows in prop::collection::vec((0u64..5, 0i64..5, any::<bool>()), 0..30),
            min_value in 0u64..5,
            block in 0i64..5,
        ) {
            let entities: Vec<_> = rows
                .iter()
                .enumerate()
                .map(|(i, (v, b, d))| transfer(&format!("{i:03}"), *v as u128, *b, None, *d))
                .collect();
            let clause = WhereClause::new()
                .with("value_gte", min_value)
                .with("block_eq", block);
            let result = run(clause.clone(), &["value_DESC"], entities.clone());

            let expected = rows
                .iter()
                .filter(|(v, b, d)| *v >= min_value && *b == block && !*d)
                .count();
            prop_assert_eq!(result.len(), expected);

            let mut reversed = entities;
            reversed.reverse();
            prop_assert_eq!(result, run(clause, &["value_DESC"], reversed));
        }
    }
}
