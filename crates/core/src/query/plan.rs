//! Query plans: the validated, store-independent form of a read.

use super::filter::{FilterPlan, WhereClause};
use super::order::{OrderBy, OrderSpec};
use super::page::{PageArgs, PageLimits};
use crate::error::DomainResult;
use crate::schema::EntitySchema;

/// A fully validated read against one entity.
///
/// Stores translate this into their own query language; identical inputs
/// always produce identical plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub entity: String,
    pub filter: FilterPlan,
    /// Always ends with an `id` term.
    pub order: Vec<OrderBy>,
    pub offset: u64,
    pub limit: u32,
}

/// Compiles where/order/page arguments into [`QueryPlan`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine {
    limits: PageLimits,
}

impl QueryEngine {
    pub fn new(limits: PageLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    pub fn plan(
        &self,
        schema: &EntitySchema,
        filter: &WhereClause,
        order: &OrderSpec,
        page: &PageArgs,
    ) -> DomainResult<QueryPlan> {
        let limit = page.resolve(&self.limits)?;
        let filter = FilterPlan::compile(schema, filter)?;
        let order = order.resolve(schema)?;

        Ok(QueryPlan {
            entity: schema.name().to_string(),
            filter,
            order,
            offset: page.offset,
            limit,
        })
    }

    /// Plan for a single live (or, with `include_deleted`, any) row by id.
    pub fn plan_by_id(&self, schema: &EntitySchema, id: &str, include_deleted: bool) -> QueryPlan {
        QueryPlan {
            entity: schema.name().to_string(),
            filter: FilterPlan::by_id(id, include_deleted),
            order: vec![OrderBy::asc(crate::schema::audit::ID)],
            offset: 0,
            limit: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::schema::{FieldDescriptor, SemanticType};

    fn schema() -> EntitySchema {
        EntitySchema::new(
            "Transfer",
            vec![FieldDescriptor::new("block", SemanticType::Integer)],
        )
        .unwrap()
    }

    #[test]
    fn test_identical_arguments_identical_plans() {
        let engine = QueryEngine::default();
        let clause = WhereClause::new().with("block_gt", 1).with("id_in", vec!["a", "b"]);
        let order = OrderSpec::parse(["block_DESC"]).unwrap();
        let page = PageArgs::new(5, 10);
        let a = engine.plan(&schema(), &clause, &order, &page).unwrap();
        let b = engine.plan(&schema(), &clause, &order, &page).unwrap();
        assert_eq!(a, b);
        assert!(!a.filter.include_deleted);
        assert_eq!(a.order.last().unwrap().field, "id");
    }

    #[test]
    fn test_page_checked_with_engine_limits() {
        let engine = QueryEngine::new(PageLimits::with_max(10));
        let err = engine
            .plan(
                &schema(),
                &WhereClause::new(),
                &OrderSpec::new(),
                &PageArgs::new(0, 11),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::PageTooLarge { max: 10, .. }));
    }
}
