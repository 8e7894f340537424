//! Generic entity query engine.
//!
//! One engine serves every entity kind: the [`EntitySchema`] decides which
//! keys a [`WhereClause`] may use and how literals are typed. Compiling a
//! read yields a [`QueryPlan`], which stores either render to SQL or
//! evaluate directly in memory (see [`eval`]).
//!
//! [`EntitySchema`]: crate::schema::EntitySchema

pub mod eval;
mod filter;
mod order;
mod page;
mod plan;

pub use filter::{FilterPlan, Operand, Predicate, WhereClause};
pub use order::{OrderBy, OrderDirection, OrderSpec};
pub use page::{PageArgs, PageLimits};
pub use plan::{QueryEngine, QueryPlan};
