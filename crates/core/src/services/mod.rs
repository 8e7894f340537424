mod context;
mod cursor;
mod query;
mod runner;

pub use context::MappingContext;
pub use cursor::{CursorManager, CursorState};
pub use query::EntityQueries;
pub use runner::{ProcessingRunner, RunnerConfig};
