//! Storage layer for the Cadence processor.
//!
//! This crate provides the PostgreSQL implementation of the entity store
//! ports defined in `cadence-core`. Each registered entity schema becomes
//! one table; reads are rendered from validated query plans and each block
//! is written inside a single transaction together with its cursor.
//!
//! # Usage
//!
//! ```ignore
//! use cadence_storage::{Database, DatabaseConfig, PgEntityStore};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_processor(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Entity tables and pack scripts are applied through the store
//! let store = Arc::new(PgEntityStore::new(Arc::new(db)));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgEntityStore, PgUnitOfWork};
