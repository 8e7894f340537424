//! Core domain layer for the Cadence processor.
//!
//! This crate holds everything that does not touch a network or a database:
//! entity schemas, the generic query engine, the mutation shaper, the port
//! traits adapters implement, and the services that drive processing. It
//! follows hexagonal architecture principles - this is the innermost layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     cadence (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  cadence-mappings   │  cadence-substrate  │ cadence-storage │
//! │     (packs)         │  (block sources)    │  (PostgreSQL)   │
//! ├─────────────────────┴─────────────────────┴─────────────────┤
//! │                     cadence-core  ← YOU ARE HERE            │
//! │      (schema, query, mutation, ports, services, store)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`schema`] - Entity schemas, field descriptors and the registry
//! - [`value`] / [`entity`] - Typed field values and entity records
//! - [`query`] - Where-clause, ordering and pagination compilation
//! - [`mutation`] - Create/update payload validation and audit stamping
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Cursor manager, processing runner, mapping context
//! - [`store`] - In-memory store adapter
//! - [`error`] / [`metrics`] - Error types and Prometheus metrics
//!
//! # Processing Lifecycle
//!
//! 1. Register schemas and handlers, migrate the store
//! 2. Resolve the start height from the flag or the persisted cursor
//! 3. Fetch each block from the indexer endpoint
//! 4. Run handlers inside the block's unit of work
//! 5. Commit entity writes and the cursor advance together

pub mod entity;
pub mod error;
pub mod metrics;
pub mod models;
pub mod mutation;
pub mod ports;
pub mod query;
pub mod schema;
pub mod services;
pub mod store;
pub mod value;
