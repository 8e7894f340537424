//! Mapping packs for the Cadence processor.
//!
//! A pack bundles what one pallet's mappings need:
//!
//! - Entity schemas (tables are generated from them)
//! - Extra SQL migrations (indexes, views)
//! - Event, extrinsic and block handlers
//!
//! Packs are compiled in and selected by name at startup (`--mappings`).
//! Schemas may also come from JSON descriptor files (`--entities`), see
//! [`load_descriptors`].
//!
//! See [`MappingPack`] for writing one.
//!
//! # Loading Packs
//!
//! ```ignore
//! let mut registry = cadence_mappings::builtin_packs();
//! registry.retain_named(&["balances"])?;
//!
//! let loaded = registry.load(load_descriptors(".", "entities/*.json")?)?;
//! cursor.migrate(&loaded.migrations).await?;
//! ```

pub mod balances;
pub mod utils;

mod descriptors;
mod pack;
mod registry;

pub use descriptors::load_descriptors;
pub use pack::MappingPack;
pub use registry::{LoadedMappings, PackRegistry};

pub use balances::BalancesPack;

/// Registry holding every pack compiled into this crate.
pub fn builtin_packs() -> PackRegistry {
    let mut registry = PackRegistry::new();
    registry.register(Box::new(BalancesPack));
    registry
}
