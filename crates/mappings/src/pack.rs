//! Mapping pack trait definition.

use cadence_core::error::DomainResult;
use cadence_core::ports::HandlerRegistry;
use cadence_core::schema::EntitySchema;

/// A self-contained set of entity schemas and the handlers that fill them.
///
/// Packs are registered explicitly in a [`PackRegistry`](crate::PackRegistry);
/// each one can:
/// - Declare the entity schemas it writes
/// - Ship extra SQL (indexes, views) tracked like any other migration
/// - Register event, extrinsic and block hook handlers
///
/// # Example
///
/// ```ignore
/// pub struct MyPack;
///
/// impl MappingPack for MyPack {
///     fn name(&self) -> &'static str { "my_pack" }
///
///     fn entities(&self) -> DomainResult<Vec<EntitySchema>> {
///         Ok(vec![Reward::schema()?])
///     }
///
///     fn register_handlers(&self, registry: &mut HandlerRegistry) {
///         registry.on_event("staking", "Rewarded", Arc::new(RewardHandler));
///     }
/// }
/// ```
pub trait MappingPack: Send + Sync {
    /// Unique name identifying this pack.
    ///
    /// Used for `--mappings` selection, logging and migration tracking.
    fn name(&self) -> &'static str;

    /// Entity schemas this pack writes.
    fn entities(&self) -> DomainResult<Vec<EntitySchema>>;

    /// Extra SQL applied after all entity tables exist.
    ///
    /// Scripts are tracked by pack name and position, so append new ones
    /// rather than editing applied ones.
    fn migrations(&self) -> &'static [&'static str] {
        &[]
    }

    /// Priority for pack initialization (higher = earlier).
    ///
    /// Packs whose handlers read another pack's entities should use a lower
    /// priority. Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Register this pack's handlers.
    fn register_handlers(&self, registry: &mut HandlerRegistry);
}
