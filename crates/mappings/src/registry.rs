//! Pack registry for managing mapping packs.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, info};

use cadence_core::error::{DomainResult, IndexerError, IndexerResult};
use cadence_core::ports::{HandlerRegistry, MigrationScript, MigrationSet};
use cadence_core::schema::{EntitySchema, SchemaRegistry};

use crate::pack::MappingPack;

/// Everything the processor needs from the selected packs.
pub struct LoadedMappings {
    pub schemas: Arc<SchemaRegistry>,
    pub migrations: MigrationSet,
    pub handlers: Arc<HandlerRegistry>,
}

/// Registry for managing mapping packs.
///
/// The registry handles:
/// - Pack registration with priority ordering
/// - Selection of the packs named on the command line
/// - Collecting schemas, migrations and handlers for the processor
///
/// # Example
///
/// ```ignore
/// let mut registry = PackRegistry::new();
///
/// // Registration order doesn't matter - priority determines processing order
/// registry.register(Box::new(BalancesPack));
/// registry.register(Box::new(StakingPack));
///
/// let loaded = registry.load(descriptor_schemas)?;
/// store.migrate(&loaded.migrations).await?;
/// ```
#[derive(Default)]
pub struct PackRegistry {
    packs: Vec<Box<dyn MappingPack>>,
}

impl PackRegistry {
    /// Create a new empty pack registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping pack.
    pub fn register(&mut self, pack: Box<dyn MappingPack>) {
        debug!(pack = pack.name(), priority = pack.priority(), "Registering pack");
        self.packs.push(pack);
    }

    /// Keep only the named packs.
    ///
    /// An unknown name is a configuration error rather than a silent no-op.
    pub fn retain_named<S: AsRef<str>>(&mut self, names: &[S]) -> IndexerResult<()> {
        for name in names {
            if !self.packs.iter().any(|p| p.name() == name.as_ref()) {
                return Err(IndexerError::ConfigError(format!(
                    "unknown mapping pack {:?} (available: {})",
                    name.as_ref(),
                    self.pack_names().join(", ")
                )));
            }
        }
        self.packs
            .retain(|p| names.iter().any(|n| n.as_ref() == p.name()));
        Ok(())
    }

    /// Get the names of all registered packs, in priority order.
    pub fn pack_names(&self) -> Vec<&'static str> {
        self.sorted().iter().map(|p| p.name()).collect()
    }

    /// Get the number of registered packs.
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    /// Check if no packs are registered.
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Higher priority first; ties keep registration order.
    fn sorted(&self) -> Vec<&dyn MappingPack> {
        let mut sorted: Vec<&dyn MappingPack> = self.packs.iter().map(|p| p.as_ref()).collect();
        sorted.sort_by_key(|p| Reverse(p.priority()));
        sorted
    }

    /// Collect schemas, migrations and handlers from every pack.
    ///
    /// `extra` schemas (from descriptor files) are registered after the
    /// packs' own; the same shape twice is fine, a different shape under one
    /// name fails with `SchemaConflict`.
    pub fn load(&self, extra: Vec<EntitySchema>) -> DomainResult<LoadedMappings> {
        let packs = self.sorted();

        let mut schemas = SchemaRegistry::new();
        for pack in &packs {
            for schema in pack.entities()? {
                schemas.register(schema)?;
            }
        }
        for schema in extra {
            schemas.register(schema)?;
        }

        let scripts = packs
            .iter()
            .flat_map(|pack| {
                pack.migrations()
                    .iter()
                    .enumerate()
                    .map(move |(index, sql)| MigrationScript::new(pack.name(), index as u32, *sql))
            })
            .collect();

        let mut handlers = HandlerRegistry::new();
        for pack in &packs {
            pack.register_handlers(&mut handlers);
            debug!(pack = pack.name(), "Handlers registered");
        }

        info!(
            packs = packs.len(),
            entities = schemas.len(),
            events = ?handlers.event_keys(),
            "📦 Mappings loaded"
        );

        Ok(LoadedMappings {
            migrations: MigrationSet {
                schemas: schemas.iter().cloned().collect(),
                scripts,
            },
            schemas: Arc::new(schemas),
            handlers: Arc::new(handlers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use cadence_core::error::DomainError;
    use cadence_core::ports::{EventHandler, RawEvent};
    use cadence_core::schema::{FieldDescriptor, SemanticType};
    use cadence_core::services::MappingContext;

    struct Noop;

    #[async_trait]
    impl EventHandler for Noop {
        async fn handle(&self, _: &mut MappingContext<'_>, _: &RawEvent) -> DomainResult<()> {
            Ok(())
        }
    }

    struct MockPack {
        name: &'static str,
        priority: i32,
        entity: &'static str,
        field_type: SemanticType,
        migrations: &'static [&'static str],
    }

    impl MappingPack for MockPack {
        fn name(&self) -> &'static str {
            self.name
        }

        fn entities(&self) -> DomainResult<Vec<EntitySchema>> {
            Ok(vec![EntitySchema::new(
                self.entity,
                vec![FieldDescriptor::new("amount", self.field_type)],
            )?])
        }

        fn migrations(&self) -> &'static [&'static str] {
            self.migrations
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn register_handlers(&self, registry: &mut HandlerRegistry) {
            registry.on_event(self.name, "Event", Arc::new(Noop));
        }
    }

    fn pack(name: &'static str, priority: i32, entity: &'static str) -> Box<MockPack> {
        Box::new(MockPack {
            name,
            priority,
            entity,
            field_type: SemanticType::Integer,
            migrations: &[],
        })
    }

    #[test]
    fn test_priority_orders_schemas_and_scripts() {
        let mut registry = PackRegistry::new();
        registry.register(Box::new(MockPack {
            migrations: &["CREATE INDEX low ON reward (amount);"],
            ..*pack("low", 0, "Reward")
        }));
        registry.register(Box::new(MockPack {
            migrations: &["SELECT 1;", "SELECT 2;"],
            ..*pack("high", 100, "Transfer")
        }));

        assert_eq!(registry.pack_names(), vec!["high", "low"]);

        let loaded = registry.load(vec![]).unwrap();
        let names: Vec<_> = loaded.migrations.schemas.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Transfer", "Reward"]);

        let scripts: Vec<_> = loaded
            .migrations
            .scripts
            .iter()
            .map(|s| format!("{}/{}", s.owner, s.index))
            .collect();
        assert_eq!(scripts, vec!["high/0", "high/1", "low/0"]);

        assert_eq!(loaded.handlers.event_keys(), vec!["high.Event", "low.Event"]);
    }

    #[test]
    fn test_conflicting_schemas_fail() {
        let mut registry = PackRegistry::new();
        registry.register(pack("a", 0, "Transfer"));
        registry.register(Box::new(MockPack {
            field_type: SemanticType::String,
            ..*pack("b", 0, "Transfer")
        }));

        assert!(matches!(
            registry.load(vec![]),
            Err(DomainError::SchemaConflict { .. })
        ));
    }

    #[test]
    fn test_identical_descriptor_schema_is_accepted() {
        let mut registry = PackRegistry::new();
        registry.register(pack("a", 0, "Transfer"));
        let descriptor = EntitySchema::new(
            "Transfer",
            vec![FieldDescriptor::new("amount", SemanticType::Integer)],
        )
        .unwrap();

        let loaded = registry.load(vec![descriptor]).unwrap();
        assert_eq!(loaded.schemas.len(), 1);
    }

    #[test]
    fn test_retain_named() {
        let mut registry = PackRegistry::new();
        registry.register(pack("a", 0, "A"));
        registry.register(pack("b", 0, "B"));

        registry.retain_named(&["b"]).unwrap();
        assert_eq!(registry.pack_names(), vec!["b"]);

        let err = registry.retain_named(&["missing"]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
