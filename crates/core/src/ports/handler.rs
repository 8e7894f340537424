//! Port traits for mapping handlers.
//!
//! This is the main extensibility point of the processor. Mapping packs
//! implement these traits and register them under `(module, name)` keys.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::ports::block_source::{RawEvent, RawExtrinsic};
use crate::services::MappingContext;

/// Handles one event kind.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: &mut MappingContext<'_>, event: &RawEvent) -> DomainResult<()>;
}

/// Handles one call kind.
#[async_trait]
pub trait ExtrinsicHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut MappingContext<'_>,
        extrinsic: &RawExtrinsic,
    ) -> DomainResult<()>;
}

/// Per-block lifecycle hooks.
#[async_trait]
pub trait BlockHook: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Called before the first event of a block.
    async fn on_block_start(&self, _ctx: &mut MappingContext<'_>) -> DomainResult<()> {
        Ok(())
    }

    /// Called after the last extrinsic of a block, before commit.
    async fn on_block_end(&self, _ctx: &mut MappingContext<'_>) -> DomainResult<()> {
        Ok(())
    }
}

/// Lookup key; modules compare case-insensitively (`balances` matches
/// `Balances`), names exactly.
fn handler_key(module: &str, name: &str) -> (String, String) {
    (module.to_ascii_lowercase(), name.to_string())
}

/// Registry of mapping handlers.
///
/// Several handlers may share a key; they run in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    events: HashMap<(String, String), Vec<Arc<dyn EventHandler>>>,
    extrinsics: HashMap<(String, String), Vec<Arc<dyn ExtrinsicHandler>>>,
    hooks: Vec<Arc<dyn BlockHook>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event(&mut self, module: &str, name: &str, handler: Arc<dyn EventHandler>) {
        self.events
            .entry(handler_key(module, name))
            .or_default()
            .push(handler);
    }

    pub fn on_extrinsic(&mut self, module: &str, call: &str, handler: Arc<dyn ExtrinsicHandler>) {
        self.extrinsics
            .entry(handler_key(module, call))
            .or_default()
            .push(handler);
    }

    pub fn on_block(&mut self, hook: Arc<dyn BlockHook>) {
        self.hooks.push(hook);
    }

    pub fn event_handlers(&self, module: &str, name: &str) -> &[Arc<dyn EventHandler>] {
        self.events
            .get(&handler_key(module, name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn extrinsic_handlers(&self, module: &str, call: &str) -> &[Arc<dyn ExtrinsicHandler>] {
        self.extrinsics
            .get(&handler_key(module, call))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn hooks(&self) -> &[Arc<dyn BlockHook>] {
        &self.hooks
    }

    /// Registered `module.name` event keys, sorted.
    pub fn event_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .events
            .keys()
            .map(|(m, n)| format!("{m}.{n}"))
            .collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.extrinsics.is_empty() && self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl EventHandler for Noop {
        async fn handle(&self, _: &mut MappingContext<'_>, _: &RawEvent) -> DomainResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_module_lookup_ignores_case() {
        let mut registry = HandlerRegistry::new();
        registry.on_event("balances", "Transfer", Arc::new(Noop));
        registry.on_event("Balances", "Transfer", Arc::new(Noop));

        assert_eq!(registry.event_handlers("BALANCES", "Transfer").len(), 2);
        assert!(registry.event_handlers("balances", "transfer").is_empty());
        assert!(registry.extrinsic_handlers("balances", "transfer").is_empty());
        assert_eq!(registry.event_keys(), ["balances.Transfer"]);
    }
}
