//! Balances pack.
//!
//! Maps `Balances.Transfer` events to `Transfer` entities and keeps an
//! `Account` row per participant.
//!
//! # Entities
//!
//! - `Transfer`: `from`, `to`, `value`, `block`, `timestamp`, plus
//!   `sender` / `recipient` references to `Account`
//! - `Account`: `firstSeenBlock`, `lastSeenBlock`

mod handler;
pub mod models;

use std::sync::Arc;

use cadence_core::error::DomainResult;
use cadence_core::ports::HandlerRegistry;
use cadence_core::schema::EntitySchema;

use crate::pack::MappingPack;

pub use handler::{BlockSummary, TransferHandler};

/// Balances pallet mappings.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancesPack;

impl MappingPack for BalancesPack {
    fn name(&self) -> &'static str {
        "balances"
    }

    fn entities(&self) -> DomainResult<Vec<EntitySchema>> {
        Ok(vec![models::account_schema()?, models::transfer_schema()?])
    }

    fn migrations(&self) -> &'static [&'static str] {
        &[include_str!("migrations/001_transfer_indexes.sql")]
    }

    fn priority(&self) -> i32 {
        100
    }

    fn register_handlers(&self, registry: &mut HandlerRegistry) {
        registry.on_event("Balances", "Transfer", Arc::new(TransferHandler));
        registry.on_block(Arc::new(BlockSummary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::watch;

    use cadence_core::error::{ChainResult, IndexerError};
    use cadence_core::ports::{BlockSource, RawBlock, RawEvent};
    use cadence_core::query::{OrderSpec, PageArgs, QueryEngine, WhereClause};
    use cadence_core::services::{CursorManager, EntityQueries, ProcessingRunner, RunnerConfig};
    use cadence_core::store::MemoryEntityStore;

    use crate::registry::{LoadedMappings, PackRegistry};

    const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const BOB: &str = "0x8eaf04151687736326c9fea17e25fc5287613693c912909cb226aa4794f26a48";

    struct Fixture(BTreeMap<u64, RawBlock>);

    #[async_trait]
    impl BlockSource for Fixture {
        async fn fetch_block(&self, height: u64) -> ChainResult<Option<RawBlock>> {
            Ok(self.0.get(&height).cloned())
        }

        async fn head(&self) -> ChainResult<u64> {
            Ok(self.0.keys().last().copied().unwrap_or_default())
        }
    }

    fn transfer(index: u32, from: &str, to: &str, value: serde_json::Value) -> RawEvent {
        RawEvent {
            index,
            extrinsic_index: Some(1),
            module: "Balances".into(),
            name: "Transfer".into(),
            data: json!([from, to, value]),
        }
    }

    fn fixture(blocks: Vec<(u64, Vec<RawEvent>)>) -> Fixture {
        Fixture(
            blocks
                .into_iter()
                .map(|(number, events)| {
                    let block = RawBlock {
                        number,
                        timestamp: Some(1_704_067_200_000 + number * 6_000),
                        events,
                        ..Default::default()
                    };
                    (number, block)
                })
                .collect(),
        )
    }

    fn load() -> LoadedMappings {
        let mut registry = PackRegistry::new();
        registry.register(Box::new(BalancesPack));
        registry.load(vec![]).unwrap()
    }

    async fn run(
        store: Arc<MemoryEntityStore>,
        mappings: &LoadedMappings,
        source: Fixture,
        from: u64,
        to: u64,
    ) -> Result<i64, IndexerError> {
        let config = RunnerConfig {
            end_height: Some(to),
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let mut runner = ProcessingRunner::new(
            config,
            Arc::new(source),
            CursorManager::new(store, "balances-test"),
            mappings.schemas.clone(),
            mappings.handlers.clone(),
            QueryEngine::default(),
        );
        runner.migrate(&mappings.migrations).await?;

        let (_tx, rx) = watch::channel(false);
        runner.run(Some(from), rx).await
    }

    fn queries(store: Arc<MemoryEntityStore>, mappings: &LoadedMappings) -> EntityQueries<MemoryEntityStore> {
        EntityQueries::new(store, mappings.schemas.clone(), QueryEngine::default())
    }

    #[test]
    fn test_pack_contents() {
        let mappings = load();
        assert_eq!(mappings.schemas.len(), 2);
        assert_eq!(mappings.migrations.scripts.len(), 1);
        assert_eq!(mappings.migrations.scripts[0].owner, "balances");
        assert_eq!(mappings.handlers.event_keys(), vec!["balances.Transfer"]);
        assert_eq!(mappings.handlers.hooks().len(), 1);
    }

    #[tokio::test]
    async fn test_transfers_and_accounts() {
        let mappings = load();
        let store = Arc::new(MemoryEntityStore::new());
        let source = fixture(vec![
            (41, vec![transfer(0, ALICE, BOB, json!("900000000000000000"))]),
            (
                42,
                vec![
                    transfer(0, ALICE, BOB, json!("1000000000000000000")),
                    transfer(3, BOB, ALICE, json!(100)),
                ],
            ),
        ]);

        let last = run(store.clone(), &mappings, source, 41, 42).await.unwrap();
        assert_eq!(last, 42);

        let queries = queries(store, &mappings);
        let filter = WhereClause::new()
            .with("value_gte", "500000000000000000")
            .with("block_eq", 42);
        let rows = queries
            .query("Transfer", &filter, &OrderSpec::new(), &PageArgs::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), "42-0");
        assert_eq!(rows[0].get("from").to_string(), ALICE);
        assert_eq!(rows[0].get("recipient").to_string(), BOB);
        assert_eq!(rows[0].get("timestamp").to_string(), "2024-01-01T00:04:12.000Z");

        let alice: models::Account = queries
            .find_by_id("Account", ALICE)
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(alice.first_seen_block, 41);
        assert_eq!(alice.last_seen_block, 42);

        let by_bob = queries
            .count("Transfer", &WhereClause::new().with("sender_eq", BOB))
            .await
            .unwrap();
        assert_eq!(by_bob, 1);
    }

    #[tokio::test]
    async fn test_replay_converges() {
        let mappings = load();
        let store = Arc::new(MemoryEntityStore::new());
        let blocks = || fixture(vec![(7, vec![transfer(0, ALICE, BOB, json!("5"))])]);

        run(store.clone(), &mappings, blocks(), 7, 7).await.unwrap();
        run(store.clone(), &mappings, blocks(), 7, 7).await.unwrap();

        assert_eq!(store.dump("Transfer").await.len(), 1);
        assert_eq!(store.dump("Account").await.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_transfer_fails_the_block() {
        let mappings = load();
        let store = Arc::new(MemoryEntityStore::new());
        let source = fixture(vec![(1, vec![transfer(0, ALICE, "0x1234", json!("5"))])]);

        let err = run(store.clone(), &mappings, source, 1, 1).await.unwrap_err();
        assert!(matches!(err, IndexerError::MappingHandlerFailure { block: 1, .. }));
        assert!(err.to_string().contains("(to)"));
        assert!(store.dump("Account").await.is_empty());
    }
}
