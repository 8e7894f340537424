//! Processing runner - drives mappings block by block.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{DomainError, IndexerError, IndexerResult};
use crate::metrics::{
    ProcessingTimer, record_block_processed, record_endpoint_retry, record_entities_written,
    record_handler_error,
};
use crate::models::Block;
use crate::mutation::WriteStamp;
use crate::ports::{BlockSource, EntityStore, HandlerRegistry, MigrationReport, MigrationSet, RawBlock};
use crate::query::QueryEngine;
use crate::schema::SchemaRegistry;
use crate::services::{CursorManager, MappingContext};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the processing runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Actor id stamped on every write (`createdById`, `updatedById`).
    pub actor: String,
    /// Wait before asking again for a block the endpoint does not have yet.
    pub poll_interval: Duration,
    /// Retries of a failing fetch before `EndpointUnavailable`.
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Stop after this height instead of following the chain.
    pub end_height: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            actor: "processor".to_string(),
            poll_interval: Duration::from_secs(6),
            max_retries: 5,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
            end_height: None,
        }
    }
}

// =============================================================================
// ProcessingRunner
// =============================================================================

/// Pulls blocks from a [`BlockSource`] and runs mapping handlers over them.
///
/// # Flow
///
/// For each height, strictly in sequence:
///
/// 1. Fetch the block (retrying with exponential backoff)
/// 2. Open the block's unit of work
/// 3. Run `on_block_start` hooks, event handlers in emission order,
///    extrinsic handlers in block order, then `on_block_end` hooks
/// 4. Commit the unit of work together with the cursor advance
///
/// A handler failure rolls the whole block back. Shutdown is only observed
/// between blocks.
pub struct ProcessingRunner<B: BlockSource, S: EntityStore> {
    config: RunnerConfig,
    source: Arc<B>,
    cursor: CursorManager<S>,
    schemas: Arc<SchemaRegistry>,
    handlers: Arc<HandlerRegistry>,
    engine: QueryEngine,
}

impl<B: BlockSource, S: EntityStore> ProcessingRunner<B, S> {
    pub fn new(
        config: RunnerConfig,
        source: Arc<B>,
        cursor: CursorManager<S>,
        schemas: Arc<SchemaRegistry>,
        handlers: Arc<HandlerRegistry>,
        engine: QueryEngine,
    ) -> Self {
        Self {
            config,
            source,
            cursor,
            schemas,
            handlers,
            engine,
        }
    }

    pub fn cursor(&self) -> &CursorManager<S> {
        &self.cursor
    }

    /// Apply migrations (the `migrate` mode, and the first step of `run`).
    pub async fn migrate(&mut self, set: &MigrationSet) -> IndexerResult<MigrationReport> {
        self.cursor.migrate(set).await
    }

    /// Process blocks until shutdown, `end_height`, or a fatal error.
    ///
    /// Returns the last committed height (`-1` if none).
    #[instrument(skip_all, fields(stream = %self.cursor.stream_id()))]
    pub async fn run(
        &mut self,
        requested_height: Option<u64>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> IndexerResult<i64> {
        let mut height = self.cursor.resolve_start_height(requested_height)?;
        info!(from = height, handlers = ?self.handlers.event_keys(), "⛓️  Starting processor");

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return Err(IndexerError::ShutdownRequested);
            }
            if self.config.end_height.is_some_and(|end| height > end) {
                info!(last = self.cursor.last_processed(), "🏁 Reached end height");
                return Ok(self.cursor.last_processed());
            }

            let Some(raw) = self.fetch_with_retry(height, &mut shutdown_rx).await? else {
                trace!(height, "Block not yet available");
                self.wait(self.config.poll_interval, &mut shutdown_rx).await?;
                continue;
            };

            self.process_block(&raw).await?;
            height += 1;
        }
    }

    /// Fetch a block, retrying failures with exponential backoff.
    async fn fetch_with_retry(
        &self,
        height: u64,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IndexerResult<Option<RawBlock>> {
        let mut delay = self.config.initial_retry_delay;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.source.fetch_block(height).await {
                Ok(block) => return Ok(block),
                Err(source) if attempts > self.config.max_retries => {
                    error!(height, attempts, error = %source, "❌ Indexer endpoint unavailable");
                    return Err(IndexerError::EndpointUnavailable {
                        height,
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    record_endpoint_retry();
                    warn!(
                        height,
                        attempt = attempts,
                        retry_in_ms = delay.as_millis(),
                        error = %e,
                        "⚠️  Block fetch failed, retrying..."
                    );
                    self.wait(delay, shutdown_rx).await?;
                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }

    async fn wait(&self, delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> IndexerResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return Err(IndexerError::ShutdownRequested);
                }
                Ok(())
            }
        }
    }

    /// Run every handler for one block inside one unit of work.
    #[instrument(skip(self, raw), fields(block = raw.number))]
    async fn process_block(&mut self, raw: &RawBlock) -> IndexerResult<()> {
        let _timer = ProcessingTimer::new();
        let block = raw.header();
        // Chain time keeps replays deterministic; wall clock only as fallback.
        let stamp = WriteStamp::new(&self.config.actor, block.timestamp.unwrap_or_else(Utc::now));

        let mut uow = self.cursor.begin().await?;
        let outcome = {
            let mut ctx = MappingContext::new(&self.schemas, self.engine, uow.as_mut(), &block, stamp);
            dispatch(&self.handlers, &mut ctx, raw, &block)
                .await
                .map(|()| ctx.into_writes())
        };

        let writes = match outcome {
            Ok(writes) => writes,
            Err(e) => {
                if let IndexerError::MappingHandlerFailure { module, name, .. } = &e {
                    error!(module = %module, name = %name, error = %e, "❌ Mapping handler failed, block rolled back");
                }
                self.cursor.abort(uow).await?;
                return Err(e);
            }
        };

        self.cursor.commit(block.number, uow).await?;

        for (entity, count) in &writes {
            record_entities_written(entity, *count);
        }
        record_block_processed(block.number);
        debug!(events = raw.events.len(), writes = writes.values().sum::<u64>(), "⛓️  Block processed");
        Ok(())
    }
}

/// Hooks, then events, then extrinsics, then hooks.
async fn dispatch(
    handlers: &HandlerRegistry,
    ctx: &mut MappingContext<'_>,
    raw: &RawBlock,
    block: &Block,
) -> IndexerResult<()> {
    let fail = |kind: &str, module: &str, name: &str, source: DomainError| {
        record_handler_error(kind, module);
        IndexerError::MappingHandlerFailure {
            block: block.number,
            module: module.to_string(),
            name: name.to_string(),
            source,
        }
    };

    for hook in handlers.hooks() {
        hook.on_block_start(ctx)
            .await
            .map_err(|e| fail("hook", hook.name(), "on_block_start", e))?;
    }

    let mut events: Vec<_> = raw.events.iter().collect();
    events.sort_by_key(|e| e.index);
    for event in events {
        for handler in handlers.event_handlers(&event.module, &event.name) {
            handler
                .handle(ctx, event)
                .await
                .map_err(|e| fail("event", &event.module, &event.name, e))?;
        }
    }

    let mut extrinsics: Vec<_> = raw.extrinsics.iter().collect();
    extrinsics.sort_by_key(|e| e.index);
    for extrinsic in extrinsics {
        for handler in handlers.extrinsic_handlers(&extrinsic.module, &extrinsic.call) {
            handler
                .handle(ctx, extrinsic)
                .await
                .map_err(|e| fail("extrinsic", &extrinsic.module, &extrinsic.call, e))?;
        }
    }

    for hook in handlers.hooks() {
        hook.on_block_end(ctx)
            .await
            .map_err(|e| fail("hook", hook.name(), "on_block_end", e))?;
    }

    Ok(())
}
