//! Block cursor and migration manager.
//!
//! The manager is the only writer of the processor cursor. It enforces that
//! blocks commit strictly in sequence: the cursor row is written inside the
//! block's own unit of work, so a block's entities and its cursor advance
//! become visible together or not at all.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::models::ProcessorCursor;
use crate::ports::{EntityStore, MigrationReport, MigrationSet, UnitOfWork};

/// Lifecycle of a [`CursorManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Store not migrated yet.
    Uninitialized,
    Migrating,
    /// Idle between blocks.
    Ready,
    /// A block's unit of work is open.
    Processing,
    /// An out-of-order commit was attempted; nothing else is allowed.
    Halted,
}

impl std::fmt::Display for CursorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CursorState::Uninitialized => "uninitialized",
            CursorState::Migrating => "migrating",
            CursorState::Ready => "ready",
            CursorState::Processing => "processing",
            CursorState::Halted => "halted",
        };
        f.write_str(s)
    }
}

/// Tracks the last processed block of one stream.
pub struct CursorManager<S: EntityStore> {
    store: Arc<S>,
    stream_id: String,
    state: CursorState,
    cursor: ProcessorCursor,
}

impl<S: EntityStore> CursorManager<S> {
    pub fn new(store: Arc<S>, stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        Self {
            store,
            cursor: ProcessorCursor::genesis(stream_id.clone()),
            stream_id,
            state: CursorState::Uninitialized,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Last committed height, `-1` before the first block.
    pub fn last_processed(&self) -> i64 {
        self.cursor.last_processed_block
    }

    /// Apply all migrations and load the persisted cursor.
    ///
    /// Safe to call again once ready.
    #[instrument(skip_all, fields(stream = %self.stream_id))]
    pub async fn migrate(&mut self, set: &MigrationSet) -> IndexerResult<MigrationReport> {
        self.expect_state(&[CursorState::Uninitialized, CursorState::Ready], "migrate")?;

        self.state = CursorState::Migrating;
        let report = match self.store.migrate(set).await {
            Ok(report) => report,
            Err(e) => {
                self.state = CursorState::Uninitialized;
                return Err(e.into());
            }
        };

        let cursor = match self.store.load_cursor(&self.stream_id).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.state = CursorState::Uninitialized;
                return Err(e.into());
            }
        };
        if let Some(cursor) = cursor {
            debug!(block = cursor.last_processed_block, "Cursor loaded");
            self.cursor = cursor;
        }

        self.state = CursorState::Ready;
        info!(
            applied = report.applied.len(),
            skipped = report.skipped,
            last_processed = self.cursor.last_processed_block,
            "🗄️  Store ready"
        );
        Ok(report)
    }

    /// Height to start processing from.
    ///
    /// An explicit height wins and rebases the in-memory cursor to
    /// `height - 1`; without one, resume after the persisted cursor.
    pub fn resolve_start_height(&mut self, requested: Option<u64>) -> IndexerResult<u64> {
        self.expect_state(&[CursorState::Ready], "resolve start height")?;

        let Some(height) = requested else {
            return Ok(self.cursor.next_height());
        };

        let rebased = i64::try_from(height)
            .map_err(|_| IndexerError::ConfigError(format!("start height {height} out of range")))?
            - 1;
        if rebased < self.cursor.last_processed_block {
            warn!(
                requested = height,
                last_processed = self.cursor.last_processed_block,
                "⚠️  Start height is behind the cursor, blocks will be re-processed"
            );
        }
        self.cursor.last_processed_block = rebased;
        Ok(height)
    }

    /// Open the unit of work for the next block.
    pub async fn begin(&mut self) -> IndexerResult<Box<dyn UnitOfWork>> {
        self.expect_state(&[CursorState::Ready], "begin block")?;
        let uow = self.store.begin().await?;
        self.state = CursorState::Processing;
        Ok(uow)
    }

    /// Advance the cursor to `block` and commit the unit of work.
    ///
    /// Fails with `OutOfOrderCommit` unless `block == last + 1`; that
    /// failure rolls the unit back and halts the manager.
    #[instrument(skip(self, uow))]
    pub async fn commit(&mut self, block: u64, mut uow: Box<dyn UnitOfWork>) -> IndexerResult<()> {
        if let Err(e) = self.expect_state(&[CursorState::Processing], "commit") {
            let _ = uow.rollback().await;
            return Err(e);
        }

        let expected = self.cursor.last_processed_block + 1;
        if i64::try_from(block).ok() != Some(expected) {
            error!(expected, got = block, "❌ Out of order commit");
            if let Err(e) = uow.rollback().await {
                warn!(error = ?e, "Rollback after out of order commit failed");
            }
            self.state = CursorState::Halted;
            return Err(IndexerError::OutOfOrderCommit {
                expected,
                got: block,
            });
        }

        let next = ProcessorCursor {
            stream_id: self.stream_id.clone(),
            last_processed_block: expected,
            updated_at: Utc::now(),
        };

        let saved = match uow.save_cursor(&next).await {
            Ok(()) => uow.commit().await,
            Err(e) => {
                let _ = uow.rollback().await;
                Err(e)
            }
        };
        self.state = CursorState::Ready;
        saved?;

        self.cursor = next;
        Ok(())
    }

    /// Discard the open unit of work; the cursor stays where it was.
    pub async fn abort(&mut self, uow: Box<dyn UnitOfWork>) -> IndexerResult<()> {
        self.expect_state(&[CursorState::Processing], "abort")?;
        self.state = CursorState::Ready;
        uow.rollback().await?;
        Ok(())
    }

    fn expect_state(&self, allowed: &[CursorState], operation: &'static str) -> IndexerResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(IndexerError::InvalidState {
                state: self.state.to_string(),
                operation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEntityStore;

    async fn ready(store: &Arc<MemoryEntityStore>) -> CursorManager<MemoryEntityStore> {
        let mut manager = CursorManager::new(store.clone(), "main");
        manager.migrate(&MigrationSet::default()).await.unwrap();
        manager
    }

    async fn commit(manager: &mut CursorManager<MemoryEntityStore>, block: u64) -> IndexerResult<()> {
        let uow = manager.begin().await?;
        manager.commit(block, uow).await
    }

    #[tokio::test]
    async fn test_start_height_without_cursor_is_zero() {
        let store = Arc::new(MemoryEntityStore::new());
        let mut manager = ready(&store).await;
        assert_eq!(manager.resolve_start_height(None).unwrap(), 0);
        assert_eq!(manager.last_processed(), -1);
    }

    #[tokio::test]
    async fn test_start_height_resumes_after_cursor() {
        let store = Arc::new(MemoryEntityStore::new());
        {
            let mut manager = ready(&store).await;
            manager.resolve_start_height(Some(99)).unwrap();
            commit(&mut manager, 99).await.unwrap();
        }

        let mut manager = ready(&store).await;
        assert_eq!(manager.last_processed(), 99);
        assert_eq!(manager.resolve_start_height(None).unwrap(), 100);
    }

    #[tokio::test]
    async fn test_explicit_start_height_wins() {
        let store = Arc::new(MemoryEntityStore::new());
        let mut manager = ready(&store).await;
        manager.resolve_start_height(Some(41)).unwrap();
        commit(&mut manager, 41).await.unwrap();

        assert_eq!(manager.resolve_start_height(Some(5)).unwrap(), 5);
        commit(&mut manager, 5).await.unwrap();
        assert_eq!(manager.last_processed(), 5);
    }

    #[tokio::test]
    async fn test_commit_requires_next_block() {
        let store = Arc::new(MemoryEntityStore::new());
        let mut manager = ready(&store).await;
        manager.resolve_start_height(None).unwrap();

        commit(&mut manager, 0).await.unwrap();
        commit(&mut manager, 1).await.unwrap();

        let err = commit(&mut manager, 3).await.unwrap_err();
        assert!(matches!(err, IndexerError::OutOfOrderCommit { expected: 2, got: 3 }));
        assert_eq!(manager.state(), CursorState::Halted);
        assert!(matches!(
            manager.begin().await,
            Err(IndexerError::InvalidState { .. })
        ));

        let persisted = store.load_cursor("main").await.unwrap().unwrap();
        assert_eq!(persisted.last_processed_block, 1);
    }

    #[tokio::test]
    async fn test_repeated_block_is_out_of_order() {
        let store = Arc::new(MemoryEntityStore::new());
        let mut manager = ready(&store).await;
        commit(&mut manager, 0).await.unwrap();
        assert!(matches!(
            commit(&mut manager, 0).await,
            Err(IndexerError::OutOfOrderCommit { expected: 1, got: 0 })
        ));
    }

    #[tokio::test]
    async fn test_abort_keeps_cursor() {
        let store = Arc::new(MemoryEntityStore::new());
        let mut manager = ready(&store).await;
        let uow = manager.begin().await.unwrap();
        manager.abort(uow).await.unwrap();
        assert_eq!(manager.state(), CursorState::Ready);
        assert!(store.load_cursor("main").await.unwrap().is_none());
        commit(&mut manager, 0).await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_before_migrate_are_rejected() {
        let store = Arc::new(MemoryEntityStore::new());
        let mut manager = CursorManager::new(store, "main");
        assert!(matches!(
            manager.resolve_start_height(None),
            Err(IndexerError::InvalidState { .. })
        ));
        assert!(manager.begin().await.is_err());
    }
}
