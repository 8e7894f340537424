//! Tracked application of entity tables and pack scripts.
//!
//! Steps are recorded in `schema_migrations` by owner and index together
//! with a content checksum, and only executed if not already applied.

use sqlx::{Executor, PgPool};
use tracing::{debug, info, warn};

use cadence_core::error::{StorageError, StorageResult};
use cadence_core::ports::{MigrationReport, compute_checksum};

/// Apply one step unless it was recorded before.
///
/// The script and its tracking row share a transaction, so a failing
/// script leaves no record behind.
pub async fn apply_tracked(
    pool: &PgPool,
    owner: &str,
    index: u32,
    sql: &str,
    report: &mut MigrationReport,
) -> StorageResult<()> {
    let checksum = compute_checksum(sql);
    let label = format!("{owner}/{index}");
    let err = |e: sqlx::Error| StorageError::MigrationError(format!("{label}: {e}"));

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT checksum FROM schema_migrations WHERE owner = $1 AND migration_index = $2",
    )
    .bind(owner)
    .bind(index as i32)
    .fetch_optional(pool)
    .await
    .map_err(err)?;

    if let Some((existing_checksum,)) = existing {
        if existing_checksum != checksum {
            warn!(
                owner,
                migration = index,
                expected = %checksum,
                found = %existing_checksum,
                "⚠️  Migration checksum mismatch! Migration content has changed."
            );
            report.mismatched.push(label.clone());
        }
        debug!(owner, migration = index, "Migration already applied, skipping");
        report.skipped += 1;
        return Ok(());
    }

    info!(owner, migration = index, "🗄️  Applying migration");

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StorageError::TransactionError(e.to_string()))?;

    (&mut *tx).execute(sqlx::raw_sql(sql)).await.map_err(err)?;

    sqlx::query(
        "INSERT INTO schema_migrations (owner, migration_index, checksum) VALUES ($1, $2, $3)",
    )
    .bind(owner)
    .bind(index as i32)
    .bind(&checksum)
    .execute(&mut *tx)
    .await
    .map_err(err)?;

    tx.commit()
        .await
        .map_err(|e| StorageError::TransactionError(e.to_string()))?;

    report.applied.push(label);
    Ok(())
}
