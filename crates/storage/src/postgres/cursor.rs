//! Processor cursor persistence.

use sqlx::PgExecutor;

use cadence_core::error::{StorageError, StorageResult};
use cadence_core::models::ProcessorCursor;

pub async fn load_cursor<'e>(
    executor: impl PgExecutor<'e>,
    stream_id: &str,
) -> StorageResult<Option<ProcessorCursor>> {
    let row = sqlx::query_as::<_, CursorRow>(
        r#"
        SELECT stream_id, last_processed_block, updated_at
        FROM processor_cursor
        WHERE stream_id = $1
        "#,
    )
    .bind(stream_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(row.map(CursorRow::into_cursor))
}

pub async fn save_cursor<'e>(
    executor: impl PgExecutor<'e>,
    cursor: &ProcessorCursor,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO processor_cursor (stream_id, last_processed_block, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (stream_id) DO UPDATE SET
            last_processed_block = EXCLUDED.last_processed_block,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&cursor.stream_id)
    .bind(cursor.last_processed_block)
    .bind(cursor.updated_at)
    .execute(executor)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    stream_id: String,
    last_processed_block: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl CursorRow {
    fn into_cursor(self) -> ProcessorCursor {
        ProcessorCursor {
            stream_id: self.stream_id,
            last_processed_block: self.last_processed_block,
            updated_at: self.updated_at,
        }
    }
}
