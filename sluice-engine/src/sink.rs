//! Execution-outcome sink
//!
//! Durably records the terminal outcome of every record that reaches a
//! pipeline's last stage or is dropped by a Filter. Writes are single-row
//! upserts keyed by (instance id, dest id); lock contention is retried
//! with bounded exponential backoff, any other persistence error is fatal
//! to the run.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use sluice_core::domain::outcome::RecordOutcome;
use sluice_core::domain::record::ExecuteStatus;

/// Maximum upsert attempts before giving up on a contended row
const MAX_ATTEMPTS: u32 = 6;
/// Initial backoff; doubles per attempt
const BACKOFF_BASE: Duration = Duration::from_millis(50);
/// Backoff ceiling
const BACKOFF_CAP: Duration = Duration::from_secs(1);

/// Errors from the outcome sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store still locked after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Durable store for per-record audit rows
#[derive(Clone)]
pub struct OutcomeSink {
    pool: sqlx::SqlitePool,
}

impl OutcomeSink {
    /// Connects to the store at `url` (e.g. "sqlite://audit.db?mode=rwc")
    /// and ensures the schema exists
    pub async fn connect(url: &str) -> Result<Self, SinkError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        let sink = Self { pool };
        sink.init_schema().await?;
        Ok(sink)
    }

    /// Opens an in-memory store, used by tests and dry runs
    ///
    /// A single connection keeps every caller on the same in-memory
    /// database.
    pub async fn in_memory() -> Result<Self, SinkError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let sink = Self { pool };
        sink.init_schema().await?;
        Ok(sink)
    }

    async fn init_schema(&self) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS record_outcomes (
                instance_id TEXT NOT NULL,
                source_id   TEXT NOT NULL,
                source_name TEXT NOT NULL,
                source_path TEXT NOT NULL,
                dest_id     TEXT NOT NULL,
                dest_name   TEXT NOT NULL,
                dest_path   TEXT NOT NULL,
                file_type   TEXT NOT NULL,
                source_size INTEGER NOT NULL,
                dest_size   INTEGER NOT NULL,
                status      TEXT NOT NULL,
                result      TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (instance_id, dest_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts one audit row, retrying lock contention with backoff
    pub async fn record(&self, outcome: &RecordOutcome) -> Result<(), SinkError> {
        let mut backoff = BACKOFF_BASE;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.upsert(outcome).await {
                Ok(()) => {
                    debug!(
                        "Recorded outcome for {} (instance {})",
                        outcome.dest_id, outcome.instance_id
                    );
                    return Ok(());
                }
                Err(err) if is_lock_contention(&err) && attempt < MAX_ATTEMPTS => {
                    warn!(
                        "Outcome store locked (attempt {}/{}), retrying in {:?}",
                        attempt, MAX_ATTEMPTS, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
                Err(err) if is_lock_contention(&err) => {
                    return Err(SinkError::RetriesExhausted {
                        attempts: MAX_ATTEMPTS,
                    });
                }
                Err(err) => return Err(SinkError::Database(err)),
            }
        }

        Err(SinkError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn upsert(&self, outcome: &RecordOutcome) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO record_outcomes (
                instance_id, source_id, source_name, source_path,
                dest_id, dest_name, dest_path, file_type,
                source_size, dest_size, status, result, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (instance_id, dest_id) DO UPDATE SET
                source_id = excluded.source_id,
                source_name = excluded.source_name,
                source_path = excluded.source_path,
                dest_name = excluded.dest_name,
                dest_path = excluded.dest_path,
                file_type = excluded.file_type,
                source_size = excluded.source_size,
                dest_size = excluded.dest_size,
                status = excluded.status,
                result = excluded.result,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(outcome.instance_id.to_string())
        .bind(&outcome.source_id)
        .bind(&outcome.source_name)
        .bind(&outcome.source_path)
        .bind(&outcome.dest_id)
        .bind(&outcome.dest_name)
        .bind(&outcome.dest_path)
        .bind(&outcome.file_type)
        .bind(outcome.source_size as i64)
        .bind(outcome.dest_size as i64)
        .bind(status_to_string(outcome.status))
        .bind(&outcome.result)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches every audit row for one pipeline run
    pub async fn for_instance(&self, instance_id: Uuid) -> Result<Vec<RecordOutcome>, SinkError> {
        let rows = sqlx::query_as::<_, OutcomeRow>(
            r#"
            SELECT instance_id, source_id, source_name, source_path,
                   dest_id, dest_name, dest_path, file_type,
                   source_size, dest_size, status, result
            FROM record_outcomes
            WHERE instance_id = $1
            ORDER BY dest_id ASC
            "#,
        )
        .bind(instance_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

/// Whether a sqlx error is sqlite lock contention
fn is_lock_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let msg = db.message();
            msg.contains("database is locked") || msg.contains("database table is locked")
        }
        _ => false,
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: ExecuteStatus) -> &'static str {
    match status {
        ExecuteStatus::Completed => "Completed",
        ExecuteStatus::Failed => "Failed",
    }
}

fn string_to_status(s: &str) -> ExecuteStatus {
    match s {
        "Completed" => ExecuteStatus::Completed,
        _ => ExecuteStatus::Failed,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct OutcomeRow {
    instance_id: String,
    source_id: String,
    source_name: String,
    source_path: String,
    dest_id: String,
    dest_name: String,
    dest_path: String,
    file_type: String,
    source_size: i64,
    dest_size: i64,
    status: String,
    result: String,
}

impl From<OutcomeRow> for RecordOutcome {
    fn from(row: OutcomeRow) -> Self {
        Self {
            instance_id: Uuid::parse_str(&row.instance_id).unwrap_or(Uuid::nil()),
            source_id: row.source_id,
            source_name: row.source_name,
            source_path: row.source_path,
            dest_id: row.dest_id,
            dest_name: row.dest_name,
            dest_path: row.dest_path,
            file_type: row.file_type,
            source_size: row.source_size as u64,
            dest_size: row.dest_size as u64,
            status: string_to_status(&row.status),
            result: row.result,
        }
    }
}
