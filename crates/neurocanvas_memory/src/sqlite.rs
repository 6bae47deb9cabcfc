use crate::embedding::Embedding;
use crate::store::{rank_matches, MemoryMatch, MemoryRecord, MemoryStore, RetentionPolicy, SweepReport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use neurocanvas_core::{FusedState, MemoryError, MemoryResult};
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteRow, Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// SQLite-backed memory store.
///
/// Timestamps are stored as unix milliseconds, so records come back with
/// millisecond precision. Writes for one session are serialized through a
/// per-session lock; sessions never block each other.
#[derive(Clone)]
pub struct SqliteMemoryStore {
    pool: Pool<Sqlite>,
    policy: RetentionPolicy,
    session_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SqliteMemoryStore {
    pub async fn new<P: AsRef<Path>>(db_path: P, policy: RetentionPolicy) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        Self::connect(&db_url, SqlitePoolOptions::new().max_connections(5), policy).await
    }

    /// A private, non-persistent database. Useful for tests and for running
    /// without a configured path.
    pub async fn in_memory(policy: RetentionPolicy) -> Result<Self> {
        // Every connection to :memory: opens its own database, so keep exactly
        // one and never let the pool recycle it.
        let options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::connect("sqlite::memory:", options, policy).await
    }

    async fn connect(db_url: &str, options: SqlitePoolOptions, policy: RetentionPolicy) -> Result<Self> {
        let pool = options
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA busy_timeout = 5000").execute(conn).await?;
                    Ok(())
                })
            })
            .connect(db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self {
            pool,
            policy,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                state_json TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memories table")?;

        // Every query is scoped to one session and ordered by age
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_session_created ON memories(session_id, created_at)")
            .execute(&self.pool)
            .await
            .context("Failed to create memories session index")?;

        Ok(())
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Drop the lock entry of a session nobody is using.
    async fn release_session_lock(&self, session_id: &str) {
        let mut locks = self.session_locks.lock().await;
        if locks.get(session_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    pub(crate) async fn tracked_sessions(&self) -> usize {
        self.session_locks.lock().await.len()
    }

    async fn count_rows(&self, session_id: &str) -> MemoryResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(MemoryError::unavailable)?;
        Ok(count.max(0) as usize)
    }

    /// Retention for one session. Caller holds the session lock.
    async fn sweep_session(&self, session_id: &str, now: DateTime<Utc>, cap: usize) -> MemoryResult<SweepReport> {
        let cutoff = self.policy.cutoff(now).timestamp_millis();

        let expired = sqlx::query("DELETE FROM memories WHERE session_id = ? AND created_at < ?")
            .bind(session_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(MemoryError::unavailable)?
            .rows_affected();

        // Keep only the `cap` newest; equal timestamps fall back to insertion order.
        let evicted = sqlx::query(
            "DELETE FROM memories WHERE session_id = ? AND id NOT IN \
             (SELECT id FROM memories WHERE session_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?)",
        )
        .bind(session_id)
        .bind(session_id)
        .bind(to_sql_limit(cap))
        .execute(&self.pool)
        .await
        .map_err(MemoryError::unavailable)?
        .rows_affected();

        Ok(SweepReport {
            expired: expired as usize,
            evicted: evicted as usize,
        })
    }

    async fn session_ids(&self) -> MemoryResult<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT session_id FROM memories")
            .fetch_all(&self.pool)
            .await
            .map_err(MemoryError::unavailable)
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn commit_at(
        &self,
        state: &FusedState,
        embedding: Embedding,
        now: DateTime<Utc>,
    ) -> MemoryResult<MemoryRecord> {
        self.policy.check_dimension(&embedding)?;
        let now = truncate_millis(now);

        let lock = self.session_lock(&state.session_id).await;
        let _guard = lock.lock().await;

        let max = self.policy.max_entries;
        if self.count_rows(&state.session_id).await? >= max {
            let report = self.sweep_session(&state.session_id, now, max.saturating_sub(1)).await?;
            tracing::debug!(
                "Inline sweep for session {}: {} expired, {} evicted",
                state.session_id,
                report.expired,
                report.evicted
            );
            if self.count_rows(&state.session_id).await? >= max {
                return Err(MemoryError::CapacityExceeded {
                    session: state.session_id.clone(),
                    max_entries: max,
                });
            }
        }

        let record = MemoryRecord::new(state, embedding, now);
        let state_json = serde_json::to_string(&record.state).map_err(MemoryError::unavailable)?;
        let blob = bincode::serialize(&record.embedding).map_err(MemoryError::unavailable)?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, session_id, state_json, embedding, created_at, last_accessed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.session_id)
        .bind(state_json)
        .bind(blob)
        .bind(record.created_at.timestamp_millis())
        .bind(record.last_accessed_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(MemoryError::unavailable)?;

        Ok(record)
    }

    async fn query_nearest(
        &self,
        session_id: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
    ) -> MemoryResult<Vec<MemoryMatch>> {
        self.policy.check_dimension(embedding)?;

        let rows = sqlx::query(
            "SELECT id, session_id, state_json, embedding, created_at, last_accessed_at \
             FROM memories WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(MemoryError::unavailable)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_record(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable memory record: {}", e),
            }
        }

        let mut matches = rank_matches(&records, embedding, k, threshold);
        if matches.is_empty() {
            return Ok(matches);
        }

        let now = truncate_millis(Utc::now());
        for m in &mut matches {
            sqlx::query("UPDATE memories SET last_accessed_at = ? WHERE id = ?")
                .bind(now.timestamp_millis())
                .bind(m.record.id.to_string())
                .execute(&self.pool)
                .await
                .map_err(MemoryError::unavailable)?;
            m.record.last_accessed_at = now;
        }
        Ok(matches)
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> MemoryResult<SweepReport> {
        let mut report = SweepReport::default();
        for session_id in self.session_ids().await? {
            let lock = self.session_lock(&session_id).await;
            let emptied = {
                let _guard = lock.lock().await;
                report.merge(self.sweep_session(&session_id, now, self.policy.max_entries).await?);
                self.count_rows(&session_id).await? == 0
            };
            drop(lock);
            if emptied {
                self.release_session_lock(&session_id).await;
            }
        }

        if report.total() > 0 {
            tracing::debug!(
                "Memory sweep removed {} expired and {} excess records",
                report.expired,
                report.evicted
            );
        }
        Ok(report)
    }

    async fn history(&self, session_id: &str, limit: usize, offset: usize) -> MemoryResult<Vec<MemoryRecord>> {
        let rows = sqlx::query(
            "SELECT id, session_id, state_json, embedding, created_at, last_accessed_at \
             FROM memories WHERE session_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(session_id)
        .bind(to_sql_limit(limit))
        .bind(to_sql_limit(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(MemoryError::unavailable)?;

        rows.iter()
            .map(|row| decode_record(row).map_err(MemoryError::unavailable))
            .collect()
    }

    async fn count(&self, session_id: &str) -> MemoryResult<usize> {
        self.count_rows(session_id).await
    }
}

fn decode_record(row: &SqliteRow) -> Result<MemoryRecord> {
    let id: String = row.try_get("id")?;
    let state_json: String = row.try_get("state_json")?;
    let blob: Vec<u8> = row.try_get("embedding")?;
    let created_at: i64 = row.try_get("created_at")?;
    let last_accessed_at: i64 = row.try_get("last_accessed_at")?;

    Ok(MemoryRecord {
        id: Uuid::parse_str(&id).context("Invalid memory id")?,
        session_id: row.try_get("session_id")?,
        state: serde_json::from_str(&state_json).context("Failed to deserialize fused state")?,
        embedding: bincode::deserialize(&blob).context("Failed to deserialize embedding")?,
        created_at: from_millis(created_at)?,
        last_accessed_at: from_millis(last_accessed_at)?,
    })
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("Timestamp out of range: {}", ms))
}

fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(t.timestamp_millis()).single().unwrap_or(t)
}

fn to_sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
