//! Process-local memory store.
//!
//! Each session's records sit behind their own `RwLock`: commits and sweeps
//! for a session take the write side and so never interleave, while queries
//! share the read side and never wait on other sessions.

use crate::embedding::Embedding;
use crate::store::{apply_retention, rank_matches, MemoryMatch, MemoryRecord, MemoryStore, RetentionPolicy, SweepReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neurocanvas_core::{FusedState, MemoryError, MemoryResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

type SessionRecords = Arc<RwLock<Vec<MemoryRecord>>>;

pub struct InMemoryStore {
    policy: RetentionPolicy,
    sessions: RwLock<HashMap<String, SessionRecords>>,
}

impl InMemoryStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    async fn existing(&self, session_id: &str) -> Option<SessionRecords> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn get_or_create(&self, session_id: &str) -> SessionRecords {
        if let Some(records) = self.existing(session_id).await {
            return records;
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.to_string()).or_default())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn commit_at(
        &self,
        state: &FusedState,
        embedding: Embedding,
        now: DateTime<Utc>,
    ) -> MemoryResult<MemoryRecord> {
        self.policy.check_dimension(&embedding)?;

        let handle = self.get_or_create(&state.session_id).await;
        let mut records = handle.write().await;

        let max = self.policy.max_entries;
        if records.len() >= max {
            let report = apply_retention(&mut records, now, &self.policy, max.saturating_sub(1));
            tracing::debug!(
                "Inline sweep for session {}: {} expired, {} evicted",
                state.session_id,
                report.expired,
                report.evicted
            );
            if records.len() >= max {
                return Err(MemoryError::CapacityExceeded {
                    session: state.session_id.clone(),
                    max_entries: max,
                });
            }
        }

        let record = MemoryRecord::new(state, embedding, now);
        records.push(record.clone());
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

        let Some(handle) = self.existing(session_id).await else {
            return Ok(Vec::new());
        };

        let mut matches = {
            let records = handle.read().await;
            rank_matches(records.iter(), embedding, k, threshold)
        };
        if matches.is_empty() {
            return Ok(matches);
        }

        let now = Utc::now();
        let touched: HashSet<_> = matches.iter().map(|m| m.record.id).collect();
        {
            let mut records = handle.write().await;
            for record in records.iter_mut().filter(|r| touched.contains(&r.id)) {
                record.last_accessed_at = now;
            }
        }
        for m in &mut matches {
            m.record.last_accessed_at = now;
        }
        Ok(matches)
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> MemoryResult<SweepReport> {
        let handles: Vec<SessionRecords> = self.sessions.read().await.values().cloned().collect();

        let mut report = SweepReport::default();
        for handle in handles {
            let mut records = handle.write().await;
            report.merge(apply_retention(&mut records, now, &self.policy, self.policy.max_entries));
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
        let Some(handle) = self.existing(session_id).await else {
            return Ok(Vec::new());
        };
        let records = handle.read().await;
        let mut ordered: Vec<&MemoryRecord> = records.iter().collect();
        // Stable sort on reversed insertion order: equal timestamps come out newest-inserted first.
        ordered.reverse();
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ordered.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn count(&self, session_id: &str) -> MemoryResult<usize> {
        match self.existing(session_id).await {
            Some(handle) => Ok(handle.read().await.len()),
            None => Ok(0),
        }
    }
}
