//! Memory store contract and the policy logic shared by its backends.
//!
//! Similarity search is a per-session linear scan with cosine similarity.
//! A session never holds more than `max_entries` records, so no vector index
//! is involved.

use crate::embedding::{cosine_similarity, Embedding};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use neurocanvas_core::{EmotionLabel, EmotionVector, FusedState, MemoryConfig, MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use uuid::Uuid;

/// A persisted fused state with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub session_id: String,
    pub state: FusedState,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
    /// The only field that changes after creation, bumped on retrieval.
    pub last_accessed_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(state: &FusedState, embedding: Embedding, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: state.session_id.clone(),
            state: state.clone(),
            embedding,
            created_at: now,
            last_accessed_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMatch {
    pub similarity: f32,
    pub record: MemoryRecord,
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Older than the retention window.
    pub expired: usize,
    /// Oldest-first removals to get back under the per-session cap.
    pub evicted: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired + self.evicted
    }

    pub fn merge(&mut self, other: SweepReport) {
        self.expired += other.expired;
        self.evicted += other.evicted;
    }
}

/// Aggregate view of a session's emotional memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionPatterns {
    pub record_count: usize,
    pub mean_vector: EmotionVector,
    pub dominant: Option<EmotionLabel>,
    pub mean_confidence: f32,
    /// Share of records whose state was flagged low-confidence.
    pub low_confidence_ratio: f32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl EmotionPatterns {
    pub fn from_records(records: &[MemoryRecord]) -> Self {
        let n = records.len();
        if n == 0 {
            return Self {
                record_count: 0,
                mean_vector: EmotionVector::zero(),
                dominant: None,
                mean_confidence: 0.0,
                low_confidence_ratio: 0.0,
                first_seen: None,
                last_seen: None,
            };
        }

        let w = 1.0 / n as f32;
        let mean_vector = EmotionVector::weighted_sum(records.iter().map(|r| (&r.state.vector, w)));
        let mean_confidence = records.iter().map(|r| r.state.confidence).sum::<f32>() * w;
        let low = records.iter().filter(|r| r.state.low_confidence).count();

        Self {
            record_count: n,
            mean_vector,
            dominant: Some(mean_vector.dominant().0),
            mean_confidence,
            low_confidence_ratio: low as f32 * w,
            first_seen: records.iter().map(|r| r.created_at).min(),
            last_seen: records.iter().map(|r| r.created_at).max(),
        }
    }
}

/// Retention limits a store enforces.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub retention: Duration,
    /// Per-session record cap.
    pub max_entries: usize,
    /// Required embedding length.
    pub vector_dim: usize,
}

impl RetentionPolicy {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            retention: config.retention(),
            max_entries: config.max_entries,
            vector_dim: config.vector_dim,
        }
    }

    /// Records created before this are expired. Saturates at the earliest
    /// representable instant.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn check_dimension(&self, embedding: &[f32]) -> MemoryResult<()> {
        if embedding.len() != self.vector_dim {
            return Err(MemoryError::EmbeddingDimension {
                expected: self.vector_dim,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist `state` as a record created at `now`.
    ///
    /// If the session is at capacity, a sweep for that session runs first.
    /// Fails with `CapacityExceeded` only if that sweep cannot make room.
    async fn commit_at(
        &self,
        state: &FusedState,
        embedding: Embedding,
        now: DateTime<Utc>,
    ) -> MemoryResult<MemoryRecord>;

    async fn commit(&self, state: &FusedState, embedding: Embedding) -> MemoryResult<MemoryRecord> {
        self.commit_at(state, embedding, Utc::now()).await
    }

    /// Up to `k` records of the session with cosine similarity ≥ `threshold`,
    /// most similar first, ties broken by most recent first. Returned records
    /// have their `last_accessed_at` bumped.
    async fn query_nearest(
        &self,
        session_id: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
    ) -> MemoryResult<Vec<MemoryMatch>>;

    /// Remove expired records, then trim every session to the cap. Idempotent.
    async fn sweep_at(&self, now: DateTime<Utc>) -> MemoryResult<SweepReport>;

    async fn sweep(&self) -> MemoryResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Records of a session, newest first.
    async fn history(&self, session_id: &str, limit: usize, offset: usize) -> MemoryResult<Vec<MemoryRecord>>;

    async fn count(&self, session_id: &str) -> MemoryResult<usize>;

    async fn patterns(&self, session_id: &str) -> MemoryResult<EmotionPatterns> {
        let records = self.history(session_id, usize::MAX, 0).await?;
        Ok(EmotionPatterns::from_records(&records))
    }
}

/// Score, filter and order candidate records for a nearest-neighbour query.
pub fn rank_matches<'a, I>(records: I, query: &[f32], k: usize, threshold: f32) -> Vec<MemoryMatch>
where
    I: IntoIterator<Item = &'a MemoryRecord>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<MemoryMatch> = records
        .into_iter()
        .filter_map(|record| {
            let similarity = cosine_similarity(query, &record.embedding);
            (similarity >= threshold).then(|| MemoryMatch {
                similarity,
                record: record.clone(),
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.record.created_at.cmp(&a.record.created_at))
    });
    scored.truncate(k);
    scored
}

/// Apply the retention policy to one session's records, in place, keeping at
/// most `cap` of them. Ties in age are broken by position (earlier goes first).
pub fn apply_retention(
    records: &mut Vec<MemoryRecord>,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
    cap: usize,
) -> SweepReport {
    let cutoff = policy.cutoff(now);
    let before = records.len();
    records.retain(|r| r.created_at >= cutoff);
    let expired = before - records.len();

    let excess = records.len().saturating_sub(cap);
    if excess > 0 {
        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by_key(|&i| records[i].created_at);
        let doomed: HashSet<Uuid> = order[..excess].iter().map(|&i| records[i].id).collect();
        records.retain(|r| !doomed.contains(&r.id));
    }

    SweepReport {
        expired,
        evicted: excess,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(joy: f32, created_at: DateTime<Utc>, low: bool) -> MemoryRecord {
        let state = FusedState {
            id: Uuid::new_v4(),
            session_id: "s".to_string(),
            vector: EmotionVector::zero().with(EmotionLabel::Joy, joy),
            confidence: 0.5,
            low_confidence: low,
            weights: BTreeMap::new(),
            timestamp: created_at,
        };
        MemoryRecord::new(&state, vec![joy, 1.0 - joy], created_at)
    }

    #[test]
    fn test_rank_orders_and_filters() {
        let now = Utc::now();
        let records = vec![
            record(0.0, now, false),
            record(1.0, now, false),
            record(0.9, now, false),
        ];
        let matches = rank_matches(&records, &[1.0, 0.0], 5, 0.8);
        assert_eq!(matches.len(), 2);
        assert!(matches[0].similarity >= matches[1].similarity);
        assert!(matches.iter().all(|m| m.similarity >= 0.8));
    }

    #[test]
    fn test_rank_ties_prefer_recent() {
        let now = Utc::now();
        let older = record(1.0, now - Duration::hours(1), false);
        let newer = record(1.0, now, false);
        let records = vec![older.clone(), newer.clone()];
        let matches = rank_matches(&records, &[1.0, 0.0], 2, 0.0);
        assert_eq!(matches[0].record.id, newer.id);
        assert_eq!(matches[1].record.id, older.id);
    }

    #[test]
    fn test_rank_k_zero() {
        let records = vec![record(1.0, Utc::now(), false)];
        assert!(rank_matches(&records, &[1.0, 0.0], 0, 0.0).is_empty());
    }

    #[test]
    fn test_apply_retention_age_then_cap() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            retention: Duration::days(10),
            max_entries: 2,
            vector_dim: 2,
        };
        let mut records = vec![
            record(0.1, now - Duration::days(20), false),
            record(0.2, now - Duration::days(3), false),
            record(0.3, now - Duration::days(2), false),
            record(0.4, now - Duration::days(1), false),
        ];
        let report = apply_retention(&mut records, now, &policy, policy.max_entries);
        assert_eq!(report, SweepReport { expired: 1, evicted: 1 });
        let kept: Vec<f32> = records.iter().map(|r| r.embedding[0]).collect();
        assert_eq!(kept, vec![0.3, 0.4]);

        // Idempotent
        let again = apply_retention(&mut records, now, &policy, policy.max_entries);
        assert_eq!(again.total(), 0);
    }

    #[test]
    fn test_huge_retention_saturates() {
        let now = Utc::now();
        let policy = RetentionPolicy::from_config(&MemoryConfig {
            retention_days: 200_000_000,
            ..MemoryConfig::default()
        });
        assert_eq!(policy.cutoff(now), DateTime::<Utc>::MIN_UTC);

        let mut records = vec![record(0.5, now - Duration::days(5000), false)];
        let report = apply_retention(&mut records, now, &policy, policy.max_entries);
        assert_eq!(report.total(), 0);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_patterns() {
        let now = Utc::now();
        let records = vec![record(1.0, now, true), record(0.0, now, false)];
        let p = EmotionPatterns::from_records(&records);
        assert_eq!(p.record_count, 2);
        assert!((p.mean_vector.get(EmotionLabel::Joy) - 0.5).abs() < 1e-6);
        assert_eq!(p.dominant, Some(EmotionLabel::Joy));
        assert!((p.low_confidence_ratio - 0.5).abs() < 1e-6);

        let empty = EmotionPatterns::from_records(&[]);
        assert_eq!(empty.dominant, None);
    }

    #[test]
    fn test_patterns_of_blank_states() {
        let now = Utc::now();
        let records = vec![record(0.0, now, true), record(0.0, now, true)];
        let p = EmotionPatterns::from_records(&records);
        assert_eq!(p.dominant, Some(EmotionLabel::Neutral));
    }

    #[test]
    fn test_dimension_check() {
        let policy = RetentionPolicy::default();
        assert!(policy.check_dimension(&[0.0; 8]).is_ok());
        assert!(matches!(
            policy.check_dimension(&[0.0; 3]),
            Err(MemoryError::EmbeddingDimension { expected: 8, actual: 3 })
        ));
    }
}
