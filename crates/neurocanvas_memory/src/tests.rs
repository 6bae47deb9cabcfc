use crate::sqlite::SqliteMemoryStore;
use crate::store::{MemoryStore, RetentionPolicy, SweepReport};
use chrono::{Duration, Utc};
use neurocanvas_core::{EmotionLabel, EmotionVector, FusedState, MemoryError};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

fn policy(max_entries: usize, retention_days: i64) -> RetentionPolicy {
    RetentionPolicy {
        retention: Duration::days(retention_days),
        max_entries,
        vector_dim: 3,
    }
}

fn state(session: &str, joy: f32, confidence: f32) -> FusedState {
    FusedState {
        id: Uuid::new_v4(),
        session_id: session.to_string(),
        vector: EmotionVector::zero()
            .with(EmotionLabel::Joy, joy)
            .with(EmotionLabel::Neutral, 1.0 - joy),
        confidence,
        low_confidence: confidence < 0.6,
        weights: BTreeMap::new(),
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_commit_roundtrip_through_sqlite() {
    let store = SqliteMemoryStore::in_memory(policy(100, 90)).await.unwrap();
    let s = state("alice", 0.7, 0.8);
    let committed = store.commit(&s, vec![0.7, 0.3, 0.8]).await.unwrap();

    let history = store.history("alice", 10, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    // Timestamps are persisted at millisecond precision, and the returned
    // record already carries the truncated value.
    assert_eq!(history[0], committed);
    assert_eq!(history[0].state.vector, s.vector);
    assert_eq!(history[0].embedding, vec![0.7, 0.3, 0.8]);
}

#[tokio::test]
async fn test_eviction_past_capacity() {
    const MAX: usize = 10;
    let store = SqliteMemoryStore::in_memory(policy(MAX, 90)).await.unwrap();
    let t0 = Utc::now() - Duration::hours(2);

    let mut ids = Vec::new();
    for i in 0..(MAX + 5) {
        let record = store
            .commit_at(&state("bob", 0.5, 0.9), vec![1.0, 0.0, 0.0], t0 + Duration::seconds(i as i64))
            .await
            .unwrap();
        ids.push(record.id);
    }

    assert_eq!(store.count("bob").await.unwrap(), MAX);
    let kept: HashSet<Uuid> = store.history("bob", 100, 0).await.unwrap().into_iter().map(|r| r.id).collect();
    for evicted in &ids[..5] {
        assert!(!kept.contains(evicted));
    }
    for survivor in &ids[5..] {
        assert!(kept.contains(survivor));
    }
}

#[tokio::test]
async fn test_zero_capacity_rejects_commit() {
    let store = SqliteMemoryStore::in_memory(policy(0, 90)).await.unwrap();
    let err = store.commit(&state("carol", 0.5, 0.9), vec![1.0, 0.0, 0.0]).await.unwrap_err();
    assert!(matches!(err, MemoryError::CapacityExceeded { max_entries: 0, .. }));
}

#[tokio::test]
async fn test_dimension_checked_on_commit_and_query() {
    let store = SqliteMemoryStore::in_memory(policy(10, 90)).await.unwrap();
    assert!(matches!(
        store.commit(&state("dan", 0.5, 0.9), vec![1.0; 8]).await,
        Err(MemoryError::EmbeddingDimension { expected: 3, actual: 8 })
    ));
    assert!(matches!(
        store.query_nearest("dan", &[1.0], 3, 0.0).await,
        Err(MemoryError::EmbeddingDimension { expected: 3, actual: 1 })
    ));
}

#[tokio::test]
async fn test_sweep_removes_everything_expired() {
    let store = SqliteMemoryStore::in_memory(policy(100, 30)).await.unwrap();
    let old = Utc::now() - Duration::days(45);
    for i in 0..4 {
        store
            .commit_at(&state("erin", 0.2, 0.7), vec![0.2, 0.8, 0.7], old + Duration::minutes(i))
            .await
            .unwrap();
    }
    store
        .commit_at(&state("frank", 0.2, 0.7), vec![0.2, 0.8, 0.7], old)
        .await
        .unwrap();

    let report = store.sweep().await.unwrap();
    assert_eq!(report, SweepReport { expired: 5, evicted: 0 });
    assert_eq!(store.count("erin").await.unwrap(), 0);
    assert_eq!(store.count("frank").await.unwrap(), 0);

    let again = store.sweep().await.unwrap();
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn test_sweep_forgets_emptied_sessions() {
    let store = SqliteMemoryStore::in_memory(policy(100, 30)).await.unwrap();
    store
        .commit_at(&state("gina", 0.4, 0.8), vec![0.4, 0.6, 0.8], Utc::now() - Duration::days(45))
        .await
        .unwrap();
    store.commit(&state("hank", 0.4, 0.8), vec![0.4, 0.6, 0.8]).await.unwrap();
    assert_eq!(store.tracked_sessions().await, 2);

    let report = store.sweep().await.unwrap();
    assert_eq!(report.expired, 1);
    // hank still has a live record, gina has none
    assert_eq!(store.tracked_sessions().await, 1);

    store.commit(&state("gina", 0.4, 0.8), vec![0.4, 0.6, 0.8]).await.unwrap();
    assert_eq!(store.count("gina").await.unwrap(), 1);
    assert_eq!(store.tracked_sessions().await, 2);
}

#[tokio::test]
async fn test_query_orders_and_filters() {
    let store = SqliteMemoryStore::in_memory(policy(100, 90)).await.unwrap();
    let now = Utc::now();
    store.commit_at(&state("gail", 1.0, 0.9), vec![1.0, 0.0, 0.0], now).await.unwrap();
    store.commit_at(&state("gail", 0.9, 0.9), vec![0.9, 0.1, 0.0], now).await.unwrap();
    store.commit_at(&state("gail", 0.0, 0.9), vec![0.0, 1.0, 0.0], now).await.unwrap();
    store.commit_at(&state("other", 1.0, 0.9), vec![1.0, 0.0, 0.0], now).await.unwrap();

    let matches = store.query_nearest("gail", &[1.0, 0.0, 0.0], 5, 0.8).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert!(matches[0].similarity > matches[1].similarity);
    assert!(matches.iter().all(|m| m.record.session_id == "gail"));

    let none = store.query_nearest("gail", &[0.0, 0.0, 1.0], 5, 0.8).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_query_ties_prefer_recent() {
    let store = SqliteMemoryStore::in_memory(policy(100, 90)).await.unwrap();
    let now = Utc::now();
    let older = store
        .commit_at(&state("hank", 1.0, 0.9), vec![1.0, 0.0, 0.0], now - Duration::hours(3))
        .await
        .unwrap();
    let newer = store
        .commit_at(&state("hank", 1.0, 0.9), vec![1.0, 0.0, 0.0], now - Duration::hours(1))
        .await
        .unwrap();

    let matches = store.query_nearest("hank", &[1.0, 0.0, 0.0], 2, 0.5).await.unwrap();
    assert_eq!(matches[0].record.id, newer.id);
    assert_eq!(matches[1].record.id, older.id);
    assert!(matches[0].record.last_accessed_at > newer.created_at);
}

#[tokio::test]
async fn test_history_and_patterns() {
    let store = SqliteMemoryStore::in_memory(policy(100, 90)).await.unwrap();
    let t0 = Utc::now() - Duration::minutes(10);
    store.commit_at(&state("ivy", 1.0, 0.9), vec![1.0, 0.0, 0.9], t0).await.unwrap();
    store
        .commit_at(&state("ivy", 0.0, 0.3), vec![0.0, 1.0, 0.3], t0 + Duration::minutes(1))
        .await
        .unwrap();

    let newest = store.history("ivy", 1, 0).await.unwrap();
    assert_eq!(newest[0].state.confidence, 0.3);
    let older = store.history("ivy", 1, 1).await.unwrap();
    assert_eq!(older[0].state.confidence, 0.9);

    let patterns = store.patterns("ivy").await.unwrap();
    assert_eq!(patterns.record_count, 2);
    assert!((patterns.mean_confidence - 0.6).abs() < 1e-6);
    assert!((patterns.low_confidence_ratio - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn test_persists_across_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("memories.db");

    {
        let store = SqliteMemoryStore::new(&path, policy(100, 90)).await.unwrap();
        store.commit(&state("jane", 0.4, 0.8), vec![0.4, 0.6, 0.8]).await.unwrap();
    }

    let reopened = SqliteMemoryStore::new(&path, policy(100, 90)).await.unwrap();
    assert_eq!(reopened.count("jane").await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_commits_respect_cap() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(
        SqliteMemoryStore::new(dir.path().join("concurrent.db"), policy(10, 90))
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..30 {
        let store = store.clone();
        let session = if i % 2 == 0 { "kim" } else { "lee" };
        handles.push(tokio::spawn(async move {
            store.commit(&state(session, 0.5, 0.9), vec![0.5, 0.5, 0.9]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.count("kim").await.unwrap(), 10);
    assert_eq!(store.count("lee").await.unwrap(), 10);
}
