//! Periodic retention sweeping.
//!
//! Inline eviction on commit only ever touches the committing session and
//! only at the cap. Age-based expiry for quiet sessions needs a timer.

use crate::coordinator::FusionCoordinator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task that runs coordinator maintenance on a fixed interval.
///
/// Dropping the handle does not stop the task; call [`RetentionSweeper::abort`].
pub struct RetentionSweeper {
    handle: JoinHandle<()>,
    interval: Duration,
}

impl RetentionSweeper {
    /// Start sweeping every `interval`. The first pass runs one full interval
    /// after start. Returns `None` for a zero interval, which disables sweeping.
    pub fn spawn(coordinator: Arc<FusionCoordinator>, interval: Duration) -> Option<Self> {
        if interval.is_zero() {
            tracing::info!("Retention sweeper disabled (zero interval)");
            return None;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that one
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match coordinator.maintenance(Utc::now()).await {
                    Ok(report) => {
                        if report.sweep.total() > 0 || report.sessions_pruned > 0 {
                            tracing::info!(
                                "Retention sweep: {} expired, {} evicted, {} idle sessions dropped",
                                report.sweep.expired,
                                report.sweep.evicted,
                                report.sessions_pruned
                            );
                        }
                    }
                    Err(e) => tracing::warn!("Retention sweep failed: {}", e),
                }
            }
        });

        tracing::info!("Retention sweeper started (every {:?})", interval);
        Some(Self { handle, interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;
    use crate::store::{MemoryStore, RetentionPolicy};
    use neurocanvas_core::{CanvasConfig, EmotionVector, FusedState};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn old_state() -> FusedState {
        FusedState {
            id: Uuid::new_v4(),
            session_id: "quiet".to_string(),
            vector: EmotionVector::neutral(),
            confidence: 0.9,
            low_confidence: false,
            weights: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_zero_interval_disables() {
        let coordinator = Arc::new(FusionCoordinator::new(&CanvasConfig::default(), None));
        assert!(RetentionSweeper::spawn(coordinator, Duration::ZERO).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_expires_quiet_sessions() {
        let config = CanvasConfig::default();
        let store = Arc::new(InMemoryStore::new(RetentionPolicy::from_config(&config.memory)));
        let long_ago = Utc::now() - chrono::Duration::days(365);
        store
            .commit_at(&old_state(), vec![0.0; config.memory.vector_dim], long_ago)
            .await
            .unwrap();
        assert_eq!(store.count("quiet").await.unwrap(), 1);

        let dyn_store: Arc<dyn MemoryStore> = store.clone();
        let coordinator = Arc::new(FusionCoordinator::new(&config, Some(dyn_store)));
        let sweeper = RetentionSweeper::spawn(coordinator, Duration::from_secs(3600)).unwrap();

        // Paused clock auto-advances; the sweep fires at 3600s and finishes first.
        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(store.count("quiet").await.unwrap(), 0);

        sweeper.abort();
    }
}
