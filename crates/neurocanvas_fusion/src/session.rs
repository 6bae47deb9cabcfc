//! Per-session history registry.
//!
//! Each session owns one [`SessionHistory`] behind its own async mutex, so
//! samples for one session are applied strictly in arrival order while
//! different sessions never contend. The outer map lock is only held long
//! enough to look up or insert a handle.

use crate::smoother::{HistoryWindow, SmoothingWindow, TemporalSmoother};
use chrono::{DateTime, Duration, Utc};
use neurocanvas_core::{FusedState, Modality};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Mutable history of one session: a smoothing window per modality plus the
/// most recent fused states.
#[derive(Debug)]
pub struct SessionHistory {
    windows: BTreeMap<Modality, SmoothingWindow>,
    recent: HistoryWindow<FusedState>,
    last_active: DateTime<Utc>,
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: BTreeMap::new(),
            recent: HistoryWindow::new(capacity),
            last_active: Utc::now(),
        }
    }

    /// The modality's smoothing window, created on first use.
    pub fn window_mut(&mut self, modality: Modality, smoother: &TemporalSmoother) -> &mut SmoothingWindow {
        self.last_active = Utc::now();
        self.windows.entry(modality).or_insert_with(|| smoother.window())
    }

    pub fn window(&self, modality: Modality) -> Option<&SmoothingWindow> {
        self.windows.get(&modality)
    }

    pub fn record(&mut self, state: FusedState) {
        self.last_active = Utc::now();
        self.recent.push(state);
    }

    /// Recent fused states, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &FusedState> {
        self.recent.iter()
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionHistory>>>>,
    capacity: usize,
}

impl SessionRegistry {
    /// `capacity` bounds every history window the registry creates.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Handle to the session's history, creating it if needed.
    pub async fn handle(&self, session_id: &str) -> Arc<Mutex<SessionHistory>> {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write().await;
        let capacity = self.capacity;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionHistory::new(capacity)))),
        )
    }

    /// Recent fused states of a session, oldest first. Empty for unknown sessions.
    pub async fn recent_states(&self, session_id: &str) -> Vec<FusedState> {
        let handle = match self.sessions.read().await.get(session_id) {
            Some(h) => Arc::clone(h),
            None => return Vec::new(),
        };
        let history = handle.lock().await;
        history.recent().cloned().collect()
    }

    /// Drop a session's history. Returns whether it existed.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::debug!("Session {} ended, history dropped", session_id);
        }
        removed
    }

    /// Drop sessions idle for longer than `max_idle`. A session whose handle
    /// is held outside the registry is in use and is kept, even if the holder
    /// has not locked it yet.
    pub async fn prune_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let cutoff = now
            .checked_sub_signed(max_idle)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(history) => history.last_active() >= cutoff,
                Err(_) => true,
            }
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} idle sessions", pruned);
        }
        pruned
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
