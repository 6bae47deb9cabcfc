//! Fusion Coordinator - one request from raw scores to generator controls
//!
//! The coordinator owns the fusion engine (and through it the per-session
//! history registry), the parameter mapper and the optional memory store.
//! A request is:
//!
//! 1. normalized per modality,
//! 2. fused into a state for its session,
//! 3. mapped to art parameters,
//! 4. committed to memory and used to recall similar past states.
//!
//! Steps 1-3 decide the outcome. Memory is best-effort: any failure there is
//! logged, flagged on the response as `memory_degraded`, and the parameters
//! still go out.

use chrono::{DateTime, Utc};
use neurocanvas_core::{
    ArtParameters, CanvasConfig, FusedState, FusionError, MemoryConfig, MemoryResult, RawSignal,
};
use neurocanvas_fusion::{normalize_all, FusionEngine, ParameterMapper};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::{EmotionEmbedder, Embedder};
use crate::store::{EmotionPatterns, MemoryMatch, MemoryRecord, MemoryStore, SweepReport};

/// One fusion request: the raw classifier outputs for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionRequest {
    pub session_id: String,
    pub signals: Vec<RawSignal>,
    /// Recall similar past states alongside the answer.
    #[serde(default = "default_recall")]
    pub recall: bool,
}

fn default_recall() -> bool {
    true
}

/// A recalled state, shaped for the personalization view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub similarity: f32,
    pub state: FusedState,
    pub timestamp: DateTime<Utc>,
}

impl From<MemoryMatch> for MemorySnippet {
    fn from(m: MemoryMatch) -> Self {
        Self {
            similarity: m.similarity,
            timestamp: m.record.created_at,
            state: m.record.state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionResponse {
    pub parameters: ArtParameters,
    pub state: FusedState,
    /// Most similar first. Never includes the state committed by this request.
    pub memories: Vec<MemorySnippet>,
    /// Some memory step failed; parameters and state are still valid.
    pub memory_degraded: bool,
}

/// Personalized starting point built from a session's stored memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub patterns: EmotionPatterns,
    /// The session's typical mood in a few words. None without history.
    pub summary: Option<String>,
    /// Parameters for the session's mean state. None without history.
    pub parameters: Option<ArtParameters>,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub sweep: SweepReport,
    pub sessions_pruned: usize,
}

pub struct FusionCoordinator {
    engine: FusionEngine,
    mapper: ParameterMapper,
    /// None when the memory system is disabled.
    memory: Option<Arc<dyn MemoryStore>>,
    embedder: Arc<dyn Embedder>,
    memory_config: MemoryConfig,
}

impl FusionCoordinator {
    /// Build from configuration. `memory` is ignored when `memory.enabled` is false.
    pub fn new(config: &CanvasConfig, memory: Option<Arc<dyn MemoryStore>>) -> Self {
        let memory = if config.memory.enabled {
            memory
        } else {
            if memory.is_some() {
                tracing::info!("Memory system disabled by configuration, store will not be used");
            }
            None
        };

        Self {
            engine: FusionEngine::from_config(&config.emotion),
            mapper: ParameterMapper::new(config.neural.clone()),
            memory,
            embedder: Arc::new(EmotionEmbedder),
            memory_config: config.memory.clone(),
        }
    }

    /// Replace the built-in embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        if embedder.dimension() != self.memory_config.vector_dim {
            tracing::warn!(
                "Embedder produces {} dimensions but memory expects {}; commits will be rejected",
                embedder.dimension(),
                self.memory_config.vector_dim
            );
        }
        self.embedder = embedder;
        self
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    pub fn mapper(&self) -> &ParameterMapper {
        &self.mapper
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory.is_some()
    }

    /// Run one request through the whole pipeline.
    ///
    /// Fails only on fusion errors. Memory failures degrade the response
    /// instead.
    pub async fn process(&self, request: FusionRequest) -> Result<FusionResponse, FusionError> {
        let samples = normalize_all(&request.signals)?;
        let state = self.engine.fuse(&request.session_id, samples).await?;
        let parameters = self.mapper.map(&state);

        if state.low_confidence {
            tracing::debug!(
                "Low-confidence state for session {} ({:.2})",
                request.session_id,
                state.confidence
            );
        }

        let mut response = FusionResponse {
            parameters,
            state,
            memories: Vec::new(),
            memory_degraded: false,
        };

        let Some(store) = &self.memory else {
            return Ok(response);
        };

        let embedding = match self.embedder.embed(&response.state) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!("Failed to embed fused state: {:#}", e);
                response.memory_degraded = true;
                return Ok(response);
            }
        };

        let committed: Option<Uuid> = match store.commit(&response.state, embedding.clone()).await {
            Ok(record) => {
                tracing::debug!("Committed memory {} for session {}", record.id, record.session_id);
                Some(record.id)
            }
            Err(e) => {
                tracing::warn!("Failed to commit memory for session {}: {}", request.session_id, e);
                response.memory_degraded = true;
                None
            }
        };

        if request.recall {
            let k = self.memory_config.recall_k;
            // One extra in case the record just committed ranks among the top k
            let query = store
                .query_nearest(
                    &request.session_id,
                    &embedding,
                    k.saturating_add(1),
                    self.memory_config.similarity_threshold,
                )
                .await;
            match query {
                Ok(matches) => {
                    response.memories = matches
                        .into_iter()
                        .filter(|m| Some(m.record.id) != committed)
                        .take(k)
                        .map(MemorySnippet::from)
                        .collect();
                }
                Err(e) => {
                    tracing::warn!("Failed to recall memories for session {}: {}", request.session_id, e);
                    response.memory_degraded = true;
                }
            }
        }

        Ok(response)
    }

    /// Recent fused states held in session history, oldest first.
    pub async fn recent_states(&self, session_id: &str) -> Vec<FusedState> {
        self.engine.sessions().recent_states(session_id).await
    }

    /// Persisted records of a session, newest first. Empty when memory is off.
    pub async fn history(&self, session_id: &str, limit: usize, offset: usize) -> MemoryResult<Vec<MemoryRecord>> {
        match &self.memory {
            Some(store) => store.history(session_id, limit, offset).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn patterns(&self, session_id: &str) -> MemoryResult<EmotionPatterns> {
        match &self.memory {
            Some(store) => store.patterns(session_id).await,
            None => Ok(EmotionPatterns::from_records(&[])),
        }
    }

    /// Suggest generator parameters from the session's typical state: the mean
    /// of its stored memories at their mean confidence, run through the mapper.
    pub async fn recommendations(&self, session_id: &str) -> MemoryResult<Recommendations> {
        let patterns = self.patterns(session_id).await?;
        if patterns.record_count == 0 {
            return Ok(Recommendations {
                patterns,
                summary: None,
                parameters: None,
            });
        }

        let typical = FusedState {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            vector: patterns.mean_vector,
            confidence: patterns.mean_confidence,
            low_confidence: patterns.mean_confidence < self.engine.policy().threshold,
            weights: BTreeMap::new(),
            timestamp: patterns.last_seen.unwrap_or_else(Utc::now),
        };

        Ok(Recommendations {
            summary: Some(typical.vector.describe()),
            parameters: Some(self.mapper.map(&typical)),
            patterns,
        })
    }

    /// Drop the session's smoothing and recent-state history. Persisted
    /// memories are kept.
    pub async fn end_session(&self, session_id: &str) -> bool {
        self.engine.sessions().end_session(session_id).await
    }

    /// Sweep memory and drop sessions idle for longer than one cleanup interval.
    pub async fn maintenance(&self, now: DateTime<Utc>) -> MemoryResult<MaintenanceReport> {
        let sweep = match &self.memory {
            Some(store) => store.sweep_at(now).await?,
            None => SweepReport::default(),
        };

        let sessions_pruned = match chrono::Duration::from_std(self.memory_config.cleanup_interval()) {
            Ok(idle) if idle > chrono::Duration::zero() => {
                self.engine.sessions().prune_idle(now, idle).await
            }
            _ => 0,
        };

        Ok(MaintenanceReport { sweep, sessions_pruned })
    }
}
