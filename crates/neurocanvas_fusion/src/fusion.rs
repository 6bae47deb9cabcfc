//! Emotion Fusion Engine
//!
//! Combines the smoothed vectors of whichever modalities are present into one
//! [`FusedState`]. Weights are the sample confidences renormalized over the
//! present modalities only: a missing modality contributes no weight rather
//! than a zero vector, so it never drags the result toward neutral.

use crate::session::SessionRegistry;
use crate::smoother::TemporalSmoother;
use chrono::{DateTime, Utc};
use neurocanvas_core::emotion::sanitize_intensity;
use neurocanvas_core::{EmotionConfig, EmotionVector, FusedState, FusionError, Modality, ModalitySample};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// How aggregate confidence is derived and judged.
#[derive(Debug, Clone, Copy)]
pub struct ConfidencePolicy {
    /// States below this are flagged `low_confidence`.
    pub threshold: f32,
    /// Multiplicative penalty per modality missing from the full set.
    pub modality_discount: f32,
}

impl ConfidencePolicy {
    pub fn from_config(config: &EmotionConfig) -> Self {
        Self {
            threshold: config.confidence_threshold,
            modality_discount: config.modality_discount,
        }
    }

    /// Corroboration factor for `present` distinct modalities.
    /// 1.0 when all modalities agree to contribute, lower for fewer.
    pub fn corroboration(&self, present: usize) -> f32 {
        let missing = Modality::ALL.len().saturating_sub(present) as f32;
        (1.0 - self.modality_discount * missing).clamp(0.0, 1.0)
    }
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self::from_config(&EmotionConfig::default())
    }
}

/// One modality's contribution to a fusion: its smoothed vector and the
/// confidence of its latest sample.
#[derive(Debug, Clone, Copy)]
pub struct Contribution {
    pub vector: EmotionVector,
    pub confidence: f32,
}

/// Pure combination step. Returns `(vector, confidence, weights)`.
///
/// If every confidence is zero the present modalities share equal weight.
pub fn combine(
    contributions: &BTreeMap<Modality, Contribution>,
    policy: &ConfidencePolicy,
) -> (EmotionVector, f32, BTreeMap<Modality, f32>) {
    let total: f32 = contributions.values().map(|c| c.confidence).sum();
    let count = contributions.len().max(1) as f32;

    let weights: BTreeMap<Modality, f32> = contributions
        .iter()
        .map(|(m, c)| {
            let w = if total > f32::EPSILON {
                c.confidence / total
            } else {
                1.0 / count
            };
            (*m, w)
        })
        .collect();

    let vector = EmotionVector::weighted_sum(
        contributions
            .iter()
            .map(|(m, c)| (&c.vector, weights.get(m).copied().unwrap_or(0.0))),
    );

    let weighted_confidence: f32 = contributions
        .iter()
        .map(|(m, c)| c.confidence * weights.get(m).copied().unwrap_or(0.0))
        .sum();
    let confidence =
        sanitize_intensity(weighted_confidence * policy.corroboration(contributions.len()));

    (vector, confidence, weights)
}

pub struct FusionEngine {
    smoother: TemporalSmoother,
    policy: ConfidencePolicy,
    sessions: Arc<SessionRegistry>,
}

impl FusionEngine {
    pub fn new(smoother: TemporalSmoother, policy: ConfidencePolicy, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            smoother,
            policy,
            sessions,
        }
    }

    /// Engine with its own session registry, configured from `config`.
    pub fn from_config(config: &EmotionConfig) -> Self {
        Self::new(
            TemporalSmoother::from_config(config),
            ConfidencePolicy::from_config(config),
            Arc::new(SessionRegistry::new(config.history_length)),
        )
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn policy(&self) -> &ConfidencePolicy {
        &self.policy
    }

    /// Fuse the samples of one request into a new state for `session_id`.
    ///
    /// Samples are smoothed per (session, modality) in timestamp order; ties
    /// keep input order. Several samples of one modality all feed its window,
    /// and the latest one supplies the modality's confidence.
    pub async fn fuse(
        &self,
        session_id: &str,
        samples: Vec<ModalitySample>,
    ) -> Result<FusedState, FusionError> {
        let timestamp: DateTime<Utc> = samples
            .iter()
            .map(|s| s.timestamp())
            .max()
            .ok_or(FusionError::NoSignalAvailable)?;

        let mut ordered = samples;
        ordered.sort_by_key(|s| s.timestamp());

        let handle = self.sessions.handle(session_id).await;
        let mut history = handle.lock().await;

        let mut contributions: BTreeMap<Modality, Contribution> = BTreeMap::new();
        for sample in &ordered {
            let window = history.window_mut(sample.modality(), &self.smoother);
            let smoothed = self.smoother.smooth(window, sample.vector());
            contributions.insert(
                sample.modality(),
                Contribution {
                    vector: smoothed,
                    confidence: sample.confidence(),
                },
            );
        }

        let (vector, confidence, weights) = combine(&contributions, &self.policy);
        let state = FusedState {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            vector,
            confidence,
            low_confidence: confidence < self.policy.threshold,
            weights,
            timestamp,
        };

        history.record(state.clone());

        tracing::trace!(
            "Fused {} modalities for session {}: {} (confidence={:.2})",
            state.weights.len(),
            session_id,
            state.vector.describe(),
            state.confidence
        );

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurocanvas_core::EmotionLabel;

    fn sample(modality: Modality, joy: f32, confidence: f32) -> ModalitySample {
        ModalitySample::new(
            modality,
            EmotionVector::zero()
                .with(EmotionLabel::Joy, joy)
                .with(EmotionLabel::Sadness, 0.1),
            confidence,
            Utc::now(),
        )
    }

    fn engine() -> FusionEngine {
        FusionEngine::from_config(&EmotionConfig::default())
    }

    #[tokio::test]
    async fn test_empty_samples() {
        let err = engine().fuse("s", vec![]).await.unwrap_err();
        assert_eq!(err, FusionError::NoSignalAvailable);
    }

    #[tokio::test]
    async fn test_single_text_sample() {
        let engine = engine();
        let s = sample(Modality::Text, 0.8, 0.9);
        let state = engine.fuse("s", vec![s.clone()]).await.unwrap();

        // Fresh window: smoothed == raw
        assert_eq!(state.vector, *s.vector());
        assert!(state.confidence <= 0.9);
        assert!((state.confidence - 0.9 * 0.7).abs() < 1e-6);
        assert_eq!(state.weights.get(&Modality::Text), Some(&1.0));
        assert_eq!(state.session_id, "s");
    }

    #[tokio::test]
    async fn test_two_modalities_weighted_by_confidence() {
        let engine = engine();
        let state = engine
            .fuse(
                "s",
                vec![sample(Modality::Text, 0.9, 0.8), sample(Modality::Voice, 0.2, 0.4)],
            )
            .await
            .unwrap();
        let joy = state.vector.get(EmotionLabel::Joy);
        assert!((joy - 0.7333).abs() < 1e-3, "joy={}", joy);
        let sum: f32 = state.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_low_confidence_flagged_not_rejected() {
        let engine = engine();
        let state = engine.fuse("s", vec![sample(Modality::Face, 0.5, 0.3)]).await.unwrap();
        assert!(state.low_confidence);

        let state = engine
            .fuse(
                "t",
                vec![
                    sample(Modality::Text, 0.5, 0.9),
                    sample(Modality::Voice, 0.5, 0.9),
                    sample(Modality::Face, 0.5, 0.9),
                ],
            )
            .await
            .unwrap();
        assert!(!state.low_confidence);
        assert!((state.confidence - 0.9).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_zero_confidence_equal_weights() {
        let engine = engine();
        let state = engine
            .fuse(
                "s",
                vec![sample(Modality::Text, 1.0, 0.0), sample(Modality::Face, 0.0, 0.0)],
            )
            .await
            .unwrap();
        assert!((state.vector.get(EmotionLabel::Joy) - 0.5).abs() < 1e-6);
        assert_eq!(state.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_smoothing_carries_across_calls() {
        let engine = engine();
        engine.fuse("s", vec![sample(Modality::Text, 0.0, 0.9)]).await.unwrap();
        let state = engine.fuse("s", vec![sample(Modality::Text, 1.0, 0.9)]).await.unwrap();
        // alpha = 0.7 by default
        assert!((state.vector.get(EmotionLabel::Joy) - 0.7).abs() < 1e-6);

        // Other sessions are unaffected
        let other = engine.fuse("t", vec![sample(Modality::Text, 1.0, 0.9)]).await.unwrap();
        assert_eq!(other.vector.get(EmotionLabel::Joy), 1.0);

        assert_eq!(engine.sessions().recent_states("s").await.len(), 2);
    }

    #[test]
    fn test_corroboration() {
        let policy = ConfidencePolicy::default();
        assert!((policy.corroboration(1) - 0.7).abs() < 1e-6);
        assert!((policy.corroboration(2) - 0.85).abs() < 1e-6);
        assert_eq!(policy.corroboration(3), 1.0);
    }
}
