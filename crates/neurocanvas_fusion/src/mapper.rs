//! Parameter Mapper
//!
//! Translates a fused emotional state into the control parameters of the
//! neuromorphic art generator. Each parameter is an explicit, bounded formula
//! of a few emotion dimensions, anchored to the configured base values. There
//! is no learned model and no randomness: the same state always yields the
//! same parameters, even though the downstream renderer may be stochastic.
//!
//! | parameter | driven by | range |
//! |---|---|---|
//! | layers | arousal × confidence | `[base, 4·base]` |
//! | nodes | (arousal + intensity)/2 × confidence | `[base, 4·base]` |
//! | connection density | joy up, sadness/fear down | `[0, 1]` |
//! | activation threshold | neutral up, intensity down | `[0, 1]` |
//! | decay rate | inverse of confidence | `[base, 2·base] ∩ [0, 1]` |

use neurocanvas_core::{ArtParameters, EmotionLabel, EmotionVector, FusedState, NeuralConfig};
use serde::{Deserialize, Serialize};

/// Growth headroom for the size parameters: at most `1 + SCALE_HEADROOM` times base.
const SCALE_HEADROOM: f32 = 3.0;

/// The generator parameters, each with its own formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Layers,
    Nodes,
    ConnectionDensity,
    ActivationThreshold,
    DecayRate,
}

impl ParameterKind {
    pub const ALL: [ParameterKind; 5] = [
        ParameterKind::Layers,
        ParameterKind::Nodes,
        ParameterKind::ConnectionDensity,
        ParameterKind::ActivationThreshold,
        ParameterKind::DecayRate,
    ];
}

/// Arousal-type activation: anger and surprise dominate, fear counts half,
/// joy a quarter. Normalized into `[0, 1]`.
pub fn arousal(v: &EmotionVector) -> f32 {
    let raw = v.get(EmotionLabel::Anger)
        + v.get(EmotionLabel::Surprise)
        + 0.5 * v.get(EmotionLabel::Fear)
        + 0.25 * v.get(EmotionLabel::Joy);
    (raw / 2.75).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct ParameterMapper {
    base: NeuralConfig,
}

impl ParameterMapper {
    /// Unit-range base values are clamped into `[0, 1]`; non-finite ones fall
    /// back to their defaults.
    pub fn new(base: NeuralConfig) -> Self {
        let defaults = NeuralConfig::default();
        let base = NeuralConfig {
            connection_density: unit_base("connection_density", base.connection_density, defaults.connection_density),
            activation_threshold: unit_base(
                "activation_threshold",
                base.activation_threshold,
                defaults.activation_threshold,
            ),
            decay_rate: unit_base("decay_rate", base.decay_rate, defaults.decay_rate),
            ..base
        };
        Self { base }
    }

    pub fn base(&self) -> &NeuralConfig {
        &self.base
    }

    /// Inclusive `(min, max)` of a parameter under this mapper's base values.
    pub fn bounds(&self, kind: ParameterKind) -> (f32, f32) {
        match kind {
            ParameterKind::Layers => size_bounds(self.base.layers),
            ParameterKind::Nodes => size_bounds(self.base.nodes),
            ParameterKind::ConnectionDensity | ParameterKind::ActivationThreshold => (0.0, 1.0),
            ParameterKind::DecayRate => {
                let base = self.base.decay_rate.clamp(0.0, 1.0);
                (base, (2.0 * base).min(1.0))
            }
        }
    }

    /// Evaluate one parameter formula.
    pub fn evaluate(&self, kind: ParameterKind, state: &FusedState) -> f32 {
        let v = &state.vector;
        let c = state.confidence.clamp(0.0, 1.0);
        let (lo, hi) = self.bounds(kind);

        let value = match kind {
            ParameterKind::Layers => {
                let drive = arousal(v) * c;
                (self.base.layers as f32 * (1.0 + SCALE_HEADROOM * drive)).round()
            }
            ParameterKind::Nodes => {
                let drive = 0.5 * (arousal(v) + v.intensity()) * c;
                (self.base.nodes as f32 * (1.0 + SCALE_HEADROOM * drive)).round()
            }
            ParameterKind::ConnectionDensity => {
                self.base.connection_density + 0.4 * v.get(EmotionLabel::Joy)
                    - 0.25 * (v.get(EmotionLabel::Sadness) + v.get(EmotionLabel::Fear))
            }
            ParameterKind::ActivationThreshold => {
                self.base.activation_threshold
                    * (1.0 + 0.5 * v.get(EmotionLabel::Neutral) - 0.5 * v.intensity())
            }
            ParameterKind::DecayRate => self.base.decay_rate * (2.0 - c),
        };

        value.clamp(lo, hi)
    }

    /// Map a fused state to generator parameters.
    pub fn map(&self, state: &FusedState) -> ArtParameters {
        ArtParameters {
            layers: self.evaluate(ParameterKind::Layers, state) as u32,
            nodes: self.evaluate(ParameterKind::Nodes, state) as u32,
            connection_density: self.evaluate(ParameterKind::ConnectionDensity, state),
            activation_threshold: self.evaluate(ParameterKind::ActivationThreshold, state),
            decay_rate: self.evaluate(ParameterKind::DecayRate, state),
        }
    }
}

impl Default for ParameterMapper {
    fn default() -> Self {
        Self::new(NeuralConfig::default())
    }
}

fn unit_base(name: &str, value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        tracing::warn!("Non-finite neural.{} ({}), using {}", name, value, fallback);
        fallback
    }
}

fn size_bounds(base: u32) -> (f32, f32) {
    let base = base.max(1) as f32;
    (base, base * (1.0 + SCALE_HEADROOM))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn state(pairs: &[(EmotionLabel, f32)], confidence: f32) -> FusedState {
        FusedState {
            id: Uuid::new_v4(),
            session_id: "s".to_string(),
            vector: EmotionVector::from_pairs(pairs.iter().copied()),
            confidence,
            low_confidence: false,
            weights: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_neutral_state_sits_at_base() {
        let mapper = ParameterMapper::default();
        let p = mapper.map(&state(&[(EmotionLabel::Neutral, 1.0)], 1.0));
        assert_eq!(p.layers, 3);
        assert_eq!(p.nodes, 64);
        assert!((p.connection_density - 0.3).abs() < 1e-6);
        assert!((p.activation_threshold - 0.75).abs() < 1e-6);
        assert!((p.decay_rate - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_anger_grows_network() {
        let mapper = ParameterMapper::default();
        let calm = mapper.map(&state(&[(EmotionLabel::Neutral, 0.8)], 0.9));
        let angry = mapper.map(&state(
            &[(EmotionLabel::Anger, 1.0), (EmotionLabel::Surprise, 0.9)],
            0.9,
        ));
        assert!(angry.layers > calm.layers);
        assert!(angry.nodes > calm.nodes);
        assert!(angry.layers <= 12);
        assert!(angry.nodes <= 256);
    }

    #[test]
    fn test_valence_moves_density() {
        let mapper = ParameterMapper::default();
        let happy = mapper.map(&state(&[(EmotionLabel::Joy, 0.9)], 0.8));
        let sad = mapper.map(&state(
            &[(EmotionLabel::Sadness, 0.9), (EmotionLabel::Fear, 0.6)],
            0.8,
        ));
        assert!(happy.connection_density > 0.3);
        assert!(sad.connection_density < 0.3);
        assert!(sad.connection_density >= 0.0);
    }

    #[test]
    fn test_low_confidence_decays_faster() {
        let mapper = ParameterMapper::default();
        let sure = mapper.map(&state(&[(EmotionLabel::Joy, 0.5)], 1.0));
        let unsure = mapper.map(&state(&[(EmotionLabel::Joy, 0.5)], 0.1));
        assert!(unsure.decay_rate > sure.decay_rate);
        assert!(unsure.decay_rate <= 0.2 + 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let mapper = ParameterMapper::default();
        let s = state(&[(EmotionLabel::Fear, 0.7), (EmotionLabel::Joy, 0.2)], 0.65);
        assert_eq!(mapper.map(&s), mapper.map(&s));
    }

    #[test]
    fn test_bounds_table() {
        let mapper = ParameterMapper::default();
        assert_eq!(mapper.bounds(ParameterKind::Layers), (3.0, 12.0));
        assert_eq!(mapper.bounds(ParameterKind::Nodes), (64.0, 256.0));
        assert_eq!(mapper.bounds(ParameterKind::DecayRate), (0.1, 0.2));
    }

    #[test]
    fn test_non_finite_base_falls_back() {
        let mapper = ParameterMapper::new(NeuralConfig {
            decay_rate: f32::NAN,
            connection_density: f32::INFINITY,
            activation_threshold: 1.7,
            ..NeuralConfig::default()
        });
        assert_eq!(mapper.bounds(ParameterKind::DecayRate), (0.1, 0.2));
        assert_eq!(mapper.base().activation_threshold, 1.0);

        let p = mapper.map(&state(&[(EmotionLabel::Joy, 0.5)], 0.5));
        assert!(p.decay_rate.is_finite());
        assert!((0.0..=1.0).contains(&p.connection_density));
    }
}
