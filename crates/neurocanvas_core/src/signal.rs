//! Signal, fused-state and art-parameter records exchanged between components.

use crate::emotion::{sanitize_intensity, EmotionVector};
use crate::error::FusionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Input channel an emotion estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Voice,
    Face,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Text, Modality::Voice, Modality::Face];

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Voice => "voice",
            Modality::Face => "face",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Modality::Text),
            "voice" => Ok(Modality::Voice),
            "face" => Ok(Modality::Face),
            _ => Err(FusionError::UnsupportedModality(s.to_string())),
        }
    }
}

/// Raw output of one modality classifier, before normalization.
///
/// The label set and scale are whatever the upstream model emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub modality: String,
    pub scores: BTreeMap<String, f32>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// One canonical emotion estimate from a single modality. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalitySample {
    modality: Modality,
    vector: EmotionVector,
    confidence: f32,
    timestamp: DateTime<Utc>,
}

impl ModalitySample {
    pub fn new(
        modality: Modality,
        vector: EmotionVector,
        confidence: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            modality,
            vector,
            confidence: sanitize_intensity(confidence),
            timestamp,
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn vector(&self) -> &EmotionVector {
        &self.vector
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// The fused emotional state of one session at one moment.
///
/// Created by the fusion engine and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedState {
    pub id: Uuid,
    pub session_id: String,
    pub vector: EmotionVector,
    /// Aggregate confidence after the partial-modality discount.
    pub confidence: f32,
    /// Set when `confidence` falls below the configured floor.
    pub low_confidence: bool,
    /// Renormalized weight of each modality that contributed. Sums to 1.
    pub weights: BTreeMap<Modality, f32>,
    pub timestamp: DateTime<Utc>,
}

impl FusedState {
    pub fn modalities(&self) -> impl Iterator<Item = Modality> + '_ {
        self.weights.keys().copied()
    }

    /// Context summary for the narrative generator.
    pub fn describe(&self) -> String {
        format!(
            "{} (confidence {:.2}{})",
            self.vector.describe(),
            self.confidence,
            if self.low_confidence { ", low" } else { "" }
        )
    }
}

/// Control parameters for the neuromorphic art generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtParameters {
    pub layers: u32,
    pub nodes: u32,
    pub connection_density: f32,
    pub activation_threshold: f32,
    pub decay_rate: f32,
}
