//! Canonical emotion representation.
//!
//! Every modality classifier speaks its own label dialect. Downstream of the
//! normalizer everything is expressed as an [`EmotionVector`] over the closed
//! [`EmotionLabel`] set: one independent intensity per label, each in `[0, 1]`.
//! Intensities are per-label confidences, not a probability simplex, so they
//! need not sum to 1.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of canonical emotion labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Neutral,
}

impl EmotionLabel {
    /// All labels in canonical order. Index positions match [`EmotionVector::as_slice`].
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Surprise,
        EmotionLabel::Disgust,
        EmotionLabel::Neutral,
    ];

    pub const COUNT: usize = Self::ALL.len();

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        EmotionLabel::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == needle)
            .ok_or_else(|| format!("unknown emotion label: {}", s))
    }
}

/// Replace NaN/Inf with 0 and clamp into `[0, 1]`.
#[inline]
pub fn sanitize_intensity(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        tracing::warn!("Non-finite emotion intensity {} replaced with 0", v);
        0.0
    }
}

/// Intensity per canonical label.
///
/// Backed by a fixed array so every label is always present. All writes go
/// through [`sanitize_intensity`], so values are always finite and in `[0, 1]`.
/// Serializes as a `label -> intensity` map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<EmotionLabel, f32>",
    into = "BTreeMap<EmotionLabel, f32>"
)]
pub struct EmotionVector {
    values: [f32; EmotionLabel::COUNT],
}

impl Default for EmotionVector {
    fn default() -> Self {
        Self::zero()
    }
}

impl EmotionVector {
    /// All intensities at 0.
    pub fn zero() -> Self {
        Self {
            values: [0.0; EmotionLabel::COUNT],
        }
    }

    /// A calm baseline: only `neutral` is active.
    pub fn neutral() -> Self {
        Self::zero().with(EmotionLabel::Neutral, 1.0)
    }

    /// Build from `(label, intensity)` pairs. Unlisted labels default to 0.
    /// If a label appears more than once the last value wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (EmotionLabel, f32)>,
    {
        let mut v = Self::zero();
        for (label, intensity) in pairs {
            v.set(label, intensity);
        }
        v
    }

    /// Builder-style setter.
    pub fn with(mut self, label: EmotionLabel, intensity: f32) -> Self {
        self.set(label, intensity);
        self
    }

    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.values[label.index()]
    }

    pub fn set(&mut self, label: EmotionLabel, intensity: f32) {
        self.values[label.index()] = sanitize_intensity(intensity);
    }

    /// Intensities in [`EmotionLabel::ALL`] order.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL.iter().map(move |&l| (l, self.get(l)))
    }

    /// Exponential blend toward `newer`: `alpha * newer + (1 - alpha) * self`.
    pub fn blend(&self, newer: &EmotionVector, alpha: f32) -> EmotionVector {
        let alpha = alpha.clamp(0.0, 1.0);
        let mut out = Self::zero();
        for label in EmotionLabel::ALL {
            let v = alpha * newer.get(label) + (1.0 - alpha) * self.get(label);
            out.set(label, v);
        }
        out
    }

    /// Weighted sum of vectors. Weights are used as given; callers normalize.
    pub fn weighted_sum<'a, I>(parts: I) -> EmotionVector
    where
        I: IntoIterator<Item = (&'a EmotionVector, f32)>,
    {
        let mut acc = [0.0f32; EmotionLabel::COUNT];
        for (vector, weight) in parts {
            for (slot, value) in acc.iter_mut().zip(vector.values.iter()) {
                *slot += value * weight;
            }
        }
        let mut out = Self::zero();
        for (label, value) in EmotionLabel::ALL.iter().zip(acc) {
            out.set(*label, value);
        }
        out
    }

    /// Largest per-label absolute difference.
    pub fn max_delta(&self, other: &EmotionVector) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }

    /// Strongest label and its intensity. Ties resolve to the earlier label in
    /// canonical order; an all-zero vector is `(Neutral, 0.0)`.
    pub fn dominant(&self) -> (EmotionLabel, f32) {
        let mut best = (EmotionLabel::Neutral, 0.0);
        for (label, v) in self.iter() {
            if v > best.1 {
                best = (label, v);
            }
        }
        best
    }

    /// Strongest non-neutral intensity. 0 for a purely neutral vector.
    pub fn intensity(&self) -> f32 {
        self.iter()
            .filter(|(l, _)| *l != EmotionLabel::Neutral)
            .map(|(_, v)| v)
            .fold(0.0, f32::max)
    }

    /// Short English summary for narrative-generator context.
    pub fn describe(&self) -> String {
        let intensity = self.intensity();
        if intensity < 0.2 {
            return "calm, without a clear emotional tone".to_string();
        }

        let (label, _) = self
            .iter()
            .filter(|(l, _)| *l != EmotionLabel::Neutral)
            .fold((EmotionLabel::Neutral, f32::MIN), |best, (l, v)| {
                if v > best.1 {
                    (l, v)
                } else {
                    best
                }
            });

        let degree = if intensity < 0.4 {
            "slightly"
        } else if intensity < 0.6 {
            "moderately"
        } else if intensity < 0.8 {
            "strongly"
        } else {
            "intensely"
        };

        let word = match label {
            EmotionLabel::Joy => "joyful",
            EmotionLabel::Sadness => "sad",
            EmotionLabel::Anger => "angry",
            EmotionLabel::Fear => "afraid",
            EmotionLabel::Surprise => "surprised",
            EmotionLabel::Disgust => "disgusted",
            EmotionLabel::Neutral => "neutral",
        };

        format!("{} {}", degree, word)
    }
}

impl From<BTreeMap<EmotionLabel, f32>> for EmotionVector {
    fn from(map: BTreeMap<EmotionLabel, f32>) -> Self {
        Self::from_pairs(map)
    }
}

impl From<EmotionVector> for BTreeMap<EmotionLabel, f32> {
    fn from(v: EmotionVector) -> Self {
        v.iter().collect()
    }
}
