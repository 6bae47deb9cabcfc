//! Fixed lookup tables from classifier label dialects to canonical labels.
//!
//! Each upstream model has its own vocabulary: the text model emits
//! `optimism`, the voice model emits `calm`, the face model emits `contempt`.
//! Labels not listed for a modality are unknown and get dropped by the
//! normalizer.

use crate::emotion::EmotionLabel;
use crate::signal::Modality;

use EmotionLabel::*;

const SHARED: &[(&str, EmotionLabel)] = &[
    ("joy", Joy),
    ("sadness", Sadness),
    ("anger", Anger),
    ("fear", Fear),
    ("surprise", Surprise),
    ("disgust", Disgust),
    ("neutral", Neutral),
];

const TEXT: &[(&str, EmotionLabel)] = &[
    ("optimism", Joy),
    ("love", Joy),
    ("happiness", Joy),
    ("admiration", Joy),
    ("grief", Sadness),
    ("disappointment", Sadness),
    ("annoyance", Anger),
    ("nervousness", Fear),
    ("realization", Surprise),
    ("disapproval", Disgust),
];

const VOICE: &[(&str, EmotionLabel)] = &[
    ("happy", Joy),
    ("sad", Sadness),
    ("angry", Anger),
    ("fearful", Fear),
    ("surprised", Surprise),
    ("calm", Neutral),
];

const FACE: &[(&str, EmotionLabel)] = &[
    ("happy", Joy),
    ("happiness", Joy),
    ("sad", Sadness),
    ("angry", Anger),
    ("contempt", Disgust),
    ("surprised", Surprise),
];

fn table(modality: Modality) -> &'static [(&'static str, EmotionLabel)] {
    match modality {
        Modality::Text => TEXT,
        Modality::Voice => VOICE,
        Modality::Face => FACE,
    }
}

/// Map a source label to its canonical label for the given modality.
///
/// Matching is case-insensitive. Returns `None` for labels the modality's
/// table does not know.
pub fn canonical_label(modality: Modality, source: &str) -> Option<EmotionLabel> {
    let needle = source.trim().to_ascii_lowercase();
    SHARED
        .iter()
        .chain(table(modality).iter())
        .find(|(name, _)| *name == needle)
        .map(|(_, label)| *label)
}
