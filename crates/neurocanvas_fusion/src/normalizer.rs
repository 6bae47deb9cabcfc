//! Signal Normalizer
//!
//! Converts one raw classifier output into a [`ModalitySample`] over the
//! canonical label set, using the fixed per-modality lookup tables in
//! [`neurocanvas_core::lexicon`].

use neurocanvas_core::emotion::sanitize_intensity;
use neurocanvas_core::lexicon::canonical_label;
use neurocanvas_core::{EmotionVector, FusionError, Modality, ModalitySample, RawSignal};

/// Normalize one raw signal.
///
/// - Unknown source labels are dropped with a warning.
/// - When several source labels land on the same canonical label the
///   strongest score wins.
/// - Without an explicit confidence, the strongest mapped score is used.
pub fn normalize(raw: &RawSignal) -> Result<ModalitySample, FusionError> {
    let modality: Modality = raw.modality.parse()?;

    let mut vector = EmotionVector::zero();
    for (source, &score) in &raw.scores {
        match canonical_label(modality, source) {
            Some(label) => {
                let score = sanitize_intensity(score);
                if score > vector.get(label) {
                    vector.set(label, score);
                }
            }
            None => {
                tracing::warn!(
                    "Dropping unknown {} label '{}' (score {:.3})",
                    modality,
                    source,
                    score
                );
            }
        }
    }

    let confidence = raw
        .confidence
        .unwrap_or_else(|| vector.as_slice().iter().copied().fold(0.0, f32::max));

    Ok(ModalitySample::new(modality, vector, confidence, raw.timestamp))
}

/// Normalize every signal of a request. The first unsupported modality
/// rejects the whole batch.
pub fn normalize_all(raws: &[RawSignal]) -> Result<Vec<ModalitySample>, FusionError> {
    raws.iter().map(normalize).collect()
}
