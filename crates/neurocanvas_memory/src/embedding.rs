use anyhow::Result;
use neurocanvas_core::{EmotionLabel, FusedState};

pub type Embedding = Vec<f32>;

/// External embedding collaborator. Embeddings are opaque to the store,
/// which only checks their length and compares them by cosine similarity.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    fn embed(&self, state: &FusedState) -> Result<Embedding>;
}

/// Built-in embedder: the canonical intensities followed by the confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionEmbedder;

impl Embedder for EmotionEmbedder {
    fn dimension(&self) -> usize {
        EmotionLabel::COUNT + 1
    }

    fn embed(&self, state: &FusedState) -> Result<Embedding> {
        let mut out = Vec::with_capacity(self.dimension());
        out.extend_from_slice(state.vector.as_slice());
        out.push(state.confidence);
        Ok(out)
    }
}

/// Calculate cosine similarity between two vectors
/// Returns a value between -1.0 and 1.0 (1.0 = identical direction)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
