pub mod coordinator;
pub mod embedding;
pub mod in_memory;
pub mod sqlite;
pub mod store;
pub mod sweeper;

pub use coordinator::{
    FusionCoordinator, FusionRequest, FusionResponse, MaintenanceReport, MemorySnippet, Recommendations,
};
pub use embedding::{cosine_similarity, Embedder, Embedding, EmotionEmbedder};
pub use in_memory::InMemoryStore;
pub use sqlite::SqliteMemoryStore;
pub use store::{
    apply_retention, rank_matches, EmotionPatterns, MemoryMatch, MemoryRecord, MemoryStore, RetentionPolicy,
    SweepReport,
};
pub use sweeper::RetentionSweeper;

#[cfg(test)]
mod tests;
