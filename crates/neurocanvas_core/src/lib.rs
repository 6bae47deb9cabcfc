//! Shared vocabulary of the NeuroCanvas emotion engine: the canonical emotion
//! model, per-modality signals, fused states, art parameters, the error
//! taxonomy and configuration.

pub mod config;
pub mod emotion;
pub mod error;
pub mod lexicon;
pub mod signal;

pub use config::{
    CanvasConfig, ConfigReport, EmotionConfig, LoggingConfig, MemoryConfig, NeuralConfig, MAX_RETENTION_DAYS,
};
pub use emotion::{EmotionLabel, EmotionVector};
pub use error::{FusionError, MemoryError, MemoryResult};
pub use signal::{ArtParameters, FusedState, Modality, ModalitySample, RawSignal};
