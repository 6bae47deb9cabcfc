//! # NeuroCanvas Fusion
//!
//! The signal path from raw classifier output to art-generator controls:
//!
//! 1. [`normalizer`] maps each modality's label dialect onto the canonical
//!    emotion vector.
//! 2. [`smoother`] damps single-frame noise with a per-(session, modality)
//!    exponential moving average.
//! 3. [`fusion`] combines the present modalities, weighted by confidence.
//! 4. [`mapper`] turns the fused state into bounded, deterministic
//!    generator parameters.
//!
//! Per-session history lives in an explicit [`SessionRegistry`] rather than
//! in process-global state.

pub mod fusion;
pub mod mapper;
pub mod normalizer;
pub mod session;
pub mod smoother;

pub use fusion::{combine, ConfidencePolicy, Contribution, FusionEngine};
pub use mapper::{ParameterKind, ParameterMapper};
pub use normalizer::{normalize, normalize_all};
pub use session::{SessionHistory, SessionRegistry};
pub use smoother::{HistoryWindow, SmoothingWindow, TemporalSmoother};
