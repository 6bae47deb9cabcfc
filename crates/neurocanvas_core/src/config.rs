use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Longest accepted retention window, about a century.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub emotion: EmotionConfig,
    pub memory: MemoryConfig,
    pub neural: NeuralConfig,
    pub logging: LoggingConfig,
}

impl CanvasConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: CanvasConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    pub fn apply_env_overrides(&mut self) {
        env_override("EMOTION_CONFIDENCE_THRESHOLD", &mut self.emotion.confidence_threshold);
        env_override("EMOTION_SMOOTHING_FACTOR", &mut self.emotion.smoothing_factor);
        env_override("EMOTION_HISTORY_LENGTH", &mut self.emotion.history_length);
        env_override("EMOTION_MODALITY_DISCOUNT", &mut self.emotion.modality_discount);

        env_override("ENABLE_MEMORY_SYSTEM", &mut self.memory.enabled);
        if let Ok(v) = std::env::var("MEMORY_DB_PATH") {
            self.memory.db_path = Some(v);
        }
        env_override("MEMORY_RETENTION_DAYS", &mut self.memory.retention_days);
        env_override("MEMORY_SIMILARITY_THRESHOLD", &mut self.memory.similarity_threshold);
        env_override("MEMORY_MAX_ENTRIES", &mut self.memory.max_entries);
        env_override("MEMORY_CLEANUP_INTERVAL", &mut self.memory.cleanup_interval_hours);
        env_override("MEMORY_VECTOR_DIM", &mut self.memory.vector_dim);
        env_override("MEMORY_RECALL_K", &mut self.memory.recall_k);

        env_override("NEURAL_NETWORK_LAYERS", &mut self.neural.layers);
        env_override("NEURAL_NETWORK_NODES", &mut self.neural.nodes);
        env_override("NEURAL_CONNECTION_DENSITY", &mut self.neural.connection_density);
        env_override("NEURAL_ACTIVATION_THRESHOLD", &mut self.neural.activation_threshold);
        env_override("NEURAL_DECAY_RATE", &mut self.neural.decay_rate);

        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        env_override("LOG_JSON", &mut self.logging.json);
    }

    /// Check bounds. Errors make the config unusable; warnings are worth logging.
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        let unit = |name: &str, v: f32, report: &mut ConfigReport| {
            if !(0.0..=1.0).contains(&v) {
                report.errors.push(format!("{} must be within [0, 1], got {}", name, v));
            }
        };

        unit("emotion.confidence_threshold", self.emotion.confidence_threshold, &mut report);
        unit("emotion.modality_discount", self.emotion.modality_discount, &mut report);
        unit("memory.similarity_threshold", self.memory.similarity_threshold, &mut report);
        unit("neural.connection_density", self.neural.connection_density, &mut report);
        unit("neural.activation_threshold", self.neural.activation_threshold, &mut report);
        unit("neural.decay_rate", self.neural.decay_rate, &mut report);

        let alpha = self.emotion.smoothing_factor;
        if !(alpha > 0.0 && alpha <= 1.0) {
            report
                .errors
                .push(format!("emotion.smoothing_factor must be within (0, 1], got {}", alpha));
        }
        if self.emotion.history_length == 0 {
            report.errors.push("emotion.history_length must be at least 1".to_string());
        }
        if self.neural.layers == 0 || self.neural.nodes == 0 {
            report.errors.push("neural.layers and neural.nodes must be at least 1".to_string());
        }
        if self.memory.vector_dim == 0 {
            report.errors.push("memory.vector_dim must be at least 1".to_string());
        }
        if self.memory.retention_days > MAX_RETENTION_DAYS {
            report.errors.push(format!(
                "memory.retention_days must be at most {}, got {}",
                MAX_RETENTION_DAYS, self.memory.retention_days
            ));
        }

        if self.memory.enabled {
            if self.memory.max_entries == 0 {
                report
                    .warnings
                    .push("memory.max_entries is 0, every commit will be rejected".to_string());
            }
            if self.memory.retention_days == 0 {
                report
                    .warnings
                    .push("memory.retention_days is 0, records expire on the next sweep".to_string());
            }
            if self.memory.cleanup_interval_hours == 0 {
                report
                    .warnings
                    .push("memory.cleanup_interval_hours is 0, periodic sweeping is disabled".to_string());
            }
            if self.memory.db_path.is_none() {
                report
                    .warnings
                    .push("memory.db_path not set, memories are kept in process only".to_string());
            }
        }

        report
    }
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(v) = std::env::var(key) {
        match v.trim().parse() {
            Ok(n) => *slot = n,
            Err(_) => tracing::warn!("Ignoring unparsable {}={:?}", key, v),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Fused states below this confidence are flagged `low_confidence`.
    pub confidence_threshold: f32,
    /// EMA weight of the newest sample, in (0, 1].
    pub smoothing_factor: f32,
    /// Capacity of each per-session history window.
    pub history_length: usize,
    /// Confidence discount per missing modality.
    pub modality_discount: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            smoothing_factor: 0.7,
            history_length: 10,
            modality_discount: 0.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// SQLite file. `None` keeps memories in process.
    pub db_path: Option<String>,
    pub retention_days: u32,
    pub similarity_threshold: f32,
    /// Per-session record cap.
    pub max_entries: usize,
    pub cleanup_interval_hours: u64,
    /// Expected embedding length.
    pub vector_dim: usize,
    /// How many similar memories to attach to a response.
    pub recall_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
            retention_days: 90,
            similarity_threshold: 0.8,
            max_entries: 10_000,
            cleanup_interval_hours: 24,
            vector_dim: 8,
            recall_k: 5,
        }
    }
}

impl MemoryConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_hours.saturating_mul(3600))
    }
}

/// Base values the art parameter mapper scales from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NeuralConfig {
    pub layers: u32,
    pub nodes: u32,
    pub connection_density: f32,
    pub activation_threshold: f32,
    pub decay_rate: f32,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            layers: 3,
            nodes: 64,
            connection_density: 0.3,
            activation_threshold: 0.5,
            decay_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
