//! Configuration system for kiln.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $KILN_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/kiln/config.toml
//!   3. ~/.config/kiln/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    pub limits: LimitsConfig,
    pub scheduler: SchedulerConfig,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max prompt size in bytes.
    pub max_prompt_bytes: u64,
    /// Max size per image attachment in bytes.
    pub max_image_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads. Valid range 1..=64.
    pub workers: usize,
    /// Seconds between ready-directory scans.
    pub scan_interval_secs: u64,
    /// Soft ceiling on the scanner's dispatched-id set before compaction.
    pub dispatched_ceiling: usize,
}

/// Generation knobs passed through to the inference tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory holding llama-cli / llama-mtmd-cli / llama-embedding.
    /// Empty = resolve via PATH.
    pub bin_dir: PathBuf,
    pub temperature: f32,
    /// Lower temperature used for vision jobs.
    pub vision_temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub min_p: f32,
    pub repeat_penalty: f32,
    /// Sampler seed. 0 = nondeterministic.
    pub seed: u32,
    /// Context window cap in tokens.
    pub max_ctx: u32,
    /// Generation cap in tokens.
    pub n_predict: u32,
    /// Layers to offload to the GPU. 0 = CPU only.
    pub gpu_layers: u32,
}

impl SchedulerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_prompt_bytes: 10 * 1024 * 1024,
            max_image_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            scan_interval_secs: 5,
            dispatched_ceiling: 1000,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::new(),
            temperature: 0.8,
            vision_temperature: 0.3,
            top_k: 40,
            top_p: 0.9,
            min_p: 0.05,
            repeat_penalty: 1.1,
            seed: 0,
            max_ctx: 8192,
            n_predict: 2048,
            gpu_layers: 0,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_or_tmp().join(".config"))
        .join("kiln")
}

fn home_or_tmp() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {}", .0.display(), .1)]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {}: {}", .0.display(), .1)]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {}: {}", .0.display(), .1)]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl KilnConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            KilnConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("KILN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&KilnConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply KILN_* env var overrides.
    fn apply_env_overrides(&mut self) {
        fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        if let Some(v) = parse_env("KILN_MAX_PROMPT_BYTES") {
            self.limits.max_prompt_bytes = v;
        }
        if let Some(v) = parse_env("KILN_MAX_IMAGE_BYTES") {
            self.limits.max_image_bytes = v;
        }
        if let Some(v) = parse_env("KILN_SCAN_INTERVAL_SECS") {
            self.scheduler.scan_interval_secs = v;
        }
        if let Some(v) = parse_env("KILN_TEMP") {
            self.engine.temperature = v;
        }
        if let Some(v) = parse_env("KILN_VISION_TEMP") {
            self.engine.vision_temperature = v;
        }
        if let Some(v) = parse_env("KILN_PREDICT") {
            self.engine.n_predict = v;
        }
        if let Some(v) = parse_env("KILN_MAX_CTX") {
            self.engine.max_ctx = v;
        }
        if let Some(v) = parse_env("KILN_SEED") {
            self.engine.seed = v;
        }
        if let Some(v) = parse_env("KILN_GPU_LAYERS") {
            self.engine.gpu_layers = v;
        }
        if let Ok(v) = std::env::var("KILN_LLAMA_BIN_DIR") {
            self.engine.bin_dir = PathBuf::from(v);
        }
    }
}
