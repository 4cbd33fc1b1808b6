//! Configuration for Neoscene
//!
//! Loaded from `neoscene.toml` in the current directory, then from
//! `~/.config/neoscene/neoscene.toml`, falling back to defaults. Environment
//! variables override file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NeosceneError, Result};

/// Root configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Text generation settings
    #[serde(default)]
    pub llm: LlmSection,

    /// Session registry settings
    #[serde(default)]
    pub session: SessionSection,

    /// Stepping loop and telemetry settings
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Asset catalog settings
    #[serde(default)]
    pub assets: AssetsSection,

    /// API server settings
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LlmSection {
    /// Provider type: "gemini" or an OpenAI-compatible endpoint
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// API key. If not set, read from GEMINI_API_KEY / GOOGLE_API_KEY.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override for self-hosted or proxy endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature. Low by default for consistent JSON output.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in the response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Extra LLM round-trips allowed to repair invalid scene JSON
    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_repair_attempts: default_max_repair_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionSection {
    /// Seconds of inactivity before a session is evicted
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between eviction sweeps
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// Maximum conversation entries kept per session (oldest dropped first)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulationSection {
    /// Camera frames are refreshed every N stepping ticks
    #[serde(default = "default_render_every_ticks")]
    pub render_every_ticks: u64,

    /// Floor for the tick period in milliseconds, whatever the scene timestep
    #[serde(default = "default_min_tick_interval_ms")]
    pub min_tick_interval_ms: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            render_every_ticks: default_render_every_ticks(),
            min_tick_interval_ms: default_min_tick_interval_ms(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AssetsSection {
    /// Root directory containing one subdirectory per asset, each with a
    /// manifest.json
    #[serde(default = "default_assets_root")]
    pub root: PathBuf,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            root: default_assets_root(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_max_repair_attempts() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_eviction_interval_secs() -> u64 {
    60
}

fn default_history_limit() -> usize {
    32
}

fn default_render_every_ticks() -> u64 {
    10
}

fn default_min_tick_interval_ms() -> u64 {
    1
}

fn default_assets_root() -> PathBuf {
    PathBuf::from("assets")
}

fn default_port() -> u16 {
    8787
}

impl Config {
    /// Load configuration, checking `./neoscene.toml` then the user config
    /// directory. Missing files are not an error.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let current_dir_path = Path::new("neoscene.toml");
        if current_dir_path.exists() {
            return Self::from_path(current_dir_path);
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::from_path(&user_path);
            }
        }

        Ok(Config::default())
    }

    /// Parse a config file at a specific path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NeosceneError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("neoscene").join("neoscene.toml"))
    }

    /// Apply environment variable overrides:
    ///
    /// - `GEMINI_API_KEY` / `GOOGLE_API_KEY` → `llm.api_key`
    /// - `NEOSCENE_MODEL` → `llm.model`
    /// - `NEOSCENE_PROVIDER` → `llm.provider`
    /// - `NEOSCENE_ASSETS` → `assets.root`
    /// - `NEOSCENE_PORT` → `server.port`
    pub fn apply_env_overrides(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = env::var("GEMINI_API_KEY")
                .ok()
                .or_else(|| env::var("GOOGLE_API_KEY").ok())
                .filter(|k| !k.is_empty());
        }

        if let Ok(model) = env::var("NEOSCENE_MODEL") {
            if !model.is_empty() {
                self.llm.model = model;
            }
        }

        if let Ok(provider) = env::var("NEOSCENE_PROVIDER") {
            if !provider.is_empty() {
                self.llm.provider = provider;
            }
        }

        if let Ok(root) = env::var("NEOSCENE_ASSETS") {
            if !root.is_empty() {
                self.assets.root = PathBuf::from(root);
            }
        }

        if let Ok(port) = env::var("NEOSCENE_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => eprintln!("Warning: Invalid NEOSCENE_PORT value: {}", port),
            }
        }
    }

    /// Save configuration as pretty TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self).map_err(|e| NeosceneError::InvalidConfig {
            message: e.to_string(),
        })?;
        fs::write(path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.max_repair_attempts, 2);
        assert_eq!(config.session.idle_timeout_secs, 600);
        assert_eq!(config.simulation.render_every_ticks, 10);
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neoscene.toml");

        let mut config = Config::default();
        config.llm.model = "gemini-1.5-pro".to_string();
        config.session.history_limit = 8;
        config.save(&path).unwrap();

        let loaded = Config::from_path(&path).unwrap();
        assert_eq!(loaded.llm.model, "gemini-1.5-pro");
        assert_eq!(loaded.session.history_limit, 8);
        // Untouched sections keep defaults
        assert_eq!(loaded.simulation.render_every_ticks, 10);
    }

    #[test]
    fn test_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neoscene.toml");
        fs::write(&path, "[session]\nidle_timeout_secs = 30\n").unwrap();

        let loaded = Config::from_path(&path).unwrap();
        assert_eq!(loaded.session.idle_timeout_secs, 30);
        assert_eq!(loaded.llm.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neoscene.toml");
        fs::write(&path, "[llm\nmodel = ").unwrap();

        let err = Config::from_path(&path).unwrap_err();
        assert!(matches!(err, NeosceneError::InvalidConfig { .. }));
    }
}
