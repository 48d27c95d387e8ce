//! Configuration for the lorekeeper engine.
//!
//! Maps directly to `lorekeeper.toml`. Every section and every key is
//! optional; omitted values take the defaults documented below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoreConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Experience and level-up tuning.
    #[serde(default)]
    pub progression: ProgressionConfig,
    /// Narrative generator settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Save store settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Session service behaviour.
    #[serde(default)]
    pub session: SessionConfig,
}

impl LoreConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `LoreError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| crate::LoreError::Config(e.to_string()))?;
        config.progression.check()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// What happens when one xp gain crosses more than one threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelUpPolicy {
    /// One pending flag per crossing check. Resolving clears the flag even
    /// when xp still exceeds the new threshold; the next xp gain re-arms it.
    #[default]
    SingleStep,
    /// Resolving re-arms the pending flag immediately while xp is still at
    /// or above the new threshold, so every crossed level gets a stat pick.
    Chained,
}

/// Experience and level-up tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Threshold for the first level-up.
    #[serde(default = "default_100")]
    pub initial_xp_to_next_level: i64,
    /// Threshold multiplier applied (and floored) on each level-up.
    #[serde(default = "default_1_5")]
    pub xp_growth_factor: f64,
    /// Max HP gained per level.
    #[serde(default = "default_10")]
    pub hp_per_level: i64,
    /// Max mana gained per level.
    #[serde(default = "default_5")]
    pub mana_per_level: i64,
    /// Amount added to the chosen stat.
    #[serde(default = "default_1")]
    pub stat_increment: i64,
    /// Multi-threshold behaviour.
    #[serde(default)]
    pub level_up_policy: LevelUpPolicy,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            initial_xp_to_next_level: 100,
            xp_growth_factor: 1.5,
            hp_per_level: 10,
            mana_per_level: 5,
            stat_increment: 1,
            level_up_policy: LevelUpPolicy::SingleStep,
        }
    }
}

impl ProgressionConfig {
    /// Reject tunings that would break the leveling invariants.
    ///
    /// # Errors
    /// Returns `LoreError::Config` when a threshold could stop growing.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.initial_xp_to_next_level <= 0 {
            return Err(crate::LoreError::Config(
                "progression.initial_xp_to_next_level must be > 0".into(),
            ));
        }
        if !self.xp_growth_factor.is_finite() || self.xp_growth_factor < 1.0 {
            return Err(crate::LoreError::Config(
                "progression.xp_growth_factor must be a finite number >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// Narrative generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "gemini", "none".
    #[serde(default = "default_gemini")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    /// Model that narrates actions and seeds custom scenarios.
    #[serde(default = "default_narrator_model")]
    pub narrator_model: String,
    /// Model that answers hint requests.
    #[serde(default = "default_assistant_model")]
    pub assistant_model: String,
    /// Environment variable holding the API key, if the provider needs one.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Retries before the call is reported as failed.
    #[serde(default = "default_1_u32")]
    pub max_retries: u32,
    /// Narration temperature.
    #[serde(default = "default_0_8")]
    pub temperature: f32,
    /// Directory of TOML prompt overrides; built-in prompts when unset.
    #[serde(default)]
    pub prompt_dir: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            narrator_model: "gemini-2.5-pro".to_string(),
            assistant_model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            request_timeout_ms: 30_000,
            max_retries: 1,
            temperature: 0.8,
            prompt_dir: None,
        }
    }
}

/// Which save store implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Single SQLite database file.
    Sqlite,
    /// One JSON file per save in a directory.
    Json,
}

/// Save store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend: "sqlite" or "json".
    #[serde(default = "default_sqlite")]
    pub backend: StoreBackend,
    /// Database file (sqlite) or directory (json).
    #[serde(default = "default_saves_path")]
    pub path: PathBuf,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: default_saves_path(),
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

/// Session service behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Player name used when a start request omits one.
    #[serde(default = "default_player_name")]
    pub default_player_name: String,
    /// Persist after every action and level-up.
    #[serde(default = "default_true")]
    pub autosave: bool,
    /// Seconds an unused, fully saved session stays in memory.
    #[serde(default = "default_1800")]
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_player_name: default_player_name(),
            autosave: true,
            idle_timeout_secs: default_1800(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_gemini() -> String { "gemini".to_string() }
fn default_gemini_url() -> String { "https://generativelanguage.googleapis.com".to_string() }
fn default_narrator_model() -> String { "gemini-2.5-pro".to_string() }
fn default_assistant_model() -> String { "gemini-2.5-flash".to_string() }
fn default_api_key_env() -> String { "GEMINI_API_KEY".to_string() }
fn default_player_name() -> String { "Adventurer".to_string() }
fn default_saves_path() -> PathBuf { PathBuf::from("saves/lorekeeper.db") }
fn default_sqlite() -> StoreBackend { StoreBackend::Sqlite }
fn default_0_8() -> f32 { 0.8 }
fn default_1_5() -> f64 { 1.5 }
fn default_1() -> i64 { 1 }
fn default_1_u32() -> u32 { 1 }
fn default_5() -> i64 { 5 }
fn default_10() -> i64 { 10 }
fn default_100() -> i64 { 100 }
fn default_1800() -> u64 { 1_800 }
fn default_30000() -> u64 { 30_000 }
