use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `{config_dir}/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Catches config a reader would otherwise only discover when a worker
    /// pool or branch operation fails downstream.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.max_concurrent_agents == 0 {
            return Err(ConfigError::Invalid(
                "general.max_concurrent_agents must be at least 1".to_string(),
            ));
        }
        if self.general.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "general.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.general.default_base_branch.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "general.default_base_branch must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_base_branch")]
    pub default_base_branch: String,
    #[serde(default = "default_true")]
    pub require_review_approval: bool,
    #[serde(default = "default_true")]
    pub serialize_merges: bool,
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default = "default_tasks_wait_max_seconds")]
    pub tasks_wait_max_seconds: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            max_iterations: default_max_iterations(),
            default_base_branch: default_base_branch(),
            require_review_approval: true,
            serialize_merges: true,
            auto_approve: false,
            tasks_wait_max_seconds: default_tasks_wait_max_seconds(),
            log_level: default_log_level(),
        }
    }
}

fn default_max_concurrent_agents() -> u32 {
    4
}
fn default_max_iterations() -> u32 {
    25
}
fn default_base_branch() -> String {
    "main".into()
}
fn default_tasks_wait_max_seconds() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Shared, hot-swappable handle (§5 "Config object: held by reference")
// ---------------------------------------------------------------------------

/// New agents and request handlers read through this handle; `update`
/// installs a freshly validated value without invalidating readers that
/// already cloned the previous `Arc`.
#[derive(Clone)]
pub struct SharedConfig(std::sync::Arc<std::sync::RwLock<std::sync::Arc<Config>>>);

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self(std::sync::Arc::new(std::sync::RwLock::new(std::sync::Arc::new(
            config,
        ))))
    }

    pub fn current(&self) -> std::sync::Arc<Config> {
        self.0.read().expect("config lock poisoned").clone()
    }

    pub fn update(&self, config: Config) {
        *self.0.write().expect("config lock poisoned") = std::sync::Arc::new(config);
    }
}

// ---------------------------------------------------------------------------
// Directory resolution
// ---------------------------------------------------------------------------

/// `{config_dir}`: `$KAGAN_CONFIG_DIR`, else the platform config dir under
/// `kagan/`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KAGAN_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kagan")
}

/// `{data_dir}`: `$KAGAN_DATA_DIR`, else the platform data dir under `kagan/`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KAGAN_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kagan")
}

/// `{cache_dir}`: `$KAGAN_CACHE_DIR`, else the platform cache dir under
/// `kagan/`.
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KAGAN_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kagan")
}

/// `{worktree_base}`: `$KAGAN_WORKTREE_BASE`, else `{data_dir}/worktrees`.
pub fn worktree_base() -> PathBuf {
    if let Ok(dir) = std::env::var("KAGAN_WORKTREE_BASE") {
        return PathBuf::from(dir);
    }
    data_dir().join("worktrees")
}

/// `{locks_dir}`: `$XDG_STATE_HOME/kagan`, else `{data_dir}/locks`.
pub fn locks_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(dir).join("kagan");
    }
    data_dir().join("locks")
}

/// `{runtime_dir}`: platform runtime dir (`$XDG_RUNTIME_DIR` on Linux via
/// `dirs::runtime_dir`), else `{data_dir}/run`.
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(|| data_dir().join("run"))
}

pub fn db_path() -> PathBuf {
    data_dir().join("kagan.db")
}
