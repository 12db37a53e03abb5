//! Configuration loading and data root resolution
//!
//! Bootstrap configuration lives in a small TOML file. Everything in it is
//! optional; a missing file means built-in defaults.
//!
//! Data root resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CHESSLAKE_DATA_ROOT`)
//! 3. TOML config file (`data_root`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the data root
pub const DATA_ROOT_ENV: &str = "CHESSLAKE_DATA_ROOT";

/// Environment variable pointing at the TOML config file
pub const CONFIG_PATH_ENV: &str = "CHESSLAKE_CONFIG";

/// Database file name inside the data root
pub const DATABASE_FILE: &str = "chesslake.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder for the landing zone and database
    #[serde(default)]
    pub data_root: Option<PathBuf>,

    /// YAML file naming the tracked usernames per platform
    #[serde(default)]
    pub players_file: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub quality: QualityConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Database tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Upper bound on total time spent retrying a locked database
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// SQLite busy_timeout applied to every connection
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: default_max_lock_wait_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Data-quality thresholds for silver game rows
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QualityConfig {
    #[serde(default = "default_rating_min")]
    pub rating_min: i64,

    #[serde(default = "default_rating_max")]
    pub rating_max: i64,

    /// Replay SAN moves against a legal move generator
    #[serde(default = "default_true")]
    pub replay_moves: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            rating_min: default_rating_min(),
            rating_max: default_rating_max(),
            replay_moves: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_busy_timeout_ms() -> u64 {
    250
}

fn default_rating_min() -> i64 {
    100
}

fn default_rating_max() -> i64 {
    3500
}

fn default_true() -> bool {
    true
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load the config file if one can be located, otherwise defaults
    ///
    /// A file named explicitly (CLI or env) that cannot be read is an error.
    /// A missing file at the default location only yields defaults.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => {
                debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.quality.rating_min >= self.quality.rating_max {
            return Err(Error::Config(format!(
                "quality.rating_min ({}) must be below quality.rating_max ({})",
                self.quality.rating_min, self.quality.rating_max
            )));
        }
        Ok(())
    }
}

/// Default config file path for the platform
///
/// `~/.config/chesslake/chesslake.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chesslake").join("chesslake.toml"))
}

/// OS-dependent default data root
pub fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("chesslake"))
        .unwrap_or_else(|| PathBuf::from("./chesslake_data"))
}

/// Resolve the data root following the priority order in the module docs
pub fn resolve_data_root(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATA_ROOT_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
        warn!("{} is set but empty, ignoring", DATA_ROOT_ENV);
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.data_root {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_data_root()
}

/// Layout of a resolved data root
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created data root: {}", self.root.display());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    /// Root of the bronze landing zone
    pub fn bronze_dir(&self) -> PathBuf {
        self.root.join("bronze")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.data_root.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.database.max_lock_wait_ms, 5000);
        assert_eq!(config.quality.rating_min, 100);
        assert_eq!(config.quality.rating_max, 3500);
        assert!(config.quality.replay_moves);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            data_root = "/srv/chess"

            [quality]
            rating_max = 3000
            "#,
        )
        .unwrap();
        assert_eq!(config.data_root, Some(PathBuf::from("/srv/chess")));
        assert_eq!(config.quality.rating_min, 100);
        assert_eq!(config.quality.rating_max, 3000);
    }

    #[test]
    fn test_inverted_rating_bounds_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [quality]
            rating_min = 2000
            rating_max = 1000
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("data_root = [");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_data_root_layout() {
        let root = DataRoot::new("/tmp/chesslake-layout");
        assert_eq!(root.database_path(), PathBuf::from("/tmp/chesslake-layout/chesslake.db"));
        assert_eq!(root.bronze_dir(), PathBuf::from("/tmp/chesslake-layout/bronze"));
    }
}
