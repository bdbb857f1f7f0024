//! Panel configuration.
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables. Every path has a default derived from the data directory.
//!
//! # Data Directory Locations
//!
//! - **Linux**: `~/.local/share/pgpanel`
//! - **macOS**: `~/Library/Application Support/pgpanel`
//! - **Windows**: `%APPDATA%\pgpanel`
//! - **Debug builds**: `./pgpanel_data` in current directory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PanelError;
use crate::models::ADMIN_TIMEOUT;

/// Overrides `data_dir`.
pub const DATA_DIR_ENV: &str = "PGPANEL_DATA_DIR";
/// Overrides `base_dir`.
pub const BASE_DIR_ENV: &str = "PGPANEL_BASE_DIR";
/// Overrides `backup_dir`.
pub const BACKUP_DIR_ENV: &str = "PGPANEL_BACKUP_DIR";

/// Get the default data directory.
pub fn default_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./pgpanel_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| d.join("pgpanel"))
            .unwrap_or_else(|| PathBuf::from("./pgpanel_data"))
    }
}

/// Filesystem layout and runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct PanelConfig {
    /// Catalog, credentials and logs
    pub data_dir: PathBuf,
    /// Root of the uploads tree (`<base_dir>/uploads/...`)
    pub base_dir: PathBuf,
    /// Root of the scheduled backup tree
    pub backup_dir: PathBuf,
    /// Installed applications, one directory per `<app_key>/<name>`
    pub app_install_dir: PathBuf,
    /// Container runtime binary
    pub container_runtime: String,
    /// Budget for each administrative operation
    pub admin_timeout_secs: u64,
}

/// On-disk form. Paths left unset follow `data_dir`, which is only known
/// once the environment has been applied.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    app_install_dir: Option<PathBuf>,
    container_runtime: Option<String>,
    admin_timeout_secs: Option<u64>,
}

impl ConfigFile {
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        if let Some(dir) = var(DATA_DIR_ENV) {
            self.data_dir = Some(dir);
        }
        if let Some(dir) = var(BASE_DIR_ENV) {
            self.base_dir = Some(dir);
        }
        if let Some(dir) = var(BACKUP_DIR_ENV) {
            self.backup_dir = Some(dir);
        }
    }
}

impl From<ConfigFile> for PanelConfig {
    fn from(file: ConfigFile) -> Self {
        let defaults = PanelConfig::with_data_dir(file.data_dir.unwrap_or_else(default_data_dir));
        Self {
            base_dir: file.base_dir.unwrap_or(defaults.base_dir),
            backup_dir: file.backup_dir.unwrap_or(defaults.backup_dir),
            app_install_dir: file.app_install_dir.unwrap_or(defaults.app_install_dir),
            container_runtime: file.container_runtime.unwrap_or(defaults.container_runtime),
            admin_timeout_secs: file.admin_timeout_secs.unwrap_or(defaults.admin_timeout_secs),
            data_dir: defaults.data_dir,
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl PanelConfig {
    /// Default layout rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            base_dir: data_dir.clone(),
            backup_dir: data_dir.join("backup"),
            app_install_dir: data_dir.join("apps"),
            data_dir,
            container_runtime: "docker".to_string(),
            admin_timeout_secs: ADMIN_TIMEOUT.as_secs(),
        }
    }

    /// Load configuration from `path` (if given and present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, PanelError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PanelError> {
        let mut file: ConfigFile = match path.filter(|p| p.exists()) {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    PanelError::config(format!("Failed to read '{}': {e}", path.display()))
                })?;
                serde_json::from_str(&contents).map_err(|e| {
                    PanelError::config(format!("Invalid config '{}': {e}", path.display()))
                })?
            }
            None => ConfigFile::default(),
        };
        file.apply_env(lookup);
        let config = Self::from(file);
        config.validate()?;

        tracing::debug!(data_dir = %config.data_dir.display(), "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), PanelError> {
        if self.admin_timeout_secs == 0 {
            return Err(PanelError::config("admin_timeout_secs must be positive"));
        }
        if self.container_runtime.trim().is_empty() {
            return Err(PanelError::config("container_runtime must not be empty"));
        }
        Ok(())
    }

    /// Budget for each administrative operation.
    pub fn admin_timeout(&self) -> Duration {
        Duration::from_secs(self.admin_timeout_secs)
    }

    /// `<app_install_dir>/<db_type>/<name>`
    pub fn engine_install_dir(&self, db_type: &str, name: &str) -> PathBuf {
        self.app_install_dir.join(db_type).join(name)
    }

    /// `<app_install_dir>/<db_type>/<name>/data/postgresql.conf`
    pub fn engine_conf_path(&self, db_type: &str, name: &str) -> PathBuf {
        self.engine_install_dir(db_type, name).join("data").join("postgresql.conf")
    }

    /// `<base_dir>/uploads/database/<db_type>/<engine>/<name>`
    pub fn upload_dir(&self, db_type: &str, engine: &str, name: &str) -> PathBuf {
        self.base_dir.join("uploads").join("database").join(db_type).join(engine).join(name)
    }

    /// `<backup_dir>/database/<db_type>/<engine>/<name>`
    pub fn database_backup_dir(&self, db_type: &str, engine: &str, name: &str) -> PathBuf {
        self.backup_dir.join("database").join(db_type).join(engine).join(name)
    }
}
