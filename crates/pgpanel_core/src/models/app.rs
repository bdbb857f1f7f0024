//! Application installations, their links to logical databases, and backups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Env key holding the engine's administrative user.
pub const ROOT_USER_ENV: &str = "PANEL_DB_ROOT_USER";
/// Env key holding the engine's administrative password (ciphertext).
pub const ROOT_PASSWORD_ENV: &str = "PANEL_DB_ROOT_PASSWORD";
/// Env key holding a linked application's database password (ciphertext).
pub const USER_PASSWORD_ENV: &str = "PANEL_DB_USER_PASSWORD";

/// Install parameter names used by credential rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallParam {
    /// A linked application's database password
    UserPassword,
    /// The engine's administrative password
    Password,
}

impl InstallParam {
    /// Parameter name as exposed in install forms.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserPassword => "user-password",
            Self::Password => "password",
        }
    }

    /// Env key the parameter is stored under.
    pub fn env_key(&self) -> &'static str {
        match self {
            Self::UserPassword => USER_PASSWORD_ENV,
            Self::Password => ROOT_PASSWORD_ENV,
        }
    }
}

/// An installed application (engine containers included).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInstall {
    /// Catalog row id
    pub id: i64,
    /// App key, e.g. `postgresql` or `wordpress`
    pub app_key: String,
    /// Install name, unique per app key
    pub name: String,
    /// Container name
    pub container_name: String,
    /// Published port
    pub http_port: i64,
    /// Install parameters
    pub env: BTreeMap<String, String>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
}

impl AppInstall {
    /// Create an unsaved install record.
    pub fn new(
        app_key: impl Into<String>,
        name: impl Into<String>,
        container_name: impl Into<String>,
        http_port: i64,
    ) -> Self {
        Self {
            id: 0,
            app_key: app_key.into(),
            name: name.into(),
            container_name: container_name.into(),
            http_port,
            env: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Set an install parameter.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Install directory: `<app_install_dir>/<app_key>/<name>`.
    pub fn install_dir(&self, app_install_dir: &Path) -> PathBuf {
        app_install_dir.join(&self.app_key).join(&self.name)
    }

    /// Compose file that supervises the install.
    pub fn compose_path(&self, app_install_dir: &Path) -> PathBuf {
        self.install_dir(app_install_dir).join("docker-compose.yml")
    }
}

/// What the resolver needs to reach a container-hosted engine.
#[derive(Debug, Clone)]
pub struct AppInstallBaseInfo {
    /// App install id
    pub id: i64,
    /// App key
    pub app_key: String,
    /// Install name
    pub name: String,
    /// Container name
    pub container_name: String,
    /// Administrative user
    pub user_name: String,
    /// Administrative password (ciphertext)
    pub password: String,
    /// Published port
    pub port: i64,
}

impl AppInstallBaseInfo {
    /// Derive base info from an install record.
    pub fn from_install(install: &AppInstall) -> Self {
        Self {
            id: install.id,
            app_key: install.app_key.clone(),
            name: install.name.clone(),
            container_name: install.container_name.clone(),
            user_name: install.env.get(ROOT_USER_ENV).cloned().unwrap_or_default(),
            password: install.env.get(ROOT_PASSWORD_ENV).cloned().unwrap_or_default(),
            port: install.http_port,
        }
    }
}

/// Link between an application install and a logical database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInstallResource {
    /// Catalog row id (insertion order)
    pub id: i64,
    /// Application that uses the database
    pub app_install_id: i64,
    /// Engine app install the database lives on (local origin only)
    pub link_id: i64,
    /// Logical database id
    pub resource_id: i64,
    /// Resource key, e.g. `postgresql`
    pub key: String,
    /// Origin label of the engine
    pub from: String,
}

/// A backup file recorded in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Catalog row id
    pub id: i64,
    /// Database type
    pub db_type: String,
    /// Engine name
    pub name: String,
    /// Logical database name
    pub detail_name: String,
    /// Directory holding the file
    pub file_dir: String,
    /// File name
    pub file_name: String,
    /// When the backup was taken
    pub created_at: DateTime<Utc>,
}
