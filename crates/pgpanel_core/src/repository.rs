//! Collaborator interfaces consumed by the control plane.
//!
//! The services only see these traits. `SqliteCatalog`, `AesSecretCipher`
//! and `DockerCompose` are the implementations wired by `PanelState`.

use async_trait::async_trait;
use std::path::Path;

use crate::error::PanelError;
use crate::models::{
    AppInstall, AppInstallBaseInfo, AppInstallResource, BackupRecord, DatabaseSearch,
    EngineInstance, InstallParam, LogicalDatabase, Origin, PageResult,
};

/// Engine instances and logical databases.
pub trait CatalogRepository: Send + Sync {
    /// Engine instance by unique name.
    fn get_engine_by_name(&self, name: &str) -> Result<Option<EngineInstance>, PanelError>;

    /// Engine instances of one type, ordered by name.
    fn list_engines(&self, db_type: &str) -> Result<Vec<EngineInstance>, PanelError>;

    /// Insert or update an engine instance by name. Returns the row id.
    fn save_engine(&self, engine: &EngineInstance) -> Result<i64, PanelError>;

    /// Replace the stored (encrypted) administrative password.
    fn update_engine_password(&self, id: i64, password: &str) -> Result<(), PanelError>;

    /// Logical database by id.
    fn get_database(&self, id: i64) -> Result<Option<LogicalDatabase>, PanelError>;

    /// Logical database by its unique key.
    fn find_database(
        &self,
        name: &str,
        postgresql_name: &str,
        from: &Origin,
    ) -> Result<Option<LogicalDatabase>, PanelError>;

    /// One page of the logical databases of an engine.
    fn page_databases(&self, search: &DatabaseSearch) -> Result<PageResult<LogicalDatabase>, PanelError>;

    /// Every logical database, ordered by engine then name.
    fn list_databases(&self) -> Result<Vec<LogicalDatabase>, PanelError>;

    /// Insert a logical database. Returns the row id.
    fn create_database(&self, database: &LogicalDatabase) -> Result<i64, PanelError>;

    /// Set the description of a logical database.
    fn update_description(&self, id: i64, description: &str) -> Result<(), PanelError>;

    /// Set the stored (encrypted) password of a logical database.
    fn update_password(&self, id: i64, password: &str) -> Result<(), PanelError>;

    /// Set the access permission of a logical database.
    fn update_permission(&self, id: i64, permission: &str) -> Result<(), PanelError>;

    /// Delete a logical database and its application links atomically.
    fn delete_database_with_links(&self, id: i64) -> Result<(), PanelError>;
}

/// Application installations and their links to logical databases.
pub trait AppInstallRepository: Send + Sync {
    /// Base info of the installation named `name` of app `app_key`.
    ///
    /// An empty name selects the first installation of the app.
    fn load_base_info(&self, app_key: &str, name: &str) -> Result<AppInstallBaseInfo, PanelError>;

    /// Installation by id.
    fn get(&self, id: i64) -> Result<Option<AppInstall>, PanelError>;

    /// Insert an installation. Returns the row id.
    fn save_install(&self, install: &AppInstall) -> Result<i64, PanelError>;

    /// Links to `resource_id`, optionally scoped to one engine installation,
    /// in insertion order.
    fn list_resources(
        &self,
        link_id: Option<i64>,
        resource_id: i64,
    ) -> Result<Vec<AppInstallResource>, PanelError>;

    /// Insert a link. Returns the row id.
    fn save_resource(&self, resource: &AppInstallResource) -> Result<i64, PanelError>;

    /// Rewrite one parameter of an installation.
    fn update_param(&self, app_install_id: i64, param: InstallParam, value: &str) -> Result<(), PanelError>;
}

/// Backup bookkeeping.
pub trait BackupRepository: Send + Sync {
    /// Insert a record. Returns the row id.
    fn save_record(&self, record: &BackupRecord) -> Result<i64, PanelError>;

    /// Delete the records of one logical database. Returns how many went.
    fn delete_records(&self, db_type: &str, name: &str, detail_name: &str) -> Result<usize, PanelError>;
}

/// Symmetric encryption of stored secrets.
pub trait SecretCipher: Send + Sync {
    /// Encrypt plaintext into a storable string.
    fn encrypt(&self, plaintext: &str) -> Result<String, PanelError>;

    /// Decrypt a value produced by `encrypt`.
    fn decrypt(&self, ciphertext: &str) -> Result<String, PanelError>;
}

/// Restarts an application's compose project.
#[async_trait]
pub trait ServiceRestarter: Send + Sync {
    /// Restart the services defined by the compose file.
    async fn restart(&self, compose_path: &Path) -> Result<(), PanelError>;
}
