//! Application state: the one place concrete collaborators are wired.
//!
//! Everything below `PanelState` only sees the traits in `repository` and
//! `admin`; this module picks SQLite, AES-GCM, the keychain and docker.

use std::path::Path;
use std::sync::Arc;

use crate::admin::PostgresConnector;
use crate::config::PanelConfig;
use crate::error::PanelError;
use crate::services::storage::init_data_dir;
use crate::services::{
    AesSecretCipher, CredentialService, DockerCompose, PostgresqlService, ServiceContext, SqliteCatalog,
};

/// Central application state.
///
/// Cheap to share behind an `Arc`; every service call borrows it.
pub struct PanelState {
    /// Resolved configuration
    config: Arc<PanelConfig>,
    /// Local catalog
    catalog: Arc<SqliteCatalog>,
    /// Storage of the catalog master key
    credential_service: CredentialService,
    /// Operation facade
    postgresql: PostgresqlService,
}

impl PanelState {
    /// Create state from configuration loaded at `config_path` (optional).
    pub fn new(config_path: Option<&Path>) -> Result<Self, PanelError> {
        Self::with_config(PanelConfig::load(config_path)?)
    }

    /// Create state with an explicit configuration (for testing).
    pub fn with_config(config: PanelConfig) -> Result<Self, PanelError> {
        let credential_service = CredentialService::new(&config.data_dir);
        Self::with_credentials(config, credential_service)
    }

    /// Create state with an explicit configuration and key storage.
    pub fn with_credentials(
        config: PanelConfig,
        credential_service: CredentialService,
    ) -> Result<Self, PanelError> {
        init_data_dir(&config.data_dir)?;

        let catalog = Arc::new(SqliteCatalog::open(config.data_dir.clone())?);
        let cipher = Arc::new(AesSecretCipher::new(&credential_service.master_key()?));
        let config = Arc::new(config);

        let ctx = ServiceContext {
            catalog: catalog.clone(),
            apps: catalog.clone(),
            backups: catalog.clone(),
            cipher,
            restarter: Arc::new(DockerCompose::new(config.container_runtime.as_str())),
            connector: Arc::new(PostgresConnector::new(config.container_runtime.as_str())),
            config: config.clone(),
        };

        tracing::info!(
            data_dir = %config.data_dir.display(),
            credentials = credential_service.provider_name(),
            "PanelState initialized"
        );

        Ok(Self { config, catalog, credential_service, postgresql: PostgresqlService::new(ctx) })
    }

    // ========== Accessors ==========

    /// Get the PostgreSQL service.
    pub fn postgresql(&self) -> &PostgresqlService {
        &self.postgresql
    }

    /// Get the local catalog.
    pub fn catalog(&self) -> &SqliteCatalog {
        &self.catalog
    }

    /// Get the credential service.
    pub fn credentials(&self) -> &CredentialService {
        &self.credential_service
    }

    /// Get the configuration.
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EngineInstance, Origin};
    use crate::repository::{CatalogRepository, SecretCipher};
    use crate::services::credentials::FileCredentialsProvider;
    use crate::services::CatalogSynchronizer;

    fn open_state(dir: &Path) -> PanelState {
        let config = PanelConfig::with_data_dir(dir);
        let provider = FileCredentialsProvider::new(dir).unwrap();
        PanelState::with_credentials(config, CredentialService::with_provider(Box::new(provider))).unwrap()
    }

    #[test]
    fn test_state_wires_catalog_and_cipher() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_state(dir.path());
        state.catalog().save_engine(&EngineInstance::local("pgA")).unwrap();
        assert_eq!(state.credentials().provider_name(), "FileCredentialsProvider");
        assert!(state.postgresql().list_db_options().unwrap().is_empty());
    }

    #[test]
    fn test_secrets_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let state = open_state(dir.path());
            CatalogSynchronizer::new(state.postgresql().context())
                .record_created("app_db", "pgA", "app_user", "p@ss1", Origin::Local, "")
                .unwrap()
                .id
        };

        let state = open_state(dir.path());
        let stored = state.catalog().get_database(id).unwrap().unwrap();
        let cipher = &state.postgresql().context().cipher;
        assert_eq!(cipher.decrypt(&stored.password).unwrap(), "p@ss1");
    }
}
