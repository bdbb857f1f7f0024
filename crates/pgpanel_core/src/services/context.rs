//! Explicitly injected collaborators shared by the services.

use std::sync::Arc;

use crate::admin::ClientConnector;
use crate::config::PanelConfig;
use crate::repository::{
    AppInstallRepository, BackupRepository, CatalogRepository, SecretCipher, ServiceRestarter,
};

/// Everything a service needs, passed in rather than looked up globally.
///
/// Cloning is cheap; all collaborators are reference counted.
#[derive(Clone)]
pub struct ServiceContext {
    /// Engine instances and logical databases
    pub catalog: Arc<dyn CatalogRepository>,
    /// Application installations and their database links
    pub apps: Arc<dyn AppInstallRepository>,
    /// Backup bookkeeping
    pub backups: Arc<dyn BackupRepository>,
    /// Encryption of stored secrets
    pub cipher: Arc<dyn SecretCipher>,
    /// Compose project restarts
    pub restarter: Arc<dyn ServiceRestarter>,
    /// Opens administrative sessions
    pub connector: Arc<dyn ClientConnector>,
    /// Filesystem layout and timeouts
    pub config: Arc<PanelConfig>,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext").field("config", &self.config).finish_non_exhaustive()
    }
}
