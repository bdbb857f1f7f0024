//! Administrative clients for PostgreSQL engines.
//!
//! - `version` - VersionFamily and per-family capabilities
//! - `sql` - Statement builders and quoting
//! - `hba` - Managed `pg_hba.conf` rules
//! - `executor` - SqlExecutor transport trait
//! - `container` - `docker exec ... psql` transport
//! - `remote` - tokio-postgres transport
//! - `postgres` - PostgresAdmin, the AdminClient implementation

pub mod container;
pub mod executor;
pub mod hba;
pub mod postgres;
pub mod remote;
pub mod sql;
pub mod version;

use async_trait::async_trait;
use std::ops::Deref;

use crate::error::PanelError;
use crate::models::{
    AccessChangeInfo, ConnectionParams, CreateInfo, DeleteInfo, Endpoint, PasswordChangeInfo,
    PostgresqlStatus,
};

pub use container::ContainerExecutor;
pub use executor::{SqlExecutor, TextRow};
pub use hba::AccessScope;
pub use postgres::PostgresAdmin;
pub use remote::RemoteExecutor;
pub use version::VersionFamily;

/// Client for a container-hosted engine.
pub type LocalAdminClient = PostgresAdmin<ContainerExecutor>;

/// Client for a network-reachable engine.
pub type RemoteAdminClient = PostgresAdmin<RemoteExecutor>;

/// A database that exists on the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDatabase {
    /// Database name
    pub name: String,
    /// Owning role
    pub owner: String,
}

/// Version-agnostic administrative capabilities of one engine session.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Create a role and a database owned by it.
    async fn create(&self, info: CreateInfo) -> Result<(), PanelError>;

    /// Drop a database and its role.
    async fn delete(&self, info: DeleteInfo) -> Result<(), PanelError>;

    /// Set a role's password.
    async fn change_password(&self, info: PasswordChangeInfo) -> Result<(), PanelError>;

    /// Change the hosts a role may connect from.
    async fn change_access(&self, info: AccessChangeInfo) -> Result<(), PanelError>;

    /// Health snapshot. Never fails; the zero value stands for "unavailable".
    async fn status(&self) -> PostgresqlStatus;

    /// User databases present on the engine.
    async fn list_databases(&self) -> Result<Vec<EngineDatabase>, PanelError>;

    /// Release the session. Idempotent.
    fn close(&self);
}

/// Opens administrative sessions.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    /// Connect using resolved parameters and the recorded version (may be empty).
    async fn connect(
        &self,
        params: &ConnectionParams,
        version: &str,
    ) -> Result<Box<dyn AdminClient>, PanelError>;
}

/// Connector producing [`PostgresAdmin`] clients over the real transports.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    container_runtime: String,
}

impl PostgresConnector {
    /// Create a connector that runs containers through `container_runtime`.
    pub fn new(container_runtime: impl Into<String>) -> Self {
        Self { container_runtime: container_runtime.into() }
    }
}

impl Default for PostgresConnector {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ClientConnector for PostgresConnector {
    async fn connect(
        &self,
        params: &ConnectionParams,
        version: &str,
    ) -> Result<Box<dyn AdminClient>, PanelError> {
        let target = params.display_target();
        match &params.endpoint {
            Endpoint::Container { container } => {
                let executor = ContainerExecutor::new(
                    self.container_runtime.as_str(),
                    container.as_str(),
                    params.username.as_str(),
                    params.password.as_str(),
                );
                let client: LocalAdminClient =
                    PostgresAdmin::new(executor, version, params.username.as_str(), target, params.timeout);
                Ok(Box::new(client))
            }
            Endpoint::Network { host, port, tls } => {
                let connecting = RemoteExecutor::connect(
                    host,
                    *port,
                    &params.username,
                    &params.password,
                    tls,
                    params.timeout,
                );
                let executor = tokio::time::timeout(params.timeout, connecting)
                    .await
                    .map_err(|_| PanelError::timeout("connect", params.timeout.as_secs()))??;
                let client: RemoteAdminClient =
                    PostgresAdmin::new(executor, version, params.username.as_str(), target, params.timeout);
                Ok(Box::new(client))
            }
        }
    }
}

/// One administrative session, closed exactly once when dropped.
pub struct ClientSession {
    client: Box<dyn AdminClient>,
    engine: String,
}

impl ClientSession {
    /// Take ownership of a connected client.
    pub fn new(engine: impl Into<String>, client: Box<dyn AdminClient>) -> Self {
        Self { client, engine: engine.into() }
    }

    /// Engine name the session was resolved for.
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Close the session now instead of at end of scope.
    pub fn close(self) {
        drop(self);
    }
}

impl Deref for ClientSession {
    type Target = dyn AdminClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.client.close();
        tracing::trace!(engine = %self.engine, "Administrative session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingClient {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AdminClient for CountingClient {
        async fn create(&self, _info: CreateInfo) -> Result<(), PanelError> {
            Ok(())
        }
        async fn delete(&self, _info: DeleteInfo) -> Result<(), PanelError> {
            Ok(())
        }
        async fn change_password(&self, _info: PasswordChangeInfo) -> Result<(), PanelError> {
            Ok(())
        }
        async fn change_access(&self, _info: AccessChangeInfo) -> Result<(), PanelError> {
            Ok(())
        }
        async fn status(&self) -> PostgresqlStatus {
            PostgresqlStatus::default()
        }
        async fn list_databases(&self) -> Result<Vec<EngineDatabase>, PanelError> {
            Ok(Vec::new())
        }
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(closes: &Arc<AtomicUsize>) -> ClientSession {
        ClientSession::new("pgA", Box::new(CountingClient { closes: closes.clone() }))
    }

    #[tokio::test]
    async fn test_session_closes_once_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let session = session(&closes);
            assert!(session.status().await.is_empty());
            assert_eq!(session.engine(), "pgA");
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_close_does_not_double_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        session(&closes).close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_container_connect_is_lazy() {
        let params = ConnectionParams::container("pgA", "pg-a-container", 5432, "postgres", "pw");
        let client = PostgresConnector::new("/nonexistent/pgpanel-runtime").connect(&params, "15").await;
        assert!(client.is_ok());
    }
}
