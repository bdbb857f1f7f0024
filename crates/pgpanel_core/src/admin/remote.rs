//! Network execution against a remote engine via tokio-postgres.
//!
//! One administrative session is a deadpool pool capped at a single
//! connection: statements share the session (so `SET` carries over) and
//! closing the pool tears the connection down.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use native_tls::{Certificate, Identity, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::{NoTls, SimpleQueryMessage};

use super::executor::{SqlExecutor, TextRow};
use crate::error::PanelError;
use crate::models::TlsMaterial;

/// Maintenance database every server has.
const ADMIN_DATABASE: &str = "postgres";

/// Application name reported in `pg_stat_activity`.
const APPLICATION_NAME: &str = "pgpanel";

/// Executes SQL over a dedicated tokio-postgres connection.
pub struct RemoteExecutor {
    pool: Pool,
    target: String,
}

impl RemoteExecutor {
    /// Connect and validate the session with `SELECT 1`.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        tls: &TlsMaterial,
        connect_timeout: Duration,
    ) -> Result<Self, PanelError> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(host);
        pg_config.port(port);
        pg_config.dbname(ADMIN_DATABASE);
        pg_config.user(username);
        pg_config.password(password);
        pg_config.application_name(APPLICATION_NAME);
        pg_config.connect_timeout(connect_timeout);
        pg_config.keepalives(true);

        let manager_config = ManagerConfig { recycling_method: RecyclingMethod::Fast };
        let manager = if tls.ssl {
            pg_config.ssl_mode(tokio_postgres::config::SslMode::Require);
            Manager::from_config(pg_config, build_tls(tls)?, manager_config)
        } else {
            Manager::from_config(pg_config, NoTls, manager_config)
        };

        let pool = Pool::builder(manager)
            .max_size(1)
            .wait_timeout(Some(connect_timeout))
            .create_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| PanelError::connection(format!("Failed to create pool: {e}")))?;

        let client = pool.get().await.map_err(|e| {
            PanelError::connection(format!("Failed to establish connection: {e}"))
        })?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| PanelError::connection(format!("Connection validation failed: {e}")))?;
        drop(client);

        let target = format!("{username}@{host}:{port}");
        tracing::debug!(target = %target, ssl = tls.ssl, "Remote administrative session opened");
        Ok(Self { pool, target })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, PanelError> {
        self.pool
            .get()
            .await
            .map_err(|e| PanelError::connection(format!("Failed to acquire session: {e}")))
    }
}

/// Build a TLS connector from PEM material.
fn build_tls(tls: &TlsMaterial) -> Result<MakeTlsConnector, PanelError> {
    let mut builder = TlsConnector::builder();

    if tls.skip_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }

    if let Some(root) = tls.root_cert.as_deref().filter(|pem| !pem.is_empty()) {
        let cert = Certificate::from_pem(root.as_bytes()).map_err(|e| {
            PanelError::connection(format!("Failed to parse CA certificate: {e}"))
        })?;
        builder.add_root_certificate(cert);
    }

    let present = |pem: &Option<String>| pem.clone().filter(|pem| !pem.is_empty());
    match (present(&tls.client_cert), present(&tls.client_key)) {
        (Some(cert), Some(key)) => {
            let identity = Identity::from_pkcs8(cert.as_bytes(), key.as_bytes()).map_err(|e| {
                PanelError::connection(format!("Failed to load client certificate: {e}"))
            })?;
            builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(PanelError::connection(
                "Client certificate and client key must be provided together",
            ))
        }
    }

    let connector = builder
        .build()
        .map_err(|e| PanelError::connection(format!("Failed to create TLS connector: {e}")))?;
    Ok(MakeTlsConnector::new(connector))
}

#[async_trait]
impl SqlExecutor for RemoteExecutor {
    async fn execute(&self, sql: &str) -> Result<(), PanelError> {
        let client = self.client().await?;
        client.batch_execute(sql).await.map_err(PanelError::from)
    }

    async fn query(&self, sql: &str) -> Result<Vec<TextRow>, PanelError> {
        let client = self.client().await?;
        let messages = client.simple_query(sql).await.map_err(PanelError::from)?;

        let rows = messages
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(
                    (0..row.len()).map(|i| row.get(i).unwrap_or_default().to_string()).collect(),
                ),
                _ => None,
            })
            .collect();
        Ok(rows)
    }

    fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close();
            tracing::debug!(target = %self.target, "Remote administrative session closed");
        }
    }

    fn transport(&self) -> &'static str {
        "network"
    }
}
