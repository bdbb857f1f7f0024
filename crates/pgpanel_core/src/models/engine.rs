//! Engine instance records and the connection parameters derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::intent::ADMIN_TIMEOUT;

/// Database type key used for PostgreSQL engines and their app installs.
pub const POSTGRESQL_TYPE: &str = "postgresql";

/// Whether an engine is supervised locally (container) or reached remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Engine runs in a container managed by the panel.
    #[default]
    Local,
    /// Externally managed server, tagged with the label it was registered from.
    Remote(String),
}

impl Origin {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local => "local",
            Self::Remote(label) => label,
        }
    }

    /// Parse from string representation.
    ///
    /// Anything other than `local` is a remote label.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("local") {
            Self::Local
        } else {
            Self::Remote(s.to_string())
        }
    }

    /// Check if the engine is locally supervised.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

/// TLS settings for a remote engine. Certificates are PEM text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    /// Whether to use TLS at all.
    pub ssl: bool,
    /// Accept any server certificate.
    pub skip_verify: bool,
    /// CA certificate to trust.
    pub root_cert: Option<String>,
    /// Client certificate for mutual TLS.
    pub client_cert: Option<String>,
    /// Client private key (PKCS#8) for mutual TLS.
    pub client_key: Option<String>,
}

/// The parent database service tracked in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInstance {
    /// Catalog row id
    pub id: i64,
    /// Unique engine name
    pub name: String,
    /// Database type (always `postgresql` here)
    pub db_type: String,
    /// Local or remote
    pub from: Origin,
    /// Server version string as recorded at registration
    pub version: String,
    /// Host name or IP (remote only)
    pub address: String,
    /// Server port
    pub port: u16,
    /// Administrative user
    pub username: String,
    /// Administrative password (ciphertext)
    pub password: String,
    /// TLS configuration
    pub tls: TlsMaterial,
    /// Free-text description
    pub description: String,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl EngineInstance {
    /// Create a locally supervised engine record.
    pub fn local(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            db_type: POSTGRESQL_TYPE.to_string(),
            from: Origin::Local,
            version: String::new(),
            address: String::new(),
            port: 5432,
            username: String::new(),
            password: String::new(),
            tls: TlsMaterial::default(),
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a remote engine record. `password` must already be encrypted.
    pub fn remote(
        name: impl Into<String>,
        label: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            from: Origin::Remote(label.into()),
            address: address.into(),
            port,
            username: username.into(),
            password: password.into(),
            version: version.into(),
            ..Self::local(name)
        }
    }
}

/// How the administrative client reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Run `psql` inside the named container.
    Container {
        /// Container name
        container: String,
    },
    /// Open a network connection.
    Network {
        /// Host name or IP
        host: String,
        /// Server port
        port: u16,
        /// TLS configuration
        tls: TlsMaterial,
    },
}

/// Everything needed to open an administrative session.
///
/// The password is plaintext and must never be logged.
#[derive(Clone)]
pub struct ConnectionParams {
    /// Engine name the params were resolved for
    pub database: String,
    /// Local or remote
    pub from: Origin,
    /// Transport endpoint
    pub endpoint: Endpoint,
    /// Port the engine listens on (informational for containers)
    pub port: u16,
    /// Administrative user
    pub username: String,
    /// Administrative password
    pub password: String,
    /// Upper bound for connecting and for each operation
    pub timeout: Duration,
}

impl ConnectionParams {
    /// Parameters for a container-hosted engine.
    pub fn container(
        database: impl Into<String>,
        container: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            from: Origin::Local,
            endpoint: Endpoint::Container { container: container.into() },
            port,
            username: username.into(),
            password: password.into(),
            timeout: ADMIN_TIMEOUT,
        }
    }

    /// Parameters for a network-reachable engine.
    pub fn network(
        database: impl Into<String>,
        from: Origin,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        tls: TlsMaterial,
    ) -> Self {
        Self {
            database: database.into(),
            from,
            endpoint: Endpoint::Network { host: host.into(), port, tls },
            port,
            username: username.into(),
            password: password.into(),
            timeout: ADMIN_TIMEOUT,
        }
    }

    /// Get the display target (without password).
    pub fn display_target(&self) -> String {
        match &self.endpoint {
            Endpoint::Container { container } => format!("container://{container}"),
            Endpoint::Network { host, port, .. } => {
                format!("postgresql://{}@{}:{}", self.username, host, port)
            }
        }
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("database", &self.database)
            .field("from", &self.from)
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
