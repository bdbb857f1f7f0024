//! Administrative control plane for local and remote PostgreSQL engines.
//!
//! Provisions databases and roles, rotates credentials, changes host access,
//! replaces engine configuration, and deprovisions, over two backends: an
//! engine running in a panel-managed container and an externally reachable
//! server. A local SQLite catalog is kept consistent with the live engines.
//!
//! - **admin**: `AdminClient` and its version-aware PostgreSQL implementation
//! - **services**: Resolver, catalog synchronizer, credential propagator, and
//!   the `PostgresqlService` facade, plus the concrete collaborators
//! - **repository**: Collaborator traits the services depend on
//! - **models**: Catalog records, intents, requests, and status
//! - **error**: `PanelError` and its classification
//! - **config** / **logging** / **state**: Ambient setup

pub mod admin;
pub mod config;
pub mod error;
pub mod legality;
pub mod logging;
pub mod models;
pub mod repository;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;

pub use admin::{AdminClient, ClientConnector, ClientSession, PostgresConnector};
pub use config::PanelConfig;
pub use error::{ErrorKind, PanelError};
pub use services::{CleanupReport, PostgresqlService, ServiceContext};
pub use state::PanelState;
