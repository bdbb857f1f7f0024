//! Service layer of the control plane.
//!
//! - `context` - ServiceContext, the injected collaborators
//! - `resolver` - Engine name to connection parameters and session
//! - `synchronizer` - Catalog updates after engine success
//! - `propagator` - Password rotation across linked applications
//! - `postgresql` - PostgresqlService, the operation facade
//! - `storage` - SQLite catalog
//! - `credentials` - Keychain/file storage for the catalog master key
//! - `cipher` - AES-GCM secret encryption
//! - `compose` - Compose project restarts

pub mod cipher;
pub mod compose;
pub mod context;
pub mod credentials;
pub mod postgresql;
pub mod propagator;
pub mod resolver;
pub mod storage;
pub mod synchronizer;

pub use cipher::AesSecretCipher;
pub use compose::DockerCompose;
pub use context::ServiceContext;
pub use credentials::CredentialService;
pub use postgresql::PostgresqlService;
pub use propagator::CredentialPropagator;
pub use resolver::{BackendResolver, ResolvedBackend};
pub use storage::SqliteCatalog;
pub use synchronizer::{CatalogSynchronizer, CleanupReport, CleanupWarning};
