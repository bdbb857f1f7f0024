//! Data models for pgpanel.
//!
//! - `engine` - EngineInstance, Origin, TlsMaterial, ConnectionParams
//! - `database` - LogicalDatabase and its search/list representations
//! - `app` - App installs, resource links, backup records
//! - `intent` - Administrative intents passed to `AdminClient`
//! - `requests` - Payloads accepted by `PostgresqlService`
//! - `status` - PostgresqlStatus

pub mod app;
pub mod database;
pub mod engine;
pub mod intent;
pub mod requests;
pub mod status;

pub use app::{
    AppInstall, AppInstallBaseInfo, AppInstallResource, BackupRecord, InstallParam, ROOT_PASSWORD_ENV,
    ROOT_USER_ENV, USER_PASSWORD_ENV,
};
pub use database::{
    DatabaseSearch, DbBaseInfo, LogicalDatabase, Order, OrderBy, PageResult, PostgresqlDbInfo,
    PostgresqlOption, DEFAULT_PERMISSION,
};
pub use engine::{
    ConnectionParams, Endpoint, EngineInstance, Origin, TlsMaterial, POSTGRESQL_TYPE,
};
pub use intent::{AccessChangeInfo, CreateInfo, DeleteInfo, PasswordChangeInfo, ADMIN_TIMEOUT};
pub use requests::{
    ChangeDbInfo, ConfUpdateByFile, CreateRequest, DeleteCheckRequest, DeleteRequest,
    LoadFromEngine, OperationWithNameAndType, UpdateDescription,
};
pub use status::PostgresqlStatus;
