//! Scripted collaborators for service tests.
//!
//! `Harness` wires a tempdir `SqliteCatalog`, a real `AesSecretCipher`, a
//! scripted `AdminClient` and a recording restarter into a `ServiceContext`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::admin::{AdminClient, ClientConnector, EngineDatabase};
use crate::config::PanelConfig;
use crate::error::PanelError;
use crate::models::{
    AccessChangeInfo, AppInstall, AppInstallResource, ConnectionParams, CreateInfo, DeleteInfo,
    EngineInstance, PasswordChangeInfo, PostgresqlStatus, POSTGRESQL_TYPE, ROOT_PASSWORD_ENV,
    ROOT_USER_ENV,
};
use crate::repository::{AppInstallRepository, CatalogRepository, SecretCipher, ServiceRestarter};
use crate::services::{AesSecretCipher, ServiceContext, SqliteCatalog};

/// How a scripted operation fails.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Engine,
    Timeout,
}

impl Failure {
    fn error(self, op: &str) -> PanelError {
        match self {
            Self::Engine => PanelError::engine(format!("scripted {op} failure")),
            Self::Timeout => PanelError::timeout(op, 300),
        }
    }
}

/// What a connect call was given.
#[derive(Debug, Clone)]
pub struct ConnectRecord {
    pub username: String,
    pub password: String,
    pub version: String,
    pub target: String,
}

/// Shared state behind the scripted connector and its clients.
#[derive(Default)]
pub struct Script {
    pub calls: Vec<String>,
    pub connects: Vec<ConnectRecord>,
    pub fail_on: HashMap<&'static str, Failure>,
    pub status: PostgresqlStatus,
    pub databases: Vec<EngineDatabase>,
    pub closes: usize,
}

impl Script {
    fn run(&mut self, op: &'static str, call: String) -> Result<(), PanelError> {
        self.calls.push(call);
        match self.fail_on.get(op) {
            Some(failure) => Err(failure.error(op)),
            None => Ok(()),
        }
    }
}

pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl AdminClient for ScriptedClient {
    async fn create(&self, info: CreateInfo) -> Result<(), PanelError> {
        self.script.lock().run("create", format!("create {} {}", info.name, info.username))
    }

    async fn delete(&self, info: DeleteInfo) -> Result<(), PanelError> {
        self.script
            .lock()
            .run("delete", format!("delete {} {} force={}", info.name, info.username, info.force_delete))
    }

    async fn change_password(&self, info: PasswordChangeInfo) -> Result<(), PanelError> {
        self.script.lock().run("change_password", format!("change_password {}", info.username))
    }

    async fn change_access(&self, info: AccessChangeInfo) -> Result<(), PanelError> {
        self.script.lock().run(
            "change_access",
            format!("change_access {} {} {}", info.name, info.username, info.permission),
        )
    }

    async fn status(&self) -> PostgresqlStatus {
        let mut script = self.script.lock();
        script.calls.push("status".to_string());
        script.status.clone()
    }

    async fn list_databases(&self) -> Result<Vec<EngineDatabase>, PanelError> {
        let mut script = self.script.lock();
        script.run("list_databases", "list_databases".to_string())?;
        Ok(script.databases.clone())
    }

    fn close(&self) {
        self.script.lock().closes += 1;
    }
}

pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl ClientConnector for ScriptedConnector {
    async fn connect(
        &self,
        params: &ConnectionParams,
        version: &str,
    ) -> Result<Box<dyn AdminClient>, PanelError> {
        let mut script = self.script.lock();
        script.connects.push(ConnectRecord {
            username: params.username.clone(),
            password: params.password.clone(),
            version: version.to_string(),
            target: params.display_target(),
        });
        if let Some(failure) = script.fail_on.get("connect") {
            return Err(failure.error("connect"));
        }
        Ok(Box::new(ScriptedClient { script: self.script.clone() }))
    }
}

/// Records restarted compose files; fails for paths containing a marker.
#[derive(Default)]
pub struct RecordingRestarter {
    pub restarted: Mutex<Vec<PathBuf>>,
    pub fail_marker: Mutex<Option<String>>,
}

#[async_trait]
impl ServiceRestarter for RecordingRestarter {
    async fn restart(&self, compose_path: &Path) -> Result<(), PanelError> {
        let failing = self
            .fail_marker
            .lock()
            .as_deref()
            .is_some_and(|marker| compose_path.to_string_lossy().contains(marker));
        if failing {
            return Err(PanelError::internal(format!("restart of {} failed", compose_path.display())));
        }
        self.restarted.lock().push(compose_path.to_path_buf());
        Ok(())
    }
}

pub struct Harness {
    pub ctx: ServiceContext,
    pub catalog: Arc<SqliteCatalog>,
    pub cipher: Arc<AesSecretCipher>,
    pub script: Arc<Mutex<Script>>,
    pub restarter: Arc<RecordingRestarter>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = PanelConfig::with_data_dir(dir.path());
        let catalog = Arc::new(SqliteCatalog::open(dir.path().to_path_buf()).unwrap());
        let cipher = Arc::new(AesSecretCipher::new(&[9u8; 32]));
        let script = Arc::new(Mutex::new(Script::default()));
        let restarter = Arc::new(RecordingRestarter::default());

        let ctx = ServiceContext {
            catalog: catalog.clone(),
            apps: catalog.clone(),
            backups: catalog.clone(),
            cipher: cipher.clone(),
            restarter: restarter.clone(),
            connector: Arc::new(ScriptedConnector { script: script.clone() }),
            config: Arc::new(config),
        };
        Self { ctx, catalog, cipher, script, restarter, dir }
    }

    /// Register a container-hosted engine. Returns its app install id.
    pub fn local_engine(&self, name: &str) -> i64 {
        self.catalog.save_engine(&EngineInstance::local(name)).unwrap();
        let install = AppInstall::new(POSTGRESQL_TYPE, name, format!("{name}-container"), 5432)
            .with_env(ROOT_USER_ENV, "postgres")
            .with_env(ROOT_PASSWORD_ENV, self.cipher.encrypt("rootpw").unwrap());
        self.catalog.save_install(&install).unwrap()
    }

    /// Register a remote engine. Returns its engine id.
    pub fn remote_engine(&self, name: &str, label: &str) -> i64 {
        let password = self.cipher.encrypt("adminpw").unwrap();
        let engine = EngineInstance::remote(name, label, "db.internal", 5433, "admin", password, "16.2");
        self.catalog.save_engine(&engine).unwrap()
    }

    /// Install an application and link it to a logical database.
    pub fn linked_app(&self, name: &str, link_id: i64, resource_id: i64, from: &str) -> i64 {
        let app = self.catalog.save_install(&AppInstall::new("wordpress", name, name, 8080)).unwrap();
        self.catalog
            .save_resource(&AppInstallResource {
                id: 0,
                app_install_id: app,
                link_id,
                resource_id,
                key: POSTGRESQL_TYPE.to_string(),
                from: from.to_string(),
            })
            .unwrap();
        app
    }

    pub fn fail(&self, op: &'static str, failure: Failure) {
        self.script.lock().fail_on.insert(op, failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    pub fn connects(&self) -> Vec<ConnectRecord> {
        self.script.lock().connects.clone()
    }

    pub fn closes(&self) -> usize {
        self.script.lock().closes
    }

    pub fn config(&self) -> &PanelConfig {
        &self.ctx.config
    }
}
