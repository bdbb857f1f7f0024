//! PostgreSQL database management service.
//!
//! The facade every caller goes through. Each operation validates its input,
//! resolves the engine, runs the administrative command under the configured
//! timeout, and only then touches durable state.

use std::collections::HashMap;

use crate::admin::AccessScope;
use crate::error::PanelError;
use crate::legality::{ensure_legal, ensure_path_segment};
use crate::models::{
    AccessChangeInfo, ChangeDbInfo, ConfUpdateByFile, CreateInfo, CreateRequest, DatabaseSearch,
    DbBaseInfo, DeleteCheckRequest, DeleteInfo, DeleteRequest, LoadFromEngine, LogicalDatabase,
    OperationWithNameAndType, Origin, PageResult, PasswordChangeInfo, PostgresqlDbInfo,
    PostgresqlOption, PostgresqlStatus, UpdateDescription, POSTGRESQL_TYPE,
};
use crate::services::{
    BackendResolver, CatalogSynchronizer, CleanupReport, CredentialPropagator, ServiceContext,
};

/// File type selecting the engine's main configuration file.
pub const POSTGRESQL_CONF_TYPE: &str = "postgresql-conf";

/// Role names that may not own a database on a local engine.
const RESERVED_LOCAL_USERS: &[&str] = &["root", "postgres"];

/// Lifecycle operations on logical databases.
pub struct PostgresqlService {
    ctx: ServiceContext,
}

impl PostgresqlService {
    /// Create a service over explicitly injected collaborators.
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn resolver(&self) -> BackendResolver<'_> {
        BackendResolver::new(&self.ctx)
    }

    fn synchronizer(&self) -> CatalogSynchronizer<'_> {
        CatalogSynchronizer::new(&self.ctx)
    }

    fn load_database(&self, id: i64) -> Result<LogicalDatabase, PanelError> {
        self.ctx
            .catalog
            .get_database(id)?
            .ok_or_else(|| PanelError::not_found(format!("database {id}")))
    }

    /// Engine app install id that scopes the links of a local database.
    fn link_scope(&self, database: &LogicalDatabase, db_type: &str, engine: &str) -> Result<Option<i64>, PanelError> {
        if database.from.is_local() {
            Ok(Some(self.ctx.apps.load_base_info(db_type, engine)?.id))
        } else {
            Ok(None)
        }
    }

    // ========== Lifecycle ==========

    /// Provision a database and its owning role, then record it.
    pub async fn create(&self, req: CreateRequest) -> Result<LogicalDatabase, PanelError> {
        ensure_legal(&[
            ("name", req.name.as_str()),
            ("username", req.username.as_str()),
            ("password", req.password.as_str()),
            ("format", req.format.as_str()),
        ])?;
        if req.name.trim().is_empty() || req.username.trim().is_empty() {
            return Err(PanelError::invalid_input("database name and username are required"));
        }
        ensure_path_segment("name", &req.name)?;

        let from = Origin::parse(&req.from);
        if from.is_local() && RESERVED_LOCAL_USERS.contains(&req.username.as_str()) {
            return Err(PanelError::invalid_input(format!("cannot use {} as user name", req.username)));
        }
        if self.ctx.catalog.find_database(&req.name, &req.database, &from)?.is_some() {
            return Err(PanelError::record_exist(format!("database {} on {}", req.name, req.database)));
        }

        let backend = self.resolver().resolve_backend(&req.database).await?;
        backend
            .session
            .create(CreateInfo {
                name: req.name.clone(),
                format: req.format.clone(),
                username: req.username.clone(),
                password: req.password.clone(),
                version: backend.version.clone(),
                timeout: self.ctx.config.admin_timeout(),
            })
            .await?;
        backend.session.close();
        tracing::info!(database = %req.name, engine = %req.database, "Database created");

        self.synchronizer()
            .record_created(&req.name, &req.database, &req.username, &req.password, from, &req.description)
            .map_err(|e| {
                PanelError::partial_failure(format!("database {} created but not recorded", req.name), e)
            })
    }

    /// Names of the applications still linked to a database.
    pub fn delete_check(&self, req: &DeleteCheckRequest) -> Result<Vec<String>, PanelError> {
        let database = self.load_database(req.id)?;
        let scope = self.link_scope(&database, &req.db_type, &req.database)?;

        let mut in_use = Vec::new();
        for link in self.ctx.apps.list_resources(scope, database.id)? {
            if let Some(install) = self.ctx.apps.get(link.app_install_id)? {
                in_use.push(install.name);
            }
        }
        Ok(in_use)
    }

    /// Drop a database from the engine and the catalog.
    ///
    /// Without `force_delete` any engine failure aborts before the catalog is
    /// touched. With it, engine failures become warnings and the catalog is
    /// cleaned regardless.
    pub async fn delete(&self, req: &DeleteRequest) -> Result<CleanupReport, PanelError> {
        let mut report = CleanupReport::default();
        let database = match self.ctx.catalog.get_database(req.id)? {
            Some(database) => database,
            None if req.force_delete => {
                report.warn("catalog", format!("database {} already absent", req.id));
                return Ok(report);
            }
            None => return Err(PanelError::not_found(format!("database {}", req.id))),
        };

        match self.drop_on_engine(&database, &req.database, req.force_delete).await {
            Ok(()) => {}
            Err(e) if req.force_delete => report.warn("engine", e.to_string()),
            Err(e) => return Err(e),
        }

        let cleanup = self.synchronizer().remove(&database, req.delete_backup).await?;
        report.warnings.extend(cleanup.warnings);
        tracing::info!(database = %database.name, engine = %req.database, "Database deleted");
        Ok(report)
    }

    async fn drop_on_engine(&self, database: &LogicalDatabase, engine: &str, force: bool) -> Result<(), PanelError> {
        let backend = self.resolver().resolve_backend(engine).await?;
        backend
            .session
            .delete(DeleteInfo {
                name: database.name.clone(),
                version: backend.version.clone(),
                username: database.username.clone(),
                permission: database.permission.clone(),
                force_delete: force,
                timeout: self.ctx.config.admin_timeout(),
            })
            .await
    }

    // ========== Credentials and access ==========

    /// Rotate a role password.
    ///
    /// `id == 0` rotates the engine's administrative password. Otherwise the
    /// database role is rotated, the catalog updated, and every linked app
    /// rewritten and restarted in link order. Anything failing after the
    /// engine accepted the password is a partial failure.
    ///
    /// The catalog is written before any app, so after a partial failure the
    /// engine and catalog hold the new password while the failing app and
    /// every app after it still hold the old one.
    pub async fn change_password(&self, info: &ChangeDbInfo) -> Result<(), PanelError> {
        ensure_legal(&[("value", info.value.as_str())])?;
        if info.value.is_empty() {
            return Err(PanelError::invalid_input("password must not be empty"));
        }

        let target = match info.id {
            0 => None,
            id => {
                let database = self.load_database(id)?;
                let scope = self.link_scope(&database, &info.db_type, &info.database)?;
                Some((database, scope))
            }
        };

        let backend = self.resolver().resolve_backend(&info.database).await?;
        let (name, username) = match &target {
            Some((database, _)) => (database.name.clone(), database.username.clone()),
            None => (String::new(), backend.params.username.clone()),
        };
        backend
            .session
            .change_password(PasswordChangeInfo {
                name,
                username,
                password: info.value.clone(),
                version: backend.version.clone(),
                timeout: self.ctx.config.admin_timeout(),
            })
            .await?;
        let from = backend.params.from.clone();
        backend.session.close();

        let propagator = CredentialPropagator::new(&self.ctx);
        match target {
            Some((database, scope)) => {
                self.synchronizer().record_password(database.id, &info.value).map_err(|e| {
                    PanelError::partial_failure(format!("password of {} changed but not recorded", database.name), e)
                })?;
                let updated = propagator.propagate_database(&database, scope, &info.value).await?;
                tracing::info!(database = %database.name, linked_apps = updated, "Password changed");
            }
            None => {
                propagator.propagate_engine(&info.database, &from, &info.value)?;
                tracing::info!(engine = %info.database, "Admin password changed");
            }
        }
        Ok(())
    }

    /// Change which hosts a role may connect from.
    ///
    /// `id == 0` targets the engine's administrative role on all databases;
    /// nothing is recorded in that case.
    pub async fn change_access(&self, info: &ChangeDbInfo) -> Result<(), PanelError> {
        ensure_legal(&[("value", info.value.as_str())])?;
        AccessScope::parse(&info.value)?;

        let database = match info.id {
            0 => None,
            id => Some(self.load_database(id)?),
        };

        let backend = self.resolver().resolve_backend(&info.database).await?;
        let access = match &database {
            Some(database) => AccessChangeInfo {
                name: database.name.clone(),
                username: database.username.clone(),
                password: database.password.clone(),
                permission: info.value.clone(),
                version: backend.version.clone(),
                timeout: self.ctx.config.admin_timeout(),
            },
            None => {
                tracing::warn!(engine = %info.database, "Changing access of the administrative role");
                AccessChangeInfo {
                    name: String::new(),
                    username: backend.params.username.clone(),
                    password: String::new(),
                    permission: info.value.clone(),
                    version: backend.version.clone(),
                    timeout: self.ctx.config.admin_timeout(),
                }
            }
        };
        backend.session.change_access(access).await?;
        backend.session.close();

        if let Some(database) = database {
            self.synchronizer().record_permission(database.id, &info.value).map_err(|e| {
                PanelError::partial_failure(format!("access of {} changed but not recorded", database.name), e)
            })?;
        }
        tracing::info!(engine = %info.database, permission = %info.value, "Access changed");
        Ok(())
    }

    // ========== Catalog ==========

    pub fn update_description(&self, req: &UpdateDescription) -> Result<(), PanelError> {
        self.synchronizer().update_description(req.id, &req.description)
    }

    /// One page of an engine's databases, passwords omitted.
    pub fn search_with_page(&self, search: &DatabaseSearch) -> Result<PageResult<PostgresqlDbInfo>, PanelError> {
        let page = self.ctx.catalog.page_databases(search)?;
        Ok(PageResult { total: page.total, items: page.items.iter().map(PostgresqlDbInfo::from).collect() })
    }

    /// Every database as a picker option, tagged with its engine's type.
    pub fn list_db_options(&self) -> Result<Vec<PostgresqlOption>, PanelError> {
        let engine_types: HashMap<String, String> = self
            .ctx
            .catalog
            .list_engines(POSTGRESQL_TYPE)?
            .into_iter()
            .map(|engine| (engine.name, engine.db_type))
            .collect();

        Ok(self
            .ctx
            .catalog
            .list_databases()?
            .into_iter()
            .map(|db| PostgresqlOption {
                id: db.id,
                from: db.from.as_str().to_string(),
                db_type: engine_types.get(&db.postgresql_name).cloned().unwrap_or_default(),
                database: db.postgresql_name,
                name: db.name,
            })
            .collect())
    }

    /// Record databases that exist on the engine but not in the catalog.
    ///
    /// Imported rows take the database owner as username and carry no
    /// password. Returns how many were imported.
    pub async fn load_from_remote(&self, req: &LoadFromEngine) -> Result<usize, PanelError> {
        let backend = self.resolver().resolve_backend(&req.database).await?;
        let found = backend.session.list_databases().await?;
        let from = backend.params.from.clone();
        backend.session.close();

        let mut imported = 0;
        for db in found {
            if self.ctx.catalog.find_database(&db.name, &req.database, &from)?.is_some() {
                continue;
            }
            let record = LogicalDatabase::new(db.name.as_str(), req.database.as_str(), db.owner, "", from.clone());
            self.ctx.catalog.create_database(&record)?;
            tracing::debug!(database = %db.name, engine = %req.database, "Imported database");
            imported += 1;
        }
        tracing::info!(engine = %req.database, imported, "Databases loaded from engine");
        Ok(imported)
    }

    // ========== Engine info ==========

    pub fn load_base_info(&self, req: &OperationWithNameAndType) -> Result<DbBaseInfo, PanelError> {
        let base = self.ctx.apps.load_base_info(&req.db_type, &req.name)?;
        Ok(DbBaseInfo { name: base.name, container_name: base.container_name, port: base.port })
    }

    /// Health snapshot of a local engine; the zero value when unreachable.
    pub async fn load_status(&self, req: &OperationWithNameAndType) -> Result<PostgresqlStatus, PanelError> {
        let base = self.ctx.apps.load_base_info(&req.db_type, &req.name)?;
        let session = self.resolver().resolve(&base.name).await?;
        Ok(session.status().await)
    }

    /// PostgreSQL engines always accept remote connections.
    pub fn load_remote_access(&self, _req: &OperationWithNameAndType) -> Result<bool, PanelError> {
        Ok(true)
    }

    /// Read an engine configuration file.
    pub async fn load_database_file(&self, req: &OperationWithNameAndType) -> Result<String, PanelError> {
        let path = match req.db_type.as_str() {
            POSTGRESQL_CONF_TYPE => self.ctx.config.engine_conf_path(POSTGRESQL_TYPE, &req.name),
            other => return Err(PanelError::not_found(format!("file type {other}"))),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PanelError::not_found(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace an engine's `postgresql.conf` and restart it.
    pub async fn update_conf_by_file(&self, req: &ConfUpdateByFile) -> Result<(), PanelError> {
        let base = self.ctx.apps.load_base_info(&req.db_type, &req.database)?;
        self.resolver().resolve_params(&req.database)?;

        let install_dir = self.ctx.config.engine_install_dir(&req.db_type, &base.name);
        let conf = self.ctx.config.engine_conf_path(&req.db_type, &base.name);
        // Only replace an existing file; a missing one means the install is broken
        match tokio::fs::metadata(&conf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PanelError::not_found(conf.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        tokio::fs::write(&conf, req.file.as_bytes()).await?;

        self.ctx
            .restarter
            .restart(&install_dir.join("docker-compose.yml"))
            .await
            .map_err(|e| PanelError::partial_failure(format!("configuration of {} written but not applied", base.name), e))?;
        tracing::info!(engine = %req.database, "Configuration replaced");
        Ok(())
    }
}
