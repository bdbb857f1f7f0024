//! Durable catalog updates that follow successful engine operations.

use serde::Serialize;
use std::path::Path;

use crate::error::PanelError;
use crate::legality::is_path_segment;
use crate::models::{LogicalDatabase, Origin, POSTGRESQL_TYPE};
use crate::services::ServiceContext;

/// A cleanup step that failed without failing the delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupWarning {
    /// Which step failed, e.g. `backup_dir`
    pub step: &'static str,
    /// What went wrong
    pub message: String,
}

/// Outcome of a delete's best-effort steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Steps that failed, in execution order
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    /// Record a failed step and log it.
    pub fn warn(&mut self, step: &'static str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(step, %message, "Cleanup step failed");
        self.warnings.push(CleanupWarning { step, message });
    }

    /// Check if every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Keeps the catalog consistent with the engine.
pub struct CatalogSynchronizer<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> CatalogSynchronizer<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Insert the row for a database the engine just created.
    pub fn record_created(
        &self,
        name: &str,
        postgresql_name: &str,
        username: &str,
        password: &str,
        from: Origin,
        description: &str,
    ) -> Result<LogicalDatabase, PanelError> {
        let encrypted = self.ctx.cipher.encrypt(password)?;
        let mut database = LogicalDatabase::new(name, postgresql_name, username, encrypted, from);
        database.description = description.to_string();
        database.id = self.ctx.catalog.create_database(&database)?;

        tracing::info!(database = %name, engine = %postgresql_name, id = database.id, "Database recorded");
        Ok(database)
    }

    pub fn update_description(&self, id: i64, description: &str) -> Result<(), PanelError> {
        self.ctx.catalog.update_description(id, description)
    }

    /// Encrypt and persist a role password.
    pub fn record_password(&self, id: i64, password: &str) -> Result<(), PanelError> {
        let encrypted = self.ctx.cipher.encrypt(password)?;
        self.ctx.catalog.update_password(id, &encrypted)
    }

    pub fn record_permission(&self, id: i64, permission: &str) -> Result<(), PanelError> {
        self.ctx.catalog.update_permission(id, permission)
    }

    /// Remove a database row, its links, and optionally its backups.
    ///
    /// Only the row deletion can fail the call. Filesystem and backup record
    /// cleanup failures are collected into the report.
    pub async fn remove(
        &self,
        database: &LogicalDatabase,
        delete_backup: bool,
    ) -> Result<CleanupReport, PanelError> {
        let mut report = CleanupReport::default();

        if delete_backup {
            let config = &self.ctx.config;
            if is_path_segment(&database.postgresql_name) && is_path_segment(&database.name) {
                let upload_dir = config.upload_dir(POSTGRESQL_TYPE, &database.postgresql_name, &database.name);
                remove_tree(&upload_dir, "upload_dir", &mut report).await;

                let backup_dir =
                    config.database_backup_dir(POSTGRESQL_TYPE, &database.postgresql_name, &database.name);
                remove_tree(&backup_dir, "backup_dir", &mut report).await;
            } else {
                // Imported names are not validated; never let one escape its directory
                report.warn("backup_dir", format!("{:?} is not a plain directory name, files kept", database.name));
            }

            match self.ctx.backups.delete_records(POSTGRESQL_TYPE, &database.postgresql_name, &database.name) {
                Ok(count) => tracing::info!(
                    engine = %database.postgresql_name,
                    database = %database.name,
                    count,
                    "Backup records removed"
                ),
                Err(e) => report.warn("backup_records", e.to_string()),
            }
        }

        self.ctx.catalog.delete_database_with_links(database.id)?;
        Ok(report)
    }
}

async fn remove_tree(path: &Path, step: &'static str, report: &mut CleanupReport) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => report.warn(step, format!("{}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupRecord;
    use crate::repository::{BackupRepository, CatalogRepository, SecretCipher};
    use crate::test_support::Harness;
    use chrono::Utc;

    fn backup(engine: &str, name: &str) -> BackupRecord {
        BackupRecord {
            id: 0,
            db_type: POSTGRESQL_TYPE.into(),
            name: engine.into(),
            detail_name: name.into(),
            file_dir: format!("database/postgresql/{engine}/{name}"),
            file_name: format!("{name}.sql.gz"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_created_encrypts_password() {
        let h = Harness::new();
        let sync = CatalogSynchronizer::new(&h.ctx);
        let db = sync.record_created("app_db", "pgA", "app_user", "p@ss1", Origin::Local, "orders").unwrap();

        let stored = h.catalog.get_database(db.id).unwrap().unwrap();
        assert_ne!(stored.password, "p@ss1");
        assert_eq!(h.cipher.decrypt(&stored.password).unwrap(), "p@ss1");
        assert_eq!(stored.permission, "%");
        assert_eq!(stored.description, "orders");

        sync.record_password(db.id, "p@ss2").unwrap();
        sync.record_permission(db.id, "localhost").unwrap();
        let stored = h.catalog.get_database(db.id).unwrap().unwrap();
        assert_eq!(h.cipher.decrypt(&stored.password).unwrap(), "p@ss2");
        assert_eq!(stored.permission, "localhost");
    }

    #[tokio::test]
    async fn test_remove_with_backups() {
        let h = Harness::new();
        let sync = CatalogSynchronizer::new(&h.ctx);
        let db = sync.record_created("app_db", "pgA", "app_user", "pw", Origin::Local, "").unwrap();

        let uploads = h.config().upload_dir(POSTGRESQL_TYPE, "pgA", "app_db");
        let backups = h.config().database_backup_dir(POSTGRESQL_TYPE, "pgA", "app_db");
        let sibling = h.config().database_backup_dir(POSTGRESQL_TYPE, "pgA", "other_db");
        for dir in [&uploads, &backups, &sibling] {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(dir.join("dump.sql.gz"), b"x").unwrap();
        }
        h.catalog.save_record(&backup("pgA", "app_db")).unwrap();
        h.catalog.save_record(&backup("pgA", "other_db")).unwrap();

        let report = sync.remove(&db, true).await.unwrap();
        assert!(report.is_clean());
        assert!(!uploads.exists());
        assert!(!backups.exists());
        assert!(sibling.exists());
        assert!(h.catalog.get_database(db.id).unwrap().is_none());
        assert_eq!(h.catalog.delete_records(POSTGRESQL_TYPE, "pgA", "other_db").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_keeps_backups_unless_asked() {
        let h = Harness::new();
        let sync = CatalogSynchronizer::new(&h.ctx);
        let db = sync.record_created("app_db", "pgA", "app_user", "pw", Origin::Local, "").unwrap();
        let backups = h.config().database_backup_dir(POSTGRESQL_TYPE, "pgA", "app_db");
        std::fs::create_dir_all(&backups).unwrap();

        let report = sync.remove(&db, false).await.unwrap();
        assert!(report.is_clean());
        assert!(backups.exists());
        assert!(h.catalog.get_database(db.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_a_warning() {
        let h = Harness::new();
        let sync = CatalogSynchronizer::new(&h.ctx);
        let db = sync.record_created("app_db", "pgA", "app_user", "pw", Origin::Local, "").unwrap();

        // A regular file where the directory tree should be
        let uploads = h.config().upload_dir(POSTGRESQL_TYPE, "pgA", "app_db");
        std::fs::create_dir_all(uploads.parent().unwrap()).unwrap();
        std::fs::write(&uploads, b"not a directory").unwrap();

        let report = sync.remove(&db, true).await.unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].step, "upload_dir");
        assert!(h.catalog.get_database(db.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_never_leaves_its_own_directory() {
        let h = Harness::new();
        let sync = CatalogSynchronizer::new(&h.ctx);
        let db = sync.record_created("..", "pgA", "legacy_owner", "", Origin::Local, "").unwrap();

        let sibling = h.config().database_backup_dir(POSTGRESQL_TYPE, "pgA", "other_db");
        std::fs::create_dir_all(&sibling).unwrap();
        std::fs::write(sibling.join("dump.sql.gz"), b"x").unwrap();

        let report = sync.remove(&db, true).await.unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].step, "backup_dir");
        assert!(sibling.join("dump.sql.gz").exists());
        assert!(h.catalog.get_database(db.id).unwrap().is_none());
    }
}
