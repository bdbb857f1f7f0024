//! `AdminClient` implementation for PostgreSQL.
//!
//! The client is generic over its transport. The version family is fixed on
//! first use, either from the recorded version or by asking the server, and
//! never changes for the lifetime of the session.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::executor::SqlExecutor;
use super::hba::{self, AccessScope};
use super::sql::Statements;
use super::version::VersionFamily;
use super::{AdminClient, EngineDatabase};
use crate::error::PanelError;
use crate::legality::ensure_legal;
use crate::models::{
    AccessChangeInfo, CreateInfo, DeleteInfo, PasswordChangeInfo, PostgresqlStatus,
};

/// Administrative client for one engine session.
pub struct PostgresAdmin<E: SqlExecutor> {
    executor: E,
    recorded_version: String,
    family: OnceCell<VersionFamily>,
    admin_user: String,
    target: String,
    timeout: Duration,
    session_id: Uuid,
}

impl<E: SqlExecutor> PostgresAdmin<E> {
    /// Wrap an executor.
    ///
    /// `recorded_version` may be empty, in which case the family is detected
    /// lazily with `SHOW server_version_num`.
    pub fn new(
        executor: E,
        recorded_version: impl Into<String>,
        admin_user: impl Into<String>,
        target: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let target = target.into();
        tracing::debug!(
            session_id = %session_id,
            target = %target,
            transport = executor.transport(),
            "Administrative session created"
        );
        Self {
            executor,
            recorded_version: recorded_version.into(),
            family: OnceCell::new(),
            admin_user: admin_user.into(),
            target,
            timeout,
            session_id,
        }
    }

    /// Version family of this session, detecting it on first use.
    pub async fn family(&self, hint: &str) -> Result<VersionFamily, PanelError> {
        self.family
            .get_or_try_init(|| async {
                if let Some(family) =
                    VersionFamily::parse(hint).or_else(|| VersionFamily::parse(&self.recorded_version))
                {
                    return Ok::<_, PanelError>(family);
                }

                let rows = self
                    .executor
                    .query(Statements::new(VersionFamily::FALLBACK).server_version_num())
                    .await?;
                let reported = rows.first().and_then(|row| row.first()).cloned().unwrap_or_default();
                let family = VersionFamily::parse(&reported).unwrap_or_else(|| {
                    tracing::warn!(
                        session_id = %self.session_id,
                        reported = %reported,
                        "Unrecognized server version, assuming oldest syntax"
                    );
                    VersionFamily::FALLBACK
                });
                tracing::debug!(session_id = %self.session_id, ?family, "Detected server version");
                Ok::<_, PanelError>(family)
            })
            .await
            .copied()
    }

    async fn statements(&self, hint: &str) -> Result<Statements, PanelError> {
        Ok(Statements::new(self.family(hint).await?))
    }

    /// Run `fut` under `limit`. An elapsed budget is reported, never retried.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        limit: Duration,
        fut: impl Future<Output = Result<T, PanelError>>,
    ) -> Result<T, PanelError> {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    target = %self.target,
                    operation,
                    seconds = limit.as_secs(),
                    "Administrative operation timed out"
                );
                Err(PanelError::timeout(operation, limit.as_secs()))
            }
        }
    }

    async fn create_steps(&self, info: &CreateInfo) -> Result<(), PanelError> {
        let stmts = self.statements(&info.version).await?;
        self.executor.execute(&stmts.create_role(&info.username, &info.password)).await?;

        if let Err(err) = self
            .executor
            .execute(&stmts.create_database(&info.name, &info.username, &info.format))
            .await
        {
            self.rollback_create(&stmts, info, false).await;
            return Err(err);
        }

        for sql in [stmts.revoke_public_connect(&info.name), stmts.grant_all(&info.name, &info.username)] {
            if let Err(err) = self.executor.execute(&sql).await {
                self.rollback_create(&stmts, info, true).await;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undo what a failed create made. Failures are logged only.
    async fn rollback_create(&self, stmts: &Statements, info: &CreateInfo, db_created: bool) {
        if db_created {
            if let Err(err) = self.executor.execute(&stmts.drop_database(&info.name, true)).await {
                tracing::warn!(database = %info.name, error = %err, "Rollback: failed to drop database");
            }
        }
        if let Err(err) = self.executor.execute(&stmts.drop_role(&info.username, true)).await {
            tracing::warn!(username = %info.username, error = %err, "Rollback: failed to drop role");
        }
    }

    async fn delete_steps(&self, info: &DeleteInfo) -> Result<(), PanelError> {
        let stmts = self.statements(&info.version).await?;
        let force = info.force_delete;

        if !stmts.family().supports_drop_force() {
            if let Err(err) = self.executor.query(&stmts.terminate_sessions(&info.name)).await {
                tracing::warn!(database = %info.name, error = %err, "Failed to terminate sessions");
            }
        }

        if let Err(err) = self.executor.execute(&stmts.drop_database(&info.name, force)).await {
            if !force {
                return Err(err);
            }
            tracing::warn!(database = %info.name, error = %err, "Forced delete: database drop failed");
        }

        if info.username.is_empty() || info.username == self.admin_user {
            return Ok(());
        }

        if let Err(err) = self.remove_access(&stmts, &info.name, &info.username).await {
            tracing::warn!(username = %info.username, error = %err, "Failed to remove access rules");
        }

        if let Err(err) = self.executor.execute(&stmts.drop_role(&info.username, force)).await {
            if !force {
                return Err(err);
            }
            tracing::warn!(username = %info.username, error = %err, "Forced delete: role drop failed");
        }
        Ok(())
    }

    async fn hba_path(&self, stmts: &Statements) -> Result<String, PanelError> {
        let rows = self.executor.query(stmts.hba_file()).await?;
        rows.first()
            .and_then(|row| row.first())
            .filter(|path| !path.is_empty())
            .cloned()
            .ok_or_else(|| PanelError::engine("Server did not report hba_file"))
    }

    async fn hba_lines(&self, stmts: &Statements, path: &str) -> Result<Vec<String>, PanelError> {
        let mut lines: Vec<String> = self
            .executor
            .query(&stmts.read_lines(path))
            .await?
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or_default())
            .collect();
        // The trailing newline splits into one empty element
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        Ok(lines)
    }

    async fn write_hba(&self, stmts: &Statements, path: &str, lines: &[String]) -> Result<(), PanelError> {
        self.executor.execute(&stmts.write_lines(path, lines)).await?;
        self.executor.query(stmts.reload_conf()).await?;
        Ok(())
    }

    async fn remove_access(&self, stmts: &Statements, database: &str, username: &str) -> Result<(), PanelError> {
        let path = self.hba_path(stmts).await?;
        let lines = self.hba_lines(stmts, &path).await?;
        let kept = hba::remove_rules(&lines, database, username);
        if kept.len() != lines.len() {
            self.write_hba(stmts, &path, &kept).await?;
        }
        Ok(())
    }

    async fn change_access_steps(&self, info: &AccessChangeInfo, scope: &AccessScope) -> Result<(), PanelError> {
        let stmts = self.statements(&info.version).await?;
        let path = self.hba_path(&stmts).await?;
        let lines = self.hba_lines(&stmts, &path).await?;
        let method = stmts.family().password_encryption();
        let updated = hba::apply_rules(&lines, &info.name, &info.username, scope, method);
        self.write_hba(&stmts, &path, &updated).await
    }

    async fn status_query(&self) -> Result<PostgresqlStatus, PanelError> {
        let stmts = self.statements("").await?;
        let rows = self.executor.query(&stmts.status()).await?;
        rows.first()
            .and_then(|row| PostgresqlStatus::from_row(row))
            .ok_or_else(|| PanelError::engine("Status query returned no row"))
    }
}

#[async_trait]
impl<E: SqlExecutor + 'static> AdminClient for PostgresAdmin<E> {
    async fn create(&self, info: CreateInfo) -> Result<(), PanelError> {
        ensure_legal(&[
            ("name", info.name.as_str()),
            ("username", info.username.as_str()),
            ("password", info.password.as_str()),
            ("format", info.format.as_str()),
        ])?;
        tracing::info!(session_id = %self.session_id, database = %info.name, "Creating database");
        self.bounded("create", info.timeout, self.create_steps(&info)).await
    }

    async fn delete(&self, info: DeleteInfo) -> Result<(), PanelError> {
        ensure_legal(&[("name", info.name.as_str()), ("username", info.username.as_str())])?;
        tracing::info!(
            session_id = %self.session_id,
            database = %info.name,
            force = info.force_delete,
            "Deleting database"
        );
        self.bounded("delete", info.timeout, self.delete_steps(&info)).await
    }

    async fn change_password(&self, info: PasswordChangeInfo) -> Result<(), PanelError> {
        ensure_legal(&[("username", info.username.as_str()), ("password", info.password.as_str())])?;
        tracing::info!(session_id = %self.session_id, username = %info.username, "Changing password");
        self.bounded("change_password", info.timeout, async {
            let stmts = self.statements(&info.version).await?;
            self.executor.execute(&stmts.alter_password(&info.username, &info.password)).await
        })
        .await
    }

    async fn change_access(&self, info: AccessChangeInfo) -> Result<(), PanelError> {
        ensure_legal(&[
            ("name", info.name.as_str()),
            ("username", info.username.as_str()),
            ("permission", info.permission.as_str()),
        ])?;
        let scope = AccessScope::parse(&info.permission)?;
        tracing::info!(
            session_id = %self.session_id,
            username = %info.username,
            permission = %info.permission,
            "Changing access"
        );
        self.bounded("change_access", info.timeout, self.change_access_steps(&info, &scope)).await
    }

    async fn status(&self) -> PostgresqlStatus {
        match self.bounded("status", self.timeout, self.status_query()).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(target = %self.target, error = %err, "Failed to load engine status");
                PostgresqlStatus::default()
            }
        }
    }

    async fn list_databases(&self) -> Result<Vec<EngineDatabase>, PanelError> {
        self.bounded("list_databases", self.timeout, async {
            let stmts = self.statements("").await?;
            let rows = self.executor.query(stmts.list_databases()).await?;
            Ok::<_, PanelError>(rows
                .into_iter()
                .filter_map(|row| {
                    let mut cols = row.into_iter();
                    let name = cols.next().filter(|n| !n.is_empty())?;
                    Some(EngineDatabase { name, owner: cols.next().unwrap_or_default() })
                })
                .collect())
        })
        .await
    }

    fn close(&self) {
        self.executor.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::executor::TextRow;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const HBA_PATH: &str = "/var/lib/postgresql/data/pg_hba.conf";

    #[derive(Default)]
    struct FakeExecutor {
        log: Arc<Mutex<Vec<String>>>,
        version_num: &'static str,
        fail_on: Option<&'static str>,
        stall: bool,
        hba: Vec<String>,
        closed: Arc<AtomicBool>,
    }

    impl FakeExecutor {
        fn respond(&self, sql: &str) -> Result<Vec<TextRow>, PanelError> {
            self.log.lock().push(sql.to_string());
            if self.fail_on.is_some_and(|needle| sql.contains(needle)) {
                return Err(PanelError::engine(format!("failed: {sql}")));
            }
            let one = |v: &str| vec![vec![v.to_string()]];
            Ok(if sql.starts_with("SHOW server_version_num") {
                one(self.version_num)
            } else if sql.starts_with("SHOW hba_file") {
                one(HBA_PATH)
            } else if sql.contains("pg_read_file") {
                self.hba.iter().map(|l| vec![l.clone()]).chain([vec![String::new()]]).collect()
            } else if sql.contains("pg_stat_bgwriter") {
                vec![(0..10).map(|i| i.to_string()).collect()]
            } else if sql.contains("FROM pg_database") {
                vec![vec!["app_db".into(), "app_user".into()], vec!["reporting".into(), "postgres".into()]]
            } else {
                Vec::new()
            })
        }
    }

    #[async_trait]
    impl SqlExecutor for FakeExecutor {
        async fn execute(&self, sql: &str) -> Result<(), PanelError> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.respond(sql).map(|_| ())
        }

        async fn query(&self, sql: &str) -> Result<Vec<TextRow>, PanelError> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.respond(sql)
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn transport(&self) -> &'static str {
            "fake"
        }
    }

    fn admin(executor: FakeExecutor, version: &str) -> (PostgresAdmin<FakeExecutor>, Arc<Mutex<Vec<String>>>) {
        let log = executor.log.clone();
        (PostgresAdmin::new(executor, version, "postgres", "test", Duration::from_secs(300)), log)
    }

    fn create_info() -> CreateInfo {
        CreateInfo {
            name: "app_db".into(),
            format: "UTF8".into(),
            username: "app_user".into(),
            password: "p@ss1".into(),
            version: String::new(),
            timeout: Duration::from_secs(300),
        }
    }

    fn delete_info(force: bool) -> DeleteInfo {
        DeleteInfo {
            name: "app_db".into(),
            version: String::new(),
            username: "app_user".into(),
            permission: "%".into(),
            force_delete: force,
            timeout: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn test_illegal_input_issues_no_command() {
        let (client, log) = admin(FakeExecutor::default(), "");
        let mut info = create_info();
        info.password = "x'; DROP ROLE postgres; --".into();
        let err = client.create(info).await.unwrap_err();
        assert!(err.is_validation());

        let err = client
            .change_access(AccessChangeInfo {
                name: "app_db".into(),
                username: "app_user".into(),
                password: String::new(),
                permission: "db.example.com".into(),
                version: String::new(),
                timeout: Duration::from_secs(300),
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_create_detects_version_once() {
        let (client, log) = admin(FakeExecutor { version_num: "150004", ..Default::default() }, "");
        client.create(create_info()).await.unwrap();
        client
            .change_password(PasswordChangeInfo {
                name: "app_db".into(),
                username: "app_user".into(),
                password: "n3w".into(),
                version: String::new(),
                timeout: Duration::from_secs(300),
            })
            .await
            .unwrap();

        let log = log.lock();
        assert_eq!(log.iter().filter(|s| s.starts_with("SHOW server_version_num")).count(), 1);
        assert!(log[1].starts_with("SET password_encryption = 'scram-sha-256'; CREATE ROLE \"app_user\""));
        assert!(log[2].starts_with("CREATE DATABASE \"app_db\" OWNER \"app_user\""));
        assert!(log[3].starts_with("REVOKE CONNECT"));
        assert!(log[4].starts_with("GRANT ALL"));
        assert!(log[5].contains("ALTER ROLE \"app_user\""));
    }

    #[tokio::test]
    async fn test_create_rolls_back_role() {
        let executor = FakeExecutor { fail_on: Some("CREATE DATABASE"), ..Default::default() };
        let (client, log) = admin(executor, "13");
        let err = client.create(create_info()).await.unwrap_err();
        assert!(matches!(err, PanelError::Engine { .. }));

        let log = log.lock();
        assert_eq!(log.last().map(String::as_str), Some("DROP ROLE IF EXISTS \"app_user\""));
        assert!(!log.iter().any(|s| s.starts_with("DROP DATABASE")));
    }

    #[tokio::test]
    async fn test_create_rolls_back_database_after_grant_failure() {
        let executor = FakeExecutor { fail_on: Some("GRANT ALL"), ..Default::default() };
        let (client, log) = admin(executor, "16");
        assert!(client.create(create_info()).await.is_err());

        let log = log.lock();
        let n = log.len();
        assert_eq!(log[n - 2], "DROP DATABASE IF EXISTS \"app_db\" WITH (FORCE)");
        assert_eq!(log[n - 1], "DROP ROLE IF EXISTS \"app_user\"");
    }

    #[tokio::test]
    async fn test_delete_pre13_terminates_sessions() {
        let (client, log) = admin(FakeExecutor::default(), "12.17");
        client.delete(delete_info(false)).await.unwrap();

        let log = log.lock();
        assert!(log[0].contains("pg_terminate_backend"));
        assert_eq!(log[1], "DROP DATABASE \"app_db\"");
        assert_eq!(log.last().map(String::as_str), Some("DROP ROLE \"app_user\""));
    }

    #[tokio::test]
    async fn test_delete_failure_without_force() {
        let executor = FakeExecutor { fail_on: Some("DROP DATABASE"), ..Default::default() };
        let (client, log) = admin(executor, "15");
        assert!(client.delete(delete_info(false)).await.is_err());
        assert!(!log.lock().iter().any(|s| s.starts_with("DROP ROLE")));
    }

    #[tokio::test]
    async fn test_forced_delete_continues_to_role() {
        let executor = FakeExecutor { fail_on: Some("DROP DATABASE"), ..Default::default() };
        let (client, log) = admin(executor, "15");
        client.delete(delete_info(true)).await.unwrap();
        assert_eq!(log.lock().last().map(String::as_str), Some("DROP ROLE IF EXISTS \"app_user\""));
    }

    #[tokio::test]
    async fn test_delete_keeps_admin_role() {
        let (client, log) = admin(FakeExecutor::default(), "15");
        let mut info = delete_info(false);
        info.username = "postgres".into();
        client.delete(info).await.unwrap();
        assert!(!log.lock().iter().any(|s| s.starts_with("DROP ROLE")));
    }

    #[tokio::test]
    async fn test_change_access_rewrites_hba() {
        let executor = FakeExecutor {
            hba: vec!["local all all trust".into(), "host all all all scram-sha-256".into()],
            ..Default::default()
        };
        let (client, log) = admin(executor, "15");
        client
            .change_access(AccessChangeInfo {
                name: "app_db".into(),
                username: "app_user".into(),
                password: String::new(),
                permission: "172.16.0.0/12".into(),
                version: String::new(),
                timeout: Duration::from_secs(300),
            })
            .await
            .unwrap();

        let log = log.lock();
        let copy = log.iter().find(|s| s.starts_with("COPY")).unwrap();
        assert!(copy.contains("172.16.0.0/12 scram-sha-256 # pgpanel:app_db:app_user"));
        assert!(copy.contains("all reject # pgpanel:app_db:app_user"));
        assert!(copy.contains(&format!("TO '{HBA_PATH}'")));
        // No blank line appended for the trailing newline
        assert!(!copy.contains(", '']"));
        assert_eq!(log.last().map(String::as_str), Some("SELECT pg_reload_conf()"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let (client, _log) = admin(FakeExecutor { stall: true, ..Default::default() }, "15");
        let mut info = create_info();
        info.timeout = Duration::from_secs(5);
        let err = client.create(info).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_status_by_family() {
        let (client, log) = admin(FakeExecutor::default(), "17.2");
        let status = client.status().await;
        assert_eq!(status.uptime, "0");
        assert_eq!(status.buffers_backend_fsync, "9");
        assert!(log.lock()[0].ends_with("'0'"));
    }

    #[tokio::test]
    async fn test_status_zero_value_on_error() {
        let executor = FakeExecutor { fail_on: Some("pg_stat_bgwriter"), ..Default::default() };
        let (client, _log) = admin(executor, "15");
        assert!(client.status().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_databases_and_close() {
        let executor = FakeExecutor::default();
        let closed = executor.closed.clone();
        let (client, _log) = admin(executor, "15");
        let dbs = client.list_databases().await.unwrap();
        assert_eq!(dbs.len(), 2);
        assert_eq!(dbs[0], EngineDatabase { name: "app_db".into(), owner: "app_user".into() });
        client.close();
        assert!(closed.load(Ordering::SeqCst));
    }
}
