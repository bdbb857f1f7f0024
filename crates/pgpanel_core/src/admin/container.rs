//! In-container execution: `docker exec` into the engine and run `psql`.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::executor::{SqlExecutor, TextRow};
use crate::error::PanelError;

/// Field separator passed to `psql -F` (ASCII unit separator).
const FIELD_SEP: char = '\u{1f}';

/// Executes SQL through `psql` inside a running container.
///
/// SQL is written to psql's stdin and the password travels through the
/// environment, so neither shows up in the host's process list.
pub struct ContainerExecutor {
    runtime: String,
    container: String,
    username: String,
    password: String,
    closed: AtomicBool,
}

impl ContainerExecutor {
    /// Create an executor for the given container.
    pub fn new(
        runtime: impl Into<String>,
        container: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            container: container.into(),
            username: username.into(),
            password: password.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Arguments for `<runtime> exec`.
    fn exec_args(&self) -> Vec<String> {
        let sep = FIELD_SEP.to_string();
        [
            "exec",
            "-i",
            "-e",
            "PGPASSWORD",
            self.container.as_str(),
            "psql",
            "-U",
            self.username.as_str(),
            "-d",
            "postgres",
            "-X",
            "-q",
            "-A",
            "-t",
            "-v",
            "ON_ERROR_STOP=1",
            "-F",
            sep.as_str(),
            "-f",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    async fn run(&self, sql: &str) -> Result<String, PanelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PanelError::connection("Container session already closed"));
        }

        let mut child = Command::new(&self.runtime)
            .args(self.exec_args())
            .env("PGPASSWORD", &self.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PanelError::connection_with_source(format!("Failed to run {}", self.runtime), e)
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(sql.as_bytes())
                .await
                .map_err(|e| PanelError::connection_with_source("Failed to send SQL to psql", e))?;
            // Closing stdin lets psql finish
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PanelError::connection_with_source("Failed to wait for psql", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim().trim_start_matches("psql:<stdin>:").trim();
            tracing::debug!(
                container = %self.container,
                code = ?output.status.code(),
                "psql exited with failure"
            );
            return Err(PanelError::engine(if message.is_empty() {
                format!("psql exited with {}", output.status)
            } else {
                message.to_string()
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Split unaligned, tuples-only psql output into rows.
pub fn parse_rows(stdout: &str) -> Vec<TextRow> {
    stdout
        .lines()
        .map(|line| line.split(FIELD_SEP).map(String::from).collect())
        .collect()
}

#[async_trait]
impl SqlExecutor for ContainerExecutor {
    async fn execute(&self, sql: &str) -> Result<(), PanelError> {
        self.run(sql).await.map(|_| ())
    }

    async fn query(&self, sql: &str) -> Result<Vec<TextRow>, PanelError> {
        self.run(sql).await.map(|stdout| parse_rows(&stdout))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(container = %self.container, "Container session closed");
        }
    }

    fn transport(&self) -> &'static str {
        "container"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows() {
        let out = "app_db\u{1f}app_user\nreporting\u{1f}postgres\n";
        assert_eq!(
            parse_rows(out),
            vec![vec!["app_db".to_string(), "app_user".into()], vec!["reporting".into(), "postgres".into()]]
        );
        assert!(parse_rows("").is_empty());
    }

    #[test]
    fn test_exec_args_keep_secrets_out() {
        let executor = ContainerExecutor::new("docker", "c1", "postgres", "hunter2");
        let args = executor.exec_args();
        assert_eq!(&args[..5], &["exec", "-i", "-e", "PGPASSWORD", "c1"]);
        assert!(!args.iter().any(|a| a.contains("hunter2")));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[tokio::test]
    async fn test_closed_session_refuses_commands() {
        let executor = ContainerExecutor::new("docker", "c1", "postgres", "pw");
        executor.close();
        executor.close();
        let err = executor.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, PanelError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_missing_runtime_is_connection_error() {
        let executor = ContainerExecutor::new("/nonexistent/pgpanel-runtime", "c1", "postgres", "pw");
        let err = executor.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, PanelError::Connection { .. }));
    }
}
