//! Compose project restarts through the container runtime CLI.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::PanelError;
use crate::repository::ServiceRestarter;

/// Restarts compose projects with `<runtime> compose -f <file> restart`.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    runtime: String,
}

impl DockerCompose {
    /// Use the given container runtime binary.
    pub fn new(runtime: impl Into<String>) -> Self {
        Self { runtime: runtime.into() }
    }
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ServiceRestarter for DockerCompose {
    async fn restart(&self, compose_path: &Path) -> Result<(), PanelError> {
        if !compose_path.is_file() {
            return Err(PanelError::not_found(format!("compose file {}", compose_path.display())));
        }

        tracing::info!(compose = %compose_path.display(), "Restarting compose project");
        let output = Command::new(&self.runtime)
            .arg("compose")
            .arg("-f")
            .arg(compose_path)
            .arg("restart")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PanelError::internal(format!("Failed to run {} compose: {e}", self.runtime))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PanelError::internal(format!(
                "Restart of {} failed: {}",
                compose_path.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_compose_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DockerCompose::default()
            .restart(&dir.path().join("docker-compose.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let compose = dir.path().join("docker-compose.yml");
        std::fs::write(&compose, "services: {}\n").unwrap();
        let err = DockerCompose::new("/nonexistent/pgpanel-runtime").restart(&compose).await.unwrap_err();
        assert!(matches!(err, PanelError::Internal { .. }));
    }
}
