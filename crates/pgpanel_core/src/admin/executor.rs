//! Transport seam between statement construction and the engine.

use async_trait::async_trait;

use crate::error::PanelError;

/// A result row as text, in column order. NULL is an empty string.
pub type TextRow = Vec<String>;

/// Runs administrative SQL against one engine session.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run statements that return no rows.
    async fn execute(&self, sql: &str) -> Result<(), PanelError>;

    /// Run a query and return its rows as text.
    async fn query(&self, sql: &str) -> Result<Vec<TextRow>, PanelError>;

    /// Release the session. Safe to call more than once.
    fn close(&self);

    /// Transport name for logging.
    fn transport(&self) -> &'static str;
}
