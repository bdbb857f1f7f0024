//! Request payloads accepted by `PostgresqlService`.
//!
//! Binding and transport decoding (e.g. base64 passwords) happen in the
//! presentation layer; values arrive here in the clear.

use serde::Deserialize;

/// Create a logical database on an engine.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    /// Database name
    pub name: String,
    /// Origin label of the engine
    pub from: String,
    /// Engine instance name
    pub database: String,
    /// Encoding
    pub format: String,
    /// Owning role
    pub username: String,
    /// Plaintext password
    pub password: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
}

impl std::fmt::Debug for CreateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateRequest")
            .field("name", &self.name)
            .field("from", &self.from)
            .field("database", &self.database)
            .field("format", &self.format)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Remove a logical database.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    /// Catalog row id
    pub id: i64,
    /// Database type
    #[serde(rename = "type")]
    pub db_type: String,
    /// Engine instance name
    pub database: String,
    /// Proceed with catalog cleanup despite engine failure
    #[serde(default)]
    pub force_delete: bool,
    /// Also remove backup files and records
    #[serde(default)]
    pub delete_backup: bool,
}

/// Which applications still use a database.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCheckRequest {
    /// Catalog row id
    pub id: i64,
    /// Database type
    #[serde(rename = "type")]
    pub db_type: String,
    /// Engine instance name
    pub database: String,
}

/// Password or access change. `id == 0` targets the engine's admin role.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDbInfo {
    /// Catalog row id, or 0 for the engine itself
    pub id: i64,
    /// Origin label of the engine
    pub from: String,
    /// Database type
    #[serde(rename = "type")]
    pub db_type: String,
    /// Engine instance name
    pub database: String,
    /// New password or permission
    pub value: String,
}

impl std::fmt::Debug for ChangeDbInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDbInfo")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("db_type", &self.db_type)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Update a database's description.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDescription {
    /// Catalog row id
    pub id: i64,
    /// New description
    pub description: String,
}

/// Replace an engine's `postgresql.conf`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfUpdateByFile {
    /// Database type
    #[serde(rename = "type")]
    pub db_type: String,
    /// Engine instance name
    pub database: String,
    /// New file content
    pub file: String,
}

/// Generic (type, name) addressed lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationWithNameAndType {
    /// Database or file type
    #[serde(rename = "type")]
    pub db_type: String,
    /// Engine instance name
    pub name: String,
}

/// Import databases that exist on an engine but not in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadFromEngine {
    /// Engine instance name
    pub database: String,
    /// Database type
    #[serde(rename = "type")]
    pub db_type: String,
    /// Origin label of the engine
    pub from: String,
}
