//! Logical database catalog rows and their external representations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::engine::Origin;

/// Permission granted to newly created roles: connect from any host.
pub const DEFAULT_PERMISSION: &str = "%";

/// A named database tracked in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalDatabase {
    /// Catalog row id
    pub id: i64,
    /// Database name on the engine
    pub name: String,
    /// Engine instance hosting it
    pub postgresql_name: String,
    /// Owning role
    pub username: String,
    /// Role password (ciphertext)
    pub password: String,
    /// Host access pattern
    pub permission: String,
    /// Free-text description
    pub description: String,
    /// Origin scope of the parent engine
    pub from: Origin,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl LogicalDatabase {
    /// Create an unsaved row; the catalog assigns the id.
    pub fn new(
        name: impl Into<String>,
        postgresql_name: impl Into<String>,
        username: impl Into<String>,
        encrypted_password: impl Into<String>,
        from: Origin,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            postgresql_name: postgresql_name.into(),
            username: username.into(),
            password: encrypted_password.into(),
            permission: DEFAULT_PERMISSION.to_string(),
            description: String::new(),
            from,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Columns the search may order by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Newest first unless ascending is requested
    #[default]
    CreatedAt,
    /// Database name
    Name,
}

impl OrderBy {
    /// Column name in the catalog.
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Name => "name",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Ascending
    Ascending,
    /// Descending
    #[default]
    Descending,
}

/// Filters for paging through logical databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSearch {
    /// 1-indexed page
    pub page: u32,
    /// Rows per page
    pub page_size: u32,
    /// Restrict to one engine instance
    pub database: String,
    /// Substring match on the name
    #[serde(default)]
    pub info: String,
    /// Sort column
    #[serde(default)]
    pub order_by: OrderBy,
    /// Sort direction
    #[serde(default)]
    pub order: Order,
}

impl DatabaseSearch {
    /// Search the first page of an engine's databases.
    pub fn for_engine(database: impl Into<String>) -> Self {
        Self {
            page: 1,
            page_size: 20,
            database: database.into(),
            info: String::new(),
            order_by: OrderBy::default(),
            order: Order::default(),
        }
    }

    /// Row offset of the requested page, clamped for out-of-range pages.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)).saturating_mul(i64::from(self.page_size))
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult<T> {
    /// Total rows matching the filters
    pub total: i64,
    /// Rows in this page
    pub items: Vec<T>,
}

/// External representation of a logical database (password omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlDbInfo {
    /// Catalog row id
    pub id: i64,
    /// Database name
    pub name: String,
    /// Parent engine
    pub postgresql_name: String,
    /// Origin label
    pub from: String,
    /// Owning role
    pub username: String,
    /// Host access pattern
    pub permission: String,
    /// Free-text description
    pub description: String,
    /// RFC 3339 creation time
    pub created_at: String,
}

impl From<&LogicalDatabase> for PostgresqlDbInfo {
    fn from(db: &LogicalDatabase) -> Self {
        Self {
            id: db.id,
            name: db.name.clone(),
            postgresql_name: db.postgresql_name.clone(),
            from: db.from.as_str().to_string(),
            username: db.username.clone(),
            permission: db.permission.clone(),
            description: db.description.clone(),
            created_at: db.created_at.to_rfc3339(),
        }
    }
}

/// Option entry for database pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlOption {
    /// Catalog row id
    pub id: i64,
    /// Origin label
    pub from: String,
    /// Engine type (empty when the engine record is gone)
    #[serde(rename = "type")]
    pub db_type: String,
    /// Parent engine
    pub database: String,
    /// Database name
    pub name: String,
}

/// Container-level facts about a local engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbBaseInfo {
    /// App install name
    pub name: String,
    /// Container name
    pub container_name: String,
    /// Published port
    pub port: i64,
}
