//! Local SQLite catalog.
//!
//! Stores engine instances, logical databases, application installations,
//! their resource links, and backup records. Secrets are stored encrypted by
//! the caller; this layer never sees plaintext passwords.

use crate::error::PanelError;
use crate::models::{
    AppInstall, AppInstallBaseInfo, AppInstallResource, BackupRecord, DatabaseSearch,
    EngineInstance, InstallParam, LogicalDatabase, Order, Origin, PageResult, TlsMaterial,
    POSTGRESQL_TYPE,
};
use crate::repository::{AppInstallRepository, BackupRepository, CatalogRepository};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Catalog file name inside the data directory.
const CATALOG_FILE: &str = "pgpanel.db";

/// Initialize the data directory, creating it if needed.
pub fn init_data_dir(path: &Path) -> Result<(), PanelError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PanelError::storage(
                format!("Data path exists but is not a directory: {}", path.display()),
                Some("Select a different location or remove the existing file"),
            ));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        PanelError::storage(
            format!("Failed to create data directory '{}': {}", path.display(), e),
            Some("Check permissions or select a different location"),
        )
    })?;

    tracing::info!(path = %path.display(), "Created data directory");
    Ok(())
}

/// SQLite-backed catalog.
///
/// Thread-safe via internal Mutex. Uses WAL mode for concurrent reads.
pub struct SqliteCatalog {
    connection: Mutex<Connection>,
    data_dir: PathBuf,
}

impl SqliteCatalog {
    /// Open or create the catalog in the given data directory.
    pub fn open(data_dir: PathBuf) -> Result<Self, PanelError> {
        init_data_dir(&data_dir)?;
        let db_path = data_dir.join(CATALOG_FILE);
        Self::open_with_path(db_path, data_dir)
    }

    /// Open the catalog at a specific database path.
    pub fn open_with_path(db_path: PathBuf, data_dir: PathBuf) -> Result<Self, PanelError> {
        let connection = Connection::open(&db_path).map_err(|e| {
            PanelError::storage(
                format!("Failed to open catalog '{}': {}", db_path.display(), e),
                Some("The catalog file may be corrupted. Restore it from a backup."),
            )
        })?;

        Self::configure_connection(&connection)?;

        let catalog = Self { connection: Mutex::new(connection), data_dir };
        catalog.run_migrations()?;

        tracing::info!(path = %db_path.display(), "Catalog opened");
        Ok(catalog)
    }

    fn configure_connection(conn: &Connection) -> Result<(), PanelError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            ",
        )
        .map_err(|e| PanelError::storage(format!("Failed to configure catalog: {e}"), None))
    }

    fn run_migrations(&self) -> Result<(), PanelError> {
        let conn = self.connection.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                domain TEXT NOT NULL,
                step INTEGER NOT NULL,
                migration TEXT NOT NULL,
                PRIMARY KEY(domain, step)
            ) STRICT",
            [],
        )
        .map_err(|e| PanelError::storage(format!("Failed to create migrations table: {e}"), None))?;

        self.migrate_schema(&conn)
    }

    fn migrate_schema(&self, conn: &Connection) -> Result<(), PanelError> {
        const DOMAIN: &str = "catalog";

        let current_step: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(step), 0) FROM migrations WHERE domain = ?",
                [DOMAIN],
                |row| row.get(0),
            )
            .map_err(|e| PanelError::storage(format!("Failed to read migration level: {e}"), None))?;

        if current_step < 1 {
            conn.execute_batch(
                "
                CREATE TABLE database_instances (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    type TEXT NOT NULL,
                    origin TEXT NOT NULL,
                    version TEXT NOT NULL DEFAULT '',
                    address TEXT NOT NULL DEFAULT '',
                    port INTEGER NOT NULL DEFAULT 5432,
                    username TEXT NOT NULL DEFAULT '',
                    password TEXT NOT NULL DEFAULT '',
                    ssl INTEGER NOT NULL DEFAULT 0,
                    skip_verify INTEGER NOT NULL DEFAULT 0,
                    root_cert TEXT,
                    client_cert TEXT,
                    client_key TEXT,
                    description TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                ) STRICT;

                CREATE TABLE database_postgresqls (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    postgresql_name TEXT NOT NULL,
                    username TEXT NOT NULL,
                    password TEXT NOT NULL,
                    permission TEXT NOT NULL DEFAULT '%',
                    description TEXT NOT NULL DEFAULT '',
                    origin TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(postgresql_name, name, origin)
                ) STRICT;

                CREATE TABLE app_installs (
                    id INTEGER PRIMARY KEY,
                    app_key TEXT NOT NULL,
                    name TEXT NOT NULL,
                    container_name TEXT NOT NULL,
                    http_port INTEGER NOT NULL DEFAULT 0,
                    env_json TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL,
                    UNIQUE(app_key, name)
                ) STRICT;

                CREATE TABLE app_install_resources (
                    id INTEGER PRIMARY KEY,
                    app_install_id INTEGER NOT NULL,
                    link_id INTEGER NOT NULL,
                    resource_id INTEGER NOT NULL,
                    key TEXT NOT NULL,
                    origin TEXT NOT NULL,
                    FOREIGN KEY(app_install_id) REFERENCES app_installs(id) ON DELETE CASCADE
                ) STRICT;

                CREATE TABLE backup_records (
                    id INTEGER PRIMARY KEY,
                    type TEXT NOT NULL,
                    name TEXT NOT NULL,
                    detail_name TEXT NOT NULL,
                    file_dir TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                ) STRICT;

                CREATE INDEX idx_postgresqls_parent ON database_postgresqls(postgresql_name, created_at DESC);
                CREATE INDEX idx_resources_resource ON app_install_resources(resource_id, key);
                CREATE INDEX idx_backup_records_owner ON backup_records(type, name, detail_name);
                ",
            )
            .map_err(|e| PanelError::storage(format!("Migration 1 failed: {e}"), None))?;

            conn.execute(
                "INSERT INTO migrations (domain, step, migration) VALUES (?, 1, 'initial_schema')",
                [DOMAIN],
            )
            .map_err(|e| PanelError::storage(format!("Failed to record migration: {e}"), None))?;

            tracing::info!("Applied catalog migration 1: initial_schema");
        }

        Ok(())
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

// ========== Row Mapping ==========

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PanelError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| PanelError::transform(format!("Invalid timestamp '{value}': {e}")))
}

const ENGINE_COLUMNS: &str = "id, name, type, origin, version, address, port, username, password, \
     ssl, skip_verify, root_cert, client_cert, client_key, description, created_at, updated_at";

struct EngineRow {
    id: i64,
    name: String,
    db_type: String,
    origin: String,
    version: String,
    address: String,
    port: u16,
    username: String,
    password: String,
    tls: TlsMaterial,
    description: String,
    created_at: String,
    updated_at: String,
}

impl EngineRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            db_type: row.get(2)?,
            origin: row.get(3)?,
            version: row.get(4)?,
            address: row.get(5)?,
            port: row.get(6)?,
            username: row.get(7)?,
            password: row.get(8)?,
            tls: TlsMaterial {
                ssl: row.get(9)?,
                skip_verify: row.get(10)?,
                root_cert: row.get(11)?,
                client_cert: row.get(12)?,
                client_key: row.get(13)?,
            },
            description: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_model(self) -> Result<EngineInstance, PanelError> {
        Ok(EngineInstance {
            id: self.id,
            name: self.name,
            db_type: self.db_type,
            from: Origin::parse(&self.origin),
            version: self.version,
            address: self.address,
            port: self.port,
            username: self.username,
            password: self.password,
            tls: self.tls,
            description: self.description,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

const DATABASE_COLUMNS: &str = "id, name, postgresql_name, username, password, permission, \
     description, origin, created_at, updated_at";

struct DatabaseRow {
    id: i64,
    name: String,
    postgresql_name: String,
    username: String,
    password: String,
    permission: String,
    description: String,
    origin: String,
    created_at: String,
    updated_at: String,
}

impl DatabaseRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            postgresql_name: row.get(2)?,
            username: row.get(3)?,
            password: row.get(4)?,
            permission: row.get(5)?,
            description: row.get(6)?,
            origin: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_model(self) -> Result<LogicalDatabase, PanelError> {
        Ok(LogicalDatabase {
            id: self.id,
            name: self.name,
            postgresql_name: self.postgresql_name,
            username: self.username,
            password: self.password,
            permission: self.permission,
            description: self.description,
            from: Origin::parse(&self.origin),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

const INSTALL_COLUMNS: &str = "id, app_key, name, container_name, http_port, env_json, created_at";

struct InstallRow {
    id: i64,
    app_key: String,
    name: String,
    container_name: String,
    http_port: i64,
    env_json: String,
    created_at: String,
}

impl InstallRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            app_key: row.get(1)?,
            name: row.get(2)?,
            container_name: row.get(3)?,
            http_port: row.get(4)?,
            env_json: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_model(self) -> Result<AppInstall, PanelError> {
        let env: BTreeMap<String, String> = serde_json::from_str(&self.env_json)?;
        Ok(AppInstall {
            id: self.id,
            app_key: self.app_key,
            name: self.name,
            container_name: self.container_name,
            http_port: self.http_port,
            env,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn read_resource(row: &Row<'_>) -> rusqlite::Result<AppInstallResource> {
    Ok(AppInstallResource {
        id: row.get(0)?,
        app_install_id: row.get(1)?,
        link_id: row.get(2)?,
        resource_id: row.get(3)?,
        key: row.get(4)?,
        from: row.get(5)?,
    })
}

fn collect_models<R, T>(
    rows: impl Iterator<Item = rusqlite::Result<R>>,
    into_model: impl Fn(R) -> Result<T, PanelError>,
) -> Result<Vec<T>, PanelError> {
    let mut items = Vec::new();
    for row in rows {
        let row = row.map_err(|e| PanelError::storage(format!("Failed to read row: {e}"), None))?;
        items.push(into_model(row)?);
    }
    Ok(items)
}

fn expect_one_row(changed: usize, what: &str, id: i64) -> Result<(), PanelError> {
    if changed == 0 {
        return Err(PanelError::not_found(format!("{what} {id}")));
    }
    Ok(())
}

// ========== Catalog ==========

impl CatalogRepository for SqliteCatalog {
    fn get_engine_by_name(&self, name: &str) -> Result<Option<EngineInstance>, PanelError> {
        let conn = self.connection.lock();
        let row = conn
            .query_row(
                &format!("SELECT {ENGINE_COLUMNS} FROM database_instances WHERE name = ?"),
                [name],
                EngineRow::read,
            )
            .optional()
            .map_err(|e| PanelError::storage(format!("Failed to load engine instance: {e}"), None))?;
        row.map(EngineRow::into_model).transpose()
    }

    fn list_engines(&self, db_type: &str) -> Result<Vec<EngineInstance>, PanelError> {
        let conn = self.connection.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENGINE_COLUMNS} FROM database_instances WHERE type = ? ORDER BY name"
            ))
            .map_err(|e| PanelError::storage(format!("Failed to prepare query: {e}"), None))?;
        let rows = stmt
            .query_map([db_type], EngineRow::read)
            .map_err(|e| PanelError::storage(format!("Failed to query engine instances: {e}"), None))?;
        collect_models(rows, EngineRow::into_model)
    }

    fn save_engine(&self, engine: &EngineInstance) -> Result<i64, PanelError> {
        let conn = self.connection.lock();
        let now = Utc::now().to_rfc3339();

        let id = conn
            .query_row(
                "INSERT INTO database_instances (
                    name, type, origin, version, address, port, username, password,
                    ssl, skip_verify, root_cert, client_cert, client_key, description,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(name) DO UPDATE SET
                    type = excluded.type,
                    origin = excluded.origin,
                    version = excluded.version,
                    address = excluded.address,
                    port = excluded.port,
                    username = excluded.username,
                    password = excluded.password,
                    ssl = excluded.ssl,
                    skip_verify = excluded.skip_verify,
                    root_cert = excluded.root_cert,
                    client_cert = excluded.client_cert,
                    client_key = excluded.client_key,
                    description = excluded.description,
                    updated_at = excluded.updated_at
                RETURNING id",
                params![
                    engine.name,
                    engine.db_type,
                    engine.from.as_str(),
                    engine.version,
                    engine.address,
                    engine.port,
                    engine.username,
                    engine.password,
                    engine.tls.ssl,
                    engine.tls.skip_verify,
                    engine.tls.root_cert,
                    engine.tls.client_cert,
                    engine.tls.client_key,
                    engine.description,
                    engine.created_at.to_rfc3339(),
                    now,
                ],
                |row| row.get(0),
            )
            .map_err(|e| PanelError::storage(format!("Failed to save engine instance: {e}"), None))?;

        tracing::debug!(engine = %engine.name, id, "Engine instance saved");
        Ok(id)
    }

    fn update_engine_password(&self, id: i64, password: &str) -> Result<(), PanelError> {
        let conn = self.connection.lock();
        let changed = conn
            .execute(
                "UPDATE database_instances SET password = ?, updated_at = ? WHERE id = ?",
                params![password, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| PanelError::storage(format!("Failed to update engine password: {e}"), None))?;
        expect_one_row(changed, "engine instance", id)
    }

    fn get_database(&self, id: i64) -> Result<Option<LogicalDatabase>, PanelError> {
        let conn = self.connection.lock();
        let row = conn
            .query_row(
                &format!("SELECT {DATABASE_COLUMNS} FROM database_postgresqls WHERE id = ?"),
                [id],
                DatabaseRow::read,
            )
            .optional()
            .map_err(|e| PanelError::storage(format!("Failed to load database: {e}"), None))?;
        row.map(DatabaseRow::into_model).transpose()
    }

    fn find_database(
        &self,
        name: &str,
        postgresql_name: &str,
        from: &Origin,
    ) -> Result<Option<LogicalDatabase>, PanelError> {
        let conn = self.connection.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {DATABASE_COLUMNS} FROM database_postgresqls
                     WHERE name = ? AND postgresql_name = ? AND origin = ?"
                ),
                params![name, postgresql_name, from.as_str()],
                DatabaseRow::read,
            )
            .optional()
            .map_err(|e| PanelError::storage(format!("Failed to look up database: {e}"), None))?;
        row.map(DatabaseRow::into_model).transpose()
    }

    fn page_databases(&self, search: &DatabaseSearch) -> Result<PageResult<LogicalDatabase>, PanelError> {
        let conn = self.connection.lock();
        let pattern = format!("%{}%", escape_like(&search.info));
        let filter = "postgresql_name = ?1 AND name LIKE ?2 ESCAPE '\\'";

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM database_postgresqls WHERE {filter}"),
                params![search.database, pattern],
                |row| row.get(0),
            )
            .map_err(|e| PanelError::storage(format!("Failed to count databases: {e}"), None))?;

        let direction = match search.order {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        };
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DATABASE_COLUMNS} FROM database_postgresqls WHERE {filter}
                 ORDER BY {} {direction}, id {direction} LIMIT ?3 OFFSET ?4",
                search.order_by.column()
            ))
            .map_err(|e| PanelError::storage(format!("Failed to prepare query: {e}"), None))?;
        let rows = stmt
            .query_map(
                params![search.database, pattern, search.page_size, search.offset()],
                DatabaseRow::read,
            )
            .map_err(|e| PanelError::storage(format!("Failed to query databases: {e}"), None))?;
        let items = collect_models(rows, DatabaseRow::into_model)?;

        Ok(PageResult { total, items })
    }

    fn list_databases(&self) -> Result<Vec<LogicalDatabase>, PanelError> {
        let conn = self.connection.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DATABASE_COLUMNS} FROM database_postgresqls ORDER BY postgresql_name, name"
            ))
            .map_err(|e| PanelError::storage(format!("Failed to prepare query: {e}"), None))?;
        let rows = stmt
            .query_map([], DatabaseRow::read)
            .map_err(|e| PanelError::storage(format!("Failed to query databases: {e}"), None))?;
        collect_models(rows, DatabaseRow::into_model)
    }

    fn create_database(&self, database: &LogicalDatabase) -> Result<i64, PanelError> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO database_postgresqls (
                name, postgresql_name, username, password, permission, description,
                origin, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                database.name,
                database.postgresql_name,
                database.username,
                database.password,
                database.permission,
                database.description,
                database.from.as_str(),
                database.created_at.to_rfc3339(),
                database.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => PanelError::record_exist(format!(
                "{} on {}",
                database.name, database.postgresql_name
            )),
            _ => PanelError::storage(format!("Failed to save database: {e}"), None),
        })?;

        let id = conn.last_insert_rowid();
        tracing::debug!(database = %database.name, engine = %database.postgresql_name, id, "Database recorded");
        Ok(id)
    }

    fn update_description(&self, id: i64, description: &str) -> Result<(), PanelError> {
        let conn = self.connection.lock();
        let changed = conn
            .execute(
                "UPDATE database_postgresqls SET description = ?, updated_at = ? WHERE id = ?",
                params![description, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| PanelError::storage(format!("Failed to update description: {e}"), None))?;
        expect_one_row(changed, "database", id)
    }

    fn update_password(&self, id: i64, password: &str) -> Result<(), PanelError> {
        let conn = self.connection.lock();
        let changed = conn
            .execute(
                "UPDATE database_postgresqls SET password = ?, updated_at = ? WHERE id = ?",
                params![password, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| PanelError::storage(format!("Failed to update password: {e}"), None))?;
        expect_one_row(changed, "database", id)
    }

    fn update_permission(&self, id: i64, permission: &str) -> Result<(), PanelError> {
        let conn = self.connection.lock();
        let changed = conn
            .execute(
                "UPDATE database_postgresqls SET permission = ?, updated_at = ? WHERE id = ?",
                params![permission, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| PanelError::storage(format!("Failed to update permission: {e}"), None))?;
        expect_one_row(changed, "database", id)
    }

    fn delete_database_with_links(&self, id: i64) -> Result<(), PanelError> {
        let mut conn = self.connection.lock();
        let tx = conn
            .transaction()
            .map_err(|e| PanelError::storage(format!("Failed to begin transaction: {e}"), None))?;

        let links = tx
            .execute(
                "DELETE FROM app_install_resources WHERE resource_id = ? AND key = ?",
                params![id, POSTGRESQL_TYPE],
            )
            .map_err(|e| PanelError::storage(format!("Failed to delete resource links: {e}"), None))?;
        tx.execute("DELETE FROM database_postgresqls WHERE id = ?", [id])
            .map_err(|e| PanelError::storage(format!("Failed to delete database: {e}"), None))?;

        tx.commit()
            .map_err(|e| PanelError::storage(format!("Failed to commit delete: {e}"), None))?;

        tracing::debug!(id, links, "Database removed from catalog");
        Ok(())
    }
}

// ========== App Installs ==========

impl AppInstallRepository for SqliteCatalog {
    fn load_base_info(&self, app_key: &str, name: &str) -> Result<AppInstallBaseInfo, PanelError> {
        let conn = self.connection.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {INSTALL_COLUMNS} FROM app_installs
                     WHERE app_key = ?1 AND (?2 = '' OR name = ?2) ORDER BY id LIMIT 1"
                ),
                params![app_key, name],
                InstallRow::read,
            )
            .optional()
            .map_err(|e| PanelError::storage(format!("Failed to load app install: {e}"), None))?;

        match row {
            Some(row) => Ok(AppInstallBaseInfo::from_install(&row.into_model()?)),
            None => Err(PanelError::not_found(format!("app install {app_key}/{name}"))),
        }
    }

    fn get(&self, id: i64) -> Result<Option<AppInstall>, PanelError> {
        let conn = self.connection.lock();
        let row = conn
            .query_row(
                &format!("SELECT {INSTALL_COLUMNS} FROM app_installs WHERE id = ?"),
                [id],
                InstallRow::read,
            )
            .optional()
            .map_err(|e| PanelError::storage(format!("Failed to load app install: {e}"), None))?;
        row.map(InstallRow::into_model).transpose()
    }

    fn save_install(&self, install: &AppInstall) -> Result<i64, PanelError> {
        let conn = self.connection.lock();
        let env_json = serde_json::to_string(&install.env)?;
        conn.execute(
            "INSERT INTO app_installs (app_key, name, container_name, http_port, env_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                install.app_key,
                install.name,
                install.container_name,
                install.http_port,
                env_json,
                install.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| PanelError::storage(format!("Failed to save app install: {e}"), None))?;
        Ok(conn.last_insert_rowid())
    }

    fn list_resources(
        &self,
        link_id: Option<i64>,
        resource_id: i64,
    ) -> Result<Vec<AppInstallResource>, PanelError> {
        let conn = self.connection.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, app_install_id, link_id, resource_id, key, origin
                 FROM app_install_resources
                 WHERE resource_id = ?1 AND key = ?2 AND (?3 IS NULL OR link_id = ?3)
                 ORDER BY id",
            )
            .map_err(|e| PanelError::storage(format!("Failed to prepare query: {e}"), None))?;
        let rows = stmt
            .query_map(params![resource_id, POSTGRESQL_TYPE, link_id], read_resource)
            .map_err(|e| PanelError::storage(format!("Failed to query resource links: {e}"), None))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| PanelError::storage(format!("Failed to read resource links: {e}"), None))
    }

    fn save_resource(&self, resource: &AppInstallResource) -> Result<i64, PanelError> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO app_install_resources (app_install_id, link_id, resource_id, key, origin)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                resource.app_install_id,
                resource.link_id,
                resource.resource_id,
                resource.key,
                resource.from,
            ],
        )
        .map_err(|e| PanelError::storage(format!("Failed to save resource link: {e}"), None))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_param(&self, app_install_id: i64, param: InstallParam, value: &str) -> Result<(), PanelError> {
        let conn = self.connection.lock();
        let env_json: Option<String> = conn
            .query_row("SELECT env_json FROM app_installs WHERE id = ?", [app_install_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| PanelError::storage(format!("Failed to load app install: {e}"), None))?;
        let env_json =
            env_json.ok_or_else(|| PanelError::not_found(format!("app install {app_install_id}")))?;

        let mut env: BTreeMap<String, String> = serde_json::from_str(&env_json)?;
        env.insert(param.env_key().to_string(), value.to_string());
        conn.execute(
            "UPDATE app_installs SET env_json = ? WHERE id = ?",
            params![serde_json::to_string(&env)?, app_install_id],
        )
        .map_err(|e| PanelError::storage(format!("Failed to update app install: {e}"), None))?;

        tracing::debug!(app_install_id, param = param.as_str(), "App install parameter updated");
        Ok(())
    }
}

// ========== Backups ==========

impl BackupRepository for SqliteCatalog {
    fn save_record(&self, record: &BackupRecord) -> Result<i64, PanelError> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO backup_records (type, name, detail_name, file_dir, file_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.db_type,
                record.name,
                record.detail_name,
                record.file_dir,
                record.file_name,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| PanelError::storage(format!("Failed to save backup record: {e}"), None))?;
        Ok(conn.last_insert_rowid())
    }

    fn delete_records(&self, db_type: &str, name: &str, detail_name: &str) -> Result<usize, PanelError> {
        let conn = self.connection.lock();
        conn.execute(
            "DELETE FROM backup_records WHERE type = ? AND name = ? AND detail_name = ?",
            params![db_type, name, detail_name],
        )
        .map_err(|e| PanelError::storage(format!("Failed to delete backup records: {e}"), None))
    }
}

/// Make user text match literally inside a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderBy, ROOT_PASSWORD_ENV, ROOT_USER_ENV, USER_PASSWORD_ENV};
    use tempfile::TempDir;

    fn catalog() -> (SqliteCatalog, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SqliteCatalog::open(dir.path().to_path_buf()).unwrap();
        (catalog, dir)
    }

    fn record(catalog: &SqliteCatalog, name: &str, parent: &str) -> i64 {
        catalog
            .create_database(&LogicalDatabase::new(name, parent, "app_user", "enc", Origin::Local))
            .unwrap()
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        {
            let catalog = SqliteCatalog::open(dir.path().to_path_buf()).unwrap();
            catalog.save_engine(&EngineInstance::local("pgA")).unwrap();
        }
        let catalog = SqliteCatalog::open(dir.path().to_path_buf()).unwrap();
        assert!(catalog.get_engine_by_name("pgA").unwrap().is_some());
        assert_eq!(catalog.data_dir(), dir.path());
    }

    #[test]
    fn test_engine_upsert_by_name() {
        let (catalog, _dir) = catalog();
        let mut engine =
            EngineInstance::remote("pgR", "aws", "db.internal", 5433, "admin", "enc-1", "16.2");
        engine.tls.ssl = true;
        engine.tls.root_cert = Some("-----BEGIN CERTIFICATE-----".into());
        let id = catalog.save_engine(&engine).unwrap();

        engine.version = "16.3".into();
        assert_eq!(catalog.save_engine(&engine).unwrap(), id);

        let loaded = catalog.get_engine_by_name("pgR").unwrap().unwrap();
        assert_eq!(loaded.version, "16.3");
        assert_eq!(loaded.from, Origin::Remote("aws".into()));
        assert_eq!(loaded.port, 5433);
        assert_eq!(loaded.tls, engine.tls);

        catalog.update_engine_password(id, "enc-2").unwrap();
        assert_eq!(catalog.list_engines(POSTGRESQL_TYPE).unwrap()[0].password, "enc-2");
        assert!(catalog.update_engine_password(999, "x").is_err());
    }

    #[test]
    fn test_unique_key_conflict() {
        let (catalog, _dir) = catalog();
        record(&catalog, "app_db", "pgA");
        let err = catalog
            .create_database(&LogicalDatabase::new("app_db", "pgA", "other", "enc", Origin::Local))
            .unwrap_err();
        assert!(matches!(err, PanelError::RecordExist { .. }));

        // Same name on another engine or origin is fine
        record(&catalog, "app_db", "pgB");
        catalog
            .create_database(&LogicalDatabase::new("app_db", "pgA", "u", "enc", Origin::Remote("aws".into())))
            .unwrap();
        assert!(catalog.find_database("app_db", "pgA", &Origin::Local).unwrap().is_some());
        assert_eq!(catalog.list_databases().unwrap().len(), 3);
    }

    #[test]
    fn test_field_updates() {
        let (catalog, _dir) = catalog();
        let id = record(&catalog, "app_db", "pgA");
        catalog.update_description(id, "orders").unwrap();
        catalog.update_password(id, "enc-2").unwrap();
        catalog.update_permission(id, "172.16.0.0/12").unwrap();

        let db = catalog.get_database(id).unwrap().unwrap();
        assert_eq!(db.description, "orders");
        assert_eq!(db.password, "enc-2");
        assert_eq!(db.permission, "172.16.0.0/12");
        assert!(matches!(catalog.update_description(999, "x"), Err(PanelError::NotFound { .. })));
    }

    #[test]
    fn test_page_databases() {
        let (catalog, _dir) = catalog();
        for name in ["alpha", "beta", "gamma", "alphabet"] {
            record(&catalog, name, "pgA");
        }
        record(&catalog, "alpha", "pgB");

        let mut search = DatabaseSearch::for_engine("pgA");
        search.page_size = 3;
        search.order_by = OrderBy::Name;
        search.order = Order::Ascending;
        let page = catalog.page_databases(&search).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(
            page.items.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["alpha", "alphabet", "beta"]
        );

        search.page = 2;
        assert_eq!(catalog.page_databases(&search).unwrap().items.len(), 1);

        search.page = 1;
        search.info = "alpha".into();
        assert_eq!(catalog.page_databases(&search).unwrap().total, 2);

        search.page = u32::MAX;
        search.page_size = u32::MAX;
        let page = catalog.page_databases(&search).unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_search_text_matches_literally() {
        let (catalog, _dir) = catalog();
        for name in ["app_db", "appxdb", "100%_done"] {
            record(&catalog, name, "pgA");
        }

        let mut search = DatabaseSearch::for_engine("pgA");
        search.info = "p_d".into();
        let names: Vec<_> = catalog.page_databases(&search).unwrap().items.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["app_db"]);

        search.info = "%".into();
        assert_eq!(catalog.page_databases(&search).unwrap().total, 1);
        search.info = String::new();
        assert_eq!(catalog.page_databases(&search).unwrap().total, 3);
    }

    #[test]
    fn test_delete_with_links() {
        let (catalog, _dir) = catalog();
        let id = record(&catalog, "app_db", "pgA");
        let app = catalog.save_install(&AppInstall::new("wordpress", "blog", "blog-1", 8080)).unwrap();
        let link = AppInstallResource {
            id: 0,
            app_install_id: app,
            link_id: 1,
            resource_id: id,
            key: POSTGRESQL_TYPE.into(),
            from: "local".into(),
        };
        catalog.save_resource(&link).unwrap();
        catalog.save_resource(&link).unwrap();
        assert_eq!(catalog.list_resources(Some(1), id).unwrap().len(), 2);
        assert!(catalog.list_resources(Some(2), id).unwrap().is_empty());

        catalog.delete_database_with_links(id).unwrap();
        assert!(catalog.get_database(id).unwrap().is_none());
        assert!(catalog.list_resources(None, id).unwrap().is_empty());
    }

    #[test]
    fn test_app_install_params() {
        let (catalog, _dir) = catalog();
        let install = AppInstall::new(POSTGRESQL_TYPE, "pgA", "pg-a", 5432)
            .with_env(ROOT_USER_ENV, "postgres")
            .with_env(ROOT_PASSWORD_ENV, "enc-root");
        let id = catalog.save_install(&install).unwrap();

        let base = catalog.load_base_info(POSTGRESQL_TYPE, "pgA").unwrap();
        assert_eq!(base.container_name, "pg-a");
        assert_eq!(base.user_name, "postgres");
        assert_eq!(base.password, "enc-root");
        assert_eq!(catalog.load_base_info(POSTGRESQL_TYPE, "").unwrap().id, id);
        assert!(matches!(
            catalog.load_base_info(POSTGRESQL_TYPE, "pgZ"),
            Err(PanelError::NotFound { .. })
        ));

        catalog.update_param(id, InstallParam::UserPassword, "enc-user").unwrap();
        let loaded = catalog.get(id).unwrap().unwrap();
        assert_eq!(loaded.env.get(USER_PASSWORD_ENV).map(String::as_str), Some("enc-user"));
        assert!(catalog.update_param(999, InstallParam::Password, "x").is_err());
    }

    #[test]
    fn test_backup_records() {
        let (catalog, _dir) = catalog();
        let backup = BackupRecord {
            id: 0,
            db_type: POSTGRESQL_TYPE.into(),
            name: "pgA".into(),
            detail_name: "app_db".into(),
            file_dir: "database/postgresql/pgA/app_db".into(),
            file_name: "app_db_20260101.sql.gz".into(),
            created_at: Utc::now(),
        };
        catalog.save_record(&backup).unwrap();
        catalog.save_record(&backup).unwrap();
        assert_eq!(catalog.delete_records(POSTGRESQL_TYPE, "pgA", "app_db").unwrap(), 2);
        assert_eq!(catalog.delete_records(POSTGRESQL_TYPE, "pgA", "app_db").unwrap(), 0);
    }
}
