//! Administrative statement construction.
//!
//! DDL cannot take bind parameters, so every identifier and literal that
//! reaches a statement goes through [`quote_ident`] or [`quote_literal`].
//! Statements are plain strings so both transports (psql in a container and
//! the simple query protocol) run them unchanged.

use super::version::VersionFamily;

/// Quote an identifier: `app"db` becomes `"app""db"`.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal.
///
/// Backslashes switch to the `E''` form so the result does not depend on
/// `standard_conforming_strings`.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}

/// Statement builder bound to one version family.
#[derive(Debug, Clone, Copy)]
pub struct Statements {
    family: VersionFamily,
}

impl Statements {
    /// Create a builder for the given family.
    pub fn new(family: VersionFamily) -> Self {
        Self { family }
    }

    /// Version family the statements target.
    pub fn family(&self) -> VersionFamily {
        self.family
    }

    fn password_encryption(&self) -> String {
        format!("SET password_encryption = {}", quote_literal(self.family.password_encryption()))
    }

    /// Create a login role with a password.
    pub fn create_role(&self, username: &str, password: &str) -> String {
        format!(
            "{}; CREATE ROLE {} WITH LOGIN PASSWORD {}",
            self.password_encryption(),
            quote_ident(username),
            quote_literal(password)
        )
    }

    /// Create a database owned by `owner`.
    pub fn create_database(&self, name: &str, owner: &str, encoding: &str) -> String {
        let mut sql = format!("CREATE DATABASE {} OWNER {}", quote_ident(name), quote_ident(owner));
        if !encoding.is_empty() {
            sql.push_str(&format!(" ENCODING {} TEMPLATE template0", quote_literal(encoding)));
        }
        sql
    }

    /// Stop granting CONNECT to every role by default.
    pub fn revoke_public_connect(&self, name: &str) -> String {
        format!("REVOKE CONNECT ON DATABASE {} FROM PUBLIC", quote_ident(name))
    }

    /// Grant all database privileges to a role.
    pub fn grant_all(&self, name: &str, username: &str) -> String {
        format!(
            "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
            quote_ident(name),
            quote_ident(username)
        )
    }

    /// Terminate other sessions on a database (needed before 13).
    pub fn terminate_sessions(&self, name: &str) -> String {
        format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = {} AND pid <> pg_backend_pid()",
            quote_literal(name)
        )
    }

    /// Drop a database, forcing sessions off where supported.
    pub fn drop_database(&self, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP DATABASE ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&quote_ident(name));
        if self.family.supports_drop_force() {
            sql.push_str(" WITH (FORCE)");
        }
        sql
    }

    /// Drop a role.
    pub fn drop_role(&self, username: &str, if_exists: bool) -> String {
        if if_exists {
            format!("DROP ROLE IF EXISTS {}", quote_ident(username))
        } else {
            format!("DROP ROLE {}", quote_ident(username))
        }
    }

    /// Set a role's password.
    pub fn alter_password(&self, username: &str, password: &str) -> String {
        format!(
            "{}; ALTER ROLE {} WITH PASSWORD {}",
            self.password_encryption(),
            quote_ident(username),
            quote_literal(password)
        )
    }

    /// Location of the active `pg_hba.conf`.
    pub fn hba_file(&self) -> &'static str {
        "SHOW hba_file"
    }

    /// Read a server-side file one line per row.
    pub fn read_lines(&self, path: &str) -> String {
        format!(
            "SELECT line FROM regexp_split_to_table(pg_read_file({}), E'\\n') \
             WITH ORDINALITY AS t(line, n) ORDER BY n",
            quote_literal(path)
        )
    }

    /// Write lines to a server-side file verbatim.
    ///
    /// CSV with control-character delimiter and quote keeps every line raw;
    /// empty lines go out as NULL, which CSV writes unquoted.
    pub fn write_lines(&self, path: &str, lines: &[String]) -> String {
        let values: Vec<String> = lines.iter().map(|line| quote_literal(line)).collect();
        format!(
            "COPY (SELECT NULLIF(line, '') FROM unnest(ARRAY[{}]::text[]) \
             WITH ORDINALITY AS t(line, n) ORDER BY n) TO {} \
             WITH (FORMAT csv, DELIMITER E'\\x01', QUOTE E'\\x02')",
            values.join(", "),
            quote_literal(path)
        )
    }

    /// Ask the postmaster to reload configuration files.
    pub fn reload_conf(&self) -> &'static str {
        "SELECT pg_reload_conf()"
    }

    /// Server version as a number, e.g. `150004`.
    pub fn server_version_num(&self) -> &'static str {
        "SHOW server_version_num"
    }

    /// User databases and their owners.
    pub fn list_databases(&self) -> &'static str {
        "SELECT datname, pg_get_userbyid(datdba) FROM pg_database \
         WHERE NOT datistemplate AND datname <> 'postgres' ORDER BY datname"
    }

    /// One-row health snapshot in `PostgresqlStatus` column order.
    pub fn status(&self) -> String {
        let backend_fsync = if self.family.has_bgwriter_backend_fsync() {
            "(SELECT buffers_backend_fsync::text FROM pg_stat_bgwriter)"
        } else {
            "'0'"
        };
        format!(
            "SELECT date_trunc('second', current_timestamp - pg_postmaster_start_time())::text, \
             current_setting('server_version'), \
             current_setting('max_connections'), \
             current_setting('autovacuum'), \
             (SELECT count(*) FROM pg_stat_activity)::text, \
             (SELECT round(coalesce(sum(blks_hit) * 100.0 / nullif(sum(blks_hit) + sum(blks_read), 0), 0), 2) \
              FROM pg_stat_database)::text, \
             current_setting('shared_buffers'), \
             (SELECT buffers_clean::text FROM pg_stat_bgwriter), \
             (SELECT maxwritten_clean::text FROM pg_stat_bgwriter), \
             {backend_fsync}"
        )
    }
}
