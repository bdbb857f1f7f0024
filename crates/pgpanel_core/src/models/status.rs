//! Engine health snapshot.

use serde::Serialize;

/// Liveness and basic health figures reported by the engine.
///
/// All fields are text as reported by the server. The default value is the
/// zero status returned when the engine cannot be queried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlStatus {
    /// Time since postmaster start
    pub uptime: String,
    /// `server_version` setting
    pub version: String,
    /// `max_connections` setting
    pub max_connections: String,
    /// `autovacuum` setting
    pub autovacuum: String,
    /// Sessions in `pg_stat_activity`
    pub current_connections: String,
    /// Buffer cache hit ratio in percent
    pub hit_ratio: String,
    /// `shared_buffers` setting
    pub shared_buffers: String,
    /// Buffers written by the background writer
    pub buffers_clean: String,
    /// Times the background writer stopped a cleaning scan
    pub maxwritten_clean: String,
    /// Backend fsync calls (always `0` from version 17)
    pub buffers_backend_fsync: String,
}

impl PostgresqlStatus {
    /// Build a status from one result row in column order.
    ///
    /// Returns `None` when the row is shorter than expected.
    pub fn from_row(row: &[String]) -> Option<Self> {
        if row.len() < 10 {
            return None;
        }
        Some(Self {
            uptime: row[0].clone(),
            version: row[1].clone(),
            max_connections: row[2].clone(),
            autovacuum: row[3].clone(),
            current_connections: row[4].clone(),
            hit_ratio: row[5].clone(),
            shared_buffers: row[6].clone(),
            buffers_clean: row[7].clone(),
            maxwritten_clean: row[8].clone(),
            buffers_backend_fsync: row[9].clone(),
        })
    }

    /// Check if this is the zero status.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
