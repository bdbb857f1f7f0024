//! Administrative intents: version-agnostic requests handed to an `AdminClient`.
//!
//! Each value is built fresh for one call and dropped afterwards.

use std::time::Duration;

/// Fixed ceiling for every administrative operation.
pub const ADMIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Provision a database and its owning role.
#[derive(Clone)]
pub struct CreateInfo {
    /// Database name
    pub name: String,
    /// Encoding, e.g. `UTF8`
    pub format: String,
    /// Owning role
    pub username: String,
    /// Plaintext password for the role
    pub password: String,
    /// Engine version hint; empty means detect
    pub version: String,
    /// Operation budget
    pub timeout: Duration,
}

/// Drop a database and its role.
#[derive(Debug, Clone)]
pub struct DeleteInfo {
    /// Database name
    pub name: String,
    /// Engine version hint; empty means detect
    pub version: String,
    /// Role to drop alongside the database
    pub username: String,
    /// Permission recorded for the role (its hba rules are removed)
    pub permission: String,
    /// Tolerate missing objects and keep going past failures
    pub force_delete: bool,
    /// Operation budget
    pub timeout: Duration,
}

/// Set a role's password.
#[derive(Clone)]
pub struct PasswordChangeInfo {
    /// Database the role belongs to; empty for the engine admin role
    pub name: String,
    /// Role name
    pub username: String,
    /// New plaintext password
    pub password: String,
    /// Engine version hint; empty means detect
    pub version: String,
    /// Operation budget
    pub timeout: Duration,
}

/// Change which hosts a role may connect from.
#[derive(Clone)]
pub struct AccessChangeInfo {
    /// Database the rule applies to; empty means all databases
    pub name: String,
    /// Role name
    pub username: String,
    /// Stored password ciphertext of the role, kept for auditing only
    pub password: String,
    /// `%`, `localhost`, an address, or a CIDR block
    pub permission: String,
    /// Engine version hint; empty means detect
    pub version: String,
    /// Operation budget
    pub timeout: Duration,
}

macro_rules! redacted_debug {
    ($ty:ident, $($field:ident),+) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))+
                    .finish_non_exhaustive()
            }
        }
    };
}

redacted_debug!(CreateInfo, name, format, username, version, timeout);
redacted_debug!(PasswordChangeInfo, name, username, version, timeout);
redacted_debug!(AccessChangeInfo, name, username, permission, version, timeout);
