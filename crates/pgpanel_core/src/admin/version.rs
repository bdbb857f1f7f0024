//! Engine version families and the syntax differences between them.

/// PostgreSQL versions grouped by administrative syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionFamily {
    /// 12 and older: no `DROP DATABASE ... WITH (FORCE)`, md5 by default.
    Pre13,
    /// 13: forced drop available, md5 still the default.
    Pg13,
    /// 14 to 16: scram-sha-256 by default.
    Pg14,
    /// 17 and newer: backend fsync counters left `pg_stat_bgwriter`.
    Pg17,
}

impl VersionFamily {
    /// Family assumed when the version cannot be determined.
    pub const FALLBACK: Self = Self::Pre13;

    /// Family for a major version number.
    pub fn from_major(major: u32) -> Self {
        match major {
            0..=12 => Self::Pre13,
            13 => Self::Pg13,
            14..=16 => Self::Pg14,
            _ => Self::Pg17,
        }
    }

    /// Parse a version string such as `15`, `15.4`, `16.2 (Debian 16.2-1)`,
    /// `9.6.24`, or a `server_version_num` like `150004`.
    pub fn parse(version: &str) -> Option<Self> {
        let digits: String = version.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        let number: u32 = digits.parse().ok()?;
        // server_version_num: major * 10000 (10+) or major * 10000 + minor * 100 (9.x)
        let major = if number >= 10_000 { number / 10_000 } else { number };
        Some(Self::from_major(major))
    }

    /// Whether `DROP DATABASE ... WITH (FORCE)` is available.
    pub fn supports_drop_force(&self) -> bool {
        *self >= Self::Pg13
    }

    /// Password hashing method matching the server default.
    pub fn password_encryption(&self) -> &'static str {
        if *self >= Self::Pg14 {
            "scram-sha-256"
        } else {
            "md5"
        }
    }

    /// Whether `pg_stat_bgwriter` still exposes `buffers_backend_fsync`.
    pub fn has_bgwriter_backend_fsync(&self) -> bool {
        *self < Self::Pg17
    }
}
