//! Error types for the pgpanel control plane.
//!
//! Every public operation returns a single `PanelError`, classified into one
//! of the [`ErrorKind`] families so callers can tell validation problems from
//! engine failures and from partial successes that need reconciliation.

use thiserror::Error;

/// Classification of a [`PanelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input rejected before any engine command was issued.
    Validation,
    /// The logical database already exists for the same parent and origin.
    Conflict,
    /// Engine instance, logical database, or linked application missing.
    NotFound,
    /// A catalog row could not be mapped to its external representation.
    Transform,
    /// The administrative command or the connection to the engine failed.
    Engine,
    /// Engine-side mutation succeeded but a dependent step failed.
    PartialFailure,
    /// Local catalog, filesystem, keyring, or cipher failure.
    Storage,
    /// Anything else.
    Internal,
}

/// Main error type for pgpanel.
#[derive(Debug, Error)]
pub enum PanelError {
    /// Administrative input contains shell or statement metacharacters.
    #[error("Illegal characters in command input: {field}")]
    CmdIllegal {
        /// Which input was rejected.
        field: String,
    },

    /// Input is well-formed but not acceptable (reserved name, bad permission).
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Human-readable error message.
        message: String,
    },

    /// Record already exists.
    #[error("Record already exists: {message}")]
    RecordExist {
        /// Human-readable error message.
        message: String,
    },

    /// Record not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Struct transform failure.
    #[error("Transform error: {message}")]
    Transform {
        /// Human-readable error message.
        message: String,
    },

    /// Connection to the engine failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Administrative statement rejected by the engine.
    #[error("{message}")]
    Engine {
        /// PostgreSQL error message or command stderr.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL error code (e.g., "42P04").
        code: Option<String>,
    },

    /// Operation exceeded its timeout budget.
    #[error("Operation '{operation}' timed out after {seconds}s")]
    Timeout {
        /// Operation name.
        operation: String,
        /// Budget that elapsed.
        seconds: u64,
    },

    /// Engine-side change applied, follow-up step failed.
    #[error("Partial failure: {message}")]
    PartialFailure {
        /// Human-readable error message.
        message: String,
        /// The step that failed.
        #[source]
        source: Option<Box<PanelError>>,
    },

    /// Local SQLite catalog or filesystem error.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// OS keychain error.
    #[error("Keyring error: {message}")]
    Keyring {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// Secret encryption or decryption failed.
    #[error("Crypto error: {message}")]
    Crypto {
        /// Human-readable error message.
        message: String,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl PanelError {
    // ========== Constructors ==========

    /// Create an illegal-command error for the named input.
    pub fn cmd_illegal(field: impl Into<String>) -> Self {
        Self::CmdIllegal { field: field.into() }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    /// Create a record-exists error.
    pub fn record_exist(message: impl Into<String>) -> Self {
        Self::RecordExist { message: message.into() }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Create a transform error.
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform { message: message.into() }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create an engine error without PostgreSQL details (e.g., psql stderr).
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine { message: message.into(), detail: None, code: None }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout { operation: operation.into(), seconds }
    }

    /// Wrap the failed follow-up step of an engine-side change.
    pub fn partial_failure(message: impl Into<String>, source: PanelError) -> Self {
        Self::PartialFailure { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new storage error.
    pub fn storage(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Storage { message: message.into(), hint: hint.map(String::from), source: None }
    }

    /// Create a new keyring error.
    pub fn keyring(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Keyring { message: message.into(), hint: hint.map(String::from) }
    }

    /// Create a new crypto error.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto { message: message.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Methods ==========

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CmdIllegal { .. } | Self::InvalidInput { .. } => ErrorKind::Validation,
            Self::RecordExist { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Transform { .. } => ErrorKind::Transform,
            Self::Connection { .. } | Self::Engine { .. } | Self::Timeout { .. } => {
                ErrorKind::Engine
            }
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::Storage { .. }
            | Self::Keyring { .. }
            | Self::Crypto { .. }
            | Self::Config { .. } => ErrorKind::Storage,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error was raised before any engine command.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::CmdIllegal { .. } => "Validation",
            Self::InvalidInput { .. } => "Validation",
            Self::RecordExist { .. } => "Conflict",
            Self::NotFound { .. } => "NotFound",
            Self::Transform { .. } => "Transform",
            Self::Connection { .. } => "Connection",
            Self::Engine { .. } => "Engine",
            Self::Timeout { .. } => "Timeout",
            Self::PartialFailure { .. } => "PartialFailure",
            Self::Storage { .. } => "Storage",
            Self::Keyring { .. } => "Keyring",
            Self::Crypto { .. } => "Crypto",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::CmdIllegal { .. } => {
                Some("Remove characters such as & | ; $ ' ` ( ) \" < > and line breaks")
            }
            Self::InvalidInput { .. } => None,
            Self::RecordExist { .. } => Some("Choose a different database name"),
            Self::NotFound { .. } => None,
            Self::Transform { .. } => Some("Please report this issue"),
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Engine { .. } => None,
            Self::Timeout { .. } => Some("Check engine load and retry the operation"),
            Self::PartialFailure { .. } => {
                Some("The engine was updated; retry propagation instead of repeating the change")
            }
            Self::Storage { hint, .. } => hint.as_deref(),
            Self::Keyring { hint, .. } => hint.as_deref(),
            Self::Crypto { .. } => Some("The catalog key may have changed"),
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Engine { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Engine { detail, code, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            Self::PartialFailure { source: Some(source), .. } => Some(source.to_string()),
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Engine Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for "Show Details" expansion.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to PanelError.
impl From<tokio_postgres::Error> for PanelError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let code_str = db_err.code().code();

            // Connection exceptions (08xxx) and auth failures (28xxx)
            if code_str.starts_with("08") || code_str.starts_with("28") {
                return PanelError::Connection { message, source: Some(Box::new(err)) };
            }
            return PanelError::Engine { message, detail, code: Some(code_str.to_string()) };
        }

        if err.is_closed() {
            return PanelError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        PanelError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from rusqlite::Error to PanelError.
impl From<rusqlite::Error> for PanelError {
    fn from(err: rusqlite::Error) -> Self {
        PanelError::Storage {
            message: err.to_string(),
            hint: Some("The catalog database may be corrupted".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from std::io::Error to PanelError.
impl From<std::io::Error> for PanelError {
    fn from(err: std::io::Error) -> Self {
        PanelError::Storage {
            message: err.to_string(),
            hint: Some("Check file permissions and disk space".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from serde_json::Error to PanelError.
impl From<serde_json::Error> for PanelError {
    fn from(err: serde_json::Error) -> Self {
        PanelError::Transform { message: format!("JSON error: {err}") }
    }
}

/// Convert from keyring::Error to PanelError.
impl From<keyring::Error> for PanelError {
    fn from(err: keyring::Error) -> Self {
        PanelError::Keyring {
            message: err.to_string(),
            hint: Some("Grant pgpanel access to the system keychain".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        assert_eq!(PanelError::cmd_illegal("name").kind(), ErrorKind::Validation);
        assert_eq!(PanelError::record_exist("app_db").kind(), ErrorKind::Conflict);
        assert_eq!(PanelError::not_found("pgA").kind(), ErrorKind::NotFound);
        assert_eq!(PanelError::timeout("create", 300).kind(), ErrorKind::Engine);
        assert_eq!(PanelError::engine("boom").kind(), ErrorKind::Engine);
        assert_eq!(
            PanelError::partial_failure("propagation", PanelError::not_found("app")).kind(),
            ErrorKind::PartialFailure
        );
    }

    #[test]
    fn test_error_info_includes_partial_failure_source() {
        let err = PanelError::partial_failure(
            "password changed on engine",
            PanelError::not_found("app install 7"),
        );
        let info = err.to_error_info();
        assert_eq!(info.error_type, "PartialFailure Error");
        assert!(info.hint.is_some());
        assert_eq!(info.technical_detail.as_deref(), Some("Not found: app install 7"));
    }

    #[test]
    fn test_engine_error_detail() {
        let err = PanelError::Engine {
            message: "database \"app_db\" already exists".into(),
            detail: None,
            code: Some("42P04".into()),
        };
        assert_eq!(err.pg_code(), Some("42P04"));
        assert_eq!(err.to_error_info().technical_detail.as_deref(), Some("Code: 42P04"));
    }
}
