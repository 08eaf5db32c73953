//! Error types for pgstamp
//!
//! All modules use `PgstampResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pgstamp operations
pub type PgstampResult<T> = Result<T, PgstampError>;

/// All errors that can occur in pgstamp
#[derive(Error, Debug)]
pub enum PgstampError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    // Store errors
    #[error("Could not connect to database server: {0}")]
    Connection(String),

    #[error("Database already exists: {0}")]
    AlreadyExists(String),

    #[error("Destination database already exists: {0}")]
    DestinationExists(String),

    #[error("Database does not exist: {0}")]
    DatabaseNotFound(String),

    #[error("Storage operation '{operation}' failed on {target}: {reason}")]
    Storage {
        operation: &'static str,
        target: String,
        reason: String,
    },

    #[error("Failed to acquire lock '{key}': {reason}")]
    Lock { key: String, reason: String },

    // Build errors
    #[error("Building database {database} failed: {reason}")]
    Build { database: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PgstampError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage error for an operation on a named target
    pub fn storage(
        operation: &'static str,
        target: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Storage {
            operation,
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Connection(_) => Some("Check [database] url in config, or pass --database-url"),
            Self::DestinationExists(_) => Some("Drop it first, or pass --unless-exists"),
            Self::DatabaseNotFound(_) => Some("Run: pgstamp cache list"),
            Self::InvalidPrefix { .. } => {
                Some("Use 1-22 characters from a-z, 0-9 and '_' for the cache prefix")
            }
            _ => None,
        }
    }
}
