//! Error types and recovery strategies for Chaptercast
//!
//! Errors are classified into three severity tiers:
//! - **Recoverable**: can be retried (locked database, transient IO)
//! - **Degraded**: the feature fails but playback continues (bookmark storage down)
//! - **Fatal**: needs user intervention (corrupted database)
//!
//! Each error maps to a recovery action that front ends use to decide what to do.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Recovery actions that can be taken when an error occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation immediately
    RetryImmediate,
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Disable the failing feature and continue
    DisableFeature,
    /// Attempt to repair the database and retry
    RepairDatabase,
    /// Nothing can be done automatically
    UserIntervention,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryImmediate => write!(f, "Retrying immediately"),
            Self::RetryWithBackoff => write!(f, "Retrying with backoff"),
            Self::DisableFeature => write!(f, "Disabling feature"),
            Self::RepairDatabase => write!(f, "Repairing database"),
            Self::UserIntervention => write!(f, "User intervention required"),
        }
    }
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Recoverable,
    Degraded,
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Main error type shared by storage and front ends
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database is locked by another process
    #[error("Database locked: {operation}")]
    DatabaseLocked { operation: String },

    /// Database is corrupted and needs repair
    #[error("Database corrupted: {details}")]
    DatabaseCorrupted { details: String },

    /// Record not found in storage
    #[error("Record not found: {entity} with {identifier}")]
    RecordNotFound { entity: String, identifier: String },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Permission denied for file operation
    #[error("Permission denied: {operation} on {path}")]
    PermissionDenied { operation: String, path: PathBuf },

    /// General I/O error
    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: io::Error,
    },

    /// Invalid argument provided
    #[error("Invalid argument: {argument} - {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl AppError {
    /// Returns the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::DatabaseLocked { .. } | Self::IoError { .. } => ErrorSeverity::Recoverable,

            Self::DatabaseCorrupted { .. } => ErrorSeverity::Fatal,

            _ => ErrorSeverity::Degraded,
        }
    }

    /// Returns the recommended recovery action for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            Self::IoError { .. } => RecoveryAction::RetryImmediate,
            Self::DatabaseError { .. } | Self::DatabaseLocked { .. } => {
                RecoveryAction::RetryWithBackoff
            }
            Self::DatabaseCorrupted { .. } => RecoveryAction::RepairDatabase,
            Self::InternalError { .. } => RecoveryAction::DisableFeature,
            _ => RecoveryAction::UserIntervention,
        }
    }

    /// Returns a message suitable for display in a front end
    pub fn user_message(&self) -> String {
        match self {
            Self::DatabaseError { .. } | Self::DatabaseLocked { .. } => {
                "Saved data is temporarily unavailable. Please try again.".to_string()
            }
            Self::DatabaseCorrupted { .. } => {
                "The bookmark database is damaged and needs repair.".to_string()
            }
            Self::RecordNotFound { entity, .. } => format!("That {} no longer exists.", entity),
            Self::FileNotFound { .. } => {
                "The file was not found. It may have been moved or deleted.".to_string()
            }
            Self::PermissionDenied { .. } => "Permission denied.".to_string(),
            Self::IoError { .. } => "A file operation failed. Please try again.".to_string(),
            Self::InvalidArgument { .. } => "Invalid input provided.".to_string(),
            Self::InternalError { .. } => "An unexpected error occurred.".to_string(),
        }
    }

    /// Returns true if this error should be logged at ERROR level
    pub fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Returns true if this error can be automatically retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.recovery_action(),
            RecoveryAction::RetryImmediate | RecoveryAction::RetryWithBackoff
        )
    }

    /// Returns true if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }

    /// Helper to create a database error from any error type
    pub fn database<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper to create a not-found error
    pub fn not_found(entity: impl Into<String>, identifier: impl fmt::Display) -> Self {
        Self::RecordNotFound {
            entity: entity.into(),
            identifier: identifier.to_string(),
        }
    }
}

/// Convenience type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound {
                path: PathBuf::from("unknown"),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                operation: "file operation".to_string(),
                path: PathBuf::from("unknown"),
            },
            _ => Self::IoError {
                message: err.to_string(),
                source: err,
            },
        }
    }
}
