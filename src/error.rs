use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinbakError {
    #[error("Database not reachable: {reason}")]
    ConnectionUnreachable { reason: String },

    #[error("Binary logging is not enabled on the database server")]
    LogCaptureDisabled,

    #[error("Binary log index unavailable: {path}: {reason}")]
    IndexUnavailable { path: PathBuf, reason: String },

    #[error("Database size estimate unavailable: size query returned no rows")]
    SizeUnavailable,

    #[error("Insufficient space on destination: need {needed_mb:.2} MB, have {available_mb:.2} MB")]
    InsufficientSpace { needed_mb: f64, available_mb: f64 },

    #[error("Dump process failed: {stderr}")]
    DumpProcessFailed { stderr: String },

    #[error("Backup artifact already exists: {path}")]
    ArtifactCollision { path: PathBuf },

    #[error("Failed to copy binary log {path}: {source}")]
    CopyIoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup destination unavailable: {path}: {reason}")]
    DestinationUnavailable { path: PathBuf, reason: String },

    #[error("Database query failed: {message}")]
    Database { message: String },

    #[error("Executable not found: {program}")]
    ToolNotFound { program: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Operation interrupted by user")]
    Interrupted,
}

impl BinbakError {
    /// Create a configuration error with a custom message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a database query error with a custom message
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Errors that stop a run before any backup is attempted
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            BinbakError::ConnectionUnreachable { .. }
                | BinbakError::LogCaptureDisabled
                | BinbakError::IndexUnavailable { .. }
                | BinbakError::DestinationUnavailable { .. }
                | BinbakError::Database { .. }
        )
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BinbakError::Interrupted => 130,
            BinbakError::Validation { .. } => 2,
            BinbakError::Config { .. } => 2,
            BinbakError::ToolNotFound { .. } => 2,
            _ => 1,
        }
    }

    /// Provide helpful suggestions for resolving the error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            BinbakError::ConnectionUnreachable { .. } => vec![
                "Check that the database server is running".to_string(),
                "Check the credentials in the mysql defaults file".to_string(),
            ],
            BinbakError::LogCaptureDisabled => vec![
                "Stop the server, enable log_bin in its configuration and start it again"
                    .to_string(),
            ],
            BinbakError::IndexUnavailable { .. } => vec![
                "Check that the binary log directory is readable".to_string(),
                "Set log_dir and index_file in the [mysql] config section".to_string(),
            ],
            BinbakError::InsufficientSpace { .. } => vec![
                "Free up space on the backup media".to_string(),
                "Mount a larger backup device".to_string(),
            ],
            BinbakError::ArtifactCollision { path } => vec![format!(
                "Another run created {} in the same second; wait and run again",
                path.display()
            )],
            BinbakError::DestinationUnavailable { .. } => vec![
                "Check that the backup media is mounted".to_string(),
                "Check the [destination] path in the config file".to_string(),
            ],
            BinbakError::ToolNotFound { program } => vec![
                format!("Install {program} or set its full path in the [mysql] config section"),
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation() {
        let path = PathBuf::from("/var/lib/mysql/binlog.index");

        let index = BinbakError::IndexUnavailable {
            path: path.clone(),
            reason: "empty".to_string(),
        };
        assert!(format!("{}", index).contains("binlog.index"));
        assert!(format!("{}", index).contains("empty"));

        let space = BinbakError::InsufficientSpace {
            needed_mb: 1000.0,
            available_mb: 512.5,
        };
        assert!(format!("{}", space).contains("1000.00"));
        assert!(format!("{}", space).contains("512.50"));
    }

    #[test]
    fn test_constructors() {
        match BinbakError::config("bad") {
            BinbakError::Config { message } => assert_eq!(message, "bad"),
            _ => panic!("Expected Config error"),
        }
        match BinbakError::validation("bad name") {
            BinbakError::Validation { message } => assert_eq!(message, "bad name"),
            _ => panic!("Expected Validation error"),
        }
        match BinbakError::database("syntax") {
            BinbakError::Database { message } => assert_eq!(message, "syntax"),
            _ => panic!("Expected Database error"),
        }
    }

    #[test]
    fn test_is_precondition() {
        assert!(BinbakError::LogCaptureDisabled.is_precondition());
        assert!(BinbakError::ConnectionUnreachable {
            reason: "refused".to_string()
        }
        .is_precondition());
        assert!(BinbakError::IndexUnavailable {
            path: PathBuf::from("/x"),
            reason: "missing".to_string()
        }
        .is_precondition());

        assert!(!BinbakError::SizeUnavailable.is_precondition());
        assert!(!BinbakError::DumpProcessFailed {
            stderr: "boom".to_string()
        }
        .is_precondition());
        assert!(!BinbakError::ArtifactCollision {
            path: PathBuf::from("/x")
        }
        .is_precondition());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinbakError::Interrupted.exit_code(), 130);
        assert_eq!(BinbakError::config("x").exit_code(), 2);
        assert_eq!(BinbakError::validation("x").exit_code(), 2);
        assert_eq!(BinbakError::LogCaptureDisabled.exit_code(), 1);
        assert_eq!(BinbakError::SizeUnavailable.exit_code(), 1);
    }

    #[test]
    fn test_suggestions() {
        let suggestions = BinbakError::LogCaptureDisabled.suggestions();
        assert!(suggestions.iter().any(|s| s.contains("log_bin")));

        let collision = BinbakError::ArtifactCollision {
            path: PathBuf::from("/media/incr.bkp-x.sql"),
        };
        assert!(collision
            .suggestions()
            .iter()
            .any(|s| s.contains("incr.bkp-x.sql")));

        assert!(BinbakError::Interrupted.suggestions().is_empty());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "gone");
        let error: BinbakError = io_error.into();
        assert!(matches!(error, BinbakError::Io(_)));
    }
}
