// src/error.rs
// Error taxonomy for the output layer

use std::path::PathBuf;
use thiserror::Error;

/// Coarse error category, used by callers to decide how to explain a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PathSecurity,
    Filesystem,
    Backend,
    Cancelled,
    Config,
}

/// Main error type for the output layer
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("invalid mode '{0}': expected one of auto, screen, file")]
    InvalidMode(String),

    #[error("invalid format '{0}': expected one of csv, json")]
    InvalidFormat(String),

    #[error("invalid filename '{name}': {reason}")]
    InvalidFilename { name: String, reason: String },

    #[error("filename '{0}' uses a reserved device name")]
    ReservedFilename(String),

    #[error("invalid output location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("invalid chunk size {0}: must be greater than zero")]
    InvalidChunkSize(usize),

    #[error("query text is empty")]
    EmptyQuery,

    #[error("relative output path '{}' requires a sandbox root, but none is configured", .path.display())]
    NoSandboxRoot { path: PathBuf },

    #[error("output path '{}' is inside the service installation directory '{}'", .path.display(), .install_dir.display())]
    InsideInstallTree { path: PathBuf, install_dir: PathBuf },

    #[error("output path '{}' is outside the sandbox root '{}'", .path.display(), .root.display())]
    OutsideSandbox { path: PathBuf, root: PathBuf },

    #[error("failed to create output directory '{}': {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output directory '{}' is not writable: {source}", .path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed writing '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("query backend error: {0}")]
    Backend(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("output cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Result using OutputError
pub type Result<T> = std::result::Result<T, OutputError>;

impl OutputError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OutputError::InvalidMode(_)
            | OutputError::InvalidFormat(_)
            | OutputError::InvalidFilename { .. }
            | OutputError::ReservedFilename(_)
            | OutputError::InvalidLocation { .. }
            | OutputError::InvalidChunkSize(_)
            | OutputError::EmptyQuery => ErrorKind::Validation,
            OutputError::NoSandboxRoot { .. }
            | OutputError::InsideInstallTree { .. }
            | OutputError::OutsideSandbox { .. } => ErrorKind::PathSecurity,
            OutputError::DirectoryCreation { .. }
            | OutputError::NotWritable { .. }
            | OutputError::Write { .. } => ErrorKind::Filesystem,
            OutputError::Backend(_) | OutputError::Db(_) => ErrorKind::Backend,
            OutputError::Cancelled => ErrorKind::Cancelled,
            OutputError::Config(_) => ErrorKind::Config,
        }
    }

    /// Corrective action to show alongside the error message.
    pub fn hint(&self) -> &'static str {
        match self {
            OutputError::InvalidMode(_) => "Use mode auto, screen or file.",
            OutputError::InvalidFormat(_) => "Use format csv or json.",
            OutputError::InvalidFilename { .. } => {
                "Remove the characters < > : \" | ? * and path separators from the filename."
            }
            OutputError::ReservedFilename(_) => {
                "Pick a filename that is not CON, PRN, AUX, NUL, COM1-9 or LPT1-9."
            }
            OutputError::InvalidLocation { .. } => {
                "Pass a directory as the location and the file name separately."
            }
            OutputError::InvalidChunkSize(_) => "Pass a chunk size of at least 1.",
            OutputError::EmptyQuery => "Provide the query text to run.",
            OutputError::NoSandboxRoot { .. } => {
                "Set QUERY_OUTPUT_CLIENT_ROOT to your project directory or pass an absolute location."
            }
            OutputError::InsideInstallTree { .. } => {
                "Choose an output directory outside the service installation."
            }
            OutputError::OutsideSandbox { .. } => {
                "Choose an output directory inside the configured sandbox root."
            }
            OutputError::DirectoryCreation { .. } => {
                "Check that the parent directory exists and is writable."
            }
            OutputError::NotWritable { .. } => "Fix the directory permissions or pick another location.",
            OutputError::Write { .. } => {
                "Check free disk space and permissions; the partial file was left in place."
            }
            OutputError::Backend(_) | OutputError::Db(_) => "Check the query and the database connection.",
            OutputError::Cancelled => "Re-run the request; the partial file was left in place.",
            OutputError::Config(_) => "Fix the QUERY_OUTPUT_* environment settings.",
        }
    }

    /// Message plus corrective hint, for tool boundaries.
    pub fn to_user_string(&self) -> String {
        format!("{} ({})", self, self.hint())
    }
}
