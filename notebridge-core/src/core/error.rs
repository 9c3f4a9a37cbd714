//! Error types for the Notebridge core library.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Failures raised while opening or reading the notes database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database file does not exist.
    #[error("Notes database not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Another process holds a lock that prevents reading.
    #[error("Notes database is locked: {0}")]
    Locked(String),

    /// The file is not a notes database, or is missing required tables or columns.
    #[error("Unexpected database schema: {0}")]
    SchemaMismatch(String),

    /// The note exists but has no body row.
    #[error("Note {0} has no body data")]
    MissingBody(i64),

    /// Any other SQLite failure.
    #[error("Database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::Locked(e.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::NotADatabase => {
                Self::SchemaMismatch(e.to_string())
            }
            _ => Self::Database(e),
        }
    }
}

/// Failures raised while decoding a single note body blob.
///
/// These never escape the snapshot build: a note whose body fails to decode
/// is kept with a placeholder body instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No gzip header, and the bytes are not a readable note document either.
    #[error("Blob is not compressed and does not contain a note document")]
    NotCompressed,

    /// The gzip stream or a record payload is malformed.
    #[error("Corrupt note stream: {0}")]
    CorruptStream(String),

    /// A record uses a wire type that cannot be skipped.
    #[error("Unknown record tag {field} with wire type {wire_type}")]
    UnknownRecordTag { field: u32, wire_type: u8 },

    /// A record claims more bytes than remain in the buffer.
    #[error("Record truncated at byte {offset}")]
    TruncatedRecord { offset: usize },
}

/// All errors that can occur within the Notebridge core library.
#[derive(Debug, Error)]
pub enum NotebridgeError {
    /// Opening or enumerating the notes database failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A folder or note ID was requested that is not in the current snapshot.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request targets data that is intentionally opaque, such as a locked note body.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The configuration could not be loaded or resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for NotebridgeError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

/// Convenience alias that pins the error type to [`NotebridgeError`].
pub type Result<T> = std::result::Result<T, NotebridgeError>;

impl NotebridgeError {
    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Storage(StorageError::NotFound(path)) => {
                format!("No notes database at {}", path.display())
            }
            Self::Storage(StorageError::Locked(_)) => {
                "The notes database is busy, try again shortly".to_string()
            }
            Self::Storage(StorageError::SchemaMismatch(_)) => {
                "This file does not look like an Apple Notes database".to_string()
            }
            Self::Storage(e) => format!("Could not read notes: {e}"),
            Self::NotFound(what) => format!("{what} no longer exists"),
            Self::Unsupported(msg) => msg.clone(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::Io(e) => format!("File error: {e}"),
            Self::Json(e) => format!("Settings format error: {e}"),
        }
    }

    /// Whether the failure prevented the snapshot from being built at all.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
