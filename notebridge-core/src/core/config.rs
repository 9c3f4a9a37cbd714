//! Location of the notes database.
//!
//! The core recognises exactly one setting: the path to `NoteStore.sqlite`.
//! It can be passed explicitly, read from a JSON settings file, taken from the
//! `NOTEBRIDGE_DB_PATH` environment variable, or left empty to use the
//! platform default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{NotebridgeError, Result};

/// Environment variable consulted by [`Config::from_env`].
pub const DB_PATH_ENV: &str = "NOTEBRIDGE_DB_PATH";

/// Where the host application keeps its store, relative to the home directory.
const DEFAULT_RELATIVE_PATH: &str =
    "Library/Group Containers/group.com.apple.notes/NoteStore.sqlite";

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the notes database file.
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Config {
    /// Builds a config from a user-supplied path.
    ///
    /// A leading `~` is expanded to the home directory; an empty or
    /// whitespace-only string selects [`default_database_path`].
    pub fn new(path: &str) -> Self {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        Self {
            database_path: expand_home(trimmed),
        }
    }

    /// Reads `NOTEBRIDGE_DB_PATH`, falling back to the default location.
    pub fn from_env() -> Self {
        match std::env::var(DB_PATH_ENV) {
            Ok(value) => Self::new(&value),
            Err(_) => Self::default(),
        }
    }

    /// Loads a JSON settings file of the form `{"databasePath": "..."}`.
    ///
    /// # Errors
    ///
    /// Returns [`NotebridgeError::Io`] if the file cannot be read and
    /// [`NotebridgeError::Json`] if it is not valid JSON for this shape.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let raw: Self = serde_json::from_str(&content)?;
        let as_str = raw.database_path.to_str().ok_or_else(|| {
            NotebridgeError::Config(format!(
                "database path in {} is not valid UTF-8",
                path.display()
            ))
        })?;
        Ok(Self::new(as_str))
    }
}

/// Returns the host application's default store location under the home directory.
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_RELATIVE_PATH)
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}
