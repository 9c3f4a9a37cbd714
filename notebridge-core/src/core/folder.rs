//! Folder model.

use serde::{Deserialize, Serialize};

/// Row key of the synthetic folder that adopts detached folders and orphan notes.
///
/// Store row keys start at 1, so 0 never collides with a real folder.
pub const SYNTHETIC_ROOT_ID: i64 = 0;

/// Title shown for the synthetic root.
pub const SYNTHETIC_ROOT_TITLE: &str = "Unfiled";

/// What a folder is for, as recorded by the host application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FolderKind {
    #[default]
    Normal,
    Trash,
    RecentlyDeleted,
    SmartFolder,
}

impl FolderKind {
    /// Maps the stored folder type code; unknown codes are treated as normal folders.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Trash,
            2 => Self::RecentlyDeleted,
            3 => Self::SmartFolder,
            _ => Self::Normal,
        }
    }
}

/// A folder in a reconciled snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: i64,
    pub title: String,
    /// `None` for top-level folders; [`SYNTHETIC_ROOT_ID`] for detached ones.
    pub parent_id: Option<i64>,
    pub kind: FolderKind,
    pub is_deleted: bool,
    /// The stored parent could not be resolved (missing or part of a cycle).
    pub is_detached: bool,
    /// Titles from the top-level ancestor down to this folder, joined with ` / `.
    pub path: String,
    pub depth: usize,
    /// Number of live notes filed directly in this folder.
    pub note_count: usize,
}

impl Folder {
    pub fn is_synthetic_root(&self) -> bool {
        self.id == SYNTHETIC_ROOT_ID
    }
}
