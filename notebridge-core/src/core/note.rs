use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::assembler::AssembledContent;

/// Body text reported for a note whose blob could not be decoded.
pub const PLACEHOLDER_BODY: &str = "content unavailable";

/// Title used when neither the stored title nor the body provides one.
pub const UNTITLED: &str = "Untitled";

/// Cloud sync state of a note. Advisory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    #[default]
    Local,
    Synced,
    AwaitingFetch,
}

impl SyncState {
    pub fn from_flags(needs_initial_fetch: bool, has_server_record: bool) -> Self {
        if needs_initial_fetch {
            Self::AwaitingFetch
        } else if has_server_record {
            Self::Synced
        } else {
            Self::Local
        }
    }
}

/// Whether a note's body is available in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyStatus {
    Decoded,
    /// Decoding failed or the body row is missing; a placeholder stands in.
    Unavailable,
    /// Password protected; the body is never read.
    Locked,
}

/// A note in a reconciled snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,
    pub identifier: Option<String>,
    pub title: String,
    pub folder_id: i64,
    pub note_data_id: Option<i64>,
    pub snippet: Option<String>,
    /// Account the note belongs to, if the store records one.
    pub account: Option<String>,
    pub is_pinned: bool,
    pub is_password_protected: bool,
    pub sync_state: SyncState,
    pub body_status: BodyStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Body of a note that is not password protected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum NoteBody {
    Decoded(AssembledContent),
    Unavailable { reason: String },
}

impl NoteBody {
    /// Plain text of the body, or [`PLACEHOLDER_BODY`].
    pub fn text(&self) -> &str {
        match self {
            Self::Decoded(content) => &content.text,
            Self::Unavailable { .. } => PLACEHOLDER_BODY,
        }
    }

    pub fn content(&self) -> Option<&AssembledContent> {
        match self {
            Self::Decoded(content) => Some(content),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn status(&self) -> BodyStatus {
        match self {
            Self::Decoded(_) => BodyStatus::Decoded,
            Self::Unavailable { .. } => BodyStatus::Unavailable,
        }
    }
}
