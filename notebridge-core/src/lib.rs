//! Core library for notebridge: read-only access to the Apple Notes store.
//!
//! The primary entry point is [`NoteLibrary`], which opens a `NoteStore.sqlite`
//! file and answers folder, note and search queries from a cached
//! [`Snapshot`]. Nothing in this crate ever writes to the store.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    assembler::{assemble, attachment_kind, attachment_placeholder, AssembledContent, Paragraph},
    cache::SnapshotCache,
    config::{default_database_path, Config, DB_PATH_ENV},
    decoder::{decode, Annotation, AnnotationKind, DecodedBody, ParagraphStyle, TextRun},
    error::{DecodeError, NotebridgeError, Result, StorageError},
    folder::{Folder, FolderKind, SYNTHETIC_ROOT_ID, SYNTHETIC_ROOT_TITLE},
    library::NoteLibrary,
    note::{BodyStatus, Note, NoteBody, SyncState, PLACEHOLDER_BODY, UNTITLED},
    snapshot::{SearchScope, Snapshot},
    storage::{FolderRow, NoteRow, Storage},
};
