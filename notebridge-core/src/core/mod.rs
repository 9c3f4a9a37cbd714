//! Internal domain modules for the notebridge core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod folder;
pub mod library;
pub mod note;
pub mod snapshot;
pub mod storage;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_support;

#[doc(inline)]
pub use assembler::{assemble, AssembledContent, Paragraph};
#[doc(inline)]
pub use cache::SnapshotCache;
#[doc(inline)]
pub use config::{default_database_path, Config, DB_PATH_ENV};
#[doc(inline)]
pub use decoder::{decode, Annotation, AnnotationKind, DecodedBody, ParagraphStyle, TextRun};
#[doc(inline)]
pub use error::{DecodeError, NotebridgeError, Result, StorageError};
#[doc(inline)]
pub use folder::{Folder, FolderKind, SYNTHETIC_ROOT_ID, SYNTHETIC_ROOT_TITLE};
#[doc(inline)]
pub use library::NoteLibrary;
#[doc(inline)]
pub use note::{BodyStatus, Note, NoteBody, SyncState, PLACEHOLDER_BODY, UNTITLED};
#[doc(inline)]
pub use snapshot::{SearchScope, Snapshot};
#[doc(inline)]
pub use storage::{FolderRow, NoteRow, Storage};
