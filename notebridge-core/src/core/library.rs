//! Read-only access to a notes database.

use std::sync::Arc;

use crate::core::cache::SnapshotCache;
use crate::core::config::Config;
use crate::core::folder::Folder;
use crate::core::note::{Note, NoteBody};
use crate::core::snapshot::{SearchScope, Snapshot};
use crate::Result;

/// An open notes database.
///
/// `NoteLibrary` is the entry point for outer layers. Every query runs
/// against the cached [`Snapshot`] and returns owned values, so callers never
/// hold a borrow into the cache. Call [`invalidate`](Self::invalidate) or
/// [`refresh`](Self::refresh) when the host application may have written to
/// the store.
#[derive(Debug)]
pub struct NoteLibrary {
    config: Config,
    cache: SnapshotCache,
}

impl NoteLibrary {
    /// Opens the database named by `config` and builds the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file is missing, locked or does not
    /// look like a notes database.
    pub fn open(config: Config) -> Result<Self> {
        let cache = SnapshotCache::new(&config.database_path);
        let snapshot = cache.get()?;
        log::info!(
            "opened {} ({} folders, {} notes)",
            config.database_path.display(),
            snapshot.folder_count(),
            snapshot.note_count()
        );
        Ok(Self { config, cache })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current snapshot, rebuilt first if it was invalidated.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.cache.get()
    }

    /// Folders in tree order; soft-deleted folders only when asked for.
    pub fn list_folders(&self, include_deleted: bool) -> Result<Vec<Folder>> {
        Ok(self
            .snapshot()?
            .list_folders(include_deleted)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn get_folder_notes(&self, folder_id: i64) -> Result<Vec<Note>> {
        Ok(self
            .snapshot()?
            .list_notes(folder_id)?
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn all_notes(&self) -> Result<Vec<Note>> {
        Ok(self.snapshot()?.all_notes().into_iter().cloned().collect())
    }

    pub fn search_notes(&self, query: &str, scope: SearchScope) -> Result<Vec<Note>> {
        let snapshot = self.snapshot()?;
        let hits: Vec<Note> = snapshot.search(query, scope).into_iter().cloned().collect();
        log::debug!("search {query:?} ({scope:?}) matched {} notes", hits.len());
        Ok(hits)
    }

    pub fn find_note_by_title(&self, title: &str) -> Result<Option<Note>> {
        Ok(self.snapshot()?.find_by_title(title).cloned())
    }

    pub fn get_note(&self, note_id: i64) -> Result<Note> {
        Ok(self.snapshot()?.note(note_id)?.clone())
    }

    /// # Errors
    ///
    /// Returns [`crate::NotebridgeError::Unsupported`] for password-protected
    /// notes and [`crate::NotebridgeError::NotFound`] for unknown ones.
    pub fn get_note_body(&self, note_id: i64) -> Result<NoteBody> {
        Ok(self.snapshot()?.note_body(note_id)?.clone())
    }

    /// The note rendered as text with a title, folder and modified header.
    pub fn read_note(&self, note_id: i64) -> Result<String> {
        self.snapshot()?.render_note(note_id)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Rebuilds the snapshot now. On failure the previous one stays in use
    /// until the next successful rebuild.
    pub fn refresh(&self) -> Result<()> {
        self.cache.refresh().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{FixtureDb, NoteBlob, NoteFixture, RunFixture};
    use crate::{AnnotationKind, BodyStatus, NotebridgeError, StorageError};

    fn library_for(db: &FixtureDb) -> NoteLibrary {
        NoteLibrary::open(Config::new(&db.path().to_string_lossy())).unwrap()
    }

    #[test]
    fn test_open_missing_database() {
        let err = NoteLibrary::open(Config::new("/nowhere/at/all/NoteStore.sqlite")).unwrap_err();
        assert!(matches!(err, NotebridgeError::Storage(StorageError::NotFound(_))));
        assert!(err.is_storage());
    }

    #[test]
    fn test_open_rejects_non_notes_database() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let junk = "not a database, just some text long enough to matter";
        std::fs::write(temp.path(), junk).unwrap();

        let err = NoteLibrary::open(Config::new(&temp.path().to_string_lossy())).unwrap_err();
        assert!(matches!(err, NotebridgeError::Storage(StorageError::SchemaMismatch(_))));
    }

    #[test]
    fn test_browse_folders_and_notes() {
        let db = FixtureDb::new();
        db.add_folder(1, "Notes", None);
        db.add_folder(2, "Travel", Some(1));
        db.add_note(NoteFixture::new(10, "Packing list", 2));

        let library = library_for(&db);
        let folders = library.list_folders(false).unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[1].path, "Notes / Travel");

        let notes = library.get_folder_notes(2).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Packing list");
        assert!(matches!(library.get_folder_notes(99), Err(NotebridgeError::NotFound(_))));
    }

    #[test]
    fn test_formatted_body_round_trips_through_library() {
        let db = FixtureDb::new();
        db.add_folder(1, "Notes", None);
        let blob = NoteBlob::new("Groceries\nmilk and eggs")
            .run(RunFixture::plain(10).style(0))
            .run(RunFixture::plain(4).bold())
            .run(RunFixture::plain(9));
        db.add_note(NoteFixture::new(10, "Groceries", 1).blob(&blob));

        let library = library_for(&db);
        let body = library.get_note_body(10).unwrap();
        let content = body.content().unwrap();
        assert_eq!(content.text, "Groceries\nmilk and eggs");
        let bold = content
            .spans
            .iter()
            .find(|s| s.kind == AnnotationKind::Bold)
            .unwrap();
        assert_eq!(content.span_text(bold), "milk");
    }

    #[test]
    fn test_search_and_read() {
        let db = FixtureDb::new();
        db.add_folder(1, "Notes", None);
        db.add_note(NoteFixture::new(10, "Garden", 1).text("Garden\nplant tomatoes"));

        let library = library_for(&db);
        let hits = library.search_notes("Tomatoes", SearchScope::Both).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 10);
        assert!(library.search_notes("", SearchScope::Both).unwrap().is_empty());

        let text = library.read_note(10).unwrap();
        assert!(text.starts_with("Title: Garden\nFolder: Notes\n"));
        assert!(text.ends_with("plant tomatoes"));
        assert_eq!(library.find_note_by_title("Garden").unwrap().map(|n| n.id), Some(10));
    }

    #[test]
    fn test_locked_note_through_library() {
        let db = FixtureDb::new();
        db.add_folder(1, "Notes", None);
        db.add_note(NoteFixture::new(10, "Diary", 1).locked());

        let library = library_for(&db);
        assert_eq!(library.get_note(10).unwrap().body_status, BodyStatus::Locked);
        let err = library.get_note_body(10).unwrap_err();
        assert!(matches!(err, NotebridgeError::Unsupported(_)));
    }

    #[test]
    fn test_refresh_picks_up_new_notes() {
        let db = FixtureDb::new();
        db.add_folder(1, "Notes", None);
        let library = library_for(&db);
        assert!(library.all_notes().unwrap().is_empty());

        db.add_note(NoteFixture::new(10, "Later", 1));
        assert!(library.all_notes().unwrap().is_empty());

        library.refresh().unwrap();
        assert_eq!(library.all_notes().unwrap().len(), 1);

        db.add_note(NoteFixture::new(11, "Even later", 1));
        library.invalidate();
        assert_eq!(library.all_notes().unwrap().len(), 2);
    }
}
