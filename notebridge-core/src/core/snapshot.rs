//! Immutable, reconciled view of the folder tree and notes.
//!
//! A [`Snapshot`] is built in one synchronous pass over the storage rows and
//! never changes afterwards. Everything it needs is copied out of the rows:
//! the folder tree is an arena indexed by row key, notes are kept in recency
//! order, and each note carries a lowercase search entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::assembler::assemble;
use crate::core::decoder::decode;
use crate::core::folder::{Folder, FolderKind, SYNTHETIC_ROOT_ID, SYNTHETIC_ROOT_TITLE};
use crate::core::note::{BodyStatus, Note, NoteBody, SyncState, UNTITLED};
use crate::core::storage::{FolderRow, NoteRow, Storage};
use crate::{NotebridgeError, Result};

const PATH_SEPARATOR: &str = " / ";

/// Which note fields a search looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchScope {
    Title,
    Content,
    #[default]
    Both,
}

impl SearchScope {
    fn includes_title(self) -> bool {
        matches!(self, Self::Title | Self::Both)
    }

    fn includes_content(self) -> bool {
        matches!(self, Self::Content | Self::Both)
    }
}

#[derive(Debug)]
struct SearchEntry {
    title: String,
    /// `None` when the body text is unknown (locked or undecodable).
    content: Option<String>,
    /// Notes filed in a soft-deleted folder are not searchable.
    searchable: bool,
}

#[derive(Debug)]
struct FolderDraft {
    row: FolderRow,
    parent: Option<i64>,
    detached: bool,
}

/// A point-in-time reconciliation of all folders and notes.
#[derive(Debug)]
pub struct Snapshot {
    built_at: DateTime<Utc>,
    folders: Vec<Folder>,
    folder_index: HashMap<i64, usize>,
    notes: Vec<Note>,
    note_index: HashMap<i64, usize>,
    bodies: Vec<Option<NoteBody>>,
    folder_notes: HashMap<i64, Vec<usize>>,
    search_index: Vec<SearchEntry>,
}

impl Snapshot {
    /// Reads every folder and note from `storage` and reconciles them.
    ///
    /// # Errors
    ///
    /// Only failures while enumerating folders or notes are returned. A note
    /// whose body cannot be read or decoded is kept with a placeholder body.
    pub fn build(storage: &Storage) -> Result<Self> {
        let folder_rows = storage.list_folders()?;
        let note_rows = storage.list_notes()?;
        let snapshot = Self::from_rows(folder_rows, note_rows, |id| storage.read_body(id));
        log::info!(
            "built snapshot of {}: {} folders, {} notes",
            storage.path().display(),
            snapshot.folders.len(),
            snapshot.notes.len()
        );
        Ok(snapshot)
    }

    /// Reconciles raw rows, fetching note bodies through `load_body`.
    ///
    /// `load_body` is never called for password-protected notes.
    pub fn from_rows<F>(
        folder_rows: Vec<FolderRow>,
        note_rows: Vec<NoteRow>,
        mut load_body: F,
    ) -> Self
    where
        F: FnMut(i64) -> Result<Vec<u8>>,
    {
        let drafts = resolve_parents(folder_rows);

        let mut entries: Vec<(Note, Option<NoteBody>)> = select_live_notes(note_rows)
            .into_iter()
            .map(|row| {
                let folder_id = match row.folder_id {
                    Some(id) if drafts.contains_key(&id) => id,
                    other => {
                        log::warn!(
                            "note {} references unknown folder {:?}; filing under {}",
                            row.id,
                            other,
                            SYNTHETIC_ROOT_TITLE
                        );
                        SYNTHETIC_ROOT_ID
                    }
                };
                let body = if row.is_password_protected {
                    None
                } else {
                    Some(read_note_body(&row, &mut load_body))
                };
                (make_note(row, folder_id, body.as_ref()), body)
            })
            .collect();
        entries.sort_by(|(a, _), (b, _)| recency_order(a, b));

        let mut notes = Vec::with_capacity(entries.len());
        let mut bodies = Vec::with_capacity(entries.len());
        let mut note_index = HashMap::with_capacity(entries.len());
        let mut folder_notes: HashMap<i64, Vec<usize>> = HashMap::new();
        for (idx, (note, body)) in entries.into_iter().enumerate() {
            note_index.insert(note.id, idx);
            folder_notes.entry(note.folder_id).or_default().push(idx);
            notes.push(note);
            bodies.push(body);
        }

        let folders = build_tree(&drafts, &folder_notes);
        let folder_index: HashMap<i64, usize> = folders
            .iter()
            .enumerate()
            .map(|(idx, folder)| (folder.id, idx))
            .collect();

        let search_index = notes
            .iter()
            .zip(&bodies)
            .map(|(note, body)| SearchEntry {
                title: note.title.to_lowercase(),
                content: body
                    .as_ref()
                    .and_then(NoteBody::content)
                    .map(|content| content.text.to_lowercase()),
                searchable: folder_index
                    .get(&note.folder_id)
                    .map_or(true, |idx| !folders[*idx].is_deleted),
            })
            .collect();

        Self {
            built_at: Utc::now(),
            folders,
            folder_index,
            notes,
            note_index,
            bodies,
            folder_notes,
            search_index,
        }
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Folders in tree order: top-level folders by title, each followed by its
    /// descendants, then the synthetic root and whatever it adopted.
    ///
    /// Soft-deleted folders are skipped unless `include_deleted` is set.
    pub fn list_folders(&self, include_deleted: bool) -> Vec<&Folder> {
        self.folders
            .iter()
            .filter(|folder| include_deleted || !folder.is_deleted)
            .collect()
    }

    /// Looks up a folder by row key, including soft-deleted folders.
    pub fn folder(&self, folder_id: i64) -> Result<&Folder> {
        self.folder_index
            .get(&folder_id)
            .map(|idx| &self.folders[*idx])
            .ok_or_else(|| NotebridgeError::NotFound(format!("Folder {folder_id}")))
    }

    /// Notes filed in `folder_id`, most recently modified first.
    ///
    /// # Errors
    ///
    /// Returns [`NotebridgeError::NotFound`] if the folder is not in the snapshot.
    pub fn list_notes(&self, folder_id: i64) -> Result<Vec<&Note>> {
        self.folder(folder_id)?;
        Ok(self
            .folder_notes
            .get(&folder_id)
            .map(|indexes| indexes.iter().map(|idx| &self.notes[*idx]).collect())
            .unwrap_or_default())
    }

    /// Every note outside soft-deleted folders, most recently modified first.
    pub fn all_notes(&self) -> Vec<&Note> {
        self.notes
            .iter()
            .zip(&self.search_index)
            .filter(|(_, entry)| entry.searchable)
            .map(|(note, _)| note)
            .collect()
    }

    pub fn note(&self, note_id: i64) -> Result<&Note> {
        self.note_index
            .get(&note_id)
            .map(|idx| &self.notes[*idx])
            .ok_or_else(|| NotebridgeError::NotFound(format!("Note {note_id}")))
    }

    /// Returns the decoded body, or the placeholder for an undecodable one.
    ///
    /// # Errors
    ///
    /// Returns [`NotebridgeError::NotFound`] for an unknown note and
    /// [`NotebridgeError::Unsupported`] for a password-protected note.
    pub fn note_body(&self, note_id: i64) -> Result<&NoteBody> {
        let idx = *self
            .note_index
            .get(&note_id)
            .ok_or_else(|| NotebridgeError::NotFound(format!("Note {note_id}")))?;
        self.bodies[idx].as_ref().ok_or_else(|| {
            NotebridgeError::Unsupported(format!(
                "Note {note_id} is password protected; its content cannot be read"
            ))
        })
    }

    /// The most recently modified searchable note with exactly this title.
    pub fn find_by_title(&self, title: &str) -> Option<&Note> {
        self.all_notes().into_iter().find(|note| note.title == title)
    }

    /// Case-insensitive search over titles and/or body text.
    ///
    /// Every whitespace-separated token of `query` must occur in the field.
    /// Title matches rank above content-only matches; within a rank, more
    /// recently modified notes come first. Notes with unknown body text never
    /// match on content.
    pub fn search(&self, query: &str, scope: SearchScope) -> Vec<&Note> {
        let tokens: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(u8, usize)> = self
            .search_index
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.searchable)
            .filter_map(|(idx, entry)| {
                if scope.includes_title() && contains_all(&entry.title, &tokens) {
                    Some((2, idx))
                } else if scope.includes_content()
                    && entry
                        .content
                        .as_deref()
                        .is_some_and(|content| contains_all(content, &tokens))
                {
                    Some((1, idx))
                } else {
                    None
                }
            })
            .collect();
        // notes are already in recency order and sort_by is stable
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.into_iter().map(|(_, idx)| &self.notes[idx]).collect()
    }

    /// Renders a note as a short text document with a metadata header.
    pub fn render_note(&self, note_id: i64) -> Result<String> {
        let note = self.note(note_id)?;
        let body = self.note_body(note_id)?;
        let folder = self
            .folder(note.folder_id)
            .map(|f| f.path.as_str())
            .unwrap_or(SYNTHETIC_ROOT_TITLE);
        let modified = note
            .modified_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(format!(
            "Title: {}\nFolder: {}\nModified: {}\n\n{}",
            note.title,
            folder,
            modified,
            body.text()
        ))
    }
}

fn contains_all(haystack: &str, tokens: &[String]) -> bool {
    tokens.iter().all(|token| haystack.contains(token.as_str()))
}

/// Newest first; undated notes last; row key breaks ties.
fn recency_order(a: &Note, b: &Note) -> Ordering {
    b.modified_at.cmp(&a.modified_at).then(a.id.cmp(&b.id))
}

/// Resolves folder parents, detaching folders whose parent is missing or
/// whose ancestry loops back on itself.
fn resolve_parents(rows: Vec<FolderRow>) -> BTreeMap<i64, FolderDraft> {
    let mut drafts = BTreeMap::new();
    for row in rows {
        if row.id == SYNTHETIC_ROOT_ID {
            log::warn!("skipping folder with reserved row key {SYNTHETIC_ROOT_ID}");
            continue;
        }
        drafts.insert(row.id, FolderDraft { parent: row.parent_id, detached: false, row });
    }

    let ids: Vec<i64> = drafts.keys().copied().collect();
    for id in &ids {
        let dangling = drafts
            .get(id)
            .and_then(|d| d.parent)
            .is_some_and(|parent| !drafts.contains_key(&parent));
        if dangling {
            detach(&mut drafts, *id, "parent folder does not exist");
        }
    }
    // Walking in key order detaches the lowest key of each cycle, which is
    // enough to break it for every other member.
    for id in &ids {
        if loops_back(&drafts, *id) {
            detach(&mut drafts, *id, "parent chain forms a cycle");
        }
    }
    drafts
}

fn detach(drafts: &mut BTreeMap<i64, FolderDraft>, id: i64, reason: &str) {
    if let Some(draft) = drafts.get_mut(&id) {
        log::warn!(
            "detaching folder {} ({:?}): {reason}",
            id,
            draft.row.title
        );
        draft.parent = Some(SYNTHETIC_ROOT_ID);
        draft.detached = true;
    }
}

fn loops_back(drafts: &BTreeMap<i64, FolderDraft>, start: i64) -> bool {
    let mut seen = HashSet::new();
    let mut current = drafts.get(&start).and_then(|d| d.parent);
    while let Some(parent) = current {
        if parent == start {
            return true;
        }
        if !seen.insert(parent) {
            return false;
        }
        current = drafts.get(&parent).and_then(|d| d.parent);
    }
    false
}

/// Drops soft-deleted notes and collapses rows sharing an identifier,
/// keeping the most recently modified one.
fn select_live_notes(rows: Vec<NoteRow>) -> Vec<NoteRow> {
    let mut live: Vec<NoteRow> = Vec::with_capacity(rows.len());
    let mut by_identifier: HashMap<String, usize> = HashMap::new();
    for row in rows.into_iter().filter(|row| !row.marked_for_deletion) {
        let Some(identifier) = row.identifier.clone() else {
            live.push(row);
            continue;
        };
        match by_identifier.get(&identifier) {
            Some(&existing) => {
                let current = &live[existing];
                log::warn!(
                    "notes {} and {} share identifier {identifier}; keeping the newer",
                    current.id,
                    row.id
                );
                if (row.modified_at, row.id) > (current.modified_at, current.id) {
                    live[existing] = row;
                }
            }
            None => {
                by_identifier.insert(identifier, live.len());
                live.push(row);
            }
        }
    }
    live
}

fn read_note_body<F>(row: &NoteRow, load_body: &mut F) -> NoteBody
where
    F: FnMut(i64) -> Result<Vec<u8>>,
{
    let reason = match load_body(row.id) {
        Ok(bytes) => match decode(&bytes) {
            Ok(body) => return NoteBody::Decoded(assemble(&body)),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };
    log::warn!("note {} body unavailable: {reason}", row.id);
    NoteBody::Unavailable { reason }
}

fn make_note(row: NoteRow, folder_id: i64, body: Option<&NoteBody>) -> Note {
    let content = body.and_then(NoteBody::content);
    let title = row
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| content.and_then(|c| c.title()))
        .unwrap_or_else(|| UNTITLED.to_string());
    let snippet = row
        .snippet
        .filter(|s| !s.trim().is_empty())
        .or_else(|| content.and_then(|c| c.snippet()));
    let body_status = body.map_or(BodyStatus::Locked, NoteBody::status);

    Note {
        id: row.id,
        identifier: row.identifier,
        title,
        folder_id,
        note_data_id: row.note_data_id,
        snippet,
        account: row.account,
        is_pinned: row.is_pinned,
        is_password_protected: row.is_password_protected,
        sync_state: SyncState::from_flags(row.needs_initial_fetch, row.has_server_record),
        body_status,
        created_at: row.created_at,
        modified_at: row.modified_at,
    }
}

struct TreeBuilder<'a> {
    drafts: &'a BTreeMap<i64, FolderDraft>,
    children: HashMap<Option<i64>, Vec<i64>>,
    folder_notes: &'a HashMap<i64, Vec<usize>>,
    out: Vec<Folder>,
}

impl TreeBuilder<'_> {
    fn push_subtree(&mut self, id: i64, depth: usize, parent_path: Option<&str>) {
        let Some(draft) = self.drafts.get(&id) else {
            return;
        };
        let path = match parent_path {
            Some(parent) => format!("{parent}{PATH_SEPARATOR}{}", draft.row.title),
            None => draft.row.title.clone(),
        };
        self.out.push(Folder {
            id,
            title: draft.row.title.clone(),
            parent_id: draft.parent,
            kind: FolderKind::from_code(draft.row.folder_type),
            is_deleted: draft.row.marked_for_deletion,
            is_detached: draft.detached,
            path: path.clone(),
            depth,
            note_count: self.folder_notes.get(&id).map_or(0, Vec::len),
        });
        let children = self.children.get(&Some(id)).cloned().unwrap_or_default();
        for child in children {
            self.push_subtree(child, depth + 1, Some(&path));
        }
    }
}

fn build_tree(
    drafts: &BTreeMap<i64, FolderDraft>,
    folder_notes: &HashMap<i64, Vec<usize>>,
) -> Vec<Folder> {
    let mut children: HashMap<Option<i64>, Vec<i64>> = HashMap::new();
    for draft in drafts.values() {
        children.entry(draft.parent).or_default().push(draft.row.id);
    }
    for ids in children.values_mut() {
        ids.sort_by(|a, b| {
            let title = |id: &i64| drafts.get(id).map(|d| d.row.title.to_lowercase());
            title(a).cmp(&title(b)).then(a.cmp(b))
        });
    }

    let needs_root = children.contains_key(&Some(SYNTHETIC_ROOT_ID))
        || folder_notes.contains_key(&SYNTHETIC_ROOT_ID);
    let roots = children.get(&None).cloned().unwrap_or_default();
    let adopted = children.get(&Some(SYNTHETIC_ROOT_ID)).cloned().unwrap_or_default();

    let mut builder = TreeBuilder {
        drafts,
        children,
        folder_notes,
        out: Vec::with_capacity(drafts.len() + 1),
    };
    for id in roots {
        builder.push_subtree(id, 0, None);
    }
    if needs_root {
        builder.out.push(Folder {
            id: SYNTHETIC_ROOT_ID,
            title: SYNTHETIC_ROOT_TITLE.to_string(),
            parent_id: None,
            kind: FolderKind::Normal,
            is_deleted: false,
            is_detached: false,
            path: SYNTHETIC_ROOT_TITLE.to_string(),
            depth: 0,
            note_count: folder_notes.get(&SYNTHETIC_ROOT_ID).map_or(0, Vec::len),
        });
        for id in adopted {
            builder.push_subtree(id, 1, Some(SYNTHETIC_ROOT_TITLE));
        }
    }
    builder.out
}
