//! Read-only access to the Apple Notes SQLite store.
//!
//! Folders and notes share the `ZICCLOUDSYNCINGOBJECT` table; note bodies live
//! in `ZICNOTEDATA`. Columns are selected by name, and optional columns that a
//! given schema version lacks are replaced by a default, so unknown or missing
//! extras never cause a failure.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, StorageError};

/// Seconds between the Unix epoch and the Core Data reference date (2001-01-01).
const CORE_DATA_EPOCH_OFFSET: i64 = 978_307_200;

/// How long to wait on a writer's lock before reporting [`StorageError::Locked`].
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

const OBJECT_TABLE: &str = "ZICCLOUDSYNCINGOBJECT";
const NOTE_DATA_TABLE: &str = "ZICNOTEDATA";

const REQUIRED_OBJECT_COLUMNS: &[&str] = &["Z_PK", "ZTITLE1", "ZTITLE2", "ZFOLDER", "ZNOTEDATA"];
const REQUIRED_NOTE_DATA_COLUMNS: &[&str] = &["Z_PK", "ZDATA"];

/// Raw folder row, copied out of storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderRow {
    pub id: i64,
    pub title: String,
    pub parent_id: Option<i64>,
    pub marked_for_deletion: bool,
    pub folder_type: i64,
    pub identifier: Option<String>,
}

/// Raw note row, copied out of storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub id: i64,
    pub title: Option<String>,
    pub folder_id: Option<i64>,
    pub note_data_id: Option<i64>,
    pub identifier: Option<String>,
    pub snippet: Option<String>,
    /// Name of the account the note belongs to, when the store records one.
    pub account: Option<String>,
    pub is_pinned: bool,
    pub is_password_protected: bool,
    pub marked_for_deletion: bool,
    pub needs_initial_fetch: bool,
    pub has_server_record: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// An open, read-only handle on a notes database.
pub struct Storage {
    conn: Connection,
    path: PathBuf,
    object_columns: HashSet<String>,
}

impl Storage {
    /// Opens the database at `path` without ever writing to it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist,
    /// [`StorageError::Locked`] if another process holds an exclusive lock,
    /// and [`StorageError::SchemaMismatch`] if the file is not a notes store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::NotFound(path.to_path_buf()).into());
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Validate database structure
        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type='table'
             AND name IN (?1, ?2)",
            [OBJECT_TABLE, NOTE_DATA_TABLE],
            |row| row.get(0),
        )?;
        if table_count != 2 {
            return Err(StorageError::SchemaMismatch(format!(
                "missing {OBJECT_TABLE} or {NOTE_DATA_TABLE} table"
            ))
            .into());
        }

        let object_columns = table_columns(&conn, OBJECT_TABLE)?;
        require_columns(OBJECT_TABLE, &object_columns, REQUIRED_OBJECT_COLUMNS)?;
        let data_columns = table_columns(&conn, NOTE_DATA_TABLE)?;
        require_columns(NOTE_DATA_TABLE, &data_columns, REQUIRED_NOTE_DATA_COLUMNS)?;

        log::debug!(
            "opened notes database {} ({} object columns)",
            path.display(),
            object_columns.len()
        );

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            object_columns,
        })
    }

    /// Path the handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns every folder row, including soft-deleted ones, ordered by row key.
    pub fn list_folders(&self) -> Result<Vec<FolderRow>> {
        let sql = format!(
            "SELECT Z_PK, ZTITLE2, {parent}, {deleted}, {folder_type}, {identifier}
             FROM {OBJECT_TABLE}
             WHERE ZTITLE2 IS NOT NULL
             ORDER BY Z_PK",
            parent = self.column_or("ZPARENT", "NULL"),
            deleted = self.column_or("ZMARKEDFORDELETION", "0"),
            folder_type = self.column_or("ZFOLDERTYPE", "0"),
            identifier = self.column_or("ZIDENTIFIER", "NULL"),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FolderRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    parent_id: row.get(2)?,
                    marked_for_deletion: flag(row.get(3)?),
                    folder_type: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                    identifier: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Returns every note row, including soft-deleted ones, ordered by row key.
    pub fn list_notes(&self) -> Result<Vec<NoteRow>> {
        let sql = format!(
            "SELECT Z_PK, ZTITLE1, ZFOLDER, ZNOTEDATA, {identifier}, {snippet},
                    {pinned}, {locked}, {deleted}, {fetch}, {server},
                    {created}, {modified}, {account}
             FROM {OBJECT_TABLE}
             WHERE ZTITLE2 IS NULL
               AND (ZNOTEDATA IS NOT NULL OR (ZTITLE1 IS NOT NULL AND ZFOLDER IS NOT NULL))
             ORDER BY Z_PK",
            identifier = self.column_or("ZIDENTIFIER", "NULL"),
            snippet = self.column_or("ZSNIPPET", "NULL"),
            pinned = self.column_or("ZISPINNED", "0"),
            locked = self.column_or("ZISPASSWORDPROTECTED", "0"),
            deleted = self.column_or("ZMARKEDFORDELETION", "0"),
            fetch = self.column_or("ZNEEDSINITIALFETCHFROMCLOUD", "0"),
            server = self.column_or_expr("ZSERVERRECORDDATA", "ZSERVERRECORDDATA IS NOT NULL", "0"),
            created = self.column_or("ZCREATIONDATE1", "NULL"),
            modified = self.column_or("ZMODIFICATIONDATE1", "NULL"),
            account = self.account_name_expr(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(NoteRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    folder_id: row.get(2)?,
                    note_data_id: row.get(3)?,
                    identifier: row.get(4)?,
                    snippet: row.get(5)?,
                    is_pinned: flag(row.get(6)?),
                    is_password_protected: flag(row.get(7)?),
                    marked_for_deletion: flag(row.get(8)?),
                    needs_initial_fetch: flag(row.get(9)?),
                    has_server_record: flag(row.get(10)?),
                    created_at: row.get::<_, Option<f64>>(11)?.and_then(core_data_time),
                    modified_at: row.get::<_, Option<f64>>(12)?.and_then(core_data_time),
                    account: row.get(13)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Returns the raw (usually gzip-compressed) body blob of a note.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingBody`] if the note has no body row or the
    /// row holds no data.
    pub fn read_body(&self, note_id: i64) -> Result<Vec<u8>> {
        let data: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                &format!(
                    "SELECT d.ZDATA
                     FROM {OBJECT_TABLE} AS n
                     JOIN {NOTE_DATA_TABLE} AS d ON n.ZNOTEDATA = d.Z_PK
                     WHERE n.Z_PK = ?1"
                ),
                [note_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(Some(bytes)) => Ok(bytes),
            _ => Err(StorageError::MissingBody(note_id).into()),
        }
    }

    /// Accounts are rows of the same table, referenced from a note's `ZACCOUNT4`.
    fn account_name_expr(&self) -> String {
        if self.has_column("ZACCOUNT4") && self.has_column("ZNAME") {
            format!(
                "(SELECT acc.ZNAME FROM {OBJECT_TABLE} AS acc
                  WHERE acc.Z_PK = {OBJECT_TABLE}.ZACCOUNT4)"
            )
        } else {
            "NULL".to_string()
        }
    }

    fn has_column(&self, name: &str) -> bool {
        self.object_columns.contains(name)
    }

    fn column_or(&self, name: &str, default: &str) -> String {
        self.column_or_expr(name, name, default)
    }

    fn column_or_expr(&self, name: &str, expr: &str, default: &str) -> String {
        if self.has_column(name) {
            expr.to_string()
        } else {
            default.to_string()
        }
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .map(|name| name.map(|n| n.to_ascii_uppercase()))
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(names)
}

fn require_columns(table: &str, present: &HashSet<String>, required: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !present.contains(*c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StorageError::SchemaMismatch(format!(
            "{table} is missing column(s): {}",
            missing.join(", ")
        ))
        .into())
    }
}

fn flag(value: Option<i64>) -> bool {
    value == Some(1)
}

/// Converts Core Data seconds-since-2001 into a UTC timestamp.
pub(crate) fn core_data_time(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    let unix_seconds = (whole as i64).checked_add(CORE_DATA_EPOCH_OFFSET)?;
    DateTime::from_timestamp(unix_seconds, nanos)
}
