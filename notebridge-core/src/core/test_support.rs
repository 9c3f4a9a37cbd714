//! Fixture builders shared by the unit tests: synthetic note blobs and
//! throwaway notes databases laid out like the real store.

use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::Connection;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Offset between a note's row key and its body row key in fixture databases.
const NOTE_DATA_KEY_OFFSET: i64 = 10_000;

pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn put_key(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire_type));
}

fn put_uint(buf: &mut Vec<u8>, field: u32, value: u64) {
    put_key(buf, field, 0);
    put_varint(buf, value);
}

fn put_bytes(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_key(buf, field, 2);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// One attribute run in a synthetic blob.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunFixture {
    length: u64,
    style: Option<i64>,
    weight: u64,
    underline: bool,
    strike: bool,
    link: Option<String>,
    attachment: Option<(String, String)>,
    unknown: Vec<(u32, u64)>,
}

impl RunFixture {
    pub(crate) fn plain(length: u64) -> Self {
        Self { length, ..Self::default() }
    }

    pub(crate) fn style(mut self, style_type: i64) -> Self {
        self.style = Some(style_type);
        self
    }

    pub(crate) fn weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    pub(crate) fn bold(mut self) -> Self {
        self.weight |= 1;
        self
    }

    pub(crate) fn italic(mut self) -> Self {
        self.weight |= 2;
        self
    }

    pub(crate) fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub(crate) fn strike(mut self) -> Self {
        self.strike = true;
        self
    }

    pub(crate) fn link(mut self, url: &str) -> Self {
        self.link = Some(url.to_string());
        self
    }

    pub(crate) fn attachment(mut self, identifier: &str, type_uti: &str) -> Self {
        self.attachment = Some((identifier.to_string(), type_uti.to_string()));
        self
    }

    pub(crate) fn unknown_varint(mut self, field: u32, value: u64) -> Self {
        self.unknown.push((field, value));
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_uint(&mut buf, 1, self.length);
        if let Some(style) = self.style {
            let mut paragraph = Vec::new();
            put_uint(&mut paragraph, 1, style as u64);
            put_bytes(&mut buf, 2, &paragraph);
        }
        if self.weight != 0 {
            put_uint(&mut buf, 5, self.weight);
        }
        if self.underline {
            put_uint(&mut buf, 6, 1);
        }
        if self.strike {
            put_uint(&mut buf, 7, 1);
        }
        if let Some(url) = &self.link {
            put_bytes(&mut buf, 9, url.as_bytes());
        }
        for (field, value) in &self.unknown {
            put_uint(&mut buf, *field, *value);
        }
        if let Some((identifier, type_uti)) = &self.attachment {
            let mut info = Vec::new();
            put_bytes(&mut info, 1, identifier.as_bytes());
            put_bytes(&mut info, 2, type_uti.as_bytes());
            put_bytes(&mut buf, 12, &info);
        }
        buf
    }
}

/// A synthetic note document.
#[derive(Debug, Clone, Default)]
pub(crate) struct NoteBlob {
    text: String,
    runs: Vec<RunFixture>,
    unknown_bytes: Vec<(u32, Vec<u8>)>,
    unknown_varints: Vec<(u32, u64)>,
}

impl NoteBlob {
    pub(crate) fn new(text: &str) -> Self {
        Self { text: text.to_string(), ..Self::default() }
    }

    pub(crate) fn run(mut self, run: RunFixture) -> Self {
        self.runs.push(run);
        self
    }

    pub(crate) fn unknown_bytes(mut self, field: u32, bytes: Vec<u8>) -> Self {
        self.unknown_bytes.push((field, bytes));
        self
    }

    pub(crate) fn unknown_varint(mut self, field: u32, value: u64) -> Self {
        self.unknown_varints.push((field, value));
        self
    }

    /// Encodes the uncompressed document.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut note = Vec::new();
        for (field, value) in &self.unknown_varints {
            put_uint(&mut note, *field, *value);
        }
        put_bytes(&mut note, 2, self.text.as_bytes());
        for run in &self.runs {
            put_bytes(&mut note, 5, &run.encode());
        }
        for (field, bytes) in &self.unknown_bytes {
            put_bytes(&mut note, *field, bytes);
        }

        let mut document = Vec::new();
        put_uint(&mut document, 2, 1);
        put_bytes(&mut document, 3, &note);

        let mut store = Vec::new();
        put_bytes(&mut store, 2, &document);
        store
    }

    pub(crate) fn gzipped(&self) -> Vec<u8> {
        gzip(&self.encode())
    }
}

#[derive(Debug, Clone)]
enum BodyFixture {
    Blob(Vec<u8>),
    Missing,
}

/// One note row in a fixture database.
#[derive(Debug, Clone)]
pub(crate) struct NoteFixture {
    id: i64,
    title: Option<String>,
    folder: Option<i64>,
    body: BodyFixture,
    identifier: Option<String>,
    account: Option<i64>,
    pinned: bool,
    locked: bool,
    deleted: bool,
    modified: f64,
}

impl NoteFixture {
    /// A note whose body repeats its title as plain text.
    pub(crate) fn new(id: i64, title: &str, folder: i64) -> Self {
        Self {
            id,
            title: Some(title.to_string()),
            folder: Some(folder),
            body: BodyFixture::Blob(NoteBlob::new(title).gzipped()),
            identifier: None,
            account: None,
            pinned: false,
            locked: false,
            deleted: false,
            modified: id as f64,
        }
    }

    pub(crate) fn text(mut self, text: &str) -> Self {
        self.body = BodyFixture::Blob(NoteBlob::new(text).gzipped());
        self
    }

    pub(crate) fn blob(mut self, blob: &NoteBlob) -> Self {
        self.body = BodyFixture::Blob(blob.gzipped());
        self
    }

    pub(crate) fn raw_body(mut self, bytes: Vec<u8>) -> Self {
        self.body = BodyFixture::Blob(bytes);
        self
    }

    pub(crate) fn without_body(mut self) -> Self {
        self.body = BodyFixture::Missing;
        self
    }

    pub(crate) fn untitled(mut self) -> Self {
        self.title = None;
        self
    }

    pub(crate) fn folder(mut self, folder: Option<i64>) -> Self {
        self.folder = folder;
        self
    }

    pub(crate) fn identifier(mut self, identifier: &str) -> Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    pub(crate) fn account(mut self, account: i64) -> Self {
        self.account = Some(account);
        self
    }

    pub(crate) fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub(crate) fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub(crate) fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub(crate) fn modified(mut self, core_data_seconds: f64) -> Self {
        self.modified = core_data_seconds;
        self
    }
}

/// A temporary database with the store's table layout.
pub(crate) struct FixtureDb {
    file: NamedTempFile,
    conn: Connection,
}

impl FixtureDb {
    pub(crate) fn new() -> Self {
        let file = NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE ZICCLOUDSYNCINGOBJECT (
                Z_PK INTEGER PRIMARY KEY,
                Z_ENT INTEGER,
                ZTITLE1 VARCHAR,
                ZTITLE2 VARCHAR,
                ZFOLDER INTEGER,
                ZPARENT INTEGER,
                ZNOTEDATA INTEGER,
                ZFOLDERTYPE INTEGER,
                ZIDENTIFIER VARCHAR,
                ZSNIPPET VARCHAR,
                ZISPINNED INTEGER,
                ZISPASSWORDPROTECTED INTEGER,
                ZMARKEDFORDELETION INTEGER,
                ZNEEDSINITIALFETCHFROMCLOUD INTEGER,
                ZSERVERRECORDDATA BLOB,
                ZCREATIONDATE1 TIMESTAMP,
                ZMODIFICATIONDATE1 TIMESTAMP,
                ZACCOUNT4 INTEGER,
                ZNAME VARCHAR
            );
            CREATE TABLE ZICNOTEDATA (
                Z_PK INTEGER PRIMARY KEY,
                ZNOTE INTEGER,
                ZDATA BLOB
            );",
        )
        .unwrap();
        Self { file, conn }
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn add_folder(&self, id: i64, title: &str, parent: Option<i64>) {
        self.add_folder_row(id, title, parent, false, 0);
    }

    pub(crate) fn add_folder_row(
        &self,
        id: i64,
        title: &str,
        parent: Option<i64>,
        deleted: bool,
        folder_type: i64,
    ) {
        self.conn
            .execute(
                "INSERT INTO ZICCLOUDSYNCINGOBJECT
                    (Z_PK, ZTITLE2, ZPARENT, ZMARKEDFORDELETION, ZFOLDERTYPE, ZIDENTIFIER)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, title, parent, deleted, folder_type, format!("folder-{id}")],
            )
            .unwrap();
    }

    pub(crate) fn add_account(&self, id: i64, name: &str) {
        self.conn
            .execute(
                "INSERT INTO ZICCLOUDSYNCINGOBJECT (Z_PK, ZNAME, ZIDENTIFIER) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, format!("account-{id}")],
            )
            .unwrap();
    }

    pub(crate) fn add_note(&self, note: NoteFixture) {
        let data_id = match &note.body {
            BodyFixture::Blob(bytes) => {
                let data_id = note.id + NOTE_DATA_KEY_OFFSET;
                self.conn
                    .execute(
                        "INSERT INTO ZICNOTEDATA (Z_PK, ZNOTE, ZDATA) VALUES (?1, ?2, ?3)",
                        rusqlite::params![data_id, note.id, bytes],
                    )
                    .unwrap();
                Some(data_id)
            }
            BodyFixture::Missing => None,
        };
        self.conn
            .execute(
                "INSERT INTO ZICCLOUDSYNCINGOBJECT
                    (Z_PK, ZTITLE1, ZFOLDER, ZNOTEDATA, ZIDENTIFIER, ZISPINNED,
                     ZISPASSWORDPROTECTED, ZMARKEDFORDELETION, ZMODIFICATIONDATE1,
                     ZCREATIONDATE1, ZACCOUNT4)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10)",
                rusqlite::params![
                    note.id,
                    note.title,
                    note.folder,
                    data_id,
                    note.identifier,
                    note.pinned,
                    note.locked,
                    note.deleted,
                    note.modified,
                    note.account,
                ],
            )
            .unwrap();
    }
}
