//! Decoding of note body blobs into styled text runs.
//!
//! A blob is a gzip stream wrapping a nested record document:
//!
//! ```text
//! NoteStore { 2: Document { 2: version, 3: Note { 2: text, 5: [AttributeRun] } } }
//! AttributeRun { 1: length, 2: ParagraphStyle { 1: style_type }, 5: font_weight,
//!                6: underlined, 7: strikethrough, 9: link,
//!                12: AttachmentInfo { 1: identifier, 2: type_uti } }
//! ```
//!
//! Each message is parsed by matching on the known tags and skipping
//! everything else, so records added by newer OS versions pass through
//! unharmed. Run lengths count Unicode scalar values.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::core::wire::{WireReader, WireType};
use crate::DecodeError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// NoteStore
const NOTE_STORE_DOCUMENT: u32 = 2;
// Document
const DOCUMENT_NOTE: u32 = 3;
// Note
const NOTE_TEXT: u32 = 2;
const NOTE_ATTRIBUTE_RUN: u32 = 5;
// AttributeRun
const RUN_LENGTH: u32 = 1;
const RUN_PARAGRAPH_STYLE: u32 = 2;
const RUN_FONT_WEIGHT: u32 = 5;
const RUN_UNDERLINED: u32 = 6;
const RUN_STRIKETHROUGH: u32 = 7;
const RUN_LINK: u32 = 9;
const RUN_ATTACHMENT_INFO: u32 = 12;
// ParagraphStyle
const PARAGRAPH_STYLE_TYPE: u32 = 1;
// AttachmentInfo
const ATTACHMENT_IDENTIFIER: u32 = 1;
const ATTACHMENT_TYPE_UTI: u32 = 2;

/// Inline formatting or reference carried by a span of text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnnotationKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Link { url: String },
    #[serde(rename_all = "camelCase")]
    Attachment {
        identifier: String,
        type_uti: Option<String>,
    },
}

/// A span over a run's text, in Unicode scalar values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub start: usize,
    pub length: usize,
}

/// Block-level style of the paragraph a run belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParagraphStyle {
    #[default]
    Body,
    Title,
    Heading,
    Subheading,
    Monospaced,
    Bulleted,
    Dashed,
    Numbered,
    /// Checklist line; item completion state is not read.
    Checklist,
}

impl ParagraphStyle {
    fn from_style_type(style_type: i64) -> Self {
        match style_type {
            0 => Self::Title,
            1 => Self::Heading,
            2 => Self::Subheading,
            4 => Self::Monospaced,
            100 => Self::Bulleted,
            101 => Self::Dashed,
            102 => Self::Numbered,
            103 => Self::Checklist,
            _ => Self::Body,
        }
    }
}

/// A contiguous piece of note text sharing one set of attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub paragraph: ParagraphStyle,
    pub annotations: Vec<Annotation>,
}

impl TextRun {
    /// Length of the run's text in Unicode scalar values.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// The decoded content of one note blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBody {
    pub runs: Vec<TextRun>,
}

impl DecodedBody {
    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.text.is_empty())
    }

    /// Concatenated run text, without placeholder substitution.
    pub fn raw_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

#[derive(Debug, Default)]
struct RawNote {
    text: String,
    runs: Vec<RawAttributeRun>,
}

#[derive(Debug, Default)]
struct RawAttributeRun {
    length: u64,
    paragraph: Option<i64>,
    font_weight: u64,
    underlined: bool,
    strikethrough: bool,
    link: Option<String>,
    attachment: Option<(String, Option<String>)>,
}

impl RawAttributeRun {
    /// Maps the stored attribute fields onto annotation kinds.
    fn kinds(&self) -> Vec<AnnotationKind> {
        let mut kinds = Vec::new();
        match self.font_weight {
            1 => kinds.push(AnnotationKind::Bold),
            2 => kinds.push(AnnotationKind::Italic),
            3 => {
                kinds.push(AnnotationKind::Bold);
                kinds.push(AnnotationKind::Italic);
            }
            _ => {}
        }
        if self.underlined {
            kinds.push(AnnotationKind::Underline);
        }
        if self.strikethrough {
            kinds.push(AnnotationKind::Strikethrough);
        }
        if let Some(url) = &self.link {
            kinds.push(AnnotationKind::Link { url: url.clone() });
        }
        if let Some((identifier, type_uti)) = &self.attachment {
            kinds.push(AnnotationKind::Attachment {
                identifier: identifier.clone(),
                type_uti: type_uti.clone(),
            });
        }
        kinds
    }
}

/// Decodes a raw note blob.
///
/// Blobs starting with the gzip magic are inflated first; anything else is
/// parsed as an already-inflated document. An empty blob is an empty body.
///
/// # Errors
///
/// Returns [`DecodeError::CorruptStream`] for a damaged gzip stream or record,
/// [`DecodeError::TruncatedRecord`] when a record runs past its container,
/// [`DecodeError::UnknownRecordTag`] for a wire type that cannot be skipped,
/// and [`DecodeError::NotCompressed`] when an uncompressed blob does not hold
/// a note document.
pub fn decode(raw: &[u8]) -> Result<DecodedBody, DecodeError> {
    if raw.is_empty() {
        return Ok(DecodedBody::default());
    }

    let note = if raw.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(raw)
            .read_to_end(&mut inflated)
            .map_err(|e| DecodeError::CorruptStream(e.to_string()))?;
        parse_note_store(&inflated)?
    } else {
        let note = parse_note_store(raw)
            .ok()
            .flatten()
            .ok_or(DecodeError::NotCompressed)?;
        Some(note)
    };

    Ok(match note {
        Some(note) => build_body(note),
        None => DecodedBody::default(),
    })
}

fn parse_note_store(buf: &[u8]) -> Result<Option<RawNote>, DecodeError> {
    let mut reader = WireReader::new(buf);
    let mut note = None;
    while let Some((field, wire_type)) = reader.next_key()? {
        match (field, wire_type) {
            (NOTE_STORE_DOCUMENT, WireType::LengthDelimited) => {
                if let Some(found) = parse_document(reader.read_bytes()?)? {
                    note = Some(found);
                }
            }
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok(note)
}

fn parse_document(buf: &[u8]) -> Result<Option<RawNote>, DecodeError> {
    let mut reader = WireReader::new(buf);
    let mut note = None;
    while let Some((field, wire_type)) = reader.next_key()? {
        match (field, wire_type) {
            (DOCUMENT_NOTE, WireType::LengthDelimited) => {
                note = Some(parse_note(reader.read_bytes()?)?);
            }
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok(note)
}

fn parse_note(buf: &[u8]) -> Result<RawNote, DecodeError> {
    let mut reader = WireReader::new(buf);
    let mut note = RawNote::default();
    while let Some((field, wire_type)) = reader.next_key()? {
        match (field, wire_type) {
            (NOTE_TEXT, WireType::LengthDelimited) => note.text = reader.read_string(field)?,
            (NOTE_ATTRIBUTE_RUN, WireType::LengthDelimited) => {
                note.runs.push(parse_attribute_run(reader.read_bytes()?)?);
            }
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok(note)
}

fn parse_attribute_run(buf: &[u8]) -> Result<RawAttributeRun, DecodeError> {
    let mut reader = WireReader::new(buf);
    let mut run = RawAttributeRun::default();
    while let Some((field, wire_type)) = reader.next_key()? {
        match (field, wire_type) {
            (RUN_LENGTH, WireType::Varint) => run.length = reader.read_varint()?,
            (RUN_PARAGRAPH_STYLE, WireType::LengthDelimited) => {
                run.paragraph = parse_paragraph_style(reader.read_bytes()?)?;
            }
            (RUN_FONT_WEIGHT, WireType::Varint) => run.font_weight = reader.read_varint()?,
            (RUN_UNDERLINED, WireType::Varint) => run.underlined = reader.read_varint()? != 0,
            (RUN_STRIKETHROUGH, WireType::Varint) => {
                run.strikethrough = reader.read_varint()? != 0;
            }
            (RUN_LINK, WireType::LengthDelimited) => run.link = Some(reader.read_string(field)?),
            (RUN_ATTACHMENT_INFO, WireType::LengthDelimited) => {
                run.attachment = Some(parse_attachment_info(reader.read_bytes()?)?);
            }
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok(run)
}

fn parse_paragraph_style(buf: &[u8]) -> Result<Option<i64>, DecodeError> {
    let mut reader = WireReader::new(buf);
    let mut style_type = None;
    while let Some((field, wire_type)) = reader.next_key()? {
        match (field, wire_type) {
            // int32 on the wire: negative values arrive sign-extended to 64 bits
            (PARAGRAPH_STYLE_TYPE, WireType::Varint) => {
                style_type = Some(reader.read_varint()? as i64);
            }
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok(style_type)
}

fn parse_attachment_info(buf: &[u8]) -> Result<(String, Option<String>), DecodeError> {
    let mut reader = WireReader::new(buf);
    let mut identifier = String::new();
    let mut type_uti = None;
    while let Some((field, wire_type)) = reader.next_key()? {
        match (field, wire_type) {
            (ATTACHMENT_IDENTIFIER, WireType::LengthDelimited) => {
                identifier = reader.read_string(field)?;
            }
            (ATTACHMENT_TYPE_UTI, WireType::LengthDelimited) => {
                type_uti = Some(reader.read_string(field)?);
            }
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok((identifier, type_uti))
}

/// Slices the note text along the attribute runs.
///
/// Run lengths are counted in Unicode scalar values and converted to byte
/// offsets here. Runs reaching past the text are clamped; text past the last
/// run becomes a plain run.
fn build_body(note: RawNote) -> DecodedBody {
    let boundaries: Vec<usize> = note
        .text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(note.text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut runs = Vec::with_capacity(note.runs.len() + 1);
    let mut cursor = 0usize;
    for raw in &note.runs {
        if cursor >= total_chars {
            log::debug!("ignoring attribute runs past end of {total_chars}-character note text");
            break;
        }
        let length = usize::try_from(raw.length).unwrap_or(usize::MAX);
        let end = cursor.saturating_add(length).min(total_chars);
        if end == cursor {
            continue;
        }
        let text = note.text[boundaries[cursor]..boundaries[end]].to_string();
        let span = end - cursor;
        runs.push(TextRun {
            text,
            paragraph: raw.paragraph.map(ParagraphStyle::from_style_type).unwrap_or_default(),
            annotations: raw
                .kinds()
                .into_iter()
                .map(|kind| Annotation { kind, start: 0, length: span })
                .collect(),
        });
        cursor = end;
    }
    if cursor < total_chars {
        runs.push(TextRun {
            text: note.text[boundaries[cursor]..].to_string(),
            paragraph: ParagraphStyle::Body,
            annotations: Vec::new(),
        });
    }
    DecodedBody { runs }
}
