//! Flattening of decoded runs into plain text with note-wide spans.

use serde::{Deserialize, Serialize};

use crate::core::decoder::{Annotation, AnnotationKind, DecodedBody, ParagraphStyle};

/// Character the store uses to mark where an attachment sits in the text.
const OBJECT_REPLACEMENT: char = '\u{FFFC}';

const SNIPPET_CHARS: usize = 100;

/// A line of assembled text, in Unicode scalar offsets, excluding the newline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub start: usize,
    pub length: usize,
    pub style: ParagraphStyle,
}

/// Plain text of a note plus the spans and paragraphs laid over it.
///
/// Span offsets are Unicode scalar positions in `text`, after attachment
/// placeholders have been substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContent {
    pub text: String,
    pub spans: Vec<Annotation>,
    pub paragraphs: Vec<Paragraph>,
}

impl AssembledContent {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// First non-empty line, trimmed.
    pub fn title(&self) -> Option<String> {
        non_empty_lines(&self.text).next().map(str::to_string)
    }

    /// The first non-empty line after the title, cut to a preview length.
    pub fn snippet(&self) -> Option<String> {
        non_empty_lines(&self.text)
            .nth(1)
            .map(|line| line.chars().take(SNIPPET_CHARS).collect())
    }

    /// Returns the text covered by `span`.
    pub fn span_text(&self, span: &Annotation) -> String {
        self.text.chars().skip(span.start).take(span.length).collect()
    }
}

/// Placeholder substituted for an attachment of the given kind.
pub fn attachment_placeholder(kind: &str) -> String {
    format!("[attachment: {kind}]")
}

/// Short human-readable attachment kind for a type identifier.
pub fn attachment_kind(type_uti: Option<&str>) -> String {
    let Some(uti) = type_uti else {
        return "unknown".to_string();
    };
    let kind = match uti {
        "public.jpeg" | "public.png" | "public.heic" | "public.tiff" | "public.image"
        | "com.compuserve.gif" => "image",
        "com.adobe.pdf" => "pdf",
        "com.apple.drawing" | "com.apple.drawing.2" | "com.apple.paper" => "drawing",
        "com.apple.notes.table" => "table",
        "com.apple.notes.gallery" => "scan",
        "public.url" => "link",
        "public.vcard" => "contact",
        "public.audio" | "public.mp3" | "com.apple.m4a-audio" => "audio",
        "public.movie" | "public.mpeg-4" | "com.apple.quicktime-movie" => "video",
        other => return other.to_string(),
    };
    kind.to_string()
}

/// Assembles decoded runs into one text with merged spans and paragraphs.
///
/// Each U+FFFC marker becomes an attachment placeholder, and every span
/// after it is shifted by the placeholder's length. The output depends only
/// on `body`.
pub fn assemble(body: &DecodedBody) -> AssembledContent {
    let mut text = String::new();
    let mut out_pos = 0usize;
    let mut spans = Vec::new();
    let mut run_ranges: Vec<(usize, usize, ParagraphStyle)> = Vec::with_capacity(body.runs.len());

    for run in &body.runs {
        let placeholder = attachment_placeholder(&run_attachment_kind(&run.annotations));
        let placeholder_len = placeholder.chars().count();
        let run_start = out_pos;

        // positions[i] is where the run's i-th character lands in `text`
        let mut positions = Vec::with_capacity(run.text.len() + 1);
        for ch in run.text.chars() {
            positions.push(out_pos);
            if ch == OBJECT_REPLACEMENT {
                text.push_str(&placeholder);
                out_pos += placeholder_len;
            } else {
                text.push(ch);
                out_pos += 1;
            }
        }
        positions.push(out_pos);
        let run_len = positions.len() - 1;

        for annotation in &run.annotations {
            let start = annotation.start.min(run_len);
            let end = annotation.start.saturating_add(annotation.length).min(run_len);
            if end > start {
                spans.push(Annotation {
                    kind: annotation.kind.clone(),
                    start: positions[start],
                    length: positions[end] - positions[start],
                });
            }
        }
        run_ranges.push((run_start, out_pos, run.paragraph));
    }

    let paragraphs = split_paragraphs(&text, &run_ranges);
    AssembledContent {
        text,
        spans: merge_spans(spans),
        paragraphs,
    }
}

fn run_attachment_kind(annotations: &[Annotation]) -> String {
    annotations
        .iter()
        .find_map(|a| match &a.kind {
            AnnotationKind::Attachment { type_uti, .. } => {
                Some(attachment_kind(type_uti.as_deref()))
            }
            _ => None,
        })
        .unwrap_or_else(|| attachment_kind(None))
}

/// Merges overlapping or touching spans of the same kind, then orders by position.
fn merge_spans(mut spans: Vec<Annotation>) -> Vec<Annotation> {
    spans.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then(a.start.cmp(&b.start))
            .then(a.length.cmp(&b.length))
    });

    let mut merged: Vec<Annotation> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = merged.last_mut() {
            let last_end = last.start + last.length;
            if last.kind == span.kind && span.start <= last_end {
                let end = last_end.max(span.start + span.length);
                last.length = end - last.start;
                continue;
            }
        }
        merged.push(span);
    }

    merged.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(a.kind.cmp(&b.kind))
            .then(a.length.cmp(&b.length))
    });
    merged
}

fn split_paragraphs(text: &str, run_ranges: &[(usize, usize, ParagraphStyle)]) -> Vec<Paragraph> {
    let style_at = |pos: usize| {
        run_ranges
            .iter()
            .find(|(start, end, _)| *start <= pos && pos < *end)
            .map(|(_, _, style)| *style)
            .unwrap_or_default()
    };

    let mut paragraphs = Vec::new();
    let mut start = 0usize;
    let mut pos = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            paragraphs.push(Paragraph { start, length: pos - start, style: style_at(start) });
            start = pos + 1;
        }
        pos += 1;
    }
    if start < pos {
        paragraphs.push(Paragraph { start, length: pos - start, style: style_at(start) });
    }
    paragraphs
}

fn non_empty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}
