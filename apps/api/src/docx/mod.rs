//! DOCX read/write layer.
//!
//! A `.docx` file is a ZIP archive; the text lives in `word/document.xml`.
//! We parse that one part into a structural model (paragraphs, runs, tables)
//! with `quick-xml` and carry everything we do not model as opaque raw XML so
//! it survives a round trip. On save, every other archive entry is copied
//! from the original bytes untouched.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub mod fill;
mod reader;
mod writer;

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Formatting attributes preserved across a placeholder substitution:
/// bold, italic, size (half-points, per `w:sz`), and font name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub size: Option<u32>,
    pub font: Option<String>,
}

/// A contiguous span of identically-styled text.
///
/// `raw_properties` holds the original `<w:rPr>` XML verbatim when the run
/// came from a parsed document, so attributes we do not model (color,
/// underline) survive untouched paragraphs. Runs synthesized by the splitter
/// carry only the copied `RunStyle`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: RunStyle,
    pub(crate) raw_properties: Option<String>,
}

impl Run {
    pub fn new(text: impl Into<String>, style: RunStyle) -> Self {
        Run {
            text: text.into(),
            style,
            raw_properties: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParagraphChild {
    Run(Run),
    /// Unmodeled content (hyperlinks, bookmarks, proofing marks) kept verbatim.
    Raw(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    /// Raw `<w:pPr>` XML. Survives `clear_runs`, like paragraph styles do in
    /// word processors when inline content is rewritten.
    pub(crate) properties: Option<String>,
    pub children: Vec<ParagraphChild>,
}

impl Paragraph {
    pub fn from_runs(runs: Vec<Run>) -> Self {
        Paragraph {
            properties: None,
            children: runs.into_iter().map(ParagraphChild::Run).collect(),
        }
    }

    /// The paragraph's visible text: run texts concatenated in order.
    pub fn text(&self) -> String {
        self.runs().map(|r| r.text.as_str()).collect()
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.children.iter().filter_map(|c| match c {
            ParagraphChild::Run(r) => Some(r),
            ParagraphChild::Raw(_) => None,
        })
    }

    /// Removes and returns all runs, dropping any raw children with them.
    /// The paragraph's own properties are kept.
    pub(crate) fn take_runs(&mut self) -> Vec<Run> {
        std::mem::take(&mut self.children)
            .into_iter()
            .filter_map(|c| match c {
                ParagraphChild::Run(r) => Some(r),
                ParagraphChild::Raw(_) => None,
            })
            .collect()
    }

    pub(crate) fn push_run(&mut self, run: Run) {
        self.children.push(ParagraphChild::Run(run));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellChild {
    Paragraph(Paragraph),
    /// Nested tables and cell properties pass through unmodeled.
    Raw(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableCell {
    pub children: Vec<CellChild>,
}

impl TableCell {
    pub fn paragraphs_mut(&mut self) -> impl Iterator<Item = &mut Paragraph> {
        self.children.iter_mut().filter_map(|c| match c {
            CellChild::Paragraph(p) => Some(p),
            CellChild::Raw(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowChild {
    Cell(TableCell),
    Raw(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub children: Vec<RowChild>,
}

impl TableRow {
    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut TableCell> {
        self.children.iter_mut().filter_map(|c| match c {
            RowChild::Cell(c) => Some(c),
            RowChild::Raw(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableChild {
    Row(TableRow),
    Raw(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub children: Vec<TableChild>,
}

impl Table {
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut TableRow> {
        self.children.iter_mut().filter_map(|c| match c {
            TableChild::Row(r) => Some(r),
            TableChild::Raw(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyElement {
    Paragraph(Paragraph),
    Table(Table),
    /// `w:sectPr` and anything else we do not model.
    Raw(String),
}

/// An in-memory DOCX document: the parsed body of `word/document.xml` plus
/// the original archive bytes, reused on save so untouched parts (styles,
/// images, relationships) are copied through bit-for-bit.
#[derive(Debug, Clone)]
pub struct DocxDocument {
    raw: Vec<u8>,
    prolog: String,
    root_tag: String,
    body_tag: String,
    pub body: Vec<BodyElement>,
}

impl DocxDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocxError> {
        let raw = std::fs::read(path)?;
        let mut archive = ZipArchive::new(Cursor::new(raw.as_slice()))?;
        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .map_err(|_| DocxError::Malformed(format!("missing {DOCUMENT_PART}")))?
            .read_to_string(&mut xml)?;
        drop(archive);

        let parsed = reader::parse_document(&xml)?;
        Ok(DocxDocument {
            raw,
            prolog: parsed.prolog,
            root_tag: parsed.root_tag,
            body_tag: parsed.body_tag,
            body: parsed.body,
        })
    }

    /// Writes the document to `path`: a fresh archive with a re-serialized
    /// `word/document.xml` and every other entry raw-copied from the original.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocxError> {
        let xml = writer::document_xml(self);

        let mut source = ZipArchive::new(Cursor::new(self.raw.as_slice()))?;
        let out = std::fs::File::create(path)?;
        let mut writer = ZipWriter::new(out);

        for i in 0..source.len() {
            let entry = source.by_index_raw(i)?;
            if entry.name() == DOCUMENT_PART {
                continue;
            }
            writer.raw_copy_file(entry)?;
        }

        writer.start_file(DOCUMENT_PART, SimpleFileOptions::default())?;
        writer.write_all(xml.as_bytes())?;
        writer.finish()?;
        Ok(())
    }

    /// Plain-text preview: body paragraph texts joined by newlines.
    /// Table content is not included, matching the paragraph-level preview
    /// shown to users.
    pub fn body_text(&self) -> String {
        self.body
            .iter()
            .filter_map(|e| match e {
                BodyElement::Paragraph(p) => Some(p.text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[cfg(test)]
    pub(crate) fn from_parts(raw: Vec<u8>, body: Vec<BodyElement>) -> Self {
        DocxDocument {
            raw,
            prolog: r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#.to_string(),
            root_tag: r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#.to_string(),
            body_tag: "<w:body>".to_string(),
            body,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_body(body: Vec<BodyElement>) -> Self {
        Self::from_parts(Vec::new(), body)
    }
}
