//! Event-stream parser for `word/document.xml`.
//!
//! The walk mirrors the WordprocessingML nesting: body > (p | tbl), tbl > tr
//! > tc > p, p > r > t. Elements outside that set are captured verbatim and
//! re-emitted by the writer, so unsupported structure is never silently lost.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{
    BodyElement, CellChild, DocxError, Paragraph, ParagraphChild, RowChild, Run, RunStyle, Table,
    TableCell, TableChild, TableRow,
};

#[derive(Debug)]
pub(crate) struct ParsedDocument {
    pub prolog: String,
    pub root_tag: String,
    pub body_tag: String,
    pub body: Vec<BodyElement>,
}

pub(crate) fn parse_document(xml: &str) -> Result<ParsedDocument, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut prolog = String::new();
    let mut root_tag = None;
    let mut body_tag = None;
    let mut body = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Decl(d) => prolog = raw_event(Event::Decl(d))?,
            Event::Start(e) if e.name().as_ref() == b"w:document" => {
                root_tag = Some(raw_event(Event::Start(e.to_owned()))?);
            }
            Event::Start(e) if e.name().as_ref() == b"w:body" => {
                body_tag = Some(raw_event(Event::Start(e.to_owned()))?);
                body = parse_body(&mut reader)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match (root_tag, body_tag) {
        (Some(root_tag), Some(body_tag)) => Ok(ParsedDocument {
            prolog,
            root_tag,
            body_tag,
            body,
        }),
        _ => Err(DocxError::Malformed(
            "document.xml has no w:document/w:body".to_string(),
        )),
    }
}

fn parse_body(reader: &mut Reader<&[u8]>) -> Result<Vec<BodyElement>, DocxError> {
    let mut body = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => body.push(BodyElement::Paragraph(parse_paragraph(reader)?)),
                b"w:tbl" => body.push(BodyElement::Table(parse_table(reader)?)),
                _ => body.push(BodyElement::Raw(capture_element(reader, &e)?)),
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => body.push(BodyElement::Paragraph(Paragraph::default())),
                _ => body.push(BodyElement::Raw(raw_event(Event::Empty(e.to_owned()))?)),
            },
            Event::End(e) if e.name().as_ref() == b"w:body" => break,
            Event::Eof => return Err(DocxError::Malformed("unterminated w:body".to_string())),
            _ => {}
        }
    }
    Ok(body)
}

fn parse_paragraph(reader: &mut Reader<&[u8]>) -> Result<Paragraph, DocxError> {
    let mut paragraph = Paragraph::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:pPr" => paragraph.properties = Some(capture_element(reader, &e)?),
                b"w:r" => {
                    let raw = capture_element(reader, &e)?;
                    match parse_run(&raw)? {
                        Some(run) => paragraph.push_run(run),
                        // Runs holding drawings or other non-text content
                        // pass through untouched.
                        None => paragraph.children.push(ParagraphChild::Raw(raw)),
                    }
                }
                _ => paragraph
                    .children
                    .push(ParagraphChild::Raw(capture_element(reader, &e)?)),
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:pPr" => {
                    paragraph.properties = Some(raw_event(Event::Empty(e.to_owned()))?);
                }
                _ => paragraph
                    .children
                    .push(ParagraphChild::Raw(raw_event(Event::Empty(e.to_owned()))?)),
            },
            Event::End(e) if e.name().as_ref() == b"w:p" => break,
            Event::Eof => return Err(DocxError::Malformed("unterminated w:p".to_string())),
            _ => {}
        }
    }
    Ok(paragraph)
}

fn parse_table(reader: &mut Reader<&[u8]>) -> Result<Table, DocxError> {
    let mut table = Table::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tr" => table.children.push(TableChild::Row(parse_row(reader)?)),
                _ => table
                    .children
                    .push(TableChild::Raw(capture_element(reader, &e)?)),
            },
            Event::Empty(e) => table
                .children
                .push(TableChild::Raw(raw_event(Event::Empty(e.to_owned()))?)),
            Event::End(e) if e.name().as_ref() == b"w:tbl" => break,
            Event::Eof => return Err(DocxError::Malformed("unterminated w:tbl".to_string())),
            _ => {}
        }
    }
    Ok(table)
}

fn parse_row(reader: &mut Reader<&[u8]>) -> Result<TableRow, DocxError> {
    let mut row = TableRow::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tc" => row.children.push(RowChild::Cell(parse_cell(reader)?)),
                _ => row
                    .children
                    .push(RowChild::Raw(capture_element(reader, &e)?)),
            },
            Event::Empty(e) => row
                .children
                .push(RowChild::Raw(raw_event(Event::Empty(e.to_owned()))?)),
            Event::End(e) if e.name().as_ref() == b"w:tr" => break,
            Event::Eof => return Err(DocxError::Malformed("unterminated w:tr".to_string())),
            _ => {}
        }
    }
    Ok(row)
}

fn parse_cell(reader: &mut Reader<&[u8]>) -> Result<TableCell, DocxError> {
    let mut cell = TableCell::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => cell
                    .children
                    .push(CellChild::Paragraph(parse_paragraph(reader)?)),
                // Nested tables stay opaque; only direct cell paragraphs are
                // searched for placeholders.
                _ => cell
                    .children
                    .push(CellChild::Raw(capture_element(reader, &e)?)),
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => cell.children.push(CellChild::Paragraph(Paragraph::default())),
                _ => cell
                    .children
                    .push(CellChild::Raw(raw_event(Event::Empty(e.to_owned()))?)),
            },
            Event::End(e) if e.name().as_ref() == b"w:tc" => break,
            Event::Eof => return Err(DocxError::Malformed("unterminated w:tc".to_string())),
            _ => {}
        }
    }
    Ok(cell)
}

/// Parses a captured `<w:r>` subtree. Returns `None` when the run carries
/// content we do not model (drawings, fields, embedded objects) so the caller
/// can keep the raw XML instead.
fn parse_run(raw: &str) -> Result<Option<Run>, DocxError> {
    let mut reader = Reader::from_str(raw);
    let mut run = Run::default();

    // Consume the opening <w:r>.
    match reader.read_event()? {
        Event::Start(e) if e.name().as_ref() == b"w:r" => {}
        _ => return Err(DocxError::Malformed("expected w:r".to_string())),
    }

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:rPr" => {
                    let rpr = capture_element(&mut reader, &e)?;
                    run.style = parse_run_style(&rpr)?;
                    run.raw_properties = Some(rpr);
                }
                b"w:t" => loop {
                    match reader.read_event()? {
                        Event::Text(t) => run.text.push_str(&t.unescape()?),
                        Event::CData(c) => {
                            run.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                        }
                        Event::End(_) => break,
                        Event::Eof => {
                            return Err(DocxError::Malformed("unterminated w:t".to_string()))
                        }
                        _ => {}
                    }
                },
                b"w:br" | b"w:cr" => {
                    run.text.push('\n');
                    reader.read_to_end(e.name())?;
                }
                b"w:tab" => {
                    run.text.push('\t');
                    reader.read_to_end(e.name())?;
                }
                _ => return Ok(None),
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:rPr" | b"w:t" | b"w:lastRenderedPageBreak" => {}
                b"w:tab" => run.text.push('\t'),
                b"w:br" | b"w:cr" => run.text.push('\n'),
                _ => return Ok(None),
            },
            Event::End(e) if e.name().as_ref() == b"w:r" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(Some(run))
}

/// Extracts the preserved style attributes from a captured `<w:rPr>` subtree.
/// Only direct children count; `w:rPrChange` history is ignored.
fn parse_run_style(rpr: &str) -> Result<RunStyle, DocxError> {
    let mut reader = Reader::from_str(rpr);
    let mut style = RunStyle::default();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 1 {
                    apply_style_element(&e, &mut style);
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 1 {
                    apply_style_element(&e, &mut style);
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(style)
}

fn apply_style_element(e: &BytesStart, style: &mut RunStyle) {
    match e.name().as_ref() {
        b"w:b" => {
            if !val_disabled(e) {
                style.bold = true;
            }
        }
        b"w:i" => {
            if !val_disabled(e) {
                style.italic = true;
            }
        }
        b"w:sz" => style.size = get_attr(e, b"w:val").and_then(|v| v.parse().ok()),
        b"w:rFonts" => {
            style.font = get_attr(e, b"w:ascii").or_else(|| get_attr(e, b"w:hAnsi"));
        }
        _ => {}
    }
}

/// Extract an attribute value by key from an element.
fn get_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .find(|a| a.as_ref().ok().map(|x| x.key.as_ref()) == Some(key))
        .and_then(Result::ok)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// True when a toggle property carries `w:val="0"` or `w:val="false"`.
fn val_disabled(e: &BytesStart) -> bool {
    e.attributes().any(|a| {
        if let Ok(attr) = a {
            if attr.key.as_ref() == b"w:val" {
                let v = std::str::from_utf8(&attr.value).unwrap_or_default();
                return v == "0" || v == "false";
            }
        }
        false
    })
}

/// Re-serializes the subtree rooted at `start` (already consumed) verbatim.
fn capture_element(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<String, DocxError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(start.to_owned()))?;
    let mut depth = 1usize;
    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(DocxError::Malformed(format!(
                    "unterminated {}",
                    String::from_utf8_lossy(start.name().as_ref())
                )))
            }
            _ => {}
        }
        let done = depth == 0;
        writer.write_event(event)?;
        if done {
            break;
        }
    }
    bytes_to_string(writer.into_inner())
}

/// Serializes a single event back to its literal XML form.
fn raw_event(event: Event<'_>) -> Result<String, DocxError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(event)?;
    bytes_to_string(writer.into_inner())
}

fn bytes_to_string(bytes: Vec<u8>) -> Result<String, DocxError> {
    String::from_utf8(bytes).map_err(|_| DocxError::Malformed("non-UTF-8 XML".to_string()))
}
