//! Serializes the document model back to `word/document.xml`.
//!
//! Raw pass-through chunks are emitted verbatim; modeled runs are rebuilt.
//! Tabs and newlines inside run text become `w:tab`/`w:br` elements, the
//! inverse of the reader's flattening.

use quick_xml::escape::escape;

use super::{BodyElement, CellChild, DocxDocument, Paragraph, Run, RunStyle, RowChild, Table, TableChild};

pub(crate) fn document_xml(doc: &DocxDocument) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(&doc.prolog);
    out.push_str(&doc.root_tag);
    out.push_str(&doc.body_tag);
    for element in &doc.body {
        match element {
            BodyElement::Paragraph(p) => write_paragraph(&mut out, p),
            BodyElement::Table(t) => write_table(&mut out, t),
            BodyElement::Raw(raw) => out.push_str(raw),
        }
    }
    out.push_str("</w:body></w:document>");
    out
}

fn write_paragraph(out: &mut String, paragraph: &Paragraph) {
    out.push_str("<w:p>");
    if let Some(props) = &paragraph.properties {
        out.push_str(props);
    }
    for child in &paragraph.children {
        match child {
            super::ParagraphChild::Run(run) => write_run(out, run),
            super::ParagraphChild::Raw(raw) => out.push_str(raw),
        }
    }
    out.push_str("</w:p>");
}

fn write_run(out: &mut String, run: &Run) {
    out.push_str("<w:r>");
    match &run.raw_properties {
        Some(raw) => out.push_str(raw),
        None => write_run_properties(out, &run.style),
    }

    let mut pending = String::new();
    for ch in run.text.chars() {
        match ch {
            '\t' => {
                flush_text(out, &mut pending);
                out.push_str("<w:tab/>");
            }
            '\n' => {
                flush_text(out, &mut pending);
                out.push_str("<w:br/>");
            }
            _ => pending.push(ch),
        }
    }
    flush_text(out, &mut pending);
    out.push_str("</w:r>");
}

fn flush_text(out: &mut String, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    out.push_str("<w:t xml:space=\"preserve\">");
    out.push_str(&escape(pending.as_str()));
    out.push_str("</w:t>");
    pending.clear();
}

fn write_run_properties(out: &mut String, style: &RunStyle) {
    if *style == RunStyle::default() {
        return;
    }
    out.push_str("<w:rPr>");
    if let Some(font) = &style.font {
        let font = escape(font.as_str());
        out.push_str(&format!(
            "<w:rFonts w:ascii=\"{font}\" w:hAnsi=\"{font}\"/>"
        ));
    }
    if style.bold {
        out.push_str("<w:b/>");
    }
    if style.italic {
        out.push_str("<w:i/>");
    }
    if let Some(size) = style.size {
        out.push_str(&format!(
            "<w:sz w:val=\"{size}\"/><w:szCs w:val=\"{size}\"/>"
        ));
    }
    out.push_str("</w:rPr>");
}

fn write_table(out: &mut String, table: &Table) {
    out.push_str("<w:tbl>");
    for child in &table.children {
        match child {
            TableChild::Row(row) => {
                out.push_str("<w:tr>");
                for row_child in &row.children {
                    match row_child {
                        RowChild::Cell(cell) => {
                            out.push_str("<w:tc>");
                            for cell_child in &cell.children {
                                match cell_child {
                                    CellChild::Paragraph(p) => write_paragraph(out, p),
                                    CellChild::Raw(raw) => out.push_str(raw),
                                }
                            }
                            out.push_str("</w:tc>");
                        }
                        RowChild::Raw(raw) => out.push_str(raw),
                    }
                }
                out.push_str("</w:tr>");
            }
            TableChild::Raw(raw) => out.push_str(raw),
        }
    }
    out.push_str("</w:tbl>");
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::super::{reader, Run, RunStyle};
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>Title</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">Amount: </w:t></w:r><w:r><w:rPr><w:b/><w:color w:val="FF0000"/></w:rPr><w:t>[AMOUNT]</w:t></w:r></w:p><w:sectPr><w:pgSz w:w="12240" w:h="15840"/></w:sectPr></w:body></w:document>"#;

    #[test]
    fn test_document_xml_round_trips_text_and_structure() {
        let parsed = reader::parse_document(FIXTURE).unwrap();
        let doc = DocxDocument::from_parts(Vec::new(), parsed.body);
        let xml = document_xml(&doc);

        let reparsed = reader::parse_document(&xml).unwrap();
        let texts: Vec<String> = reparsed
            .body
            .iter()
            .filter_map(|e| match e {
                BodyElement::Paragraph(p) => Some(p.text()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Title".to_string(), "Amount: [AMOUNT]".to_string()]);
    }

    #[test]
    fn test_document_xml_preserves_sectpr_and_unmodeled_run_properties() {
        let parsed = reader::parse_document(FIXTURE).unwrap();
        let doc = DocxDocument::from_parts(Vec::new(), parsed.body);
        let xml = document_xml(&doc);
        assert!(xml.contains("<w:sectPr>"));
        // w:color is not in the style model but rides along in raw rPr.
        assert!(xml.contains("w:color"));
        assert!(xml.contains("<w:jc w:val=\"center\"/>"));
    }

    #[test]
    fn test_write_run_escapes_text_and_preserves_space() {
        let mut out = String::new();
        write_run(&mut out, &Run::new("a < b & c ", RunStyle::default()));
        assert_eq!(
            out,
            "<w:r><w:t xml:space=\"preserve\">a &lt; b &amp; c </w:t></w:r>"
        );
    }

    #[test]
    fn test_write_run_emits_tab_and_break_elements() {
        let mut out = String::new();
        write_run(&mut out, &Run::new("a\tb\nc", RunStyle::default()));
        assert!(out.contains("<w:tab/>"));
        assert!(out.contains("<w:br/>"));
        let reparsed = reader::parse_document(&format!(
            r#"<?xml version="1.0"?><w:document><w:body><w:p>{out}</w:p></w:body></w:document>"#
        ))
        .unwrap();
        let BodyElement::Paragraph(p) = &reparsed.body[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.text(), "a\tb\nc");
    }

    #[test]
    fn test_write_run_properties_generates_all_four_attributes() {
        let mut out = String::new();
        let style = RunStyle {
            bold: true,
            italic: true,
            size: Some(24),
            font: Some("Garamond".to_string()),
        };
        write_run(&mut out, &Run::new("x", style));
        assert!(out.contains("<w:b/>"));
        assert!(out.contains("<w:i/>"));
        assert!(out.contains("<w:sz w:val=\"24\"/>"));
        assert!(out.contains("<w:rFonts w:ascii=\"Garamond\" w:hAnsi=\"Garamond\"/>"));
    }

    #[test]
    fn test_write_run_with_default_style_omits_rpr() {
        let mut out = String::new();
        write_run(&mut out, &Run::new("plain", RunStyle::default()));
        assert!(!out.contains("<w:rPr>"));
    }

    #[test]
    fn test_save_and_load_archive_round_trip() {
        // Build a minimal .docx archive in memory.
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
            .unwrap();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(FIXTURE.as_bytes()).unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("template.docx");
        std::fs::write(&source, &bytes).unwrap();

        let mut doc = DocxDocument::load(&source).unwrap();
        assert_eq!(doc.body_text(), "Title\nAmount: [AMOUNT]");

        if let BodyElement::Paragraph(p) = &mut doc.body[0] {
            p.take_runs();
            p.push_run(Run::new("Rewritten", RunStyle::default()));
        }

        let target = dir.path().join("template_completed.docx");
        doc.save(&target).unwrap();

        let reloaded = DocxDocument::load(&target).unwrap();
        assert_eq!(reloaded.body_text(), "Rewritten\nAmount: [AMOUNT]");
    }
}
