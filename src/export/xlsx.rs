//! OOXML workbook writer.
//!
//! An `.xlsx` file is a zip archive of SpreadsheetML parts. Cells are
//! written as inline strings so no shared-strings table is needed.

use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::layout::Sheet;
use super::ExportError;

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const DOC_REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const OFFICE_DOC_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const WORKBOOK_CT: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const WORKSHEET_CT: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// Spreadsheet column letters for a zero-based index: 0 -> A, 26 -> AA.
pub fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Drop characters XML 1.0 cannot carry.
fn xml_safe(value: &str) -> String {
    value
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect()
}

struct Xml(Writer<Vec<u8>>);

impl Xml {
    fn new() -> Result<Self, ExportError> {
        let mut xml = Self(Writer::new(Vec::new()));
        xml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        Ok(xml)
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), ExportError> {
        self.0
            .write_event(event)
            .map_err(|e| ExportError::Xml(e.to_string()))
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.event(Event::Start(start))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.event(Event::Empty(start))
    }

    fn close(&mut self, name: &str) -> Result<(), ExportError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, value: &str) -> Result<(), ExportError> {
        self.event(Event::Text(BytesText::new(value)))
    }

    fn finish(self) -> Vec<u8> {
        self.0.into_inner()
    }
}

fn content_types(sheet_count: usize) -> Result<Vec<u8>, ExportError> {
    let mut xml = Xml::new()?;
    xml.open("Types", &[("xmlns", CONTENT_TYPES_NS)])?;
    xml.empty(
        "Default",
        &[
            ("Extension", "rels"),
            ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
        ],
    )?;
    xml.empty(
        "Default",
        &[("Extension", "xml"), ("ContentType", "application/xml")],
    )?;
    xml.empty(
        "Override",
        &[("PartName", "/xl/workbook.xml"), ("ContentType", WORKBOOK_CT)],
    )?;
    for n in 1..=sheet_count {
        let part = format!("/xl/worksheets/sheet{}.xml", n);
        xml.empty(
            "Override",
            &[("PartName", part.as_str()), ("ContentType", WORKSHEET_CT)],
        )?;
    }
    xml.close("Types")?;
    Ok(xml.finish())
}

fn root_rels() -> Result<Vec<u8>, ExportError> {
    let mut xml = Xml::new()?;
    xml.open("Relationships", &[("xmlns", PKG_REL_NS)])?;
    xml.empty(
        "Relationship",
        &[
            ("Id", "rId1"),
            ("Type", OFFICE_DOC_REL),
            ("Target", "xl/workbook.xml"),
        ],
    )?;
    xml.close("Relationships")?;
    Ok(xml.finish())
}

fn workbook(sheets: &[Sheet]) -> Result<Vec<u8>, ExportError> {
    let mut xml = Xml::new()?;
    xml.open(
        "workbook",
        &[("xmlns", SPREADSHEET_NS), ("xmlns:r", DOC_REL_NS)],
    )?;
    xml.open("sheets", &[])?;
    for (i, sheet) in sheets.iter().enumerate() {
        let sheet_id = (i + 1).to_string();
        let rel_id = format!("rId{}", i + 1);
        xml.empty(
            "sheet",
            &[
                ("name", sheet.name),
                ("sheetId", sheet_id.as_str()),
                ("r:id", rel_id.as_str()),
            ],
        )?;
    }
    xml.close("sheets")?;
    xml.close("workbook")?;
    Ok(xml.finish())
}

fn workbook_rels(sheet_count: usize) -> Result<Vec<u8>, ExportError> {
    let mut xml = Xml::new()?;
    xml.open("Relationships", &[("xmlns", PKG_REL_NS)])?;
    for n in 1..=sheet_count {
        let id = format!("rId{}", n);
        let target = format!("worksheets/sheet{}.xml", n);
        xml.empty(
            "Relationship",
            &[
                ("Id", id.as_str()),
                ("Type", WORKSHEET_REL),
                ("Target", target.as_str()),
            ],
        )?;
    }
    xml.close("Relationships")?;
    Ok(xml.finish())
}

fn worksheet(sheet: &Sheet) -> Result<Vec<u8>, ExportError> {
    let mut xml = Xml::new()?;
    xml.open("worksheet", &[("xmlns", SPREADSHEET_NS)])?;
    xml.open("sheetData", &[])?;

    let rows = std::iter::once(&sheet.table.headers).chain(sheet.table.rows.iter());
    for (r, row) in rows.enumerate() {
        let row_ref = (r + 1).to_string();
        xml.open("row", &[("r", row_ref.as_str())])?;
        for (c, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_name(c), row_ref);
            if value.is_empty() {
                xml.empty("c", &[("r", cell_ref.as_str())])?;
                continue;
            }
            xml.open("c", &[("r", cell_ref.as_str()), ("t", "inlineStr")])?;
            xml.open("is", &[])?;
            xml.open("t", &[("xml:space", "preserve")])?;
            xml.text(&xml_safe(value))?;
            xml.close("t")?;
            xml.close("is")?;
            xml.close("c")?;
        }
        xml.close("row")?;
    }

    xml.close("sheetData")?;
    xml.close("worksheet")?;
    Ok(xml.finish())
}

/// Render `sheets` as an in-memory `.xlsx` archive.
pub fn write_workbook(sheets: &[Sheet]) -> Result<Vec<u8>, ExportError> {
    let mut parts: Vec<(String, Vec<u8>)> = vec![
        ("[Content_Types].xml".to_string(), content_types(sheets.len())?),
        ("_rels/.rels".to_string(), root_rels()?),
        ("xl/workbook.xml".to_string(), workbook(sheets)?),
        (
            "xl/_rels/workbook.xml.rels".to_string(),
            workbook_rels(sheets.len())?,
        ),
    ];
    for (i, sheet) in sheets.iter().enumerate() {
        parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), worksheet(sheet)?));
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in parts {
        zip.start_file(name, options)?;
        zip.write_all(&bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::export::layout::{self, Table};
    use crate::export::tests::intake;

    fn read_part(bytes: &[u8], name: &str) -> Option<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        Some(out)
    }

    #[test]
    fn test_column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn test_single_record_workbook_parts() {
        let bytes = write_workbook(&layout::single_record_sheets(&intake(2))).unwrap();

        let workbook = read_part(&bytes, "xl/workbook.xml").unwrap();
        assert!(workbook.contains(r#"name="Client Information""#));
        assert!(workbook.contains(r#"name="Related Parties""#));
        assert!(read_part(&bytes, "xl/worksheets/sheet2.xml").is_some());
        assert!(read_part(&bytes, "[Content_Types].xml")
            .unwrap()
            .contains("/xl/worksheets/sheet2.xml"));
    }

    #[test]
    fn test_no_party_sheet_without_parties() {
        let bytes = write_workbook(&layout::single_record_sheets(&intake(0))).unwrap();
        let workbook = read_part(&bytes, "xl/workbook.xml").unwrap();
        assert!(!workbook.contains("Related Parties"));
        assert!(read_part(&bytes, "xl/worksheets/sheet2.xml").is_none());
    }

    #[test]
    fn test_cells_are_escaped_inline_strings() {
        let sheet = Sheet {
            name: "Test",
            table: Table {
                headers: vec!["A".to_string(), "B".to_string()],
                rows: vec![vec!["Smith & <Sons>".to_string(), String::new()]],
            },
        };
        let bytes = write_workbook(&[sheet]).unwrap();
        let xml = read_part(&bytes, "xl/worksheets/sheet1.xml").unwrap();

        assert!(xml.contains(r#"<c r="A2" t="inlineStr"><is><t xml:space="preserve">Smith &amp; &lt;Sons&gt;</t></is></c>"#));
        assert!(xml.contains(r#"<c r="B2"/>"#));
    }

    #[test]
    fn test_control_characters_dropped() {
        assert_eq!(xml_safe("a\u{1}b\tc"), "ab\tc");
    }
}
