//! Minimal xlsx worksheet reader
//!
//! Reads the first worksheet of a workbook into a sparse cell map. Only cell
//! values are extracted: shared strings, inline strings, formula string
//! results and plain numbers. Styles, formulas and number formats are ignored.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use thiserror::Error;

/// Upper bound for any single decompressed part
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Invalid xlsx archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Failed to read xlsx part: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid worksheet XML: {0}")]
    Xml(String),

    #[error("Workbook has no worksheets")]
    NoWorksheet,
}

impl From<quick_xml::Error> for SheetError {
    fn from(e: quick_xml::Error) -> Self {
        SheetError::Xml(e.to_string())
    }
}

/// Cell values of one worksheet keyed by (row, column), both 1-based
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Sheet {
    cells: HashMap<(u32, u32), String>,
}

impl Sheet {
    /// Value at an A1-style reference
    pub fn get(&self, reference: &str) -> Option<&str> {
        parse_reference(reference).and_then(|(row, col)| self.value(row, col))
    }

    pub fn value(&self, row: u32, col: u32) -> Option<&str> {
        self.cells.get(&(row, col)).map(String::as_str)
    }

    /// Columns `1..=width` of `row`
    pub fn row(&self, row: u32, width: u32) -> Vec<Option<&str>> {
        (1..=width).map(|col| self.value(row, col)).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Read the first worksheet of an xlsx workbook
pub fn read_first_sheet(bytes: &[u8]) -> Result<Sheet, SheetError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => read_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut sheets: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("xl/worksheets/sheet")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    sheets.sort();

    let (_, name) = sheets.into_iter().next().ok_or(SheetError::NoWorksheet)?;
    let xml = read_part(&mut archive, &name)?.ok_or(SheetError::NoWorksheet)?;
    read_cells(&xml, &shared)
}

fn read_part(archive: &mut zip::ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<Vec<u8>>, SheetError> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    file.take(MAX_PART_BYTES).read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// One entry per `<si>`, rich-text runs concatenated
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, SheetError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Event::Text(te) if in_t => {
                current.push_str(&te.unescape()?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CellType {
    Shared,
    Inline,
    Plain,
}

fn read_cells(xml: &[u8], shared: &[String]) -> Result<Sheet, SheetError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut cells = HashMap::new();
    let mut position: Option<(u32, u32)> = None;
    let mut cell_type = CellType::Plain;
    let mut capture = false;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    position = None;
                    cell_type = CellType::Plain;
                    text.clear();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                position = std::str::from_utf8(&attr.value).ok().and_then(parse_reference);
                            }
                            b"t" => {
                                cell_type = match attr.value.as_ref() {
                                    b"s" => CellType::Shared,
                                    b"inlineStr" => CellType::Inline,
                                    _ => CellType::Plain,
                                };
                            }
                            _ => {}
                        }
                    }
                }
                b"v" => capture = true,
                b"t" if cell_type == CellType::Inline => capture = true,
                _ => {}
            },
            Event::Text(te) if capture => {
                text.push_str(&te.unescape()?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let value = match cell_type {
                        CellType::Shared => text.trim().parse::<usize>().ok().and_then(|i| shared.get(i).cloned()),
                        CellType::Inline | CellType::Plain => Some(text.clone()),
                    };
                    if let (Some(pos), Some(value)) = (position.take(), value) {
                        if !value.trim().is_empty() {
                            cells.insert(pos, value);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(Sheet { cells })
}

/// "B3" -> (3, 2)
fn parse_reference(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }

    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col.checked_mul(26)?.checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row = digits.parse::<u32>().ok().filter(|r| *r > 0)?;
    Some((row, col))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Workbook with a single sheet; `cells` are (reference, value) pairs,
    /// strings go through the shared string table
    pub(crate) fn workbook(cells: &[(&str, &str)]) -> Vec<u8> {
        let mut shared = Vec::new();
        let mut rows: std::collections::BTreeMap<u32, Vec<String>> = Default::default();
        for (reference, value) in cells {
            let (row, _) = parse_reference(reference).unwrap();
            let xml = match value.parse::<f64>() {
                Ok(_) => format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value),
                Err(_) => {
                    shared.push(format!("<si><t>{}</t></si>", escape(value)));
                    format!(r#"<c r="{}" t="s"><v>{}</v></c>"#, reference, shared.len() - 1)
                }
            };
            rows.entry(row).or_default().push(xml);
        }

        let sheet_data: String = rows
            .iter()
            .map(|(r, cells)| format!(r#"<row r="{}">{}</row>"#, r, cells.concat()))
            .collect();
        let sheet = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            sheet_data
        );
        let strings = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{}</sst>"#,
            shared.concat()
        );

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        zip.write_all(strings.as_bytes()).unwrap();
        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn escape(s: &str) -> String {
        s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("A1"), Some((1, 1)));
        assert_eq!(parse_reference("B3"), Some((3, 2)));
        assert_eq!(parse_reference("AA10"), Some((10, 27)));
        assert_eq!(parse_reference("10"), None);
        assert_eq!(parse_reference("A0"), None);
    }

    #[test]
    fn test_reads_shared_and_numeric_cells() {
        let bytes = workbook(&[("B3", "42"), ("A9", "RU 2 123 456"), ("C9", "Насос & клапан")]);
        let sheet = read_first_sheet(&bytes).unwrap();

        assert_eq!(sheet.get("B3"), Some("42"));
        assert_eq!(sheet.get("A9"), Some("RU 2 123 456"));
        assert_eq!(sheet.get("C9"), Some("Насос & клапан"));
        assert_eq!(sheet.get("B9"), None);
        assert_eq!(sheet.row(9, 3), vec![Some("RU 2 123 456"), None, Some("Насос & клапан")]);
    }

    #[test]
    fn test_inline_strings_and_rich_text() {
        let sheet_xml = br#"<worksheet><sheetData><row r="1">
            <c r="A1" t="inlineStr"><is><t>inline</t></is></c>
            <c r="B1" t="s"><v>0</v></c>
        </row></sheetData></worksheet>"#;
        let shared = read_shared_strings(br#"<sst><si><r><t>rich</t></r><r><t>text</t></r></si></sst>"#).unwrap();
        let sheet = read_cells(sheet_xml, &shared).unwrap();

        assert_eq!(sheet.get("A1"), Some("inline"));
        assert_eq!(sheet.get("B1"), Some("richtext"));
    }

    #[test]
    fn test_not_a_workbook() {
        assert!(matches!(read_first_sheet(b"not a zip"), Err(SheetError::Archive(_))));
    }

    #[test]
    fn test_workbook_without_sheets() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("xl/workbook.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<workbook/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(read_first_sheet(&bytes), Err(SheetError::NoWorksheet)));
    }
}
