//! Just enough of the xlsx container to list sheets and to scaffold blank
//! templates. Cell contents are never parsed here.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

/// Leading bytes of every zip container, and therefore every xlsx file.
pub const ZIP_SIGNATURE: &[u8; 4] = b"PK\x03\x04";

const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Read sheet names, in workbook order, from `xl/workbook.xml`.
pub fn sheet_names(path: &Path) -> Result<Vec<String>, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|e| format!("not a zip container: {}", e))?;
    let mut part = archive
        .by_name(WORKBOOK_PART)
        .map_err(|_| format!("missing {}", WORKBOOK_PART))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| format!("unreadable {}: {}", WORKBOOK_PART, e))?;
    parse_sheet_names(&xml)
}

/// Extract the `name` attribute of every `<sheet .../>` element.
pub fn parse_sheet_names(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut names = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"name" {
                        let name = attr
                            .unescape_value()
                            .map_err(|e| format!("bad sheet name in {}: {}", WORKBOOK_PART, e))?;
                        names.push(name.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed {}: {}", WORKBOOK_PART, e)),
            _ => {}
        }
    }
    Ok(names)
}

/// Write a blank workbook containing the given sheets.
pub fn write_blank_workbook(path: &Path, sheets: &[&str]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );

    for (i, name) in sheets.iter().enumerate() {
        let n = i + 1;
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(name)
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }
    content_types.push_str("</Types>");
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    let package_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;
    let worksheet = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

    let zip_err = |e: zip::result::ZipError| std::io::Error::other(e);

    zip.start_file("[Content_Types].xml", options).map_err(zip_err)?;
    zip.write_all(content_types.as_bytes())?;
    zip.start_file("_rels/.rels", options).map_err(zip_err)?;
    zip.write_all(package_rels.as_bytes())?;
    zip.start_file(WORKBOOK_PART, options).map_err(zip_err)?;
    zip.write_all(workbook.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options).map_err(zip_err)?;
    zip.write_all(rels.as_bytes())?;
    for n in 1..=sheets.len() {
        zip.start_file(format!("xl/worksheets/sheet{n}.xml"), options)
            .map_err(zip_err)?;
        zip.write_all(worksheet.as_bytes())?;
    }
    zip.finish().map_err(zip_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sheet_names() {
        let xml = r#"<workbook><bookViews/><sheets>
            <sheet name="0. Car&#225;tula" sheetId="1" r:id="rId1"/>
            <sheet sheetId="2" name='Planos &amp; Fotos' r:id="rId2"/>
            <sheetView/>
        </sheets></workbook>"#;
        assert_eq!(
            parse_sheet_names(xml).unwrap(),
            vec!["0. Carátula", "Planos & Fotos"]
        );
    }

    #[test]
    fn test_only_name_attribute_is_read() {
        let xml = r#"<workbook><sheets><sheet sheetname="x" name="y"/><sheet id="1"/></sheets></workbook>"#;
        assert_eq!(parse_sheet_names(xml).unwrap(), vec!["y"]);
    }

    #[test]
    fn test_malformed_workbook_xml_is_an_error() {
        let xml = r#"<workbook><sheets><sheet name="a"/></workbook>"#;
        assert!(parse_sheet_names(xml).is_err());
    }

    #[test]
    fn test_blank_workbook_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.xlsx");
        let sheets = ["1. Información General A", "Q&A <draft>"];
        write_blank_workbook(&path, &sheets).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], ZIP_SIGNATURE);
        assert!(bytes.len() > 1000);
        assert_eq!(sheet_names(&path).unwrap(), sheets);
    }

    #[test]
    fn test_non_zip_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a workbook").unwrap();
        assert!(sheet_names(file.path()).is_err());
    }
}
