mod common;

use common::*;
use docx_compose::{DecodeError, Package};

fn rich_fixture() -> DocxBuilder {
    DocxBuilder::new()
        .paragraph("Title")
        .body(&drawing_para("rId5", 1))
        .body(&table(&para("cell & more")))
        .styles("rId1")
        .header("rId2", "header1.xml", &para("Header"))
        .image("rId5", "image1.png", png(4, 3, 10))
        .rel("rId6", RT_HYPERLINK, "https://example.com/?a=1&b=2", true)
        .part("docProps/core.xml", None, b"<core/>")
}

#[test]
fn load_then_save_preserves_structure() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let original = rich_fixture().package();

    let out = dir.path().join("out.docx");
    original.save(&out).unwrap();
    let reloaded = Package::load(&out).unwrap();

    assert!(original.document().same_structure(reloaded.document()));
    assert_eq!(original.relationships(), reloaded.relationships());
    assert_eq!(original.media(), reloaded.media());
    assert_eq!(original.content_types(), reloaded.content_types());
    assert_eq!(reloaded.headers().len(), 1);
    assert!(
        original.headers()[0]
            .tree
            .same_structure(&reloaded.headers()[0].tree)
    );
    let names: Vec<&str> = reloaded.raw_part_names().collect();
    assert!(names.contains(&"docProps/core.xml"));
    assert!(names.contains(&"word/styles.xml"));
}

#[test]
fn encoding_is_deterministic() {
    let pkg = rich_fixture().package();
    assert_eq!(pkg.to_bytes().unwrap(), pkg.to_bytes().unwrap());
}

#[test]
fn content_types_and_package_rels_come_first() {
    let pkg = rich_fixture().package();
    let names = zip_entry_names(&pkg.to_bytes().unwrap());
    assert_eq!(names[0], "[Content_Types].xml");
    assert_eq!(names[1], "_rels/.rels");
    assert!(names.contains(&"word/document.xml".to_string()));
    assert!(names.contains(&"word/_rels/document.xml.rels".to_string()));
    assert!(names.contains(&"word/media/image1.png".to_string()));
    assert!(names.contains(&"word/header1.xml".to_string()));
}

#[test]
fn headers_and_media_are_modelled() {
    let pkg = rich_fixture().package();
    assert_eq!(pkg.headers()[0].name, "word/header1.xml");
    assert!(pkg.footers().is_empty());
    assert!(pkg.settings().is_none());
    assert!(pkg.media().contains("image1.png"));
    let link = pkg.relationships().get("rId6").unwrap();
    assert!(link.external);
    assert_eq!(link.target, "https://example.com/?a=1&b=2");
}

#[test]
fn special_characters_survive() {
    let pkg = reopen(&rich_fixture().package());
    assert_eq!(body_texts(&pkg)[0], "Title");
    let doc = pkg.document();
    let tc = docx_compose::wml::all_cells(doc, docx_compose::wml::body(doc).unwrap())[0];
    assert_eq!(docx_compose::wml::cell_text(doc, tc), "cell & more");
}

#[test]
fn attribute_whitespace_survives_reload() {
    let pkg = DocxBuilder::new()
        .body(concat!(
            r#"<w:p><w:r><w:drawing><wp:inline>"#,
            r#"<wp:docPr id="1" name="P" descr="line1&#xA;line2&#x9;end"/>"#,
            r#"</wp:inline></w:drawing></w:r></w:p>"#
        ))
        .package();
    assert_eq!(
        attr_values(pkg.document(), "docPr", "descr"),
        ["line1\nline2\tend"]
    );

    let again = reopen(&pkg);

    assert_eq!(
        attr_values(again.document(), "docPr", "descr"),
        ["line1\nline2\tend"]
    );
    assert!(pkg.document().same_structure(again.document()));
    assert!(reopen(&again).document().same_structure(again.document()));
}

#[test]
fn missing_relationships_part_gives_empty_table() {
    let pkg = DocxBuilder::new().paragraph("x").without_rels().package();
    assert!(pkg.relationships().is_empty());
    let again = reopen(&pkg);
    assert!(again.relationships().is_empty());
}

#[test]
fn garbage_is_not_a_zip() {
    let err = Package::from_bytes(b"definitely not a zip").unwrap_err();
    assert!(matches!(err, DecodeError::NotAZip));
}

#[test]
fn archive_without_document_is_rejected() {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("hello.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    std::io::Write::write_all(&mut zip, b"hi").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    match Package::from_bytes(&bytes) {
        Err(DecodeError::MissingPart(part)) => assert_eq!(part, "word/document.xml"),
        other => panic!("expected MissingPart, got {other:?}"),
    }
}

#[test]
fn malformed_document_xml_is_reported() {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    std::io::Write::write_all(&mut zip, b"<w:document><w:body>").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let err = Package::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, DecodeError::Xml { ref part, .. } if part == "word/document.xml"));
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Package::load(&dir.path().join("nope.docx")).unwrap_err();
    assert!(matches!(err, DecodeError::Io { .. }));
}

#[test]
fn save_unique_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = DocxBuilder::new().paragraph("one").package();
    let target = dir.path().join("report.docx");

    let first = pkg.save_unique(&target).unwrap();
    let second = pkg.save_unique(&target).unwrap();
    let third = pkg.save_unique(&target).unwrap();

    assert_eq!(first, target);
    assert_eq!(second, dir.path().join("report-1.docx"));
    assert_eq!(third, dir.path().join("report-2.docx"));
    assert!(Package::load(&third).is_ok());
}

#[test]
fn failed_save_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = DocxBuilder::new().paragraph("one").package();
    let target = dir.path().join("missing-dir").join("out.docx");

    assert!(pkg.save(&target).is_err());
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn unique_output_path_skips_existing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("a.docx");
    assert_eq!(docx_compose::unique_output_path(&target), target);
    std::fs::write(&target, b"x").unwrap();
    assert_eq!(
        docx_compose::unique_output_path(&target),
        dir.path().join("a-1.docx")
    );
}
