mod common;

use common::*;
use docx_compose::package::{CT_SETTINGS, RT_SETTINGS};
use docx_compose::wml;
use docx_compose::xml::{XmlTree, local_name};
use docx_compose::{Package, TOC_TITLE, TOC_TOKEN, insert_toc_at};

fn settings_children(pkg: &Package) -> Vec<String> {
    let tree = &pkg.settings().unwrap().tree;
    tree.child_elements(tree.root())
        .map(|c| local_name(tree.name(c).unwrap()).to_string())
        .collect()
}

fn update_fields_value(tree: &XmlTree) -> Option<String> {
    let node = tree.child(tree.root(), "updateFields")?;
    tree.attr(node, "w:val").map(str::to_string)
}

#[test]
fn token_becomes_title_and_toc_field() {
    init_logging();
    let mut pkg = DocxBuilder::new()
        .paragraph("Cover")
        .paragraph("#toc#")
        .paragraph("Chapter 1")
        .settings("rId1", r#"<w:zoom w:percent="100"/>"#)
        .package();

    assert!(insert_toc_at(&mut pkg, TOC_TOKEN, TOC_TITLE).unwrap());

    let texts = body_texts(&pkg);
    assert_eq!(texts.len(), 4);
    assert_eq!(texts[0], "Cover");
    assert_eq!(texts[1], TOC_TITLE);
    assert_eq!(texts[3], "Chapter 1");
    assert!(!texts.iter().any(|t| t.contains("#toc#")));

    let doc = pkg.document();
    let body = wml::body(doc).unwrap();
    let paragraphs = wml::story_paragraphs(doc, body);

    let title = paragraphs[1];
    let ppr = doc.child(title, "pPr").unwrap();
    assert_eq!(doc.attr(doc.child(ppr, "jc").unwrap(), "w:val"), Some("center"));
    let spacing = doc.child(ppr, "spacing").unwrap();
    assert_eq!(doc.attr(spacing, "w:before"), Some("240"));
    assert_eq!(doc.attr(spacing, "w:after"), Some("240"));
    let rpr = doc.child(wml::runs(doc, title)[0], "rPr").unwrap();
    assert!(doc.child(rpr, "b").is_some());
    assert_eq!(doc.attr(doc.child(rpr, "sz").unwrap(), "w:val"), Some("32"));
    assert_eq!(doc.attr(doc.child(rpr, "szCs").unwrap(), "w:val"), Some("32"));

    let field = paragraphs[2];
    assert_eq!(
        attr_values(doc, "fldChar", "w:fldCharType"),
        ["begin", "separate", "end"]
    );
    let instr = doc
        .descendants(field)
        .into_iter()
        .find(|&n| doc.is(n, "instrText"))
        .unwrap();
    let instr_text: String = doc.children(instr).iter().filter_map(|&t| doc.text(t)).collect();
    assert_eq!(instr_text, r#" TOC \o "1-3" \h \z \u "#);
    let placeholder = wml::runs(doc, field)
        .into_iter()
        .find(|&r| !wml::run_text(doc, r).is_empty())
        .unwrap();
    let color = doc.child(doc.child(placeholder, "rPr").unwrap(), "color").unwrap();
    assert_eq!(doc.attr(color, "w:val"), Some("808080"));

    assert_eq!(settings_children(&pkg), ["zoom", "updateFields"]);
    assert_eq!(update_fields_value(&pkg.settings().unwrap().tree).as_deref(), Some("true"));
}

#[test]
fn settings_part_is_created_when_missing() {
    let mut pkg = DocxBuilder::new().paragraph("#toc#").package();
    assert!(pkg.settings().is_none());

    assert!(insert_toc_at(&mut pkg, TOC_TOKEN, "Contents").unwrap());

    let rel = pkg.relationships().first_of_type(RT_SETTINGS).unwrap();
    assert_eq!(rel.target, "settings.xml");
    assert_eq!(
        pkg.content_types().override_for("word/settings.xml"),
        Some(CT_SETTINGS)
    );

    let reopened = reopen(&pkg);
    let settings = reopened.settings().unwrap();
    assert_eq!(settings.name, "word/settings.xml");
    assert_eq!(update_fields_value(&settings.tree).as_deref(), Some("true"));
    assert_eq!(body_texts(&reopened)[0], "Contents");
}

#[test]
fn update_fields_goes_before_later_settings() {
    let mut pkg = DocxBuilder::new()
        .paragraph("#toc#")
        .settings(
            "rId1",
            r#"<w:zoom w:percent="90"/><w:defaultTabStop w:val="420"/><w:compat/><w:rsids/>"#,
        )
        .package();

    insert_toc_at(&mut pkg, TOC_TOKEN, TOC_TITLE).unwrap();

    assert_eq!(
        settings_children(&pkg),
        ["zoom", "defaultTabStop", "updateFields", "compat", "rsids"]
    );
}

#[test]
fn existing_update_fields_is_switched_on() {
    let mut pkg = DocxBuilder::new()
        .paragraph("#toc#")
        .settings("rId1", r#"<w:updateFields w:val="false"/>"#)
        .package();

    insert_toc_at(&mut pkg, TOC_TOKEN, TOC_TITLE).unwrap();

    assert_eq!(settings_children(&pkg), ["updateFields"]);
    assert_eq!(update_fields_value(&pkg.settings().unwrap().tree).as_deref(), Some("true"));
}

#[test]
fn absent_token_leaves_package_untouched() {
    let mut pkg = DocxBuilder::new().paragraph("no contents here").package();
    let before = pkg.document().to_xml();

    assert!(!insert_toc_at(&mut pkg, TOC_TOKEN, TOC_TITLE).unwrap());

    assert_eq!(pkg.document().to_xml(), before);
    assert!(pkg.settings().is_none());
    assert!(pkg.relationships().is_empty());
}

#[test]
fn token_must_be_the_whole_paragraph() {
    let mut pkg = DocxBuilder::new()
        .paragraph("see #toc# below")
        .paragraph("   #toc#  ")
        .package();

    assert!(insert_toc_at(&mut pkg, TOC_TOKEN, TOC_TITLE).unwrap());

    let texts = body_texts(&pkg);
    assert_eq!(texts[0], "see #toc# below");
    assert_eq!(texts[1], TOC_TITLE);
    assert_eq!(texts.len(), 3);
}
