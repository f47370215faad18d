mod common;

use common::*;
use docx_compose::wml;
use docx_compose::{
    ComposeConfig, FillRequest, ImageItem, Package, PlaceholderMap, TOC_TITLE, Warning,
    fill_template, merge_documents,
};

fn template() -> DocxBuilder {
    DocxBuilder::new()
        .paragraph("#title#")
        .paragraph("#toc#")
        .paragraph("Overall: #overall_risk_level#")
        .paragraph("#shot#")
        .body(&table(&para("#evidence#")))
        .paragraph("Findings:\n#findings#")
        .header("rId1", "header1.xml", &para("#title# | confidential"))
}

#[test]
fn template_is_filled_end_to_end() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = template().write_to(&dir.path().join("template.docx"));
    std::fs::write(dir.path().join("shot.png"), png(480, 240, 5)).unwrap();
    std::fs::write(dir.path().join("a.png"), png(100, 100, 50)).unwrap();

    let request = FillRequest {
        values: PlaceholderMap::from_pairs([
            ("title", "Quarterly Review"),
            ("overall_risk_level", "High"),
            ("findings", "one\ntwo"),
        ]),
        images: vec![(
            "shot".to_string(),
            ImageItem::new("shot.png").with_caption("Figure 1"),
        )],
        image_lists: vec![(
            "#evidence#".to_string(),
            vec![
                ImageItem::new("a.png").with_caption("A"),
                ImageItem::new("missing.png"),
            ],
        )],
        toc: true,
        config: ComposeConfig {
            risk_color: true,
            ..ComposeConfig::default().with_image_dir(dir.path())
        },
    };

    let output = dir.path().join("report.docx");
    let report = fill_template(&input, &output, &request).unwrap();

    assert_eq!(report.output, output);
    assert_eq!(
        report.warnings,
        [Warning::ImageResolutionFailure {
            path: "missing.png".into()
        }]
    );

    let pkg = Package::load(&report.output).unwrap();
    let texts = body_texts(&pkg);
    assert_eq!(texts[0], "Quarterly Review");
    assert_eq!(texts[1], TOC_TITLE);
    assert_eq!(texts[3], "Overall: High");
    assert_eq!(texts[4], "Figure 1");
    assert!(texts.iter().all(|t| !t.contains('#')), "{texts:?}");
    assert!(texts.contains(&"one".to_string()));
    assert!(texts.contains(&"two".to_string()));

    let doc = pkg.document();
    let tc = wml::all_cells(doc, wml::body(doc).unwrap())[0];
    let cell: Vec<String> = wml::story_paragraphs(doc, tc)
        .into_iter()
        .map(|p| wml::paragraph_text(doc, p))
        .collect();
    assert_eq!(cell, ["A", "", "[image missing: missing.png]"]);

    assert_eq!(pkg.media().len(), 2);
    assert_eq!(attr_values(doc, "color", "w:val").len(), 2);
    let header = &pkg.headers()[0].tree;
    let p = wml::story_paragraphs(header, header.root())[0];
    assert_eq!(wml::paragraph_text(header, p), "Quarterly Review | confidential");
    assert!(pkg.settings().is_some());
}

#[test]
fn repeated_fill_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let input = DocxBuilder::new()
        .paragraph("Hello #name#")
        .write_to(&dir.path().join("t.docx"));
    let output = dir.path().join("out.docx");
    let request = FillRequest {
        values: PlaceholderMap::from_pairs([("name", "world")]),
        ..FillRequest::default()
    };

    let first = fill_template(&input, &output, &request).unwrap();
    let second = fill_template(&input, &output, &request).unwrap();

    assert_eq!(first.output, output);
    assert_eq!(second.output, dir.path().join("out-1.docx"));
    for path in [&first.output, &second.output] {
        assert_eq!(body_texts(&Package::load(path).unwrap()), ["Hello world"]);
    }
}

#[test]
fn missing_template_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = fill_template(
        &dir.path().join("nope.docx"),
        &dir.path().join("out.docx"),
        &FillRequest::default(),
    );
    assert!(result.is_err());
    assert!(!dir.path().join("out.docx").exists());
}

#[test]
fn documents_are_merged_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = [
        DocxBuilder::new()
            .paragraph("cover")
            .write_to(&dir.path().join("a.docx")),
        dir.path().join("absent.docx"),
        DocxBuilder::new()
            .paragraph("body")
            .write_to(&dir.path().join("b.docx")),
    ];
    let output = dir.path().join("merged.docx");

    let report = merge_documents(&inputs, &output, true).unwrap();

    assert_eq!(report.output, output);
    assert!(matches!(report.warnings.as_slice(), [Warning::PartialSkip { .. }]));
    let pkg = Package::load(&output).unwrap();
    assert_eq!(body_texts(&pkg), ["cover", "", "body"]);
}

#[test]
fn merging_nothing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = [dir.path().join("x.docx")];
    let err = merge_documents(&inputs, &dir.path().join("m.docx"), true).unwrap_err();
    assert!(matches!(
        err,
        docx_compose::Error::Merge(docx_compose::MergeError::NoValidInputs)
    ));
}
