//! Table-of-contents field injection.

use crate::error::DecodeError;
use crate::package::Package;
use crate::wml;
use crate::xml::{NodeId, XmlTree};

pub const TOC_TOKEN: &str = "#toc#";
pub const TOC_TITLE: &str = "目  录";

const TOC_INSTRUCTION: &str = r#" TOC \o "1-3" \h \z \u "#;
const TOC_PLACEHOLDER: &str = "请更新目录：右键点击此处 → 更新域，或按 Ctrl+A 后按 F9";

// Settings children that follow w:updateFields in CT_Settings.
const AFTER_UPDATE_FIELDS: &[&str] = &[
    "hdrShapeDefaults", "footnotePr", "endnotePr", "compat", "docVars", "rsids", "mathPr",
    "attachedSchema", "themeFontLang", "clrSchemeMapping", "doNotIncludeSubdocsInStats",
    "doNotAutoCompressPictures", "forceUpgrade", "captions", "readModeInkLockDown", "smartTagType",
    "schemaLibrary", "shapeDefaults", "doNotEmbedSmartTags", "decimalSymbol", "listSeparator",
];

/// Replace the first body paragraph whose trimmed text is `token` with a
/// title paragraph and a TOC field, and ask Word to refresh fields on open.
/// Returns `Ok(false)` without touching the package when the token is absent.
pub fn insert_toc_at(pkg: &mut Package, token: &str, title: &str) -> Result<bool, DecodeError> {
    let doc = pkg.document();
    let target = wml::body(doc).and_then(|body| {
        wml::story_paragraphs(doc, body)
            .into_iter()
            .find(|&p| wml::paragraph_text(doc, p).trim() == token)
    });
    let Some(target) = target else {
        log::warn!("TOC placeholder {token} not found");
        return Ok(false);
    };

    let settings = pkg.settings_mut()?;
    let root = settings.tree.root();
    set_update_fields(&mut settings.tree, root);

    let doc = pkg.document_mut();
    let title_p = title_paragraph(doc, title);
    doc.insert_before(target, title_p);
    let field_p = field_paragraph(doc);
    doc.insert_before(target, field_p);
    doc.detach(target);
    log::debug!("Inserted TOC field at {token}");
    Ok(true)
}

fn title_paragraph(doc: &mut XmlTree, title: &str) -> NodeId {
    let p = wml::new_paragraph(doc);
    wml::set_ppr_value(doc, p, "spacing", &[("w:before", "240"), ("w:after", "240")]);
    wml::set_alignment(doc, p, "center");
    let r = wml::add_run(doc, p, title);
    wml::set_run_bold(doc, r);
    wml::set_rpr_value(doc, r, "sz", &[("w:val", "32")]);
    wml::set_rpr_value(doc, r, "szCs", &[("w:val", "32")]);
    p
}

fn field_paragraph(doc: &mut XmlTree) -> NodeId {
    let p = wml::new_paragraph(doc);
    doc.add(p, "w:pPr", &[]);

    let begin = doc.add(p, "w:r", &[]);
    doc.add(begin, "w:fldChar", &[("w:fldCharType", "begin")]);

    let instr = doc.add(p, "w:r", &[]);
    doc.add_text_element(instr, "w:instrText", &[("xml:space", "preserve")], TOC_INSTRUCTION);

    let separate = doc.add(p, "w:r", &[]);
    doc.add(separate, "w:fldChar", &[("w:fldCharType", "separate")]);

    let placeholder = wml::add_run(doc, p, TOC_PLACEHOLDER);
    wml::set_run_color(doc, placeholder, "808080");

    let end = doc.add(p, "w:r", &[]);
    doc.add(end, "w:fldChar", &[("w:fldCharType", "end")]);
    p
}

fn set_update_fields(tree: &mut XmlTree, settings: NodeId) {
    if let Some(existing) = tree.child(settings, "updateFields") {
        tree.set_attr(existing, "w:val", "true");
        return;
    }
    let node = tree.new_element("w:updateFields", &[("w:val", "true")]);
    let later = tree
        .child_elements(settings)
        .find(|&c| AFTER_UPDATE_FIELDS.iter().any(|n| tree.is(c, n)));
    match later {
        Some(sibling) => tree.insert_before(sibling, node),
        None => tree.append(settings, node),
    }
}
