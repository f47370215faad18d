//! WordprocessingML helpers over [`XmlTree`]: paragraph/run text, run and
//! paragraph properties, table traversal.

use crate::xml::{NodeId, XmlTree};

pub const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
pub const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

// Schema order of the pPr / rPr children we touch (CT_PPr, CT_RPr).
const PPR_ORDER: &[&str] = &[
    "pStyle", "keepNext", "keepLines", "pageBreakBefore", "framePr", "widowControl", "numPr",
    "suppressLineNumbers", "pBdr", "shd", "tabs", "suppressAutoHyphens", "kinsoku", "wordWrap",
    "overflowPunct", "topLinePunct", "autoSpaceDE", "autoSpaceDN", "bidi", "adjustRightInd",
    "snapToGrid", "spacing", "ind", "contextualSpacing", "mirrorIndents", "suppressOverlap", "jc",
    "textDirection", "textAlignment", "textboxTightWrap", "outlineLvl", "divId", "cnfStyle", "rPr",
    "sectPr", "pPrChange",
];

const RPR_ORDER: &[&str] = &[
    "rStyle", "rFonts", "b", "bCs", "i", "iCs", "caps", "smallCaps", "strike", "dstrike",
    "outline", "shadow", "emboss", "imprint", "noProof", "snapToGrid", "vanish", "webHidden",
    "color", "spacing", "w", "kern", "position", "sz", "szCs", "highlight", "u", "effect", "bdr",
    "shd", "fitText", "vertAlign", "rtl", "cs", "em", "lang", "eastAsianLayout", "specVanish",
    "oMath",
];

/// The `w:body` element of a document tree.
pub fn body(tree: &XmlTree) -> Option<NodeId> {
    tree.child(tree.root(), "body")
}

/// Runs of a paragraph in document order, including runs nested in hyperlinks.
pub fn runs(tree: &XmlTree, p: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for c in tree.child_elements(p) {
        if tree.is(c, "r") {
            out.push(c);
        } else if tree.is(c, "hyperlink") || tree.is(c, "smartTag") {
            out.extend(tree.children_named(c, "r"));
        }
    }
    out
}

pub fn run_text(tree: &XmlTree, r: NodeId) -> String {
    let mut text = String::new();
    for c in tree.child_elements(r) {
        if tree.is(c, "t") {
            for &t in tree.children(c) {
                if let Some(s) = tree.text(t) {
                    text.push_str(s);
                }
            }
        } else if tree.is(c, "tab") {
            text.push('\t');
        } else if tree.is(c, "cr") {
            text.push('\n');
        } else if tree.is(c, "br") {
            // Page and column breaks carry no text.
            match tree.attr(c, "w:type") {
                None | Some("textWrapping") => text.push('\n'),
                _ => {}
            }
        }
    }
    text
}

pub fn paragraph_text(tree: &XmlTree, p: NodeId) -> String {
    runs(tree, p).into_iter().map(|r| run_text(tree, r)).collect()
}

pub fn has_drawing(tree: &XmlTree, p: NodeId) -> bool {
    tree.descendants(p)
        .into_iter()
        .any(|n| tree.is(n, "drawing") || tree.is(n, "pict"))
}

/// Remove the text-bearing children of a run, keeping its properties and any
/// drawing content.
pub fn clear_run_text(tree: &mut XmlTree, r: NodeId) {
    let doomed: Vec<NodeId> = tree
        .child_elements(r)
        .filter(|&c| ["t", "tab", "br", "cr", "delText"].iter().any(|n| tree.is(c, n)))
        .collect();
    for c in doomed {
        tree.detach(c);
    }
}

/// Replace the text of a run. Newlines become `w:br`, tabs become `w:tab`.
pub fn set_run_text(tree: &mut XmlTree, r: NodeId, text: &str) {
    clear_run_text(tree, r);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            tree.add(r, "w:br", &[]);
        }
        for (j, chunk) in line.split('\t').enumerate() {
            if j > 0 {
                tree.add(r, "w:tab", &[]);
            }
            if !chunk.is_empty() {
                tree.add_text_element(r, "w:t", &[("xml:space", "preserve")], chunk);
            }
        }
    }
}

/// Set the whole text of a paragraph: the first run absorbs the text and keeps
/// its properties, the text of every later run is cleared.
pub fn set_paragraph_text(tree: &mut XmlTree, p: NodeId, text: &str) {
    let runs = runs(tree, p);
    match runs.split_first() {
        Some((&first, rest)) => {
            set_run_text(tree, first, text);
            for &r in rest {
                clear_run_text(tree, r);
            }
        }
        None => {
            add_run(tree, p, text);
        }
    }
}

pub fn add_run(tree: &mut XmlTree, p: NodeId, text: &str) -> NodeId {
    let r = tree.add(p, "w:r", &[]);
    if !text.is_empty() {
        set_run_text(tree, r, text);
    }
    r
}

pub fn new_paragraph(tree: &mut XmlTree) -> NodeId {
    tree.new_element("w:p", &[])
}

/// Paragraph holding a single page break run.
pub fn page_break_paragraph(tree: &mut XmlTree) -> NodeId {
    let p = new_paragraph(tree);
    let r = tree.add(p, "w:r", &[]);
    tree.add(r, "w:br", &[("w:type", "page")]);
    p
}

/// Find or create `local` under `parent`, inserted at its schema position.
pub fn ensure_child(tree: &mut XmlTree, parent: NodeId, local: &str, order: &[&str]) -> NodeId {
    if let Some(existing) = tree.child(parent, local) {
        return existing;
    }
    let rank = |name: &str| order.iter().position(|o| *o == name).unwrap_or(order.len());
    let my_rank = rank(local);
    let children: Vec<NodeId> = tree.children(parent).to_vec();
    let pos = children
        .iter()
        .position(|&c| {
            tree.name(c)
                .map(crate::xml::local_name)
                .is_some_and(|n| rank(n) > my_rank)
        })
        .unwrap_or(children.len());
    let node = tree.new_element(&format!("w:{local}"), &[]);
    tree.insert(parent, pos, node);
    node
}

pub fn ensure_ppr(tree: &mut XmlTree, p: NodeId) -> NodeId {
    if let Some(ppr) = tree.child(p, "pPr") {
        return ppr;
    }
    let ppr = tree.new_element("w:pPr", &[]);
    tree.insert(p, 0, ppr);
    ppr
}

pub fn ensure_rpr(tree: &mut XmlTree, r: NodeId) -> NodeId {
    if let Some(rpr) = tree.child(r, "rPr") {
        return rpr;
    }
    let rpr = tree.new_element("w:rPr", &[]);
    tree.insert(r, 0, rpr);
    rpr
}

pub fn set_ppr_value(tree: &mut XmlTree, p: NodeId, local: &str, attrs: &[(&str, &str)]) -> NodeId {
    let ppr = ensure_ppr(tree, p);
    let node = ensure_child(tree, ppr, local, PPR_ORDER);
    for (k, v) in attrs {
        tree.set_attr(node, k, v);
    }
    node
}

pub fn set_rpr_value(tree: &mut XmlTree, r: NodeId, local: &str, attrs: &[(&str, &str)]) -> NodeId {
    let rpr = ensure_rpr(tree, r);
    let node = ensure_child(tree, rpr, local, RPR_ORDER);
    for (k, v) in attrs {
        tree.set_attr(node, k, v);
    }
    node
}

/// `w:jc` value: `left`, `center`, `right`, `both`.
pub fn set_alignment(tree: &mut XmlTree, p: NodeId, jc: &str) {
    set_ppr_value(tree, p, "jc", &[("w:val", jc)]);
}

/// Zero the first-line indentation. Indentation inherited from styles is
/// additive, so it has to be overridden explicitly.
pub fn clear_first_line_indent(tree: &mut XmlTree, p: NodeId) {
    set_ppr_value(tree, p, "ind", &[("w:firstLine", "0"), ("w:firstLineChars", "0")]);
}

pub fn set_run_bold(tree: &mut XmlTree, r: NodeId) {
    set_rpr_value(tree, r, "b", &[]);
}

pub fn set_run_color(tree: &mut XmlTree, r: NodeId, hex: &str) {
    set_rpr_value(tree, r, "color", &[("w:val", hex)]);
}

/// Direct paragraph and table children of a story container (body, header,
/// footer, table cell).
pub fn story_paragraphs(tree: &XmlTree, container: NodeId) -> Vec<NodeId> {
    tree.children_named(container, "p").collect()
}

pub fn story_tables(tree: &XmlTree, container: NodeId) -> Vec<NodeId> {
    tree.children_named(container, "tbl").collect()
}

/// Cells of a table in row-major order (nested tables not included).
pub fn table_cells(tree: &XmlTree, tbl: NodeId) -> Vec<NodeId> {
    tree.children_named(tbl, "tr")
        .flat_map(|tr| tree.children_named(tr, "tc").collect::<Vec<_>>())
        .collect()
}

/// Cells of every table in a story, row-major, each table's nested tables
/// following the cell that holds them.
pub fn all_cells(tree: &XmlTree, container: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for tbl in story_tables(tree, container) {
        for tc in table_cells(tree, tbl) {
            out.push(tc);
            out.extend(all_cells(tree, tc));
        }
    }
    out
}

pub fn cell_text(tree: &XmlTree, tc: NodeId) -> String {
    story_paragraphs(tree, tc)
        .into_iter()
        .map(|p| paragraph_text(tree, p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cell width in inches when `w:tcW` is given in twips.
pub fn cell_width_inches(tree: &XmlTree, tc: NodeId) -> Option<f64> {
    let tcw = tree.child(tc, "tcPr").and_then(|pr| tree.child(pr, "tcW"))?;
    if tree.attr(tcw, "w:type").is_some_and(|t| t != "dxa") {
        return None;
    }
    tree.attr(tcw, "w:w")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|&w| w > 0.0)
        .map(|w| w / 1440.0)
}

/// Largest `wp:docPr` id under `id`, 0 when there is none.
pub fn max_drawing_id(tree: &XmlTree, id: NodeId) -> u64 {
    tree.descendants(id)
        .into_iter()
        .filter(|&n| tree.is(n, "docPr"))
        .filter_map(|n| tree.attr(n, "id").and_then(|v| v.parse::<u64>().ok()))
        .max()
        .unwrap_or(0)
}
