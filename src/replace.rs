//! Placeholder substitution over the body, table cells, headers and footers.

use std::time::Instant;

use crate::package::Package;
use crate::wml;
use crate::xml::{NodeId, XmlTree};

/// Reserved token rendered as a colored bold run in risk-color mode.
pub const RISK_TOKEN: &str = "#overall_risk_level#";

const RISK_LEVEL_COLORS: &[(&str, &str)] = &[
    ("无风险", "198754"),
    ("信息性", "17a2b8"),
    ("低危", "28a745"),
    ("中危", "fd7e14"),
    ("高危", "dc3545"),
    ("超危", "8B0000"),
    ("严重", "8B0000"),
    ("低风险", "28a745"),
    ("中风险", "fd7e14"),
    ("高风险", "dc3545"),
    ("None", "198754"),
    ("Info", "17a2b8"),
    ("Low", "28a745"),
    ("Medium", "fd7e14"),
    ("High", "dc3545"),
    ("Critical", "8B0000"),
];

/// Hex color for a risk level label.
pub fn risk_color(level: &str) -> Option<&'static str> {
    RISK_LEVEL_COLORS
        .iter()
        .find(|(label, _)| *label == level)
        .map(|(_, color)| *color)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Replacement {
    /// Literal text; newlines split the paragraph.
    Text(String),
    /// Delete the token.
    Remove,
}

impl Replacement {
    pub fn as_str(&self) -> &str {
        match self {
            Replacement::Text(s) => s,
            Replacement::Remove => "",
        }
    }
}

impl From<&str> for Replacement {
    fn from(s: &str) -> Self {
        Replacement::Text(s.to_string())
    }
}

impl From<String> for Replacement {
    fn from(s: String) -> Self {
        Replacement::Text(s)
    }
}

/// `#key#` unless the key is already wrapped.
pub fn wrap_key(key: &str) -> String {
    if key.len() >= 2 && key.starts_with('#') && key.ends_with('#') {
        key.to_string()
    } else {
        format!("#{key}#")
    }
}

/// Ordered token → replacement map. Substitutions are applied in insertion
/// order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaceholderMap {
    entries: Vec<(String, Replacement)>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Replacement>,
    {
        let mut map = Self::new();
        for (k, v) in pairs {
            map.insert(k.as_ref(), v);
        }
        map
    }

    /// Set the replacement for `key`, wrapping it as `#key#` if needed. An
    /// existing entry keeps its position.
    pub fn insert(&mut self, key: &str, value: impl Into<Replacement>) {
        let token = wrap_key(key);
        let value = value.into();
        match self.entries.iter_mut().find(|(t, _)| *t == token) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((token, value)),
        }
    }

    pub fn remove_token(&mut self, key: &str) {
        self.insert(key, Replacement::Remove);
    }

    pub fn get(&self, key: &str) -> Option<&Replacement> {
        let token = wrap_key(key);
        self.entries.iter().find(|(t, _)| *t == token).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Replacement)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matches(&self, text: &str) -> bool {
        self.entries.iter().any(|(t, _)| text.contains(t.as_str()))
    }

    fn substitute(&self, text: &str, skip: Option<&str>) -> String {
        let mut out = text.to_string();
        for (token, value) in &self.entries {
            if Some(token.as_str()) == skip {
                continue;
            }
            if out.contains(token.as_str()) {
                out = out.replace(token.as_str(), value.as_str());
            }
        }
        out
    }
}

/// Substitute every token of `map` in the document body, its tables, and every
/// header and footer. Unknown tokens are left as they are.
pub fn replace(pkg: &mut Package, map: &PlaceholderMap, color_mode: bool) {
    if map.is_empty() {
        return;
    }
    let t0 = Instant::now();
    let mut touched = 0;

    let doc = pkg.document_mut();
    if let Some(body) = wml::body(doc) {
        touched += replace_in_story(doc, body, map, color_mode);
    }
    for part in pkg.headers_mut() {
        let root = part.tree.root();
        touched += replace_in_story(&mut part.tree, root, map, color_mode);
    }
    for part in pkg.footers_mut() {
        let root = part.tree.root();
        touched += replace_in_story(&mut part.tree, root, map, color_mode);
    }

    log::debug!(
        "Replaced placeholders in {touched} paragraphs ({} tokens) in {:.1}ms",
        map.len(),
        t0.elapsed().as_secs_f64() * 1000.0
    );
}

fn replace_in_story(tree: &mut XmlTree, container: NodeId, map: &PlaceholderMap, color_mode: bool) -> usize {
    let mut touched = 0;
    for p in wml::story_paragraphs(tree, container) {
        if replace_in_paragraph(tree, p, map, color_mode) {
            touched += 1;
        }
    }
    for tc in wml::all_cells(tree, container) {
        if !wml::cell_text(tree, tc).contains('#') {
            continue;
        }
        for p in wml::story_paragraphs(tree, tc) {
            if replace_in_paragraph(tree, p, map, color_mode) {
                touched += 1;
            }
        }
    }
    touched
}

fn replace_in_paragraph(tree: &mut XmlTree, p: NodeId, map: &PlaceholderMap, color_mode: bool) -> bool {
    let text = wml::paragraph_text(tree, p);
    if !text.contains('#') || !map.matches(&text) {
        return false;
    }

    if color_mode
        && text.contains(RISK_TOKEN)
        && let Some(Replacement::Text(level)) = map.get(RISK_TOKEN)
        && let Some(color) = risk_color(level)
    {
        write_colored(tree, p, &text, map, level, color);
        return true;
    }

    let multiline = map
        .iter()
        .any(|(t, v)| text.contains(t) && v.as_str().contains('\n'));
    let substituted = map.substitute(&text, None);

    if multiline {
        let lines: Vec<&str> = substituted
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .collect();
        match lines.split_first() {
            Some((first, rest)) => {
                wml::set_paragraph_text(tree, p, first);
                let mut anchor = p;
                for line in rest {
                    let sibling = sibling_paragraph(tree, p, line);
                    tree.insert_after(anchor, sibling);
                    anchor = sibling;
                }
            }
            None => wml::set_paragraph_text(tree, p, ""),
        }
    } else {
        wml::set_paragraph_text(tree, p, &substituted);
    }
    true
}

/// New paragraph with the properties of `template` and a single run carrying
/// the properties of its first run.
fn sibling_paragraph(tree: &mut XmlTree, template: NodeId, text: &str) -> NodeId {
    let p = wml::new_paragraph(tree);
    if let Some(ppr) = tree.child(template, "pPr") {
        let copy = tree.deep_clone(ppr);
        tree.append(p, copy);
    }
    let r = tree.add(p, "w:r", &[]);
    if let Some(rpr) = first_run_properties(tree, template) {
        let copy = tree.deep_clone(rpr);
        tree.append(r, copy);
    }
    wml::set_run_text(tree, r, text);
    p
}

fn first_run_properties(tree: &XmlTree, p: NodeId) -> Option<NodeId> {
    let first = wml::runs(tree, p).into_iter().next()?;
    tree.child(first, "rPr")
}

/// Rebuild the paragraph's runs so the risk level stands alone in a bold,
/// colored run. The other tokens are substituted as plain text.
fn write_colored(tree: &mut XmlTree, p: NodeId, text: &str, map: &PlaceholderMap, level: &str, color: &str) {
    let base_rpr = first_run_properties(tree, p).map(|rpr| tree.deep_clone(rpr));
    for r in wml::runs(tree, p) {
        tree.detach(r);
    }

    let new_run = |tree: &mut XmlTree, p: NodeId, text: &str| {
        let r = tree.add(p, "w:r", &[]);
        if let Some(rpr) = base_rpr {
            let copy = tree.deep_clone(rpr);
            tree.append(r, copy);
        }
        wml::set_run_text(tree, r, text);
        r
    };

    for (i, segment) in text.split(RISK_TOKEN).enumerate() {
        if i > 0 {
            let r = new_run(tree, p, level);
            wml::set_run_bold(tree, r);
            wml::set_run_color(tree, r, color);
        }
        let plain = map.substitute(segment, Some(RISK_TOKEN));
        if !plain.is_empty() {
            new_run(tree, p, &plain);
        }
    }
}
