//! Concatenation of independent packages into one.
//!
//! The first source is the accumulator. Every later source has its
//! relationships re-issued from a single [`RelationshipIdAllocator`], its
//! media and per-document parts copied under `_docN` names, and its body
//! content imported with every relationship reference rewritten.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use crate::error::{MergeError, Warning};
use crate::package::{
    DOCUMENT_DIR, MEDIA_DIR, Package, RT_FOOTER, RT_HEADER, Relationship, RelationshipIdAllocator,
    Relationships, XmlPart, rels_part_name, resolve_target, split_ext,
};
use crate::wml::{self, REL_NS};
use crate::xml::{NodeId, XmlTree, local_name};

// Relationship kinds that name a part shared by the whole package. A source's
// relationship of one of these kinds maps onto the accumulator's.
const SINGLETON_KINDS: &[&str] = &[
    "styles",
    "stylesWithEffects",
    "settings",
    "webSettings",
    "fontTable",
    "theme",
    "numbering",
    "footnotes",
    "endnotes",
    "comments",
    "commentsExtended",
    "commentsIds",
    "commentsExtensible",
    "people",
    "customXml",
    "glossaryDocument",
];

pub struct MergeOutput {
    pub package: Package,
    pub warnings: Vec<Warning>,
}

/// Old relationship id → accumulator id for one source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdRemapTable {
    map: HashMap<String, String>,
}

impl IdRemapTable {
    pub fn get(&self, old: &str) -> Option<&str> {
        self.map.get(old).map(String::as_str)
    }

    fn insert(&mut self, old: String, new: String) {
        self.map.insert(old, new);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Incremental merge session over one accumulator package.
pub struct Composer {
    acc: Package,
    allocator: RelationshipIdAllocator,
    sect_pr: Option<NodeId>,
    sources: usize,
    next_drawing_id: u64,
    warnings: Vec<Warning>,
}

impl Composer {
    /// Start a session with `master` as the accumulator. Its trailing
    /// `w:sectPr` is held aside until [`finish`](Self::finish).
    pub fn new(mut master: Package) -> Self {
        let allocator = RelationshipIdAllocator::seeded(master.relationships());
        let doc = master.document_mut();
        let body = match wml::body(doc) {
            Some(body) => body,
            None => {
                let root = doc.root();
                doc.add(root, "w:body", &[])
            }
        };
        let sect_pr = doc
            .child_elements(body)
            .last()
            .filter(|&n| doc.is(n, "sectPr"));
        if let Some(sect_pr) = sect_pr {
            doc.detach(sect_pr);
        }
        let next_drawing_id = max_drawing_id(&master).saturating_add(1);
        Self {
            acc: master,
            allocator,
            sect_pr,
            sources: 1,
            next_drawing_id,
            warnings: Vec::new(),
        }
    }

    /// Append the body of `source`, optionally after a page break.
    pub fn append(&mut self, source: &Package, page_break: bool) {
        self.sources += 1;
        let suffix = format!("_doc{}", self.sources);
        let Some(src_body) = wml::body(source.document()) else {
            log::warn!("Source {} has no body; nothing appended", self.sources);
            return;
        };

        if page_break {
            let doc = self.acc.document_mut();
            if let Some(body) = wml::body(doc) {
                let p = wml::page_break_paragraph(doc);
                doc.append(body, p);
            }
        }

        let remap = self.copy_relationships(source, &suffix);
        log::debug!(
            "Source {}: {} relationships remapped",
            self.sources,
            remap.len()
        );
        self.copy_body(source, src_body, &remap);
    }

    /// Restore the held section properties and hand back the merged package.
    pub fn finish(mut self) -> MergeOutput {
        if let Some(sect_pr) = self.sect_pr {
            let doc = self.acc.document_mut();
            if let Some(body) = wml::body(doc) {
                doc.append(body, sect_pr);
            }
        }
        MergeOutput {
            package: self.acc,
            warnings: self.warnings,
        }
    }

    fn copy_relationships(&mut self, source: &Package, suffix: &str) -> IdRemapTable {
        let mut remap = IdRemapTable::default();
        let mut copied_media = HashMap::new();

        for rel in source.relationships().iter() {
            let target = if rel.external {
                Some(rel.target.clone())
            } else if let Some(name) = Package::media_name_for_target(&rel.target)
                && let Some(data) = source.media().get(&name)
            {
                let new_name = self.copy_media(source, &name, data, suffix, &mut copied_media);
                Some(format!("media/{new_name}"))
            } else if SINGLETON_KINDS.contains(&rel.kind()) {
                match self.acc.relationships().first_of_type(&rel.rel_type) {
                    Some(existing) => remap.insert(rel.id.clone(), existing.id.clone()),
                    None => log::debug!("Dropping {} relationship {}", rel.kind(), rel.id),
                }
                None
            } else {
                self.copy_part(source, rel, suffix, &mut copied_media)
            };

            if let Some(target) = target {
                let id = self.allocator.allocate();
                remap.insert(rel.id.clone(), id.clone());
                self.acc.relationships_mut().push(Relationship {
                    id,
                    rel_type: rel.rel_type.clone(),
                    target,
                    external: rel.external,
                });
            }
        }
        remap
    }

    /// Copy one media blob under a suffixed name, once per source.
    fn copy_media(
        &mut self,
        source: &Package,
        name: &str,
        data: &[u8],
        suffix: &str,
        copied: &mut HashMap<String, String>,
    ) -> String {
        if let Some(done) = copied.get(name) {
            return done.clone();
        }
        let new_name = self.acc.media().disambiguate(name, suffix);
        let ext = split_ext(&new_name).1.trim_start_matches('.').to_string();
        if !ext.is_empty() {
            let content_type = source
                .content_types()
                .default_for(&ext)
                .unwrap_or_else(|| guess_content_type(&ext))
                .to_string();
            self.acc.content_types_mut().ensure_default(&ext, &content_type);
        }
        self.acc.media_mut().insert(new_name.clone(), data.to_vec());
        copied.insert(name.to_string(), new_name.clone());
        new_name
    }

    /// Copy a per-document part (header, footer, chart, …) with its content
    /// type and its own relationships. Returns the new target relative to the
    /// main document.
    fn copy_part(
        &mut self,
        source: &Package,
        rel: &Relationship,
        suffix: &str,
        copied_media: &mut HashMap<String, String>,
    ) -> Option<String> {
        let part = resolve_target(DOCUMENT_DIR, &rel.target);
        let Some(data) = source.part_bytes(&part) else {
            log::warn!(
                "Relationship {} points at missing part {part}; dropped",
                rel.id
            );
            return None;
        };
        let new_part = self.unique_part_name(&part, suffix);

        match source.content_types().override_for(&part) {
            Some(ct) => {
                let ct = ct.to_string();
                self.acc.content_types_mut().set_override(&new_part, &ct);
            }
            None => {
                let ext = split_ext(&part).1.trim_start_matches('.');
                if let Some(ct) = source.content_types().default_for(ext) {
                    let ct = ct.to_string();
                    self.acc.content_types_mut().ensure_default(ext, &ct);
                }
            }
        }

        let rels_name = rels_part_name(&part);
        if let Some(rels_data) = source.part_bytes(&rels_name) {
            let text = String::from_utf8_lossy(&rels_data);
            match Relationships::parse(text.trim_start_matches('\u{feff}'), &rels_name) {
                Ok(mut rels) => {
                    let part_dir = part.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
                    for r in rels.iter_mut().filter(|r| !r.external) {
                        let resolved = resolve_target(part_dir, &r.target);
                        if let Some(name) = resolved.strip_prefix(MEDIA_DIR)
                            && let Some(bytes) = source.media().get(name)
                        {
                            let new_name = self.copy_media(source, name, bytes, suffix, copied_media);
                            r.target = if part_dir == DOCUMENT_DIR {
                                format!("media/{new_name}")
                            } else {
                                format!("/{MEDIA_DIR}{new_name}")
                            };
                        }
                    }
                    self.acc
                        .put_part(rels_part_name(&new_part), rels.to_xml().into_bytes());
                }
                Err(e) => {
                    log::warn!("Copying unreadable {rels_name} as is: {e}");
                    self.acc.put_part(rels_part_name(&new_part), rels_data.clone());
                }
            }
        }

        let is_story = rel.rel_type == RT_HEADER || rel.rel_type == RT_FOOTER;
        let tree = if is_story {
            std::str::from_utf8(&data)
                .ok()
                .and_then(|t| XmlTree::parse(t.trim_start_matches('\u{feff}')).ok())
        } else {
            None
        };
        match tree {
            Some(mut tree) => {
                let root = tree.root();
                renumber_drawings(&mut tree, root, &mut self.next_drawing_id);
                let part = XmlPart {
                    name: new_part.clone(),
                    tree,
                };
                if rel.rel_type == RT_HEADER {
                    self.acc.push_header(part);
                } else {
                    self.acc.push_footer(part);
                }
            }
            None => self.acc.put_part(new_part.clone(), data),
        }
        log::debug!("Copied {part} as {new_part}");

        Some(match new_part.strip_prefix("word/") {
            Some(rest) => rest.to_string(),
            None => format!("/{new_part}"),
        })
    }

    fn unique_part_name(&self, part: &str, suffix: &str) -> String {
        let (stem, ext) = split_ext(part);
        let mut candidate = format!("{stem}{suffix}{ext}");
        let mut n = 1;
        while self.acc.has_part(&candidate) {
            candidate = format!("{stem}{suffix}_{n}{ext}");
            n += 1;
        }
        candidate
    }

    fn copy_body(&mut self, source: &Package, src_body: NodeId, remap: &IdRemapTable) {
        let src = source.document();
        let ref_prefixes = src.prefixes_for(REL_NS);
        let local_decls = adopt_namespaces(self.acc.document_mut(), src, src_body);

        let doc = self.acc.document_mut();
        let Some(body) = wml::body(doc) else {
            return;
        };
        for &child in src.children(src_body) {
            if !src.is_element(child) || src.is(child, "sectPr") {
                continue;
            }
            let copy = doc.import(src, child);
            for (key, uri) in &local_decls {
                if doc.attr(copy, key).is_none() {
                    doc.set_attr(copy, key, uri);
                }
            }
            rewrite_references(doc, copy, &ref_prefixes, remap, &mut self.warnings);
            renumber_drawings(doc, copy, &mut self.next_drawing_id);
            doc.append(body, copy);
        }
    }
}

fn guess_content_type(ext: &str) -> &'static str {
    image::ImageFormat::from_extension(ext)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

fn max_drawing_id(pkg: &Package) -> u64 {
    let doc = pkg.document();
    let mut max = wml::max_drawing_id(doc, doc.root());
    for part in pkg.headers().iter().chain(pkg.footers()) {
        max = max.max(wml::max_drawing_id(&part.tree, part.tree.root()));
    }
    max
}

/// Declare the source's namespaces on the accumulator root. Returns the
/// declarations whose prefix is already bound to another URI there; those are
/// repeated on each imported element instead.
fn adopt_namespaces(acc: &mut XmlTree, src: &XmlTree, src_body: NodeId) -> Vec<(String, String)> {
    let acc_root = acc.root();
    let mut local = Vec::new();
    for scope in [src.root(), src_body] {
        for (key, uri) in src.attrs(scope) {
            if key != "xmlns" && !key.starts_with("xmlns:") {
                continue;
            }
            let existing = acc.attr(acc_root, key).map(str::to_string);
            match existing {
                None => acc.set_attr(acc_root, key, uri),
                Some(bound) if bound != *uri => local.push((key.clone(), uri.clone())),
                Some(_) => {}
            }
        }
    }

    // Union of mc:Ignorable prefixes.
    let src_ignorable = src
        .attrs(src.root())
        .iter()
        .find(|(k, _)| k.contains(':') && local_name(k) == "Ignorable")
        .cloned();
    if let Some((src_key, tokens)) = src_ignorable {
        let key = acc
            .attrs(acc_root)
            .iter()
            .find(|(k, _)| k.contains(':') && local_name(k) == "Ignorable")
            .map(|(k, _)| k.clone())
            .unwrap_or(src_key);
        let mut merged: Vec<String> = acc
            .attr(acc_root, &key)
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        for token in tokens.split_whitespace() {
            if !merged.iter().any(|m| m == token) {
                merged.push(token.to_string());
            }
        }
        acc.set_attr(acc_root, &key, &merged.join(" "));
    }
    local
}

fn rewrite_references(
    tree: &mut XmlTree,
    root: NodeId,
    prefixes: &[String],
    remap: &IdRemapTable,
    warnings: &mut Vec<Warning>,
) {
    for n in tree.descendants(root) {
        for (key, old) in tree.attrs_with_prefix(n, prefixes) {
            match remap.get(&old) {
                Some(new) => tree.set_attr(n, &key, new),
                None => {
                    let warning = Warning::ReferenceInconsistency { old_id: old };
                    if !warnings.contains(&warning) {
                        log::warn!("{warning}");
                        warnings.push(warning);
                    }
                }
            }
        }
    }
}

fn renumber_drawings(tree: &mut XmlTree, root: NodeId, next: &mut u64) {
    for n in tree.descendants(root) {
        if tree.is(n, "docPr") {
            tree.set_attr(n, "id", &next.to_string());
            *next = next.saturating_add(1);
        }
    }
}

/// Merge packages in order. The first is the accumulator; each later one is
/// appended, after a page break when `add_page_breaks` is set.
pub fn merge(sources: impl IntoIterator<Item = Package>, add_page_breaks: bool) -> Result<MergeOutput, MergeError> {
    let t0 = Instant::now();
    let mut sources = sources.into_iter();
    let master = sources.next().ok_or(MergeError::NoValidInputs)?;
    let mut composer = Composer::new(master);
    for source in sources {
        composer.append(&source, add_page_breaks);
    }
    let count = composer.sources;
    let out = composer.finish();
    log::info!(
        "Merged {count} documents in {:.1}ms ({} warnings)",
        t0.elapsed().as_secs_f64() * 1000.0,
        out.warnings.len()
    );
    Ok(out)
}

/// Load and merge documents from disk. Inputs that cannot be loaded are
/// skipped with a [`Warning::PartialSkip`].
pub fn merge_files<P: AsRef<Path>>(paths: &[P], add_page_breaks: bool) -> Result<MergeOutput, MergeError> {
    let t0 = Instant::now();
    let mut skipped = Vec::new();
    let mut composer: Option<Composer> = None;

    for path in paths {
        let path = path.as_ref();
        match Package::load(path) {
            Ok(pkg) => match &mut composer {
                Some(c) => c.append(&pkg, add_page_breaks),
                None => composer = Some(Composer::new(pkg)),
            },
            Err(e) => {
                log::warn!("Skipping {}: {e}", path.display());
                skipped.push(Warning::PartialSkip {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let composer = composer.ok_or(MergeError::NoValidInputs)?;
    let count = composer.sources;
    let mut out = composer.finish();
    skipped.append(&mut out.warnings);
    out.warnings = skipped;
    log::info!(
        "Merged {count} of {} documents in {:.1}ms ({} warnings)",
        paths.len(),
        t0.elapsed().as_secs_f64() * 1000.0,
        out.warnings.len()
    );
    Ok(out)
}
