//! Picture insertion into body paragraphs and table cells.
//!
//! Problems with a single picture never abort the fill: the picture is
//! replaced by a short bracketed note in the document and the outcome is
//! reported as [`EmbedOutcome::Degraded`].

use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::config::ComposeConfig;
use crate::error::Warning;
use crate::package::Package;
use crate::wml::{self, DML_NS, PIC_NS, REL_NS, WPD_NS};
use crate::xml::{NodeId, XmlTree};

const PX_PER_INCH: f64 = 96.0;
const EMU_PER_INCH: f64 = 914_400.0;

/// One picture, optionally preceded by a caption paragraph.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageItem {
    pub path: PathBuf,
    pub caption: Option<String>,
}

impl ImageItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Where a picture goes: appended as a run to an existing body paragraph, or
/// in a new centered paragraph at the end of a table cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Paragraph(NodeId),
    Cell(NodeId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertedImage {
    pub rel_id: String,
    pub media_name: String,
    pub width_emu: u64,
    pub height_emu: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Degraded {
    /// The file does not exist or cannot be read.
    Missing { path: PathBuf },
    /// The file exists but is not an image we can size.
    Corrupt { path: PathBuf, reason: String },
}

impl Degraded {
    pub fn path(&self) -> &Path {
        match self {
            Degraded::Missing { path } | Degraded::Corrupt { path, .. } => path,
        }
    }

    pub fn warning(&self) -> Warning {
        Warning::ImageResolutionFailure {
            path: self.path().to_path_buf(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EmbedOutcome {
    Inserted(InsertedImage),
    Degraded(Degraded),
}

impl EmbedOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, EmbedOutcome::Inserted(_))
    }

    pub fn warning(&self) -> Option<Warning> {
        match self {
            EmbedOutcome::Inserted(_) => None,
            EmbedOutcome::Degraded(d) => Some(d.warning()),
        }
    }
}

struct ImageInfo {
    width: u32,
    height: u32,
    ext: &'static str,
    mime: &'static str,
}

fn probe(data: &[u8]) -> Result<ImageInfo, String> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    let format = reader
        .format()
        .ok_or_else(|| "unrecognized image format".to_string())?;
    let (width, height) = reader.into_dimensions().map_err(|e| e.to_string())?;
    Ok(ImageInfo {
        width,
        height,
        ext: format.extensions_str().first().copied().unwrap_or("bin"),
        mime: format.to_mime_type(),
    })
}

/// Dimensions straight from the JPEG SOF or PNG IHDR header.
fn sniff_dimensions(data: &[u8]) -> Option<ImageInfo> {
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
        let mut i = 2;
        while i + 4 < data.len() {
            if data[i] != 0xFF {
                return None;
            }
            let marker = data[i + 1];
            if marker == 0xD9 {
                break;
            }
            let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            if (marker == 0xC0 || marker == 0xC1 || marker == 0xC2) && i + 9 < data.len() {
                let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
                let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
                return Some(ImageInfo {
                    width,
                    height,
                    ext: "jpg",
                    mime: "image/jpeg",
                });
            }
            i += 2 + len;
        }
        return None;
    }

    if data.len() >= 24 && data[..4] == [0x89, 0x50, 0x4E, 0x47] {
        let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        return Some(ImageInfo {
            width,
            height,
            ext: "png",
            mime: "image/png",
        });
    }

    None
}

/// Display size in EMU. Pictures wider than the limit shrink to it, smaller
/// ones keep their natural size at 96 px/inch.
fn display_size(width_px: u32, height_px: u32, max_width_inches: f64, force_max: bool) -> (u64, u64) {
    let natural = width_px as f64 / PX_PER_INCH;
    let width_in = if force_max || natural > max_width_inches {
        max_width_inches
    } else {
        natural
    };
    let cx = (width_in * EMU_PER_INCH).round() as u64;
    let cy = (cx as f64 * height_px as f64 / width_px as f64).round() as u64;
    (cx, cy)
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct ImageEmbedder {
    config: ComposeConfig,
}

impl ImageEmbedder {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Relative paths are tried against the image base directory first and
    /// fall back to the path as given.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() || path.is_absolute() {
            return path.to_path_buf();
        }
        let joined = self.config.image_base_dir.join(path);
        if joined.exists() {
            joined
        } else {
            path.to_path_buf()
        }
    }

    /// Insert one picture at `target`.
    pub fn insert_image(&self, pkg: &mut Package, target: Target, path: &Path, max_width_inches: f64) -> EmbedOutcome {
        let p = match target {
            Target::Paragraph(p) => p,
            Target::Cell(tc) => {
                let doc = pkg.document_mut();
                let p = doc.add(tc, "w:p", &[]);
                wml::set_alignment(doc, p, "center");
                wml::clear_first_line_indent(doc, p);
                p
            }
        };
        self.embed_in_paragraph(pkg, p, path, max_width_inches)
    }

    fn embed_in_paragraph(&self, pkg: &mut Package, p: NodeId, path: &Path, max_width_inches: f64) -> EmbedOutcome {
        let resolved = self.resolve_path(path);
        let data = match std::fs::read(&resolved) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Image {} not readable: {e}", resolved.display());
                wml::add_run(pkg.document_mut(), p, &format!("[image missing: {}]", basename(path)));
                return EmbedOutcome::Degraded(Degraded::Missing {
                    path: path.to_path_buf(),
                });
            }
        };

        let (info, force_max) = match probe(&data) {
            Ok(info) => (info, false),
            Err(reason) => match sniff_dimensions(&data) {
                Some(info) => {
                    log::warn!("Image {} did not decode ({reason}), using header size", resolved.display());
                    (info, true)
                }
                None => return self.degrade_corrupt(pkg, p, path, reason),
            },
        };
        if info.width == 0 || info.height == 0 {
            return self.degrade_corrupt(pkg, p, path, "image has zero size".to_string());
        }

        let (cx, cy) = display_size(info.width, info.height, max_width_inches, force_max);
        let (rel_id, media_name) = pkg.add_image(data, info.ext, info.mime);

        let doc = pkg.document_mut();
        let doc_pr_id = wml::max_drawing_id(doc, doc.root()).saturating_add(1);
        let r = wml::add_run(doc, p, "");
        append_inline_drawing(doc, r, &rel_id, &media_name, &basename(path), doc_pr_id, cx, cy);

        log::debug!(
            "Embedded {} as {media_name} ({rel_id}, {:.2}in wide)",
            resolved.display(),
            cx as f64 / EMU_PER_INCH
        );
        EmbedOutcome::Inserted(InsertedImage {
            rel_id,
            media_name,
            width_emu: cx,
            height_emu: cy,
        })
    }

    fn degrade_corrupt(&self, pkg: &mut Package, p: NodeId, path: &Path, reason: String) -> EmbedOutcome {
        log::warn!("Image {} could not be inserted: {reason}", path.display());
        wml::add_run(pkg.document_mut(), p, &format!("[image insert error: {reason}]"));
        EmbedOutcome::Degraded(Degraded::Corrupt {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Replace `token` with a picture and optional caption. The first table
    /// cell containing the token wins, then the first body paragraph.
    /// Returns `None` when the token is nowhere in the body.
    pub fn insert_by_keyword(
        &self,
        pkg: &mut Package,
        token: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Option<EmbedOutcome> {
        let item = ImageItem {
            path: path.to_path_buf(),
            caption: caption.map(str::to_string),
        };
        match find_token(pkg.document(), token)? {
            Location::Cell(tc) => {
                let doc = pkg.document_mut();
                clear_token_in_cell(doc, tc, token);
                if wml::story_paragraphs(doc, tc).is_empty() {
                    doc.add(tc, "w:p", &[]);
                }
                let max_width = wml::cell_width_inches(doc, tc).unwrap_or(self.config.cell_image_width);
                let outcome = self.append_item_to_cell(pkg, tc, &item, max_width);
                drop_leading_empty_paragraph(pkg.document_mut(), tc);
                Some(outcome)
            }
            Location::Paragraph(p) => {
                clear_token_in_paragraph(pkg.document_mut(), p, token);
                let (outcome, _) = self.insert_item_after(pkg, p, &item, self.config.paragraph_image_width);
                remove_if_empty(pkg.document_mut(), p);
                Some(outcome)
            }
        }
    }

    /// Replace `token` with a caption + picture pair per item. With no items
    /// the token text is only removed. Returns `None` when the token is
    /// nowhere in the body.
    pub fn insert_list(&self, pkg: &mut Package, token: &str, items: &[ImageItem]) -> Option<Vec<EmbedOutcome>> {
        let location = find_token(pkg.document(), token)?;
        let doc = pkg.document_mut();
        match location {
            Location::Cell(tc) => {
                clear_token_in_cell(doc, tc, token);
                if items.is_empty() {
                    return Some(Vec::new());
                }
                Some(self.insert_into_cell(pkg, tc, items))
            }
            Location::Paragraph(p) => {
                clear_token_in_paragraph(doc, p, token);
                if items.is_empty() {
                    return Some(Vec::new());
                }
                let mut outcomes = Vec::with_capacity(items.len());
                let mut anchor = p;
                for item in items {
                    let (outcome, last) = self.insert_item_after(pkg, anchor, item, self.config.paragraph_image_width);
                    outcomes.push(outcome);
                    anchor = last;
                }
                remove_if_empty(pkg.document_mut(), p);
                Some(outcomes)
            }
        }
    }

    /// Replace the paragraphs of a cell with the given pictures. The cell
    /// always keeps at least one paragraph.
    pub fn insert_into_cell(&self, pkg: &mut Package, cell: NodeId, items: &[ImageItem]) -> Vec<EmbedOutcome> {
        let doc = pkg.document_mut();
        for p in wml::story_paragraphs(doc, cell) {
            doc.detach(p);
        }
        doc.add(cell, "w:p", &[]);
        let max_width = wml::cell_width_inches(doc, cell).unwrap_or(self.config.cell_image_width);

        let outcomes: Vec<EmbedOutcome> = items
            .iter()
            .map(|item| self.append_item_to_cell(pkg, cell, item, max_width))
            .collect();
        drop_leading_empty_paragraph(pkg.document_mut(), cell);
        outcomes
    }

    fn append_item_to_cell(&self, pkg: &mut Package, tc: NodeId, item: &ImageItem, max_width: f64) -> EmbedOutcome {
        let doc = pkg.document_mut();
        if let Some(caption) = item.caption.as_deref().filter(|c| !c.is_empty()) {
            let p = doc.add(tc, "w:p", &[]);
            caption_paragraph(doc, p, caption);
        }
        self.insert_image(pkg, Target::Cell(tc), &item.path, max_width)
    }

    /// Insert the caption and picture paragraphs after `anchor`; returns the
    /// outcome and the last paragraph inserted.
    fn insert_item_after(&self, pkg: &mut Package, anchor: NodeId, item: &ImageItem, max_width: f64) -> (EmbedOutcome, NodeId) {
        let doc = pkg.document_mut();
        let mut anchor = anchor;
        if let Some(caption) = item.caption.as_deref().filter(|c| !c.is_empty()) {
            let p = wml::new_paragraph(doc);
            doc.insert_after(anchor, p);
            caption_paragraph(doc, p, caption);
            anchor = p;
        }
        let p = wml::new_paragraph(doc);
        doc.insert_after(anchor, p);
        wml::set_alignment(doc, p, "center");
        wml::clear_first_line_indent(doc, p);
        let outcome = self.embed_in_paragraph(pkg, p, &item.path, max_width);
        (outcome, p)
    }
}

enum Location {
    Cell(NodeId),
    Paragraph(NodeId),
}

fn find_token(doc: &XmlTree, token: &str) -> Option<Location> {
    let body = wml::body(doc)?;
    if let Some(tc) = wml::all_cells(doc, body)
        .into_iter()
        .find(|&tc| wml::cell_text(doc, tc).contains(token))
    {
        return Some(Location::Cell(tc));
    }
    wml::story_paragraphs(doc, body)
        .into_iter()
        .find(|&p| wml::paragraph_text(doc, p).contains(token))
        .map(Location::Paragraph)
}

fn clear_token_in_paragraph(doc: &mut XmlTree, p: NodeId, token: &str) {
    let text = wml::paragraph_text(doc, p);
    if text.contains(token) {
        wml::set_paragraph_text(doc, p, &text.replace(token, ""));
    }
}

fn clear_token_in_cell(doc: &mut XmlTree, tc: NodeId, token: &str) {
    for p in wml::story_paragraphs(doc, tc) {
        clear_token_in_paragraph(doc, p, token);
    }
}

fn caption_paragraph(doc: &mut XmlTree, p: NodeId, caption: &str) {
    wml::set_alignment(doc, p, "left");
    wml::clear_first_line_indent(doc, p);
    wml::add_run(doc, p, caption);
}

fn is_blank(doc: &XmlTree, p: NodeId) -> bool {
    wml::paragraph_text(doc, p).trim().is_empty() && !wml::has_drawing(doc, p)
}

fn remove_if_empty(doc: &mut XmlTree, p: NodeId) {
    if is_blank(doc, p) {
        doc.detach(p);
    }
}

fn drop_leading_empty_paragraph(doc: &mut XmlTree, tc: NodeId) {
    let paragraphs = wml::story_paragraphs(doc, tc);
    if paragraphs.len() > 1 && is_blank(doc, paragraphs[0]) {
        doc.detach(paragraphs[0]);
    }
}

#[allow(clippy::too_many_arguments)]
fn append_inline_drawing(
    doc: &mut XmlTree,
    run: NodeId,
    rel_id: &str,
    media_name: &str,
    descr: &str,
    doc_pr_id: u64,
    cx: u64,
    cy: u64,
) {
    let (cx, cy, id) = (cx.to_string(), cy.to_string(), doc_pr_id.to_string());
    let name = format!("Picture {id}");
    let drawing = doc.add(run, "w:drawing", &[]);
    let inline = doc.add(
        drawing,
        "wp:inline",
        &[
            ("xmlns:wp", WPD_NS),
            ("xmlns:a", DML_NS),
            ("xmlns:pic", PIC_NS),
            ("xmlns:r", REL_NS),
            ("distT", "0"),
            ("distB", "0"),
            ("distL", "0"),
            ("distR", "0"),
        ],
    );
    doc.add(inline, "wp:extent", &[("cx", cx.as_str()), ("cy", cy.as_str())]);
    doc.add(inline, "wp:effectExtent", &[("l", "0"), ("t", "0"), ("r", "0"), ("b", "0")]);
    doc.add(
        inline,
        "wp:docPr",
        &[("id", id.as_str()), ("name", name.as_str()), ("descr", descr)],
    );
    let frame = doc.add(inline, "wp:cNvGraphicFramePr", &[]);
    doc.add(frame, "a:graphicFrameLocks", &[("noChangeAspect", "1")]);

    let graphic = doc.add(inline, "a:graphic", &[]);
    let data = doc.add(graphic, "a:graphicData", &[("uri", PIC_NS)]);
    let pic = doc.add(data, "pic:pic", &[]);

    let nv = doc.add(pic, "pic:nvPicPr", &[]);
    doc.add(nv, "pic:cNvPr", &[("id", "0"), ("name", media_name)]);
    doc.add(nv, "pic:cNvPicPr", &[]);

    let fill = doc.add(pic, "pic:blipFill", &[]);
    doc.add(fill, "a:blip", &[("r:embed", rel_id)]);
    let stretch = doc.add(fill, "a:stretch", &[]);
    doc.add(stretch, "a:fillRect", &[]);

    let sp = doc.add(pic, "pic:spPr", &[]);
    let xfrm = doc.add(sp, "a:xfrm", &[]);
    doc.add(xfrm, "a:off", &[("x", "0"), ("y", "0")]);
    doc.add(xfrm, "a:ext", &[("cx", cx.as_str()), ("cy", cy.as_str())]);
    let geom = doc.add(sp, "a:prstGeom", &[("prst", "rect")]);
    doc.add(geom, "a:avLst", &[]);
}
