#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use docx_compose::Package;
use docx_compose::wml;
use docx_compose::xml::XmlTree;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

pub const RT_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const RT_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const RT_HEADER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const RT_FOOTER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
pub const RT_SETTINGS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
pub const RT_HYPERLINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

const CT_HEADER: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";
const CT_FOOTER: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";
const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
const CT_SETTINGS: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";

pub const SECT_PR: &str = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// `<w:p>` with a single plain run.
pub fn para(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, escape(text))
}

/// `<w:p>` with one run per text piece, each with the given run properties.
pub fn para_runs(ppr: &str, runs: &[(&str, &str)]) -> String {
    let mut xml = format!("<w:p>{ppr}");
    for (rpr, text) in runs {
        xml.push_str(&format!(
            r#"<w:r>{rpr}<w:t xml:space="preserve">{}</w:t></w:r>"#,
            escape(text)
        ));
    }
    xml.push_str("</w:p>");
    xml
}

/// Single-cell table holding the given paragraphs.
pub fn table(cell_xml: &str) -> String {
    format!("<w:tbl><w:tr><w:tc>{cell_xml}</w:tc></w:tr></w:tbl>")
}

/// Paragraph holding an inline picture that references `rel_id`.
pub fn drawing_para(rel_id: &str, doc_pr_id: u32) -> String {
    format!(
        concat!(
            r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="914400" cy="914400"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}"/><a:graphic><a:graphicData uri="{pic}">"#,
            r#"<pic:pic><pic:blipFill><a:blip r:embed="{rel}"/></pic:blipFill></pic:pic>"#,
            r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ),
        id = doc_pr_id,
        pic = PIC_NS,
        rel = rel_id
    )
}

/// Solid-color PNG of the given size.
pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, 128, 255 - shade]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// In-memory DOCX fixture.
#[derive(Clone)]
pub struct DocxBuilder {
    root_attrs: String,
    body: String,
    sect_pr: Option<String>,
    rels: Vec<(String, String, String, bool)>,
    parts: Vec<(String, Option<String>, Vec<u8>)>,
    media: Vec<(String, Vec<u8>)>,
    with_rels: bool,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self {
            root_attrs: String::new(),
            body: String::new(),
            sect_pr: Some(SECT_PR.to_string()),
            rels: Vec::new(),
            parts: Vec::new(),
            media: Vec::new(),
            with_rels: true,
        }
    }

    pub fn paragraph(self, text: &str) -> Self {
        self.body(&para(text))
    }

    pub fn body(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    /// Extra attribute on `w:document`, e.g. a namespace declaration.
    pub fn root_attr(mut self, attr: &str) -> Self {
        self.root_attrs.push(' ');
        self.root_attrs.push_str(attr);
        self
    }

    pub fn sect_pr(mut self, xml: Option<&str>) -> Self {
        self.sect_pr = xml.map(str::to_string);
        self
    }

    pub fn rel(mut self, id: &str, rel_type: &str, target: &str, external: bool) -> Self {
        self.rels
            .push((id.to_string(), rel_type.to_string(), target.to_string(), external));
        self
    }

    pub fn part(mut self, name: &str, content_type: Option<&str>, data: &[u8]) -> Self {
        self.parts
            .push((name.to_string(), content_type.map(str::to_string), data.to_vec()));
        self
    }

    pub fn image(mut self, rel_id: &str, name: &str, data: Vec<u8>) -> Self {
        self.media.push((name.to_string(), data));
        self.rel(rel_id, RT_IMAGE, &format!("media/{name}"), false)
    }

    pub fn header(self, rel_id: &str, file: &str, inner: &str) -> Self {
        let xml = format!(r#"<w:hdr xmlns:w="{W_NS}" xmlns:r="{R_NS}" xmlns:wp="{WP_NS}" xmlns:a="{A_NS}" xmlns:pic="{PIC_NS}">{inner}</w:hdr>"#);
        self.part(&format!("word/{file}"), Some(CT_HEADER), xml.as_bytes())
            .rel(rel_id, RT_HEADER, file, false)
    }

    pub fn footer(self, rel_id: &str, file: &str, inner: &str) -> Self {
        let xml = format!(r#"<w:ftr xmlns:w="{W_NS}" xmlns:r="{R_NS}" xmlns:wp="{WP_NS}" xmlns:a="{A_NS}" xmlns:pic="{PIC_NS}">{inner}</w:ftr>"#);
        self.part(&format!("word/{file}"), Some(CT_FOOTER), xml.as_bytes())
            .rel(rel_id, RT_FOOTER, file, false)
    }

    pub fn styles(self, rel_id: &str) -> Self {
        let xml = format!(r#"<w:styles xmlns:w="{W_NS}"/>"#);
        self.part("word/styles.xml", Some(CT_STYLES), xml.as_bytes())
            .rel(rel_id, RT_STYLES, "styles.xml", false)
    }

    pub fn settings(self, rel_id: &str, inner: &str) -> Self {
        let xml = format!(r#"<w:settings xmlns:w="{W_NS}">{inner}</w:settings>"#);
        self.part("word/settings.xml", Some(CT_SETTINGS), xml.as_bytes())
            .rel(rel_id, RT_SETTINGS, "settings.xml", false)
    }

    pub fn without_rels(mut self) -> Self {
        self.with_rels = false;
        self
    }

    pub fn document_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<w:document xmlns:w="{w}" xmlns:r="{r}" xmlns:wp="{wp}" xmlns:a="{a}" xmlns:pic="{pic}"{extra}>"#,
                "<w:body>{body}{sect}</w:body></w:document>"
            ),
            w = W_NS,
            r = R_NS,
            wp = WP_NS,
            a = A_NS,
            pic = PIC_NS,
            extra = self.root_attrs,
            body = self.body,
            sect = self.sect_pr.as_deref().unwrap_or("")
        )
    }

    fn content_types_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
        xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
        xml.push_str(r#"<Default Extension="png" ContentType="image/png"/>"#);
        xml.push_str(r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#);
        for (name, ct, _) in &self.parts {
            if let Some(ct) = ct {
                xml.push_str(&format!(r#"<Override PartName="/{name}" ContentType="{ct}"/>"#));
            }
        }
        xml.push_str("</Types>");
        xml
    }

    fn rels_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (id, ty, target, external) in &self.rels {
            let mode = if *external { r#" TargetMode="External""# } else { "" };
            xml.push_str(&format!(
                r#"<Relationship Id="{id}" Type="{ty}" Target="{}"{mode}/>"#,
                escape(target)
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        let mut put = |name: &str, data: &[u8]| {
            zip.start_file(name, opts).unwrap();
            zip.write_all(data).unwrap();
        };
        put("[Content_Types].xml", self.content_types_xml().as_bytes());
        put(
            "_rels/.rels",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
        );
        put("word/document.xml", self.document_xml().as_bytes());
        if self.with_rels {
            put("word/_rels/document.xml.rels", self.rels_xml().as_bytes());
        }
        for (name, _, data) in &self.parts {
            put(name, data);
        }
        for (name, data) in &self.media {
            put(&format!("word/media/{name}"), data);
        }
        zip.finish().unwrap().into_inner()
    }

    pub fn package(&self) -> Package {
        Package::from_bytes(&self.build()).unwrap()
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        std::fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

/// Text of every direct paragraph of the body.
pub fn body_texts(pkg: &Package) -> Vec<String> {
    let doc = pkg.document();
    let body = wml::body(doc).unwrap();
    wml::story_paragraphs(doc, body)
        .into_iter()
        .map(|p| wml::paragraph_text(doc, p))
        .collect()
}

/// Local names of the direct children of the body.
pub fn body_children(pkg: &Package) -> Vec<String> {
    let doc = pkg.document();
    let body = wml::body(doc).unwrap();
    doc.child_elements(body)
        .map(|c| docx_compose::xml::local_name(doc.name(c).unwrap()).to_string())
        .collect()
}

/// Values of `attr` on every element named `local` in the tree.
pub fn attr_values(tree: &XmlTree, local: &str, attr: &str) -> Vec<String> {
    tree.descendants(tree.root())
        .into_iter()
        .filter(|&n| tree.is(n, local))
        .filter_map(|n| tree.attr(n, attr).map(str::to_string))
        .collect()
}

pub fn zip_entry_names(bytes: &[u8]) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Round-trip through the encoder and decoder.
pub fn reopen(pkg: &Package) -> Package {
    Package::from_bytes(&pkg.to_bytes().unwrap()).unwrap()
}
