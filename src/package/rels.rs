use crate::error::DecodeError;

pub const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

pub const RT_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const RT_SETTINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
pub const RT_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const RT_FOOTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";

#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Last path segment of the relationship type (`.../image` → `image`).
    pub fn kind(&self) -> &str {
        self.rel_type.rsplit('/').next().unwrap_or(&self.rel_type)
    }
}

/// Relationship part of a single source part, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relationships {
    rels: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(xml_content: &str, part: &str) -> Result<Self, DecodeError> {
        let xml = roxmltree::Document::parse(xml_content).map_err(|e| DecodeError::Xml {
            part: part.to_string(),
            message: e.to_string(),
        })?;
        let mut rels = Vec::new();
        for node in xml.root_element().children() {
            if node.tag_name().name() == "Relationship"
                && let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target"))
            {
                rels.push(Relationship {
                    id: id.to_string(),
                    rel_type: node.attribute("Type").unwrap_or("").to_string(),
                    target: target.to_string(),
                    external: node.attribute("TargetMode") == Some("External"),
                });
            }
        }
        Ok(Self { rels })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    pub fn len(&self) -> usize {
        self.rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.id == id)
    }

    pub fn first_of_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.rel_type == rel_type)
    }

    pub fn push(&mut self, rel: Relationship) {
        self.rels.push(rel);
    }

    pub fn retain(&mut self, f: impl FnMut(&Relationship) -> bool) {
        self.rels.retain(f);
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Relationship> {
        self.rels.iter_mut()
    }

    /// Largest `N` among ids of the form `rIdN`, 0 if there are none.
    pub fn max_numeric_id(&self) -> u64 {
        self.rels
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n");
        xml.push_str(&format!("<Relationships xmlns=\"{RELS_NS}\">"));
        for rel in &self.rels {
            let target_mode = if rel.external {
                r#" TargetMode="External""#
            } else {
                ""
            };
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                quick_xml::escape::escape(rel.id.as_str()),
                quick_xml::escape::escape(rel.rel_type.as_str()),
                quick_xml::escape::escape(rel.target.as_str()),
                target_mode
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }
}

/// Package part name of an internal target relative to the source part's
/// directory (`media/image1.png` from `word/document.xml` → `word/media/image1.png`).
pub fn resolve_target(source_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = source_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Relationship part for a part name (`word/header1.xml` → `word/_rels/header1.xml.rels`).
pub fn rels_part_name(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Issues `rIdN` ids above every id present when it was seeded. Scoped to one
/// editing or merge session; ids issued by one allocator never collide as long
/// as every relationship added in the session takes its id from it.
#[derive(Clone, Debug)]
pub struct RelationshipIdAllocator {
    last: u64,
}

impl RelationshipIdAllocator {
    pub fn seeded(rels: &Relationships) -> Self {
        Self {
            last: rels.max_numeric_id(),
        }
    }

    pub fn allocate(&mut self) -> String {
        self.last = self.last.saturating_add(1);
        format!("rId{}", self.last)
    }
}
