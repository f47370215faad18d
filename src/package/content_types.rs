use crate::error::DecodeError;

const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub const CT_DOCUMENT: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
pub const CT_SETTINGS: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";

/// `[Content_Types].xml`: extension defaults and per-part overrides.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(xml_content: &str) -> Result<Self, DecodeError> {
        let xml = roxmltree::Document::parse(xml_content).map_err(|e| DecodeError::Xml {
            part: "[Content_Types].xml".to_string(),
            message: e.to_string(),
        })?;
        let mut types = Self::default();
        for node in xml.root_element().children() {
            match node.tag_name().name() {
                "Default" => {
                    if let (Some(ext), Some(ct)) =
                        (node.attribute("Extension"), node.attribute("ContentType"))
                    {
                        types.defaults.push((ext.to_ascii_lowercase(), ct.to_string()));
                    }
                }
                "Override" => {
                    if let (Some(part), Some(ct)) =
                        (node.attribute("PartName"), node.attribute("ContentType"))
                    {
                        types
                            .overrides
                            .push((part.trim_start_matches('/').to_string(), ct.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    /// Minimal table for a package that lacks one.
    pub fn minimal() -> Self {
        Self {
            defaults: vec![
                (
                    "rels".into(),
                    "application/vnd.openxmlformats-package.relationships+xml".into(),
                ),
                ("xml".into(), "application/xml".into()),
            ],
            overrides: vec![("word/document.xml".into(), CT_DOCUMENT.into())],
        }
    }

    pub fn default_for(&self, ext: &str) -> Option<&str> {
        let ext = ext.to_ascii_lowercase();
        self.defaults
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn override_for(&self, part: &str) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(p, _)| p == part)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn ensure_default(&mut self, ext: &str, content_type: &str) {
        if self.default_for(ext).is_none() {
            self.defaults
                .push((ext.to_ascii_lowercase(), content_type.to_string()));
        }
    }

    pub fn set_override(&mut self, part: &str, content_type: &str) {
        match self.overrides.iter_mut().find(|(p, _)| p == part) {
            Some(slot) => slot.1 = content_type.to_string(),
            None => self
                .overrides
                .push((part.to_string(), content_type.to_string())),
        }
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n");
        xml.push_str(&format!("<Types xmlns=\"{CT_NS}\">"));
        for (ext, ct) in &self.defaults {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                quick_xml::escape::escape(ext.as_str()),
                quick_xml::escape::escape(ct.as_str())
            ));
        }
        for (part, ct) in &self.overrides {
            xml.push_str(&format!(
                r#"<Override PartName="/{}" ContentType="{}"/>"#,
                quick_xml::escape::escape(part.as_str()),
                quick_xml::escape::escape(ct.as_str())
            ));
        }
        xml.push_str("</Types>");
        xml
    }
}
