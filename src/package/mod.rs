//! In-memory OOXML word-processing package.

mod content_types;
mod rels;

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{DecodeError, EncodeError};
use crate::wml::WML_NS;
use crate::xml::XmlTree;

pub use content_types::{CT_DOCUMENT, CT_SETTINGS, ContentTypes};
pub use rels::{
    RT_FOOTER, RT_HEADER, RT_IMAGE, RT_SETTINGS, Relationship, RelationshipIdAllocator,
    Relationships, rels_part_name, resolve_target,
};

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const DOCUMENT_DIR: &str = "word";
pub const MEDIA_DIR: &str = "word/media/";
const SETTINGS_PART: &str = "word/settings.xml";

/// A parsed XML part other than the main document.
#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub tree: XmlTree,
}

/// Binary media under `word/media/`, keyed by file name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaStore {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MediaStore {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.blobs.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    pub fn insert(&mut self, name: String, data: Vec<u8>) {
        self.blobs.insert(name, data);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.blobs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// `imageN.ext` with N above every existing `imageN`.
    pub fn next_image_name(&self, ext: &str) -> String {
        let max = self
            .blobs
            .keys()
            .filter_map(|k| k.strip_prefix("image"))
            .filter_map(|rest| rest.split('.').next())
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!("image{}.{ext}", max.saturating_add(1))
    }

    /// `name` with `suffix` inserted before the extension, made unique with a
    /// trailing counter if needed (`image1.png` + `_doc2` → `image1_doc2.png`).
    pub fn disambiguate(&self, name: &str, suffix: &str) -> String {
        let (stem, ext) = split_ext(name);
        let mut candidate = format!("{stem}{suffix}{ext}");
        let mut n = 1;
        while self.blobs.contains_key(&candidate) {
            candidate = format!("{stem}{suffix}_{n}{ext}");
            n += 1;
        }
        candidate
    }
}

/// `("image1", ".png")`; the extension part is empty when there is none.
pub(crate) fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

#[derive(Clone, Debug)]
pub struct Package {
    document: XmlTree,
    rels: Relationships,
    media: MediaStore,
    content_types: ContentTypes,
    settings: Option<XmlPart>,
    headers: Vec<XmlPart>,
    footers: Vec<XmlPart>,
    /// Every other part, untouched, in archive order.
    parts: Vec<(String, Vec<u8>)>,
}

fn xml_text<'a>(part: &str, data: &'a [u8]) -> Result<&'a str, DecodeError> {
    let text = std::str::from_utf8(data).map_err(|e| DecodeError::Xml {
        part: part.to_string(),
        message: e.to_string(),
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

fn parse_tree(part: &str, data: &[u8]) -> Result<XmlTree, DecodeError> {
    XmlTree::parse(xml_text(part, data)?).map_err(|e| DecodeError::Xml {
        part: part.to_string(),
        message: e.to_string(),
    })
}

fn take_entry(entries: &mut Vec<(String, Vec<u8>)>, name: &str) -> Option<Vec<u8>> {
    let pos = entries.iter().position(|(n, _)| n == name)?;
    Some(entries.remove(pos).1)
}

impl Package {
    pub fn load(path: &Path) -> Result<Self, DecodeError> {
        let t0 = Instant::now();
        let file = std::fs::File::open(path).map_err(|e| DecodeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let pkg = Self::from_reader(file)?;
        log::debug!(
            "Loaded {} in {:.1}ms ({} relationships, {} media, {} other parts)",
            path.display(),
            t0.elapsed().as_secs_f64() * 1000.0,
            pkg.rels.len(),
            pkg.media.len(),
            pkg.parts.len(),
        );
        Ok(pkg)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::from_reader(Cursor::new(data))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, DecodeError> {
        let mut zip = zip::ZipArchive::new(reader).map_err(|_| DecodeError::NotAZip)?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|_| DecodeError::NotAZip)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| DecodeError::Io {
                    path: PathBuf::from(&name),
                    source: e,
                })?;
            entries.push((name, data));
        }
        Self::from_entries(entries)
    }

    fn from_entries(mut entries: Vec<(String, Vec<u8>)>) -> Result<Self, DecodeError> {
        let document_data = take_entry(&mut entries, DOCUMENT_PART)
            .ok_or_else(|| DecodeError::MissingPart(DOCUMENT_PART.to_string()))?;
        let document = parse_tree(DOCUMENT_PART, &document_data)?;

        let rels = match take_entry(&mut entries, DOCUMENT_RELS_PART) {
            Some(data) => Relationships::parse(xml_text(DOCUMENT_RELS_PART, &data)?, DOCUMENT_RELS_PART)?,
            None => Relationships::default(),
        };

        let content_types = match take_entry(&mut entries, CONTENT_TYPES_PART) {
            Some(data) => ContentTypes::parse(xml_text(CONTENT_TYPES_PART, &data)?)?,
            None => ContentTypes::minimal(),
        };

        let mut media = MediaStore::default();
        let mut parts = Vec::new();
        for (name, data) in entries {
            match name.strip_prefix(MEDIA_DIR) {
                Some(file) if !file.is_empty() => media.insert(file.to_string(), data),
                _ => parts.push((name, data)),
            }
        }

        let mut pkg = Package {
            document,
            rels,
            media,
            content_types,
            settings: None,
            headers: Vec::new(),
            footers: Vec::new(),
            parts,
        };

        let linked: Vec<(String, String)> = pkg
            .rels
            .iter()
            .filter(|r| !r.external)
            .filter(|r| [RT_SETTINGS, RT_HEADER, RT_FOOTER].contains(&r.rel_type.as_str()))
            .map(|r| (r.rel_type.clone(), resolve_target(DOCUMENT_DIR, &r.target)))
            .collect();
        for (rel_type, name) in linked {
            let Some(data) = take_entry(&mut pkg.parts, &name) else {
                log::debug!("Relationship target {name} is not in the package");
                continue;
            };
            let part = XmlPart {
                tree: parse_tree(&name, &data)?,
                name,
            };
            match rel_type.as_str() {
                RT_SETTINGS => pkg.settings = Some(part),
                RT_HEADER => pkg.headers.push(part),
                _ => pkg.footers.push(part),
            }
        }

        Ok(pkg)
    }

    pub fn document(&self) -> &XmlTree {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut XmlTree {
        &mut self.document
    }

    pub fn relationships(&self) -> &Relationships {
        &self.rels
    }

    pub fn relationships_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut MediaStore {
        &mut self.media
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn content_types_mut(&mut self) -> &mut ContentTypes {
        &mut self.content_types
    }

    pub fn settings(&self) -> Option<&XmlPart> {
        self.settings.as_ref()
    }

    pub fn headers(&self) -> &[XmlPart] {
        &self.headers
    }

    pub fn footers(&self) -> &[XmlPart] {
        &self.footers
    }

    pub fn headers_mut(&mut self) -> &mut [XmlPart] {
        &mut self.headers
    }

    pub fn footers_mut(&mut self) -> &mut [XmlPart] {
        &mut self.footers
    }

    pub(crate) fn push_header(&mut self, part: XmlPart) {
        self.headers.push(part);
    }

    pub(crate) fn push_footer(&mut self, part: XmlPart) {
        self.footers.push(part);
    }

    /// Names of the untouched raw parts, in archive order.
    pub fn raw_part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    pub fn has_part(&self, name: &str) -> bool {
        name == DOCUMENT_PART
            || name == DOCUMENT_RELS_PART
            || self.settings.as_ref().is_some_and(|s| s.name == name)
            || self.headers.iter().chain(&self.footers).any(|p| p.name == name)
            || name.strip_prefix(MEDIA_DIR).is_some_and(|m| self.media.contains(m))
            || self.parts.iter().any(|(n, _)| n == name)
    }

    /// Serialized bytes of any part, modelled or raw.
    pub fn part_bytes(&self, name: &str) -> Option<Vec<u8>> {
        if name == DOCUMENT_PART {
            return Some(self.document.to_xml().into_bytes());
        }
        if name == DOCUMENT_RELS_PART {
            return Some(self.rels.to_xml().into_bytes());
        }
        if let Some(media) = name.strip_prefix(MEDIA_DIR) {
            return self.media.get(media).map(<[u8]>::to_vec);
        }
        let modelled = self
            .settings
            .iter()
            .chain(&self.headers)
            .chain(&self.footers)
            .find(|p| p.name == name);
        if let Some(part) = modelled {
            return Some(part.tree.to_xml().into_bytes());
        }
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.clone())
    }

    /// Add or replace a raw part.
    pub fn put_part(&mut self, name: String, data: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = data,
            None => self.parts.push((name, data)),
        }
    }

    /// Store an image blob and link it from the main document. Returns the
    /// relationship id and the media file name.
    pub fn add_image(&mut self, data: Vec<u8>, ext: &str, content_type: &str) -> (String, String) {
        let name = self.media.next_image_name(ext);
        self.media.insert(name.clone(), data);
        self.content_types.ensure_default(ext, content_type);
        let id = RelationshipIdAllocator::seeded(&self.rels).allocate();
        self.rels.push(Relationship {
            id: id.clone(),
            rel_type: RT_IMAGE.to_string(),
            target: format!("media/{name}"),
            external: false,
        });
        (id, name)
    }

    /// Media file name behind a relationship target of the main document.
    pub fn media_name_for_target(target: &str) -> Option<String> {
        resolve_target(DOCUMENT_DIR, target)
            .strip_prefix(MEDIA_DIR)
            .map(str::to_string)
    }

    /// The settings part, created (with its relationship and content type)
    /// when the package has none.
    pub fn settings_mut(&mut self) -> Result<&mut XmlPart, DecodeError> {
        if self.settings.is_none() {
            let tree = match take_entry(&mut self.parts, SETTINGS_PART) {
                Some(data) => parse_tree(SETTINGS_PART, &data)?,
                None => XmlTree::with_root("w:settings", &[("xmlns:w", WML_NS)]),
            };
            if self.rels.first_of_type(RT_SETTINGS).is_none() {
                let id = RelationshipIdAllocator::seeded(&self.rels).allocate();
                self.rels.push(Relationship {
                    id,
                    rel_type: RT_SETTINGS.to_string(),
                    target: "settings.xml".to_string(),
                    external: false,
                });
            }
            self.content_types.set_override(SETTINGS_PART, CT_SETTINGS);
            self.settings = Some(XmlPart {
                name: SETTINGS_PART.to_string(),
                tree,
            });
        }
        Ok(self.settings.get_or_insert_with(|| XmlPart {
            name: SETTINGS_PART.to_string(),
            tree: XmlTree::with_root("w:settings", &[("xmlns:w", WML_NS)]),
        }))
    }

    /// Encode the package as a zip archive: content types first, then the
    /// package relationships, then every other part.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        // Fixed timestamps keep the encoding byte-for-byte reproducible.
        let base = zip::write::SimpleFileOptions::default().last_modified_time(zip::DateTime::default());
        let deflated = base.compression_method(zip::CompressionMethod::Deflated);
        let stored = base.compression_method(zip::CompressionMethod::Stored);

        zip.start_file(CONTENT_TYPES_PART, deflated)?;
        zip.write_all(self.content_types.to_xml().as_bytes())?;

        let (package_rels, others): (Vec<_>, Vec<_>) =
            self.parts.iter().partition(|(n, _)| n.starts_with("_rels/"));
        for (name, data) in package_rels.into_iter().chain(others) {
            zip.start_file(name.as_str(), deflated)?;
            zip.write_all(data)?;
        }

        zip.start_file(DOCUMENT_PART, deflated)?;
        zip.write_all(self.document.to_xml().as_bytes())?;
        zip.start_file(DOCUMENT_RELS_PART, deflated)?;
        zip.write_all(self.rels.to_xml().as_bytes())?;

        for part in self.settings.iter().chain(&self.headers).chain(&self.footers) {
            zip.start_file(part.name.as_str(), deflated)?;
            zip.write_all(part.tree.to_xml().as_bytes())?;
        }

        for (name, data) in self.media.iter() {
            zip.start_file(format!("{MEDIA_DIR}{name}").as_str(), stored)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Write the package to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), EncodeError> {
        let tmp = self.stage(path)?;
        tmp.persist(path).map_err(|e| EncodeError::Io(e.error))?;
        log::info!("Saved {}", path.display());
        Ok(())
    }

    /// Write the package next to `path` without overwriting anything: on
    /// collision `-1`, `-2`, … is appended to the file stem. Returns the path
    /// actually written.
    pub fn save_unique(&self, path: &Path) -> Result<PathBuf, EncodeError> {
        let mut tmp = self.stage(path)?;
        let mut n = 0;
        loop {
            let candidate = numbered_path(path, n);
            match tmp.persist_noclobber(&candidate) {
                Ok(_) => {
                    log::info!("Saved {}", candidate.display());
                    return Ok(candidate);
                }
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    n += 1;
                }
                Err(e) => return Err(EncodeError::Io(e.error)),
            }
        }
    }

    /// Encode, verify the result decodes, and write it to a temporary file in
    /// the destination directory. Dropping the handle removes the file.
    fn stage(&self, path: &Path) -> Result<tempfile::NamedTempFile, EncodeError> {
        let t0 = Instant::now();
        let bytes = self.to_bytes()?;
        Package::from_bytes(&bytes).map_err(|e| EncodeError::Verify(Box::new(e)))?;

        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        log::debug!(
            "Encoded package in {:.1}ms ({} bytes)",
            t0.elapsed().as_secs_f64() * 1000.0,
            bytes.len()
        );
        Ok(tmp)
    }
}

/// `report.docx` for 0, `report-1.docx` for 1, …
pub fn numbered_path(path: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{n}"),
    };
    path.with_file_name(name)
}

/// First of `path`, `path-1`, `path-2`, … that does not exist yet.
pub fn unique_output_path(path: &Path) -> PathBuf {
    (0..)
        .map(|n| numbered_path(path, n))
        .find(|p| !p.exists())
        .unwrap_or_else(|| path.to_path_buf())
}
