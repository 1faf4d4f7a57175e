use anyhow::{Context, Result, anyhow};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PART: &str = "_rels/.rels";

pub(crate) const RT_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const RT_SLIDE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
pub(crate) const RT_SLIDE_LAYOUT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
pub(crate) const RT_SLIDE_MASTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
pub(crate) const RT_THEME: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
pub(crate) const RT_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub(crate) const RT_NOTES_SLIDE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide";
pub(crate) const RT_NOTES_MASTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesMaster";

pub(crate) const CT_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";
pub(crate) const CT_XML: &str = "application/xml";
pub(crate) const CT_PRESENTATION: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
pub(crate) const CT_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
pub(crate) const CT_SLIDE_LAYOUT: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
pub(crate) const CT_SLIDE_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
pub(crate) const CT_THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
pub(crate) const CT_NOTES_SLIDE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml";
pub(crate) const CT_NOTES_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.notesMaster+xml";

/// All parts of an OPC package, keyed by part name without the leading slash.
#[derive(Debug, Clone, Default)]
pub(crate) struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub(crate) fn read(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("invalid presentation: {}", path.display()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).with_context(|| "failed to read zip archive")?;
        let mut parts = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .with_context(|| "failed to read zip entry")?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .with_context(|| format!("failed to read zip entry content: {}", name))?;
            parts.insert(name, data);
        }
        if !parts.contains_key(CONTENT_TYPES_PART) {
            return Err(anyhow!("missing {}", CONTENT_TYPES_PART));
        }
        Ok(Self { parts })
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let content_types = self
            .parts
            .get_key_value(CONTENT_TYPES_PART)
            .into_iter();
        let rest = self
            .parts
            .iter()
            .filter(|(name, _)| name.as_str() != CONTENT_TYPES_PART);
        for (name, data) in content_types.chain(rest) {
            writer
                .start_file(name.clone(), options)
                .with_context(|| format!("failed to write zip entry: {}", name))?;
            writer
                .write_all(data)
                .with_context(|| "failed to write zip content")?;
        }

        let bytes = writer
            .finish()
            .with_context(|| "failed to finalize zip output")?
            .into_inner();
        Ok(bytes)
    }

    pub(crate) fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }

    pub(crate) fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&[u8]> {
        self.get(name)
            .ok_or_else(|| anyhow!("presentation is missing part {}", name))
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.parts.insert(name.into(), data.into());
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// First free `{prefix}{n}.{ext}` with n starting at 1.
    pub(crate) fn next_numbered(&self, prefix: &str, ext: &str) -> String {
        (1..)
            .map(|n| format!("{}{}.{}", prefix, n, ext))
            .find(|name| !self.contains(name))
            .unwrap_or_else(|| format!("{}0.{}", prefix, ext))
    }

    pub(crate) fn relationships(&self, part: &str) -> Result<Relationships> {
        match self.get(&rels_path_for(part)) {
            Some(xml) => Relationships::parse(xml),
            None => Ok(Relationships::default()),
        }
    }

    pub(crate) fn set_relationships(&mut self, part: &str, rels: &Relationships) {
        self.insert(rels_path_for(part), rels.to_xml());
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Relationship {
    pub(crate) id: String,
    pub(crate) rel_type: String,
    pub(crate) target: String,
    pub(crate) external: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    pub(crate) fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut items = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let id = attr(&e, b"Id")?.ok_or_else(|| anyhow!("relationship without Id"))?;
                    let rel_type = attr(&e, b"Type")?.unwrap_or_default();
                    let target = attr(&e, b"Target")?.unwrap_or_default();
                    let external = attr(&e, b"TargetMode")?
                        .map(|mode| mode.eq_ignore_ascii_case("External"))
                        .unwrap_or(false);
                    items.push(Relationship {
                        id,
                        rel_type,
                        target,
                        external,
                    });
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(anyhow!("failed to parse relationships: {}", err)),
            }
            buf.clear();
        }
        Ok(Self { items })
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
        );
        for rel in &self.items {
            xml.push_str(&format!(
                "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"{}/>",
                escape(&rel.id),
                escape(&rel.rel_type),
                escape(&rel.target),
                if rel.external {
                    " TargetMode=\"External\""
                } else {
                    ""
                }
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }

    pub(crate) fn add(&mut self, rel_type: &str, target: impl Into<String>) -> String {
        let id = self.next_id();
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.into(),
            external: false,
        });
        id
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|rel| rel.id == id)
    }

    pub(crate) fn first_of_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.items.iter().find(|rel| rel.rel_type == rel_type)
    }

    pub(crate) fn of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.items.iter().filter(move |rel| rel.rel_type == rel_type)
    }

    fn next_id(&self) -> String {
        let max = self
            .items
            .iter()
            .filter_map(|rel| rel.id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub(crate) fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut types = Self::default();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"Default" => {
                        let ext = attr(&e, b"Extension")?.unwrap_or_default();
                        let ct = attr(&e, b"ContentType")?.unwrap_or_default();
                        types.defaults.push((ext, ct));
                    }
                    b"Override" => {
                        let part = attr(&e, b"PartName")?.unwrap_or_default();
                        let ct = attr(&e, b"ContentType")?.unwrap_or_default();
                        types.overrides.push((part, ct));
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(anyhow!("failed to parse content types: {}", err)),
            }
            buf.clear();
        }
        Ok(types)
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
        );
        for (ext, ct) in &self.defaults {
            xml.push_str(&format!(
                "<Default Extension=\"{}\" ContentType=\"{}\"/>",
                escape(ext),
                escape(ct)
            ));
        }
        for (part, ct) in &self.overrides {
            xml.push_str(&format!(
                "<Override PartName=\"{}\" ContentType=\"{}\"/>",
                escape(part),
                escape(ct)
            ));
        }
        xml.push_str("</Types>");
        xml
    }

    pub(crate) fn ensure_default(&mut self, ext: &str, content_type: &str) {
        let known = self
            .defaults
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(ext));
        if !known {
            self.defaults
                .push((ext.to_string(), content_type.to_string()));
        }
    }

    pub(crate) fn set_override(&mut self, part: &str, content_type: &str) {
        let part_name = format!("/{}", part.trim_start_matches('/'));
        match self.overrides.iter_mut().find(|(name, _)| *name == part_name) {
            Some(entry) => entry.1 = content_type.to_string(),
            None => self
                .overrides
                .push((part_name, content_type.to_string())),
        }
    }
}

pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(|err| anyhow!("invalid xml attribute: {}", err))?;
        if attribute.key.as_ref() == key {
            let value = attribute
                .unescape_value()
                .map_err(|err| anyhow!("invalid xml attribute value: {}", err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// `ppt/slides/slide1.xml` -> `ppt/slides/_rels/slide1.xml.rels`
pub(crate) fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None if part.is_empty() => ROOT_RELS_PART.to_string(),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolves a relationship target relative to the part that owns the relationship.
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Inverse of [`resolve_target`]: the relative target from `source_part` to `target_part`.
pub(crate) fn relative_target(source_part: &str, target_part: &str) -> String {
    let source_dir: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let target: Vec<&str> = target_part.split('/').collect();
    let (target_dir, file) = target.split_at(target.len().saturating_sub(1));
    let common = source_dir
        .iter()
        .zip(target_dir.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = vec![".."; source_dir.len() - common];
    parts.extend_from_slice(&target_dir[common..]);
    parts.extend_from_slice(file);
    parts.join("/")
}
