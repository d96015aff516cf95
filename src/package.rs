//! OPF package reading: manifest, spine order and table-of-contents types.

use percent_encoding::percent_decode_str;
use quick_xml::events::Event;

use crate::error::{ErrorPhase, ParseError};
use crate::reader::resolve_relative;

/// One `<item>` of the package manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// Manifest id.
    pub id: String,
    /// Archive path, resolved against the package folder.
    pub path: String,
    /// Declared media type.
    pub media_type: String,
    /// `properties` attribute (EPUB 3).
    pub properties: Option<String>,
}

/// Parsed package document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Package {
    /// Archive path of the `.opf` entry.
    pub opf_path: String,
    /// `dc:title`, when present.
    pub title: Option<String>,
    /// Manifest items in document order.
    pub manifest: Vec<ManifestItem>,
    /// Spine resource paths in reading order.
    pub spine: Vec<String>,
    /// Manifest id named by `<spine toc="...">`.
    pub toc_id: Option<String>,
    cover_id: Option<String>,
}

impl Package {
    /// Manifest item by id.
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Cover image path (`properties="cover-image"`, then `<meta name="cover">`).
    pub fn cover_path(&self) -> Option<&str> {
        self.manifest
            .iter()
            .find(|item| {
                item.properties
                    .as_deref()
                    .is_some_and(|props| props.split_whitespace().any(|p| p == "cover-image"))
            })
            .or_else(|| self.cover_id.as_deref().and_then(|id| self.item(id)))
            .map(|item| item.path.as_str())
    }
}

/// Table-of-contents entry supplied by a metadata reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    pub label: String,
    /// Link relative to the context resource (`ch1.xhtml#s2`).
    pub href: String,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<TocEntry>) -> Self {
        self.children = children;
        self
    }
}

/// Table-of-contents entry mapped onto the global position space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTocEntry {
    pub label: String,
    pub href: String,
    /// Target position, `None` when the link does not resolve.
    pub position: Option<usize>,
    pub children: Vec<ResolvedTocEntry>,
}

/// First `.opf` entry in archive order.
pub fn find_package_path(resources: &[String]) -> Option<&str> {
    resources
        .iter()
        .map(String::as_str)
        .find(|path| path.to_ascii_lowercase().ends_with(".opf"))
}

/// Parse a package document located at `opf_path`.
pub fn parse_package(opf_path: &str, content: &[u8]) -> Result<Package, ParseError> {
    let mut reader = quick_xml::reader::Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut package = Package {
        opf_path: opf_path.to_string(),
        ..Package::default()
    };
    let mut spine_ids: Vec<String> = Vec::with_capacity(16);
    let mut in_title = false;
    let mut buf = Vec::with_capacity(256);

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e))
                if package.title.is_none() && local_name(e.name().as_ref()) == b"title" =>
            {
                in_title = true;
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"item" => {
                    let mut id = String::new();
                    let mut href = String::new();
                    let mut media_type = String::new();
                    let mut properties = None;
                    for attr in e.attributes().flatten() {
                        let value = reader
                            .decoder()
                            .decode(attr.value.as_ref())
                            .unwrap_or_default()
                            .into_owned();
                        match attr.key.as_ref() {
                            b"id" => id = value,
                            b"href" => href = value,
                            b"media-type" => media_type = value,
                            b"properties" => properties = Some(value),
                            _ => {}
                        }
                    }
                    if id.is_empty() || href.is_empty() {
                        log::warn!("skipping manifest item without id or href in {}", opf_path);
                    } else {
                        let decoded = percent_decode_str(&href).decode_utf8_lossy();
                        package.manifest.push(ManifestItem {
                            id,
                            path: resolve_relative(opf_path, &decoded),
                            media_type,
                            properties,
                        });
                    }
                }
                b"itemref" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"idref" {
                            let idref = reader
                                .decoder()
                                .decode(attr.value.as_ref())
                                .unwrap_or_default();
                            spine_ids.push(idref.into_owned());
                        }
                    }
                }
                b"spine" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"toc" {
                            let toc = reader
                                .decoder()
                                .decode(attr.value.as_ref())
                                .unwrap_or_default();
                            package.toc_id = Some(toc.into_owned());
                        }
                    }
                }
                b"meta" => {
                    let mut is_cover = false;
                    let mut content_id = None;
                    for attr in e.attributes().flatten() {
                        let value = reader
                            .decoder()
                            .decode(attr.value.as_ref())
                            .unwrap_or_default();
                        match attr.key.as_ref() {
                            b"name" => is_cover = value == "cover",
                            b"content" => content_id = Some(value.into_owned()),
                            _ => {}
                        }
                    }
                    if is_cover {
                        package.cover_id = content_id;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_title => {
                let text = reader.decoder().decode(&e).unwrap_or_default();
                package
                    .title
                    .get_or_insert_with(String::new)
                    .push_str(text.as_ref());
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == b"title" {
                    in_title = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                let offset = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
                return Err(ParseError::new(
                    ErrorPhase::Package,
                    "OPF_XML",
                    format!("package XML parse error: {}", err),
                )
                .with_offset(offset)
                .with_path(opf_path));
            }
            _ => {}
        }
        buf.clear();
    }

    for idref in spine_ids {
        match package.item(&idref) {
            Some(item) => {
                let path = item.path.clone();
                package.spine.push(path);
            }
            None => log::warn!("spine itemref {} has no manifest item", idref),
        }
    }
    Ok(package)
}

/// Error for an archive without a package document.
pub(crate) fn missing_package() -> ParseError {
    ParseError::new(
        ErrorPhase::Package,
        "OPF_MISSING",
        "archive has no .opf package document",
    )
}

fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}
