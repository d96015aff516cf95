//! Resource-reader contract and archive path helpers.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::ResourceError;

/// Read access to the entries of a document archive.
///
/// Resource ids are archive paths (`OEBPS/text/ch1.xhtml`). Implementations
/// decide how bytes are obtained; the composer only awaits them.
#[allow(async_fn_in_trait)]
pub trait ResourceReader {
    /// Archive entries (files only) in archive order.
    async fn list_resources(&self) -> Result<Vec<String>, ResourceError>;

    /// Raw bytes of one entry.
    async fn read_bytes(&self, id: &str) -> Result<Vec<u8>, ResourceError>;

    /// Entry decoded as UTF-8 text. A leading byte-order mark is dropped.
    async fn read_text(&self, id: &str) -> Result<String, ResourceError> {
        let bytes = self.read_bytes(id).await?;
        let text = String::from_utf8(bytes).map_err(|err| ResourceError::Read {
            id: id.to_string(),
            message: err.to_string(),
        })?;
        Ok(match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        })
    }

    /// Entry as a self-contained `data:` URI.
    async fn read_inline(&self, id: &str) -> Result<String, ResourceError> {
        let bytes = self.read_bytes(id).await?;
        Ok(data_uri(mime_from_path(id), &bytes))
    }
}

/// In-memory archive, mostly for tests and small embedded books.
#[derive(Clone, Debug, Default)]
pub struct MemoryResourceReader {
    order: Vec<String>,
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryResourceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. New entries keep insertion order.
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let path = path.into();
        if self.entries.insert(path.clone(), bytes.into()).is_none() {
            self.order.push(path);
        }
    }

    /// Builder form of [`MemoryResourceReader::insert`].
    pub fn with_entry(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<P, B> FromIterator<(P, B)> for MemoryResourceReader
where
    P: Into<String>,
    B: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (P, B)>>(iter: I) -> Self {
        let mut reader = Self::new();
        for (path, bytes) in iter {
            reader.insert(path, bytes);
        }
        reader
    }
}

impl ResourceReader for MemoryResourceReader {
    async fn list_resources(&self) -> Result<Vec<String>, ResourceError> {
        Ok(self.order.clone())
    }

    async fn read_bytes(&self, id: &str) -> Result<Vec<u8>, ResourceError> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound { id: id.to_string() })
    }
}

/// Mime type for an archive path, by extension. Unknown types are
/// `text/plain`.
pub fn mime_from_path(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpeg" | "jpg" => "image/jpeg",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "tiff" | "tif" => "image/tiff",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/vnd.microsoft.icon",
        _ => "text/plain",
    }
}

/// Returns `true` when the path names an image the reader can display.
pub fn is_image_path(path: &str) -> bool {
    mime_from_path(path).starts_with("image/")
}

/// Encode bytes as a base64 `data:` URI.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Folder part of an archive path (`""` at the archive root).
pub fn context_folder(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve `rel` against the folder of `base_path`, collapsing `.` and `..`.
pub fn resolve_relative(base_path: &str, rel: &str) -> String {
    if let Some(absolute) = rel.strip_prefix('/') {
        return normalize_path(absolute);
    }
    let base_dir = context_folder(base_path);
    if base_dir.is_empty() {
        normalize_path(rel)
    } else {
        normalize_path(&format!("{}/{}", base_dir, rel))
    }
}

/// Collapse `.`/`..` segments and empty components.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(8);
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}
