//! Spine composer: one global position space over every spine resource.
//!
//! Resources are parsed lazily on first use, each rooted at the previous
//! resource's `end + 1`. A single content retrieval never crosses a resource
//! boundary; callers ask for the next section explicitly.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use percent_encoding::percent_decode_str;
use tokio::sync::OnceCell;

use crate::error::EpubError;
use crate::markup::parse_resource;
use crate::node::{Document, ReferenceKind, Rewrite};
use crate::package::{find_package_path, missing_package, parse_package, Package, ResolvedTocEntry, TocEntry};
use crate::reader::{resolve_relative, ResourceReader};

/// Options applied to content retrieved through [`SpineComposer::contents_at`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineOptions {
    /// Replace asset references with `data:` URIs.
    pub inline_assets: bool,
    /// When set, in-document links become `onclick="<handler>(<position>)"`.
    pub link_handler: Option<String>,
}

impl Default for SpineOptions {
    fn default() -> Self {
        Self {
            inline_assets: true,
            link_handler: None,
        }
    }
}

impl SpineOptions {
    /// Leave retrieved markup exactly as sliced.
    pub fn raw() -> Self {
        Self {
            inline_assets: false,
            link_handler: None,
        }
    }

    pub fn with_link_handler(mut self, handler: impl Into<String>) -> Self {
        self.link_handler = Some(handler.into());
        self
    }
}

/// One resolved spine resource.
#[derive(Clone, Copy, Debug)]
pub struct SpineEntry<'a> {
    /// Index in spine order.
    pub index: usize,
    /// Archive path.
    pub id: &'a str,
    /// Positioned document tree.
    pub document: &'a Document,
}

/// Composes spine resources into one seamless position space.
pub struct SpineComposer<R> {
    reader: R,
    spine: Vec<String>,
    index: HashMap<String, usize>,
    options: SpineOptions,
    package: Option<Package>,
    documents: OnceCell<Vec<Document>>,
    assets: Mutex<HashMap<String, String>>,
}

impl<R: ResourceReader> SpineComposer<R> {
    /// Compose an explicit spine of archive paths.
    pub fn new(reader: R, spine: Vec<String>) -> Self {
        let index = spine
            .iter()
            .enumerate()
            .map(|(position, id)| (id.clone(), position))
            .collect();
        Self {
            reader,
            spine,
            index,
            options: SpineOptions::default(),
            package: None,
            documents: OnceCell::new(),
            assets: Mutex::new(HashMap::new()),
        }
    }

    /// Locate the archive's package document and compose its spine.
    pub async fn from_package(reader: R) -> Result<Self, EpubError> {
        let resources = reader.list_resources().await?;
        let opf_path = find_package_path(&resources)
            .ok_or_else(missing_package)?
            .to_string();
        let bytes = reader.read_bytes(&opf_path).await?;
        let package = parse_package(&opf_path, &bytes)?;
        log::debug!(
            "package {} lists {} spine resource(s)",
            opf_path,
            package.spine.len()
        );
        let mut composer = Self::new(reader, package.spine.clone());
        composer.package = Some(package);
        Ok(composer)
    }

    pub fn with_options(mut self, options: SpineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SpineOptions {
        &self.options
    }

    /// Package the spine was read from, if any.
    pub fn package(&self) -> Option<&Package> {
        self.package.as_ref()
    }

    /// Spine resource paths in reading order.
    pub fn spine(&self) -> &[String] {
        &self.spine
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    async fn documents(&self) -> Result<&[Document], EpubError> {
        self.documents
            .get_or_try_init(|| self.load_documents())
            .await
            .map(Vec::as_slice)
    }

    async fn load_documents(&self) -> Result<Vec<Document>, EpubError> {
        let mut documents = Vec::with_capacity(self.spine.len());
        let mut entry = 0;
        for id in &self.spine {
            let text = self.reader.read_text(id).await?;
            let document = parse_resource(&text, entry).map_err(|err| err.with_path(id.as_str()))?;
            log::debug!(
                "spine resource {} spans [{}, {}]",
                id,
                document.start(),
                document.end()
            );
            entry = document.end() + 1;
            documents.push(document);
        }
        Ok(documents)
    }

    /// Total length of the position space.
    pub async fn size(&self) -> Result<usize, EpubError> {
        Ok(self.documents().await?.iter().map(Document::len).sum())
    }

    /// Spine resource containing `position`.
    pub async fn node_at(&self, position: usize) -> Result<Option<SpineEntry<'_>>, EpubError> {
        let documents = self.documents().await?;
        Ok(entry_at(&self.spine, documents, position))
    }

    /// Parsed document of the resource with this archive path.
    pub async fn document(&self, id: &str) -> Result<Option<&Document>, EpubError> {
        let documents = self.documents().await?;
        Ok(self.index.get(id).and_then(|index| documents.get(*index)))
    }

    /// `[start, end]` of the resource containing `position`.
    pub async fn section_bounds(
        &self,
        position: usize,
    ) -> Result<Option<(usize, usize)>, EpubError> {
        Ok(self
            .node_at(position)
            .await?
            .map(|entry| (entry.document.start(), entry.document.end())))
    }

    /// Markup for `[start, end]`, clamped to the resource owning `start`.
    ///
    /// Returns `None` for inverted or out-of-range requests.
    pub async fn contents_at(&self, start: usize, end: usize) -> Result<Option<String>, EpubError> {
        if start > end || end >= self.size().await? {
            return Ok(None);
        }
        let documents = self.documents().await?;
        let Some(entry) = entry_at(&self.spine, documents, start) else {
            return Ok(None);
        };
        let end = end.min(entry.document.end());
        let Some(mut slice) = entry.document.copy(start, end) else {
            return Ok(Some(String::new()));
        };
        self.rewrite_slice(entry.id, documents, &mut slice).await;
        Ok(Some(slice.serialize()))
    }

    async fn rewrite_slice(&self, context: &str, documents: &[Document], slice: &mut Document) {
        let handler = self.options.link_handler.as_deref();
        if !self.options.inline_assets && handler.is_none() {
            return;
        }
        let mut assets: HashMap<String, String> = HashMap::new();
        let mut links: HashMap<String, usize> = HashMap::new();
        for (kind, value) in slice.references() {
            match kind {
                ReferenceKind::Asset if self.options.inline_assets => {
                    if value.starts_with("data:") || is_external(&value) || assets.contains_key(&value)
                    {
                        continue;
                    }
                    if let Some(uri) = self.inline_asset(context, &value).await {
                        assets.insert(value, uri);
                    }
                }
                ReferenceKind::Link if handler.is_some() => {
                    if let Some(position) = self.resolve_in(documents, context, &value) {
                        links.insert(value, position);
                    }
                }
                _ => {}
            }
        }
        if assets.is_empty() && links.is_empty() {
            return;
        }
        slice.rewrite_references(|kind, value| match kind {
            ReferenceKind::Asset => assets.get(value).cloned().map(Rewrite::Value),
            ReferenceKind::Link => {
                let position = links.get(value)?;
                let handler = handler?;
                Some(Rewrite::Attribute(format!(
                    "onclick=\"{}({})\"",
                    handler, position
                )))
            }
        });
    }

    async fn inline_asset(&self, context: &str, reference: &str) -> Option<String> {
        let decoded = percent_decode_str(reference).decode_utf8_lossy();
        let path = resolve_relative(context, strip_fragment(&decoded));
        let cached = self
            .assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path)
            .cloned();
        if cached.is_some() {
            return cached;
        }
        match self.reader.read_inline(&path).await {
            Ok(uri) => {
                self.assets
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(path, uri.clone());
                Some(uri)
            }
            Err(err) => {
                log::warn!("leaving asset reference {} in {} as-is: {}", reference, context, err);
                None
            }
        }
    }

    /// Global position targeted by `href` as written in `context`.
    ///
    /// External links, unknown resources and unknown anchors resolve to
    /// `None`. A link without an anchor targets the resource start.
    pub async fn resolve_link(&self, context: &str, href: &str) -> Result<Option<usize>, EpubError> {
        let documents = self.documents().await?;
        Ok(self.resolve_in(documents, context, href))
    }

    fn resolve_in(&self, documents: &[Document], context: &str, href: &str) -> Option<usize> {
        let href = href.trim();
        if href.is_empty() || is_external(href) {
            return None;
        }
        let (file, anchor) = match href.split_once('#') {
            Some((file, anchor)) => (file, Some(anchor)),
            None => (href, None),
        };
        let target = if file.is_empty() {
            context.to_string()
        } else {
            let decoded = percent_decode_str(file).decode_utf8_lossy();
            resolve_relative(context, &decoded)
        };
        let document = documents.get(*self.index.get(&target)?)?;
        match anchor.filter(|anchor| !anchor.is_empty()) {
            Some(anchor) => document.id_position(anchor),
            None => Some(document.start()),
        }
    }

    /// Resolve table-of-contents links to global positions.
    pub async fn resolve_toc(
        &self,
        context: &str,
        entries: &[TocEntry],
    ) -> Result<Vec<ResolvedTocEntry>, EpubError> {
        let documents = self.documents().await?;
        Ok(self.resolve_toc_in(documents, context, entries))
    }

    fn resolve_toc_in(
        &self,
        documents: &[Document],
        context: &str,
        entries: &[TocEntry],
    ) -> Vec<ResolvedTocEntry> {
        entries
            .iter()
            .map(|entry| ResolvedTocEntry {
                label: entry.label.clone(),
                href: entry.href.clone(),
                position: self.resolve_in(documents, context, &entry.href),
                children: self.resolve_toc_in(documents, context, &entry.children),
            })
            .collect()
    }

    /// Next whitespace boundary after `position`, within its resource.
    pub async fn find_space_after(&self, position: usize) -> Result<Option<usize>, EpubError> {
        Ok(self
            .node_at(position)
            .await?
            .map(|entry| entry.document.find_space_after(position)))
    }

    /// Previous whitespace boundary before `position`, within its resource.
    pub async fn find_space_before(&self, position: usize) -> Result<Option<usize>, EpubError> {
        Ok(self
            .node_at(position)
            .await?
            .map(|entry| entry.document.find_space_before(position)))
    }

    /// Asset and link references of one spine resource.
    pub async fn resources_of(&self, id: &str) -> Result<Option<Vec<String>>, EpubError> {
        Ok(self.document(id).await?.map(Document::resources))
    }
}

fn entry_at<'a>(spine: &'a [String], documents: &'a [Document], position: usize) -> Option<SpineEntry<'a>> {
    documents
        .iter()
        .enumerate()
        .find(|(_, document)| document.contains(position))
        .map(|(index, document)| SpineEntry {
            index,
            id: spine[index].as_str(),
            document,
        })
}

fn is_external(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.contains("://")
        || lower.starts_with("www.")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
}

fn strip_fragment(path: &str) -> &str {
    path.split('#').next().unwrap_or(path)
}
