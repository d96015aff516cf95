//! Layout-keyed page boundary cache and its persisted form.

use core::fmt;

use serde::{Deserialize, Serialize};

const CACHE_SCHEMA_VERSION: u8 = 1;

/// Inclusive range of global positions shown on one screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Page {
    pub start: usize,
    pub end: usize,
}

impl Page {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position <= self.end
    }

    /// Number of positions on the page.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }
}

/// Why a persisted payload was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheDecodeError {
    /// Not a valid envelope.
    Malformed(String),
    /// Written by an incompatible schema.
    Version { found: u8 },
    /// Written for a different layout.
    Signature { found: String },
    /// Pages are not contiguous from position 0.
    Order { index: usize },
}

impl fmt::Display for CacheDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed page cache: {}", message),
            Self::Version { found } => write!(
                f,
                "page cache schema {} (expected {})",
                found, CACHE_SCHEMA_VERSION
            ),
            Self::Signature { found } => write!(f, "page cache written for signature {}", found),
            Self::Order { index } => write!(f, "page {} breaks page ordering", index),
        }
    }
}

impl std::error::Error for CacheDecodeError {}

/// Discovered pages for one layout signature.
///
/// Pages are append-only and contiguous: each page starts right after the
/// previous one ends, the first at position 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageCache {
    signature: String,
    pages: Vec<Page>,
}

impl PageCache {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            pages: Vec::new(),
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Key this cache persists under.
    pub fn storage_key(&self) -> String {
        storage_key(&self.signature)
    }

    /// Cached page containing `position`.
    pub fn page_for(&self, position: usize) -> Option<Page> {
        let index = self.pages.partition_point(|page| page.end < position);
        self.pages
            .get(index)
            .copied()
            .filter(|page| page.contains(position))
    }

    /// Largest page end, `0` when empty.
    pub fn frontier(&self) -> usize {
        self.pages.iter().map(|page| page.end).max().unwrap_or(0)
    }

    /// Start of the next page to discover.
    pub fn next_start(&self) -> usize {
        if self.pages.is_empty() {
            0
        } else {
            self.frontier() + 1
        }
    }

    /// Append a page. Rejects pages that do not start at [`Self::next_start`].
    pub fn push(&mut self, page: Page) -> bool {
        if page.start != self.next_start() || page.end < page.start {
            log::warn!(
                "rejecting page [{}, {}] for cache expecting start {}",
                page.start,
                page.end,
                self.next_start()
            );
            return false;
        }
        self.pages.push(page);
        true
    }

    /// Running average page length, `None` without history.
    pub fn average_page_len(&self) -> Option<usize> {
        if self.pages.is_empty() {
            return None;
        }
        let total: usize = self.pages.iter().map(Page::len).sum();
        Some(total / self.pages.len())
    }

    /// Whether the cache reaches the last position of a `size`-long document.
    pub fn is_complete(&self, size: usize) -> bool {
        size == 0 || (!self.pages.is_empty() && self.frontier() + 1 >= size)
    }

    /// Serialize to the versioned JSON envelope.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&PersistedCacheEnvelope::from_cache(self))
    }

    /// Decode a persisted payload written for `signature`.
    pub fn from_json(signature: &str, payload: &str) -> Result<Self, CacheDecodeError> {
        let envelope: PersistedCacheEnvelope = serde_json::from_str(payload)
            .map_err(|err| CacheDecodeError::Malformed(err.to_string()))?;
        envelope.into_cache(signature)
    }
}

/// Storage key for the cache of `signature`.
pub fn storage_key(signature: &str) -> String {
    format!("pages:{}", signature)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PersistedCacheEnvelope {
    version: u8,
    signature: String,
    pages: Vec<PersistedPage>,
}

impl PersistedCacheEnvelope {
    fn from_cache(cache: &PageCache) -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            signature: cache.signature.clone(),
            pages: cache.pages.iter().map(PersistedPage::from).collect(),
        }
    }

    fn into_cache(self, signature: &str) -> Result<PageCache, CacheDecodeError> {
        if self.version != CACHE_SCHEMA_VERSION {
            return Err(CacheDecodeError::Version {
                found: self.version,
            });
        }
        if self.signature != signature {
            return Err(CacheDecodeError::Signature {
                found: self.signature,
            });
        }
        let mut cache = PageCache::new(signature);
        for (index, page) in self.pages.into_iter().enumerate() {
            let page = Page::from(page);
            if page.start != cache.next_start() || page.end < page.start {
                return Err(CacheDecodeError::Order { index });
            }
            cache.pages.push(page);
        }
        Ok(cache)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct PersistedPage {
    start: usize,
    end: usize,
}

impl From<&Page> for PersistedPage {
    fn from(page: &Page) -> Self {
        Self {
            start: page.start,
            end: page.end,
        }
    }
}

impl From<PersistedPage> for Page {
    fn from(page: PersistedPage) -> Self {
        Self {
            start: page.start,
            end: page.end,
        }
    }
}
