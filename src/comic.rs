//! Paged image archives (CBZ-style): one position per image entry.

use tokio::sync::OnceCell;

use crate::error::EpubError;
use crate::reader::{is_image_path, ResourceReader};

/// Image archive read page by page.
pub struct ComicArchive<R> {
    reader: R,
    pages: OnceCell<Vec<String>>,
}

impl<R: ResourceReader> ComicArchive<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pages: OnceCell::new(),
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Image entry paths in archive order.
    pub async fn page_paths(&self) -> Result<&[String], EpubError> {
        let pages = self
            .pages
            .get_or_try_init(|| async {
                let entries = self.reader.list_resources().await?;
                let total = entries.len();
                let pages: Vec<String> = entries.into_iter().filter(|path| is_image_path(path)).collect();
                if pages.len() < total {
                    log::debug!("ignoring {} non-image archive entries", total - pages.len());
                }
                Ok::<_, EpubError>(pages)
            })
            .await?;
        Ok(pages.as_slice())
    }

    /// Number of pages.
    pub async fn size(&self) -> Result<usize, EpubError> {
        Ok(self.page_paths().await?.len())
    }

    /// First page as a `data:` URI.
    pub async fn cover(&self) -> Result<Option<String>, EpubError> {
        self.contents_at(0).await
    }

    /// Page at `position` as a `data:` URI, `None` past the end.
    pub async fn contents_at(&self, position: usize) -> Result<Option<String>, EpubError> {
        let Some(path) = self.page_paths().await?.get(position) else {
            return Ok(None);
        };
        Ok(Some(self.reader.read_inline(path).await?))
    }
}
