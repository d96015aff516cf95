//! Paged content seen by the pagination engine.

use epub_pager::{ComicArchive, EpubError, ResourceReader, SpineComposer};

/// Anything that can be sliced by global position.
#[allow(async_fn_in_trait)]
pub trait PagedContent {
    /// Length of the position space.
    async fn size(&self) -> Result<usize, EpubError>;

    /// `[start, end]` of the section containing `position`. Pages never
    /// cross a section end.
    async fn section_bounds(&self, position: usize) -> Result<Option<(usize, usize)>, EpubError>;

    /// Next break opportunity after `position`.
    async fn find_space_after(&self, position: usize) -> Result<Option<usize>, EpubError>;

    /// Markup for `[start, end]`.
    async fn contents_at(&self, start: usize, end: usize) -> Result<Option<String>, EpubError>;
}

impl<R: ResourceReader> PagedContent for SpineComposer<R> {
    async fn size(&self) -> Result<usize, EpubError> {
        SpineComposer::size(self).await
    }

    async fn section_bounds(&self, position: usize) -> Result<Option<(usize, usize)>, EpubError> {
        SpineComposer::section_bounds(self, position).await
    }

    async fn find_space_after(&self, position: usize) -> Result<Option<usize>, EpubError> {
        SpineComposer::find_space_after(self, position).await
    }

    async fn contents_at(&self, start: usize, end: usize) -> Result<Option<String>, EpubError> {
        SpineComposer::contents_at(self, start, end).await
    }
}

// Each image is its own section, so every page holds exactly one image.
impl<R: ResourceReader> PagedContent for ComicArchive<R> {
    async fn size(&self) -> Result<usize, EpubError> {
        ComicArchive::size(self).await
    }

    async fn section_bounds(&self, position: usize) -> Result<Option<(usize, usize)>, EpubError> {
        let size = ComicArchive::size(self).await?;
        Ok((position < size).then_some((position, position)))
    }

    async fn find_space_after(&self, position: usize) -> Result<Option<usize>, EpubError> {
        let size = ComicArchive::size(self).await?;
        Ok((position < size).then_some(position))
    }

    async fn contents_at(&self, start: usize, _end: usize) -> Result<Option<String>, EpubError> {
        Ok(ComicArchive::contents_at(self, start)
            .await?
            .map(|uri| format!("<img src=\"{}\"/>", uri)))
    }
}
