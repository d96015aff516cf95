//! Positional document model and spine composer for paged EPUB reading.
//!
//! Every spine resource is parsed into a [`Document`] whose leaves occupy a
//! contiguous slot of one global position space. A [`SpineComposer`] stitches
//! resources together so a pagination engine can ask for whitespace
//! boundaries and content slices by global position.
//!
//! ```no_run
//! use epub_pager::{MemoryResourceReader, SpineComposer};
//!
//! # async fn demo() -> Result<(), epub_pager::EpubError> {
//! let reader = MemoryResourceReader::new().with_entry("c1.xhtml", "<p>Hello world</p>");
//! let spine = SpineComposer::new(reader, vec!["c1.xhtml".into()]);
//! assert_eq!(spine.size().await?, 11);
//! assert_eq!(spine.find_space_after(0).await?, Some(5));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod attributes;
pub mod comic;
pub mod error;
pub mod markup;
pub mod node;
pub mod package;
pub mod reader;
pub mod spine;

pub use attributes::{parse_attributes, value_of, Attributes};
pub use comic::ComicArchive;
pub use error::{EpubError, ErrorPhase, ParseError, ResourceError};
pub use markup::{extract_body, is_void_element, parse_fragment, parse_resource, VOID_ELEMENTS};
pub use node::{Document, Node, NodeId, NodeKind, ReferenceKind, Rewrite, LEAF_ELEMENTS};
pub use package::{parse_package, ManifestItem, Package, ResolvedTocEntry, TocEntry};
pub use reader::{data_uri, mime_from_path, MemoryResourceReader, ResourceReader};
pub use spine::{SpineComposer, SpineEntry, SpineOptions};
