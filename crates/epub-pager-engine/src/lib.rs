//! Adaptive pagination over `epub-pager` content.
//!
//! A [`PaginationEngine`] discovers page boundaries lazily by probing a host
//! viewport, caches them per layout signature and persists the cache through
//! a [`KeyValueStore`].
//!
//! ```no_run
//! use epub_pager::{MemoryResourceReader, SpineComposer};
//! use epub_pager_engine::{MemoryKeyValueStore, PaginationEngine, ViewportProbe};
//!
//! struct Chars(usize);
//!
//! impl ViewportProbe for Chars {
//!     async fn overflows(&self, markup: &str) -> bool {
//!         markup.len() > self.0
//!     }
//! }
//!
//! # async fn demo() -> Result<(), epub_pager_engine::EngineError> {
//! let reader = MemoryResourceReader::new().with_entry("c1.xhtml", "<p>Hello paged world</p>");
//! let spine = SpineComposer::new(reader, vec!["c1.xhtml".into()]);
//! let engine = PaginationEngine::new(spine, Chars(32), "book|600x800", MemoryKeyValueStore::new());
//! let first = engine.page_for(0).await?;
//! # let _ = first;
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

pub mod content;
pub mod engine;
pub mod page_cache;
pub mod probe;
pub mod store;

pub use content::PagedContent;
pub use engine::{
    AbandonReason, EngineError, PageOutcome, PaginationDiagnostic, PaginationEngine,
    PaginationOptions,
};
pub use page_cache::{storage_key, CacheDecodeError, Page, PageCache};
pub use probe::{
    CancelToken, LayoutSignature, LayoutSignatureProvider, SharedSignature, StopFlag,
    ViewportProbe,
};
pub use store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
