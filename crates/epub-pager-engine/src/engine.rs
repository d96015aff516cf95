//! Adaptive pagination engine.
//!
//! Page boundaries are discovered by asking a [`ViewportProbe`] whether a
//! candidate slice overflows. Candidates are aligned to whitespace through
//! the content's `find_space_after`. The search gallops forward while slices
//! fit, then bisects between the last fitting end and the first overflowing
//! end. Discovered pages are appended to a per-signature [`PageCache`] and
//! persisted through a [`KeyValueStore`].

use core::fmt;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use epub_pager::EpubError;

use crate::content::PagedContent;
use crate::page_cache::{storage_key, Page, PageCache};
use crate::probe::{CancelToken, LayoutSignatureProvider, StopFlag, ViewportProbe};
use crate::store::KeyValueStore;

/// Search and persistence tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationOptions {
    /// First step, in positions, when no page history exists.
    pub initial_step: usize,
    /// The search stops once its step shrinks below this.
    pub min_step: usize,
    /// Step multiplier while candidates keep fitting.
    pub growth_factor: usize,
    /// Minimum time between persists during a long extension.
    pub persist_interval: Duration,
    /// Upper bound on probe calls for one page.
    pub max_probes_per_page: usize,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            initial_step: 256,
            min_step: 1,
            growth_factor: 2,
            persist_interval: Duration::from_secs(2),
            max_probes_per_page: 64,
        }
    }
}

impl PaginationOptions {
    /// Persist after every discovered page.
    pub fn eager_persist() -> Self {
        Self {
            persist_interval: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Why an extension stopped without a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbandonReason {
    /// [`PaginationEngine::stop`] was called.
    Stopped,
    /// The layout signature changed mid-run.
    SignatureChanged,
}

/// Result of a page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageOutcome {
    /// Page covering the requested position.
    Ready(Page),
    /// Another extension is already running.
    NotStarted,
    /// The extension was abandoned. Pages found so far stay cached.
    Abandoned(AbandonReason),
    /// The position lies outside the content.
    OutOfRange,
}

impl PageOutcome {
    pub fn page(&self) -> Option<Page> {
        match self {
            Self::Ready(page) => Some(*page),
            _ => None,
        }
    }
}

/// Runtime diagnostics from pagination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaginationDiagnostic {
    CacheHit { position: usize, page: Page },
    CacheMiss { position: usize },
    PageComputed { page: Page, probes: usize },
    Persisted { signature: String, pages: usize },
    PersistFailed { signature: String, message: String },
    Abandoned { reason: AbandonReason, pages: usize },
    CacheDiscarded { signature: String, reason: String },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(PaginationDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

/// Errors returned by the pagination engine.
#[derive(Debug)]
pub enum EngineError {
    /// The content failed to load or slice.
    Content(EpubError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(err) => write!(f, "content error: {}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Content(err) => Some(err),
        }
    }
}

impl From<EpubError> for EngineError {
    fn from(value: EpubError) -> Self {
        Self::Content(value)
    }
}

enum Search {
    Found { page: Page, probes: usize },
    Cancelled,
}

struct ExtensionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ExtensionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ExtensionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Cancelled by an explicit stop or by any change of the layout signature.
struct ExtensionCancel<'a, L> {
    stop: &'a StopFlag,
    provider: &'a L,
    signature: &'a str,
}

impl<L: LayoutSignatureProvider> ExtensionCancel<'_, L> {
    fn reason(&self) -> Option<AbandonReason> {
        if self.stop.is_cancelled() {
            Some(AbandonReason::Stopped)
        } else if self.provider.current_signature() != self.signature {
            Some(AbandonReason::SignatureChanged)
        } else {
            None
        }
    }
}

impl<L: LayoutSignatureProvider> CancelToken for ExtensionCancel<'_, L> {
    fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }
}

/// Pagination engine over paged content.
pub struct PaginationEngine<C, P, L, S> {
    content: C,
    probe: P,
    signature: L,
    store: S,
    options: PaginationOptions,
    caches: Mutex<HashMap<String, PageCache>>,
    extending: AtomicBool,
    stop: StopFlag,
    diagnostic_sink: DiagnosticSink,
}

impl<C, P, L, S> PaginationEngine<C, P, L, S>
where
    C: PagedContent,
    P: ViewportProbe,
    L: LayoutSignatureProvider,
    S: KeyValueStore,
{
    pub fn new(content: C, probe: P, signature: L, store: S) -> Self {
        Self {
            content,
            probe,
            signature,
            store,
            options: PaginationOptions::default(),
            caches: Mutex::new(HashMap::new()),
            extending: AtomicBool::new(false),
            stop: StopFlag::new(),
            diagnostic_sink: None,
        }
    }

    pub fn with_options(mut self, options: PaginationOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a stop flag with the host. The flag is cleared whenever an
    /// extension starts.
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(PaginationDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: PaginationDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn options(&self) -> &PaginationOptions {
        &self.options
    }

    /// Handle that can stop a running extension.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Ask the running extension to abandon at its next yield point.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Whether an extension is currently running.
    pub fn is_extending(&self) -> bool {
        self.extending.load(Ordering::Acquire)
    }

    fn lock_caches(&self) -> std::sync::MutexGuard<'_, HashMap<String, PageCache>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the cache for `signature` on first use.
    async fn ensure_cache(&self, signature: &str) {
        if self.lock_caches().contains_key(signature) {
            return;
        }
        let key = storage_key(signature);
        let loaded = match self.store.get(&key).await {
            Ok(Some(payload)) => match PageCache::from_json(signature, &payload) {
                Ok(cache) => {
                    log::debug!("loaded {} cached page(s) for {}", cache.len(), signature);
                    cache
                }
                Err(err) => {
                    log::warn!("discarding persisted page cache {}: {}", key, err);
                    self.emit_diagnostic(PaginationDiagnostic::CacheDiscarded {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                    PageCache::new(signature)
                }
            },
            Ok(None) => PageCache::new(signature),
            Err(err) => {
                log::warn!("failed to load page cache {}: {}", key, err);
                self.emit_diagnostic(PaginationDiagnostic::CacheDiscarded {
                    signature: signature.to_string(),
                    reason: err.to_string(),
                });
                PageCache::new(signature)
            }
        };
        self.lock_caches()
            .entry(signature.to_string())
            .or_insert(loaded);
    }

    /// Already-discovered page containing `position` for the current layout.
    pub fn cached_page_for(&self, position: usize) -> Option<Page> {
        let signature = self.signature.current_signature();
        self.lock_caches()
            .get(&signature)
            .and_then(|cache| cache.page_for(position))
    }

    /// Discovered pages for the current layout.
    pub fn cached_pages(&self) -> Vec<Page> {
        let signature = self.signature.current_signature();
        self.lock_caches()
            .get(&signature)
            .map(|cache| cache.pages().to_vec())
            .unwrap_or_default()
    }

    /// Page containing `position`, extending the cache when needed.
    pub async fn page_for(&self, position: usize) -> Result<PageOutcome, EngineError> {
        if position >= self.content.size().await? {
            return Ok(PageOutcome::OutOfRange);
        }
        let signature = self.signature.current_signature();
        self.ensure_cache(&signature).await;
        if let Some(page) = self.cached_page_for(position) {
            self.emit_diagnostic(PaginationDiagnostic::CacheHit { position, page });
            return Ok(PageOutcome::Ready(page));
        }
        self.emit_diagnostic(PaginationDiagnostic::CacheMiss { position });
        self.compute_page_for(position).await
    }

    /// Page following `page`.
    pub async fn page_after(&self, page: Page) -> Result<PageOutcome, EngineError> {
        self.page_for(page.end + 1).await
    }

    /// Page preceding `page`.
    pub async fn page_before(&self, page: Page) -> Result<PageOutcome, EngineError> {
        match page.start.checked_sub(1) {
            Some(position) => self.page_for(position).await,
            None => Ok(PageOutcome::OutOfRange),
        }
    }

    /// Extend the cache through the last position.
    pub async fn paginate_to_end(&self) -> Result<PageOutcome, EngineError> {
        match self.content.size().await?.checked_sub(1) {
            Some(last) => self.page_for(last).await,
            None => Ok(PageOutcome::OutOfRange),
        }
    }

    /// Append pages from the cache frontier until one contains `position`.
    ///
    /// Returns [`PageOutcome::NotStarted`] while another extension runs.
    pub async fn compute_page_for(&self, position: usize) -> Result<PageOutcome, EngineError> {
        let Some(_guard) = ExtensionGuard::acquire(&self.extending) else {
            log::debug!("extension already running; page {} not started", position);
            return Ok(PageOutcome::NotStarted);
        };
        self.stop.reset();
        let signature = self.signature.current_signature();
        self.ensure_cache(&signature).await;
        let size = self.content.size().await?;
        let cancel = ExtensionCancel {
            stop: &self.stop,
            provider: &self.signature,
            signature: &signature,
        };

        let mut last_persist = Instant::now();
        let result = loop {
            if let Some(reason) = cancel.reason() {
                break Ok(PageOutcome::Abandoned(reason));
            }
            let (start, estimate, existing) = {
                let caches = self.lock_caches();
                match caches.get(&signature) {
                    Some(cache) => (
                        cache.next_start(),
                        cache.average_page_len(),
                        cache.page_for(position),
                    ),
                    None => (0, None, None),
                }
            };
            if let Some(page) = existing {
                break Ok(PageOutcome::Ready(page));
            }
            if start >= size {
                break Ok(PageOutcome::OutOfRange);
            }

            let (page, probes) = match self.search(start, estimate, &cancel).await {
                Ok(Search::Found { page, probes }) => (page, probes),
                Ok(Search::Cancelled) => {
                    let reason = cancel.reason().unwrap_or(AbandonReason::Stopped);
                    break Ok(PageOutcome::Abandoned(reason));
                }
                Err(err) => break Err(err),
            };
            if let Some(reason) = cancel.reason() {
                break Ok(PageOutcome::Abandoned(reason));
            }
            let appended = self
                .lock_caches()
                .entry(signature.clone())
                .or_insert_with(|| PageCache::new(signature.as_str()))
                .push(page);
            if !appended {
                break Ok(PageOutcome::NotStarted);
            }
            log::debug!(
                "page [{}, {}] computed with {} probe(s)",
                page.start,
                page.end,
                probes
            );
            self.emit_diagnostic(PaginationDiagnostic::PageComputed { page, probes });
            if page.contains(position) {
                break Ok(PageOutcome::Ready(page));
            }
            if last_persist.elapsed() >= self.options.persist_interval {
                self.persist(&signature).await;
                last_persist = Instant::now();
            }
            tokio::task::yield_now().await;
        };

        self.persist(&signature).await;
        if let Ok(PageOutcome::Abandoned(reason)) = result {
            let pages = self
                .lock_caches()
                .get(&signature)
                .map_or(0, PageCache::len);
            log::debug!("extension for {} abandoned: {:?}", signature, reason);
            self.emit_diagnostic(PaginationDiagnostic::Abandoned { reason, pages });
        }
        result
    }

    /// Largest page starting at `start` that fits the viewport.
    ///
    /// Does not touch the cache. Returns `None` when `start` is out of range
    /// or the search was cancelled.
    pub async fn compute_maximal_page(&self, start: usize) -> Result<Option<Page>, EngineError> {
        if start >= self.content.size().await? {
            return Ok(None);
        }
        let signature = self.signature.current_signature();
        let estimate = self
            .lock_caches()
            .get(&signature)
            .and_then(PageCache::average_page_len);
        let cancel = ExtensionCancel {
            stop: &self.stop,
            provider: &self.signature,
            signature: &signature,
        };
        match self.search(start, estimate, &cancel).await? {
            Search::Found { page, .. } => Ok(Some(page)),
            Search::Cancelled => Ok(None),
        }
    }

    async fn search<T>(
        &self,
        start: usize,
        estimate: Option<usize>,
        cancel: &T,
    ) -> Result<Search, EngineError>
    where
        T: CancelToken + ?Sized,
    {
        let Some((_, section_end)) = self.content.section_bounds(start).await? else {
            return Ok(Search::Found {
                page: Page::new(start, start),
                probes: 0,
            });
        };
        let min_step = self.options.min_step.max(1);
        let growth = self.options.growth_factor.max(2);
        let mut step = estimate
            .unwrap_or(self.options.initial_step)
            .max(min_step);
        let mut fits: Option<usize> = None;
        let mut overflows: Option<usize> = None;
        let mut growing = true;
        let mut probes = 0usize;
        let mut target = start.saturating_add(step);

        loop {
            if cancel.is_cancelled() {
                return Ok(Search::Cancelled);
            }
            if probes >= self.options.max_probes_per_page {
                log::debug!("probe budget exhausted for page at {}", start);
                break;
            }
            // A step of 1 lands on the break right after the accepted end, so
            // the search ends only once that extension is known to overflow.
            let from = target.min(section_end).saturating_sub(1).max(start);
            let candidate = self
                .content
                .find_space_after(from)
                .await?
                .unwrap_or(section_end)
                .clamp(start, section_end);

            let known = fits.is_some_and(|end| candidate <= end)
                || overflows.is_some_and(|end| candidate >= end);
            if known {
                if fits == Some(section_end) {
                    break;
                }
                growing = false;
                step /= 2;
                if step < min_step {
                    break;
                }
                target = fits.unwrap_or(start).saturating_add(step);
                continue;
            }

            let Some(markup) = self.content.contents_at(start, candidate).await? else {
                break;
            };
            probes += 1;
            if self.probe.overflows(&markup).await {
                overflows = Some(candidate);
                growing = false;
                step = (step / 2).max(min_step);
            } else {
                fits = Some(candidate);
                if candidate >= section_end {
                    break;
                }
                step = if growing {
                    step.saturating_mul(growth)
                } else {
                    (step / 2).max(min_step)
                };
            }
            target = fits.unwrap_or(start).saturating_add(step);
        }

        let end = match fits {
            Some(end) => end,
            None => {
                // Nothing fits: take the first break opportunity so the
                // reader still advances.
                let forced = self
                    .content
                    .find_space_after(start)
                    .await?
                    .unwrap_or(start)
                    .clamp(start, section_end);
                log::warn!("no fitting slice at {}; forcing page end {}", start, forced);
                forced
            }
        };
        Ok(Search::Found {
            page: Page::new(start, end),
            probes,
        })
    }

    async fn persist(&self, signature: &str) {
        let payload = {
            let caches = self.lock_caches();
            let Some(cache) = caches.get(signature) else {
                return;
            };
            cache.to_json().map(|json| (json, cache.len()))
        };
        let result = match payload {
            Ok((json, pages)) => self
                .store
                .set(&storage_key(signature), &json)
                .await
                .map(|_| pages),
            Err(err) => Err(io::Error::new(io::ErrorKind::InvalidData, err.to_string())),
        };
        match result {
            Ok(pages) => {
                log::debug!("persisted {} page(s) for {}", pages, signature);
                self.emit_diagnostic(PaginationDiagnostic::Persisted {
                    signature: signature.to_string(),
                    pages,
                });
            }
            Err(err) => {
                log::warn!("failed to persist page cache for {}: {}", signature, err);
                self.emit_diagnostic(PaginationDiagnostic::PersistFailed {
                    signature: signature.to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Persist every in-memory cache.
    pub async fn flush(&self) {
        let signatures: Vec<String> = self.lock_caches().keys().cloned().collect();
        for signature in signatures {
            self.persist(&signature).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SharedSignature;
    use crate::store::MemoryKeyValueStore;
    use epub_pager::{MemoryResourceReader, SpineComposer, SpineOptions};
    use std::sync::atomic::AtomicUsize;

    /// Overflows once the visible text exceeds `capacity` characters.
    #[derive(Clone)]
    struct CharProbe {
        capacity: usize,
        calls: Arc<AtomicUsize>,
    }

    impl CharProbe {
        fn new(capacity: usize) -> Self {
            Self {
                capacity,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn visible_chars(markup: &str) -> usize {
        let mut in_tag = false;
        let mut count = 0;
        for c in markup.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => count += 1,
                _ => {}
            }
        }
        count
    }

    impl ViewportProbe for CharProbe {
        async fn overflows(&self, markup: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            visible_chars(markup) > self.capacity
        }
    }

    fn words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{:03}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn book(chapters: &[String]) -> SpineComposer<MemoryResourceReader> {
        let mut reader = MemoryResourceReader::new();
        let mut spine = Vec::new();
        for (index, body) in chapters.iter().enumerate() {
            let path = format!("c{}.xhtml", index);
            reader.insert(path.clone(), format!("<p>{}</p>", body));
            spine.push(path);
        }
        SpineComposer::new(reader, spine).with_options(SpineOptions::raw())
    }

    fn engine(
        chapters: &[String],
        capacity: usize,
    ) -> PaginationEngine<SpineComposer<MemoryResourceReader>, CharProbe, String, MemoryKeyValueStore>
    {
        PaginationEngine::new(
            book(chapters),
            CharProbe::new(capacity),
            "sig".to_string(),
            MemoryKeyValueStore::new(),
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn maximal_page_ends_on_the_last_fitting_word() {
        // "w000 w001 ..." words are 4 chars plus a separating space.
        let engine = engine(&[words(100)], 22);
        let page = engine
            .compute_maximal_page(0)
            .await
            .expect("content")
            .expect("page");
        // [0, 19] is "w000 w001 w002 w003 " (20 chars); the next break at 24 overflows.
        assert_eq!(page, Page::new(0, 19));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stopped_maximal_page_search_does_not_probe() {
        let engine = engine(&[words(100)], 22);
        engine.stop();
        assert_eq!(engine.compute_maximal_page(0).await.expect("content"), None);
        assert_eq!(engine.probe.calls(), 0);

        engine.stop_flag().reset();
        assert!(engine
            .compute_maximal_page(0)
            .await
            .expect("content")
            .is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pages_are_contiguous_and_cover_the_book() {
        let engine = engine(&[words(120), words(30)], 40);
        let outcome = engine.paginate_to_end().await.expect("content");
        let size = engine.content().size().await.expect("size");
        assert_eq!(outcome.page().map(|page| page.end), Some(size - 1));
        let pages = engine.cached_pages();
        assert_eq!(pages.first().map(|page| page.start), Some(0));
        for pair in pages.windows(2) {
            assert_eq!(pair[1].start, pair[0].end + 1);
        }
        for page in &pages {
            assert!(page.len() <= 41, "page {:?} too long", page);
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pages_never_cross_a_section() {
        let engine = engine(&[words(3), words(50)], 1000);
        let first = engine.page_for(0).await.expect("content").page().expect("page");
        let section = engine
            .content()
            .section_bounds(0)
            .await
            .expect("bounds")
            .expect("section");
        assert_eq!(first, Page::new(0, section.1));
        let second = engine.page_after(first).await.expect("content").page().expect("page");
        assert_eq!(second.start, section.1 + 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cached_pages_skip_the_probe() {
        let engine = engine(&[words(60)], 30);
        let page = engine.page_for(100).await.expect("content").page().expect("page");
        let calls = engine.probe.calls();
        let again = engine.page_for(page.start).await.expect("content");
        assert_eq!(again, PageOutcome::Ready(page));
        assert_eq!(engine.probe.calls(), calls);
        assert_eq!(engine.cached_page_for(page.end), Some(page));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn out_of_range_positions_are_reported() {
        let engine = engine(&[words(5)], 30);
        assert_eq!(engine.page_for(10_000).await.expect("content"), PageOutcome::OutOfRange);
        assert_eq!(
            engine.page_before(Page::new(0, 3)).await.expect("content"),
            PageOutcome::OutOfRange
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_extension_is_not_started() {
        let engine = engine(&[words(400)], 20);
        let (first, second) = tokio::join!(engine.page_for(1500), engine.page_for(1900));
        assert!(matches!(first.expect("content"), PageOutcome::Ready(page) if page.contains(1500)));
        assert_eq!(second.expect("content"), PageOutcome::NotStarted);
        assert!(!engine.is_extending());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn oversized_words_are_forced_onto_a_page() {
        let engine = engine(&["abcdefghijklmnop qrs".to_string()], 3);
        let page = engine.page_for(0).await.expect("content").page().expect("page");
        assert_eq!(page, Page::new(0, 16));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn probe_budget_bounds_each_page() {
        let options = PaginationOptions {
            max_probes_per_page: 2,
            ..PaginationOptions::default()
        };
        let engine = engine(&[words(200)], 50).with_options(options);
        let page = engine.page_for(0).await.expect("content").page().expect("page");
        assert_eq!(page.start, 0);
        assert!(engine.probe.calls() <= 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn completion_persists_the_cache() {
        let store = MemoryKeyValueStore::new();
        let engine = PaginationEngine::new(
            book(&[words(50)]),
            CharProbe::new(30),
            "sig".to_string(),
            store.clone(),
        );
        engine.page_for(120).await.expect("content");
        let payload = store.get("pages:sig").await.expect("get").expect("persisted");
        let cache = PageCache::from_json("sig", &payload).expect("valid");
        assert_eq!(cache.pages(), engine.cached_pages().as_slice());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn diagnostics_report_misses_hits_and_pages() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut engine = engine(&[words(20)], 30);
        engine.set_diagnostic_sink(move |event| {
            if let Ok(mut events) = sink.lock() {
                events.push(event);
            }
        });
        engine.page_for(0).await.expect("content");
        engine.page_for(0).await.expect("content");
        let events = events.lock().expect("events").clone();
        assert!(matches!(events[0], PaginationDiagnostic::CacheMiss { position: 0 }));
        assert!(events
            .iter()
            .any(|event| matches!(event, PaginationDiagnostic::PageComputed { .. })));
        assert!(events
            .iter()
            .any(|event| matches!(event, PaginationDiagnostic::Persisted { .. })));
        assert!(matches!(
            events.last(),
            Some(PaginationDiagnostic::CacheHit { position: 0, .. })
        ));
    }

    /// Switches the shared signature after a number of probe calls.
    struct ResizingProbe {
        inner: CharProbe,
        signature: SharedSignature,
        after: usize,
    }

    impl ViewportProbe for ResizingProbe {
        async fn overflows(&self, markup: &str) -> bool {
            let result = self.inner.overflows(markup).await;
            if self.inner.calls() == self.after {
                self.signature.set("resized");
            }
            result
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn signature_change_abandons_the_extension() {
        let signature = SharedSignature::new("original");
        let probe = ResizingProbe {
            inner: CharProbe::new(20),
            signature: signature.clone(),
            after: 12,
        };
        let store = MemoryKeyValueStore::new();
        let engine = PaginationEngine::new(book(&[words(300)]), probe, signature.clone(), store.clone());
        let outcome = engine.page_for(1400).await.expect("content");
        assert_eq!(outcome, PageOutcome::Abandoned(AbandonReason::SignatureChanged));
        assert!(store.get("pages:original").await.expect("get").is_some());
        // The new layout starts its own cache.
        assert!(engine.cached_pages().is_empty());
        let page = engine.page_for(0).await.expect("content").page().expect("page");
        assert_eq!(page.start, 0);
        assert_eq!(engine.cached_pages().len(), 1);
    }

    struct StoppingProbe {
        inner: CharProbe,
        stop: StopFlag,
        after: usize,
    }

    impl ViewportProbe for StoppingProbe {
        async fn overflows(&self, markup: &str) -> bool {
            let result = self.inner.overflows(markup).await;
            if self.inner.calls() == self.after {
                self.stop.stop();
            }
            result
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stop_abandons_and_keeps_partial_progress() {
        let stop = StopFlag::new();
        let probe = StoppingProbe {
            inner: CharProbe::new(20),
            stop: stop.clone(),
            after: 15,
        };
        let engine = PaginationEngine::new(
            book(&[words(300)]),
            probe,
            "sig".to_string(),
            MemoryKeyValueStore::new(),
        )
        .with_stop_flag(stop);
        let outcome = engine.page_for(1400).await.expect("content");
        assert_eq!(outcome, PageOutcome::Abandoned(AbandonReason::Stopped));
        let partial = engine.cached_pages();
        assert!(!partial.is_empty());
        // A new request clears the flag and continues from the frontier.
        let resumed = engine.page_for(1400).await.expect("content");
        assert!(matches!(resumed, PageOutcome::Ready(page) if page.contains(1400)));
        assert_eq!(&engine.cached_pages()[..partial.len()], partial.as_slice());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn corrupt_persisted_cache_falls_back_to_empty() {
        let store = MemoryKeyValueStore::new();
        store.set("pages:sig", "{not json").await.expect("seed");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut engine = PaginationEngine::new(
            book(&[words(20)]),
            CharProbe::new(30),
            "sig".to_string(),
            store.clone(),
        );
        engine.set_diagnostic_sink(move |event| {
            if let Ok(mut events) = sink.lock() {
                events.push(event);
            }
        });
        let page = engine.page_for(0).await.expect("content").page().expect("page");
        assert_eq!(page.start, 0);
        assert!(events
            .lock()
            .expect("events")
            .iter()
            .any(|event| matches!(event, PaginationDiagnostic::CacheDiscarded { .. })));
        let payload = store.get("pages:sig").await.expect("get").expect("rewritten");
        assert!(PageCache::from_json("sig", &payload).is_ok());
    }
}
