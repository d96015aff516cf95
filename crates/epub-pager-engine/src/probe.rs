//! Measurement, layout-signature and cancellation contracts.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Oracle answering "does this markup overflow the viewport".
///
/// Must be deterministic for a fixed signature and fixed markup.
#[allow(async_fn_in_trait)]
pub trait ViewportProbe {
    async fn overflows(&self, markup: &str) -> bool;
}

/// Source of the active layout signature.
pub trait LayoutSignatureProvider {
    fn current_signature(&self) -> String;
}

impl LayoutSignatureProvider for String {
    fn current_signature(&self) -> String {
        self.clone()
    }
}

impl LayoutSignatureProvider for &str {
    fn current_signature(&self) -> String {
        (*self).to_string()
    }
}

/// Layout-affecting settings rendered to a stable signature string.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutSignature {
    pub document_id: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub font_family: String,
    pub font_size_px: f32,
    pub line_height: f32,
}

impl LayoutSignature {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            viewport_width: 0,
            viewport_height: 0,
            font_family: String::new(),
            font_size_px: 16.0,
            line_height: 1.2,
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn with_font(mut self, family: impl Into<String>, size_px: f32) -> Self {
        self.font_family = family.into();
        self.font_size_px = size_px;
        self
    }

    pub fn with_line_height(mut self, line_height: f32) -> Self {
        self.line_height = line_height;
        self
    }
}

impl fmt::Display for LayoutSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}x{}|{}|{:.2}|{:.2}",
            self.document_id,
            self.viewport_width,
            self.viewport_height,
            self.font_family,
            self.font_size_px,
            self.line_height
        )
    }
}

impl LayoutSignatureProvider for LayoutSignature {
    fn current_signature(&self) -> String {
        self.to_string()
    }
}

/// Signature shared with the host, updated on resize or font change.
#[derive(Clone, Debug, Default)]
pub struct SharedSignature {
    inner: Arc<Mutex<String>>,
}

impl SharedSignature {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(signature.into())),
        }
    }

    /// Replace the active signature.
    pub fn set(&self, signature: impl Into<String>) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = signature.into();
    }
}

impl LayoutSignatureProvider for SharedSignature {
    fn current_signature(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cancellation hook checked at every pagination yield point.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Shared stop flag. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct StopFlag {
    stopped: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the running extension to stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl CancelToken for StopFlag {
    fn is_cancelled(&self) -> bool {
        self.is_stopped()
    }
}
