//! Diagnostic Sinks
//!
//! Expected failures are returned as errors *and* raised here: every raise is
//! logged at WARN through `tracing`, then handed to the component's injected
//! [`DiagnosticSink`]. Tests inspect a [`MemorySink`] instead of scraping logs.

use crate::domain::{Diagnostic, DiagnosticSink};
use crate::error::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Log `error` and forward it to `sink`
pub(crate) fn raise(sink: &dyn DiagnosticSink, error: &Error) {
    let diagnostic = Diagnostic::from_error(error);
    match diagnostic.device {
        Some(device) => warn!(kind = %diagnostic.kind, device = %device, "{}", diagnostic.message),
        None => warn!(kind = %diagnostic.kind, "{}", diagnostic.message),
    }
    sink.report(diagnostic);
}

/// Sink that drops everything; the `tracing` output is all that remains
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl DiscardSink {
    pub fn shared() -> Arc<dyn DiagnosticSink> {
        Arc::new(Self)
    }
}

impl DiagnosticSink for DiscardSink {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Sink that keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Most recent diagnostic
    pub fn last(&self) -> Option<Diagnostic> {
        self.records.lock().last().cloned()
    }

    /// Number of diagnostics held
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Take all diagnostics, leaving the sink empty
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: Diagnostic) {
        self.records.lock().push(diagnostic);
    }
}
