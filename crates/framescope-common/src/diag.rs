//! Diagnostic reporting for profiler misuse.
//!
//! Misuse never aborts the host; it is routed to an injectable sink so
//! applications can choose to log, collect, or assert on it.

use crate::error::ProfError;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Destination for caller-misuse reports.
pub trait DiagnosticSink: Send {
    /// Called once per misuse occurrence.
    fn report(&self, err: &ProfError);
}

impl<S> DiagnosticSink for Arc<S>
where
    S: DiagnosticSink + Sync + ?Sized,
{
    fn report(&self, err: &ProfError) {
        (**self).report(err);
    }
}

/// Default sink: emits a `tracing` warning per report.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, err: &ProfError) {
        warn!(error = %err, "profiler misuse");
    }
}

/// Sink that retains every report, for hosts that want to inspect or assert
/// on profiler misuse.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<ProfError>>,
}

impl CollectingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reports collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no misuse has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain and return every collected report.
    pub fn take(&self) -> Vec<ProfError> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProfError>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, err: &ProfError) {
        self.lock().push(err.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_retains_reports() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());

        sink.report(&ProfError::EmptyBlockName);
        sink.report(&ProfError::UnknownBlock {
            name: "render".into(),
        });

        assert_eq!(sink.len(), 2);
        let reports = sink.take();
        assert_eq!(reports[0], ProfError::EmptyBlockName);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_shared_sink_through_arc() {
        let sink = Arc::new(CollectingSink::new());
        let handle: Arc<CollectingSink> = Arc::clone(&sink);

        handle.report(&ProfError::BlockNotOpen { name: "ai".into() });
        assert_eq!(sink.len(), 1);
    }
}
