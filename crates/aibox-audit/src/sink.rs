// sink.rs — Streaming sinks.
//
// Sinks forward batches to external consumers (SIEM collectors, object
// stores, queues). They are strictly secondary: the local immutable store
// is authoritative, so a sink failure is warned, parked in a bounded
// on-disk retry buffer, and re-attempted on later appends. It never blocks
// or fails an append.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::batch::Batch;
use crate::error::AuditError;

/// A streaming consumer of persisted batches.
pub trait EventSink: Send + Sync {
    /// Display name for logs and errors.
    fn name(&self) -> &str;

    /// Deliver one batch. Failures are retried on later appends.
    fn emit(&self, batch: &Batch) -> Result<(), AuditError>;
}

/// Sink that POSTs each batch as JSON to an HTTP collector.
pub struct HttpSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Result<Self, AuditError> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuditError::SinkFailed {
                sink: "http".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client, url })
    }
}

impl EventSink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    fn emit(&self, batch: &Batch) -> Result<(), AuditError> {
        let response = self
            .client
            .post(&self.url)
            .json(batch)
            .send()
            .map_err(|e| AuditError::SinkFailed {
                sink: self.name().to_string(),
                message: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AuditError::SinkFailed {
                sink: self.name().to_string(),
                message: format!("collector returned {}", response.status()),
            })
        }
    }
}

/// Fans batches out to every registered sink and keeps a bounded on-disk
/// retry buffer of batch keys that failed delivery.
pub(crate) struct SinkDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
    retry_path: PathBuf,
    max_pending: usize,
}

impl SinkDispatcher {
    pub(crate) fn new(store_dir: &Path) -> Self {
        Self {
            sinks: Vec::new(),
            // Not `.json`: batch listing must never pick this file up.
            retry_path: store_dir.join("sink-retry.state"),
            max_pending: 32,
        }
    }

    pub(crate) fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Deliver a freshly appended batch, retrying parked keys first.
    /// Never returns an error: failures are warned and parked.
    pub(crate) fn dispatch(&self, batch: &Batch, reread: &dyn Fn(&str) -> Option<Batch>) {
        if self.sinks.is_empty() {
            return;
        }

        let mut still_pending = Vec::new();
        for key in self.load_pending() {
            match reread(&key) {
                Some(parked) => {
                    if !self.emit_all(&parked) {
                        still_pending.push(key);
                    }
                }
                // The batch is gone (retention); nothing left to deliver.
                None => {}
            }
        }

        if !self.emit_all(batch) {
            still_pending.push(batch.key.clone());
        }

        while still_pending.len() > self.max_pending {
            let dropped = still_pending.remove(0);
            warn!("sink retry buffer full; dropping oldest pending batch '{dropped}'");
        }
        self.save_pending(&still_pending);
    }

    fn emit_all(&self, batch: &Batch) -> bool {
        let mut all_ok = true;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(batch) {
                warn!("audit sink '{}' failed for batch '{}': {e}", sink.name(), batch.key);
                all_ok = false;
            }
        }
        all_ok
    }

    fn load_pending(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.retry_path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn save_pending(&self, pending: &[String]) {
        if pending.is_empty() {
            let _ = std::fs::remove_file(&self.retry_path);
            return;
        }
        match serde_json::to_string(pending) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.retry_path, json) {
                    warn!("failed to persist sink retry buffer: {e}");
                }
            }
            Err(e) => warn!("failed to encode sink retry buffer: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Test double: fails while `failing` is set, counts deliveries.
    struct FlakySink {
        failing: Arc<AtomicBool>,
        delivered: Arc<AtomicUsize>,
    }

    impl EventSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn emit(&self, _batch: &Batch) -> Result<(), AuditError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(AuditError::SinkFailed {
                    sink: "flaky".to_string(),
                    message: "collector down".to_string(),
                })
            } else {
                self.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn batch(key: &str) -> Batch {
        let mut batch = Batch::new().with_key(key);
        batch.push_event("{\"x\":1}".to_string());
        batch
    }

    #[test]
    fn failed_delivery_is_parked_and_retried() {
        let dir = tempdir().unwrap();
        let failing = Arc::new(AtomicBool::new(true));
        let delivered = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = SinkDispatcher::new(dir.path());
        dispatcher.add_sink(Box::new(FlakySink {
            failing: Arc::clone(&failing),
            delivered: Arc::clone(&delivered),
        }));

        let b1 = batch("b1");
        dispatcher.dispatch(&b1, &|_| None);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert!(dispatcher.retry_path.exists());

        // Collector recovers; the parked batch goes out with the next one.
        failing.store(false, Ordering::SeqCst);
        let b1_clone = b1.clone();
        dispatcher.dispatch(&batch("b2"), &move |key| {
            (key == "b1").then(|| b1_clone.clone())
        });
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert!(!dispatcher.retry_path.exists());
    }

    #[test]
    fn retry_buffer_is_bounded() {
        let dir = tempdir().unwrap();
        let mut dispatcher = SinkDispatcher::new(dir.path());
        dispatcher.max_pending = 2;
        dispatcher.add_sink(Box::new(FlakySink {
            failing: Arc::new(AtomicBool::new(true)),
            delivered: Arc::new(AtomicUsize::new(0)),
        }));

        for i in 0..5 {
            dispatcher.dispatch(&batch(&format!("b{i}")), &|key| Some(batch(key)));
        }
        let pending = dispatcher.load_pending();
        assert_eq!(pending.len(), 2);
        // Oldest keys were dropped.
        assert_eq!(pending, vec!["b3".to_string(), "b4".to_string()]);
    }

    #[test]
    fn no_sinks_means_no_buffer() {
        let dir = tempdir().unwrap();
        let dispatcher = SinkDispatcher::new(dir.path());
        dispatcher.dispatch(&batch("b1"), &|_| None);
        assert!(!dispatcher.retry_path.exists());
    }
}
