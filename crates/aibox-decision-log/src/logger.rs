// logger.rs — Buffered, sampled, rotating decision logger.
//
// Producers call log() from any thread; the entry is encoded and pushed onto
// an in-memory buffer under the writer mutex, so the common case never
// touches the disk. A background thread flushes the buffer every
// flush_interval; flush() does the same on demand and close() shuts the
// thread down, flushes once more, and releases the file.
//
// Sampling is deterministic and counter-based: with sample_safe = N >= 2,
// the Nth, 2Nth, ... safe entry is persisted and the rest are dropped at
// log() time. Non-safe entries always persist.
//
// Rotation happens under the same mutex: once the current file has grown
// past max_size, the next flush renames it to `<path>.1` (shifting older
// history up, dropping anything past max_rotated) and starts a fresh file.
// Historical files are never rewritten.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::warn;

use aibox_policy::RiskClass;

use crate::config::DecisionLogConfig;
use crate::entry::DecisionEntry;
use crate::error::DecisionLogError;

/// A decision logger bound to one log file. One instance per sandbox start;
/// safe to share across producer threads.
pub struct DecisionLogger {
    inner: Arc<Mutex<Inner>>,
    config: DecisionLogConfig,
    flusher: Mutex<Option<Flusher>>,
}

struct Flusher {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

struct Inner {
    file: File,
    current_size: u64,
    buffer: Vec<String>,
    safe_seen: u64,
    closed: bool,
}

impl DecisionLogger {
    /// Open (or create) the log file and start the background flusher.
    pub fn open(config: DecisionLogConfig) -> Result<Self, DecisionLogError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DecisionLogError::OpenFailed {
                path: config.path.clone(),
                source,
            })?;
        }
        let file = open_append(&config.path)?;
        let current_size = file
            .metadata()
            .map_err(|source| DecisionLogError::OpenFailed {
                path: config.path.clone(),
                source,
            })?
            .len();

        let inner = Arc::new(Mutex::new(Inner {
            file,
            current_size,
            buffer: Vec::new(),
            safe_seen: 0,
            closed: false,
        }));

        let (stop_tx, stop_rx) = mpsc::channel();
        let thread_inner = Arc::clone(&inner);
        let thread_config = config.clone();
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(thread_config.flush_interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let mut guard = match thread_inner.lock() {
                        Ok(g) => g,
                        Err(_) => break,
                    };
                    if let Err(e) = flush_locked(&mut guard, &thread_config) {
                        warn!("periodic decision log flush failed (will retry): {e}");
                    }
                }
                // Stop signal or sender dropped: exit; close() flushes.
                _ => break,
            }
        });

        Ok(Self {
            inner,
            config,
            flusher: Mutex::new(Some(Flusher { stop_tx, handle })),
        })
    }

    /// Record a decision. Non-blocking in the common case: the entry is
    /// encoded and buffered under the mutex. Fails only on encoding errors
    /// or after close.
    pub fn log(&self, entry: &DecisionEntry) -> Result<(), DecisionLogError> {
        let line = serde_json::to_string(entry)?;

        let mut inner = self.lock();
        if inner.closed {
            return Err(DecisionLogError::Closed);
        }

        if entry.risk_class == RiskClass::Safe && self.config.sample_safe >= 2 {
            inner.safe_seen += 1;
            if inner.safe_seen % u64::from(self.config.sample_safe) != 0 {
                return Ok(()); // sampled out
            }
        }

        inner.buffer.push(line);
        Ok(())
    }

    /// Force buffered entries to the file and fsync. On failure the buffer
    /// is kept and retried by the next flush.
    pub fn flush(&self) -> Result<(), DecisionLogError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(DecisionLogError::Closed);
        }
        flush_locked(&mut inner, &self.config)
    }

    /// Stop the background flusher, flush once more, and release the file.
    /// Idempotent: later calls are no-ops.
    pub fn close(&self) -> Result<(), DecisionLogError> {
        let flusher = {
            let mut guard = self
                .flusher
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.take()
        };
        let Some(Flusher { stop_tx, handle }) = flusher else {
            return Ok(());
        };
        let _ = stop_tx.send(());
        let _ = handle.join();

        let mut inner = self.lock();
        let result = flush_locked(&mut inner, &self.config);
        inner.closed = true;
        result
    }

    /// The sanitized log file path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub(crate) fn config(&self) -> &DecisionLogConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a producer panicked mid-push; the buffer is
        // still structurally sound, so recover rather than cascade.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for DecisionLogger {
    fn drop(&mut self) {
        // No detached threads: join the flusher even if close() was skipped.
        let _ = self.close();
    }
}

fn open_append(path: &Path) -> Result<File, DecisionLogError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DecisionLogError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn flush_locked(inner: &mut Inner, config: &DecisionLogConfig) -> Result<(), DecisionLogError> {
    if inner.current_size >= config.max_size {
        rotate(inner, config)?;
    }
    if inner.buffer.is_empty() {
        return Ok(());
    }

    let mut payload = String::with_capacity(inner.buffer.iter().map(|l| l.len() + 1).sum());
    for line in &inner.buffer {
        payload.push_str(line);
        payload.push('\n');
    }

    inner
        .file
        .write_all(payload.as_bytes())
        .map_err(|source| DecisionLogError::FlushFailed { source })?;
    inner
        .file
        .sync_all()
        .map_err(|source| DecisionLogError::FlushFailed { source })?;

    inner.current_size += payload.len() as u64;
    inner.buffer.clear();
    Ok(())
}

/// Shift `<path>.N` → `<path>.N+1` (dropping anything past retention), move
/// the current file to `<path>.1`, and start fresh.
fn rotate(inner: &mut Inner, config: &DecisionLogConfig) -> Result<(), DecisionLogError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DecisionLogError::RotateFailed { path, source }
    };

    let oldest = rotated_path(&config.path, config.max_rotated);
    if oldest.exists() {
        std::fs::remove_file(&oldest).map_err(io_err(&oldest))?;
    }
    for i in (1..config.max_rotated).rev() {
        let from = rotated_path(&config.path, i);
        if from.exists() {
            let to = rotated_path(&config.path, i + 1);
            std::fs::rename(&from, &to).map_err(io_err(&from))?;
        }
    }
    let first = rotated_path(&config.path, 1);
    std::fs::rename(&config.path, &first).map_err(io_err(&config.path))?;

    inner.file = open_append(&config.path).map_err(|e| match e {
        DecisionLogError::OpenFailed { path, source } => {
            DecisionLogError::RotateFailed { path, source }
        }
        other => other,
    })?;
    inner.current_size = 0;
    Ok(())
}

/// `<path>.N` history file name.
pub(crate) fn rotated_path(path: &Path, index: usize) -> PathBuf {
    PathBuf::from(format!("{}.{}", path.display(), index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchFilter;
    use aibox_policy::Decision;
    use chrono::Utc;
    use tempfile::tempdir;

    fn config(dir: &Path) -> DecisionLogConfig {
        let mut config =
            DecisionLogConfig::new(dir.join("decisions.jsonl").display().to_string());
        config.flush_interval = std::time::Duration::from_secs(60); // tests flush explicitly
        config
    }

    fn entry(command: &str, risk_class: RiskClass) -> DecisionEntry {
        DecisionEntry {
            timestamp: Utc::now(),
            policy_version: Some("0011223344556677".to_string()),
            input_hash: None,
            action: "tool.invoke".to_string(),
            command: command.to_string(),
            target: None,
            user: "dev".to_string(),
            workspace: None,
            sandbox_id: None,
            decision: if risk_class == RiskClass::BlockedByDefault {
                Decision::Deny
            } else {
                Decision::Allow
            },
            risk_class,
            rule: Some("test".to_string()),
            reason: None,
            duration_ms: Some(0),
        }
    }

    #[test]
    fn log_flush_read_round_trip() {
        let dir = tempdir().unwrap();
        let logger = DecisionLogger::open(config(dir.path())).unwrap();

        logger.log(&entry("git status", RiskClass::Safe)).unwrap();
        logger.log(&entry("git push", RiskClass::ReviewRequired)).unwrap();
        logger.flush().unwrap();

        let first = logger.read_entry(0).unwrap().unwrap();
        assert_eq!(first.command, "git status");
        let second = logger.read_entry(1).unwrap().unwrap();
        assert_eq!(second.command, "git push");
        assert!(logger.read_entry(2).unwrap().is_none());

        logger.close().unwrap();
    }

    #[test]
    fn unflushed_entries_are_not_visible() {
        let dir = tempdir().unwrap();
        let logger = DecisionLogger::open(config(dir.path())).unwrap();

        logger.log(&entry("ls", RiskClass::Safe)).unwrap();
        assert!(logger.read_entry(0).unwrap().is_none());

        logger.flush().unwrap();
        assert!(logger.read_entry(0).unwrap().is_some());

        logger.close().unwrap();
    }

    #[test]
    fn sampling_law_holds() {
        // Spec scenario 5: sample_safe=5, 20 safe + 10 blocked → 4 + 10.
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.sample_safe = 5;
        let logger = DecisionLogger::open(cfg).unwrap();

        for i in 0..20 {
            logger
                .log(&entry(&format!("safe-{i}"), RiskClass::Safe))
                .unwrap();
        }
        for i in 0..10 {
            logger
                .log(&entry(&format!("blocked-{i}"), RiskClass::BlockedByDefault))
                .unwrap();
        }
        logger.flush().unwrap();

        let all = logger.search(&SearchFilter::default()).unwrap();
        assert_eq!(all.len(), 14);
        let safe = all
            .iter()
            .filter(|e| e.risk_class == RiskClass::Safe)
            .count();
        assert_eq!(safe, 4);

        logger.close().unwrap();
    }

    #[test]
    fn sample_rate_one_persists_everything() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.sample_safe = 1;
        let logger = DecisionLogger::open(cfg).unwrap();

        for i in 0..7 {
            logger
                .log(&entry(&format!("safe-{i}"), RiskClass::Safe))
                .unwrap();
        }
        logger.flush().unwrap();
        assert_eq!(logger.search(&SearchFilter::default()).unwrap().len(), 7);

        logger.close().unwrap();
    }

    #[test]
    fn review_entries_are_never_sampled() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.sample_safe = 10;
        let logger = DecisionLogger::open(cfg).unwrap();

        for i in 0..5 {
            logger
                .log(&entry(&format!("gated-{i}"), RiskClass::ReviewRequired))
                .unwrap();
        }
        logger.flush().unwrap();
        assert_eq!(logger.search(&SearchFilter::default()).unwrap().len(), 5);

        logger.close().unwrap();
    }

    #[test]
    fn rotation_keeps_history_and_old_entries_searchable() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.max_size = 64; // force rotation quickly
        cfg.max_rotated = 20; // keep all history for this test
        let logger = DecisionLogger::open(cfg.clone()).unwrap();

        for i in 0..10 {
            logger
                .log(&entry(&format!("cmd-{i}"), RiskClass::ReviewRequired))
                .unwrap();
            logger.flush().unwrap();
        }
        logger.close().unwrap();

        assert!(rotated_path(&cfg.path, 1).exists());
        let all = logger.search(&SearchFilter::default()).unwrap();
        assert_eq!(all.len(), 10);
        // Oldest first across rotated files.
        assert_eq!(all[0].command, "cmd-0");
        assert_eq!(all[9].command, "cmd-9");
    }

    #[test]
    fn rotation_respects_retention_count() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.max_size = 1; // rotate on every flush with content
        cfg.max_rotated = 2;
        let logger = DecisionLogger::open(cfg.clone()).unwrap();

        for i in 0..6 {
            logger
                .log(&entry(&format!("cmd-{i}"), RiskClass::ReviewRequired))
                .unwrap();
            logger.flush().unwrap();
        }
        logger.close().unwrap();

        assert!(rotated_path(&cfg.path, 1).exists());
        assert!(rotated_path(&cfg.path, 2).exists());
        assert!(!rotated_path(&cfg.path, 3).exists());
    }

    #[test]
    fn close_is_idempotent_and_log_after_close_fails() {
        let dir = tempdir().unwrap();
        let logger = DecisionLogger::open(config(dir.path())).unwrap();

        logger.log(&entry("ls", RiskClass::Safe)).unwrap();
        logger.close().unwrap();
        logger.close().unwrap();

        assert!(matches!(
            logger.log(&entry("ls", RiskClass::Safe)),
            Err(DecisionLogError::Closed)
        ));
        // The pre-close entry was flushed by close().
        assert!(logger.read_entry(0).unwrap().is_some());
    }

    #[test]
    fn background_flusher_persists_without_explicit_flush() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.flush_interval = std::time::Duration::from_millis(20);
        let logger = DecisionLogger::open(cfg).unwrap();

        logger.log(&entry("ls", RiskClass::Safe)).unwrap();
        // Wait out a couple of flush periods.
        std::thread::sleep(std::time::Duration::from_millis(120));
        assert!(logger.read_entry(0).unwrap().is_some());

        logger.close().unwrap();
    }

    #[test]
    fn concurrent_producers_all_land() {
        let dir = tempdir().unwrap();
        let logger = Arc::new(DecisionLogger::open(config(dir.path())).unwrap());

        let mut handles = Vec::new();
        for t in 0..4 {
            let logger = Arc::clone(&logger);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    logger
                        .log(&entry(&format!("t{t}-{i}"), RiskClass::ReviewRequired))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        logger.flush().unwrap();

        assert_eq!(
            logger.search(&SearchFilter::default()).unwrap().len(),
            100
        );
        logger.close().unwrap();
    }
}
