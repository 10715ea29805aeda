// store.rs — Immutable batch store with end-to-end verification.
//
// One batch per file, `<key>.json`, written once and chmodded read-only.
// The append path rejects duplicate keys from an in-memory set before even
// looking at the filesystem. Writes serialize behind the write half of a
// RwLock; reads share the read half.
//
// verify() distinguishes the two tamper modes:
//   - batch-level: stored checksum no longer matches the entry bytes
//   - event-level: checksum recomputed by the attacker, but the hash chain
//     no longer reproduces a stored hash_self
//
// Detection of the second mode works because hash_self covers the event's
// canonical bytes *and* the previous hash, so an in-place edit cannot be
// hidden without rewriting every later event.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::batch::Batch;
use crate::chain::{chain_hash, genesis_hash};
use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::sink::{EventSink, SinkDispatcher};

/// Append-only store of audit batches under one directory. Instantiate one
/// per store directory; safe to share across threads.
pub struct AuditStore {
    dir: PathBuf,
    inner: RwLock<Inner>,
}

struct Inner {
    appended_keys: HashSet<String>,
    dispatcher: SinkDispatcher,
}

/// Result of a full store verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub total_batches: usize,
    pub total_events: usize,
    pub intact_batches: usize,
    pub corrupt_batches: usize,
    pub chain_intact: bool,
    /// Global index (insertion order, 0-based) of the first event whose
    /// chain hash does not hold.
    pub chain_broken_at: Option<usize>,
    pub first_error: Option<String>,
}

impl AuditStore {
    /// Open (or create) a store directory. Existing batch keys are indexed
    /// so duplicate appends are rejected without filesystem probes.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| AuditError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut appended_keys = HashSet::new();
        for key in scan_keys(&dir)? {
            appended_keys.insert(key);
        }

        let dispatcher = SinkDispatcher::new(&dir);
        Ok(Self {
            dir,
            inner: RwLock::new(Inner {
                appended_keys,
                dispatcher,
            }),
        })
    }

    /// Register a streaming sink. Sinks receive every batch appended from
    /// now on, best-effort.
    pub fn add_sink(&self, sink: Box<dyn EventSink>) {
        self.write_lock().dispatcher.add_sink(sink);
    }

    /// Persist a batch and return its key.
    ///
    /// An empty key is generated from `created_at` (defaulted to now). The
    /// store computes the checksum; a pre-set value is overwritten. Appending
    /// a key that already exists fails with
    /// [`AuditError::ImmutableViolation`] and leaves the original intact.
    pub fn append(&self, mut batch: Batch) -> Result<String, AuditError> {
        let mut inner = self.write_lock();

        let created_at = batch.created_at.unwrap_or_else(Utc::now);
        batch.created_at = Some(created_at);
        if batch.key.is_empty() {
            batch.key = Batch::key_for(created_at);
        }
        let key = batch.key.clone();

        if inner.appended_keys.contains(&key) {
            return Err(AuditError::ImmutableViolation { key });
        }
        let path = self.batch_path(&key);
        if path.exists() {
            return Err(AuditError::ImmutableViolation { key });
        }

        batch.checksum = Batch::compute_checksum(&batch.entries);

        let json = serde_json::to_string_pretty(&batch)?;
        std::fs::write(&path, json).map_err(|source| AuditError::Io {
            path: path.clone(),
            source,
        })?;
        make_read_only(&path)?;

        inner.appended_keys.insert(key.clone());

        let dir = self.dir.clone();
        inner
            .dispatcher
            .dispatch(&batch, &move |k| read_batch_file(&dir, k).ok());

        Ok(key)
    }

    /// Load a batch and validate its checksum.
    pub fn read(&self, key: &str) -> Result<Batch, AuditError> {
        let _guard = self.read_lock();
        let batch = read_batch_file(&self.dir, key)?;
        let got = Batch::compute_checksum(&batch.entries);
        if got != batch.checksum {
            return Err(AuditError::Corrupted {
                key: key.to_string(),
                expected: batch.checksum,
                got,
            });
        }
        Ok(batch)
    }

    /// Batch keys in ascending order, optionally filtered to
    /// `[since, until)` on `created_at`. The time filter requires per-batch
    /// metadata reads; a plain listing only touches file names.
    pub fn list(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, AuditError> {
        let _guard = self.read_lock();
        let mut keys = scan_keys(&self.dir)?;
        keys.sort();

        if since.is_none() && until.is_none() {
            return Ok(keys);
        }

        let mut filtered = Vec::new();
        for key in keys {
            let batch = read_batch_file(&self.dir, &key)?;
            let Some(created_at) = batch.created_at else {
                continue;
            };
            if let Some(since) = since {
                if created_at < since {
                    continue;
                }
            }
            if let Some(until) = until {
                if created_at >= until {
                    continue;
                }
            }
            filtered.push(key);
        }
        Ok(filtered)
    }

    /// Re-read every batch in key order, validating checksums and replaying
    /// the hash chain from genesis.
    pub fn verify(&self) -> Result<VerifyReport, AuditError> {
        let keys = self.list(None, None)?;

        let mut report = VerifyReport {
            total_batches: 0,
            total_events: 0,
            intact_batches: 0,
            corrupt_batches: 0,
            chain_intact: true,
            chain_broken_at: None,
            first_error: None,
        };

        let mut current = genesis_hash();
        let mut index = 0usize;

        for key in keys {
            report.total_batches += 1;
            let batch = match self.read(&key) {
                Ok(batch) => batch,
                Err(e) => {
                    // Batch-level tamper: count it and keep walking. The
                    // chain cannot be replayed through missing entries, so
                    // it is reported broken here as well.
                    report.corrupt_batches += 1;
                    if report.chain_intact {
                        report.chain_intact = false;
                        report.chain_broken_at = Some(index);
                    }
                    record_first_error(&mut report, e.to_string());
                    continue;
                }
            };
            report.intact_batches += 1;

            for line in &batch.entries {
                report.total_events += 1;
                if !report.chain_intact {
                    index += 1;
                    continue;
                }
                match verify_link(line, &current, index) {
                    Ok(next) => current = next,
                    Err(e) => {
                        report.chain_intact = false;
                        report.chain_broken_at = Some(index);
                        record_first_error(&mut report, e.to_string());
                    }
                }
                index += 1;
            }
        }

        Ok(report)
    }

    /// Directory this store persists into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn batch_path(&self, key: &str) -> PathBuf {
        batch_path(&self.dir, key)
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Check one chain link; returns the next running hash.
fn verify_link(line: &str, current: &str, index: usize) -> Result<String, AuditError> {
    let event = AuditEvent::from_line(line)?;
    let expected = chain_hash(&event, current)?;
    if event.hash_prev != current || event.hash_self != expected {
        return Err(AuditError::ChainBroken {
            index,
            expected,
            got: event.hash_self,
        });
    }
    Ok(expected)
}

fn record_first_error(report: &mut VerifyReport, message: String) {
    if report.first_error.is_none() {
        report.first_error = Some(message);
    }
}

fn batch_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_batch_file(dir: &Path, key: &str) -> Result<Batch, AuditError> {
    let path = batch_path(dir, key);
    if !path.exists() {
        return Err(AuditError::NotFound {
            key: key.to_string(),
        });
    }
    let text = std::fs::read_to_string(&path).map_err(|source| AuditError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn scan_keys(dir: &Path) -> Result<Vec<String>, AuditError> {
    let mut keys = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|source| AuditError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| AuditError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
    }
    Ok(keys)
}

#[cfg(unix)]
fn make_read_only(path: &Path) -> Result<(), AuditError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o444)).map_err(|source| {
        AuditError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_read_only(path: &Path) -> Result<(), AuditError> {
    let mut perms = std::fs::metadata(path)
        .map_err(|source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(path, perms).map_err(|source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::HashChain;
    use crate::event::{AuditEvent, AuditEventType};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn chained_batch(chain: &mut HashChain, users: &[&str]) -> Batch {
        let mut batch = Batch::new();
        for user in users {
            let mut event = AuditEvent::new(AuditEventType::ToolInvoke, "sb-1", *user, "policy");
            chain.chain(&mut event).unwrap();
            batch.push_event(event.to_line().unwrap());
        }
        batch.chain_head = chain.head().to_string();
        batch
    }

    #[test]
    fn append_generates_time_encoded_key() {
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();

        let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut chain = HashChain::new();
        let batch = chained_batch(&mut chain, &["dev"]).with_created_at(t);
        let key = store.append(batch).unwrap();
        assert_eq!(key, "20260301T120000Z");
    }

    #[test]
    fn append_twice_is_immutable_violation() {
        // Spec scenario 4.
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();

        let mut chain = HashChain::new();
        let batch = chained_batch(&mut chain, &["dev"]).with_key("b1");
        let key = store.append(batch.clone()).unwrap();
        assert_eq!(key, "b1");

        match store.append(batch) {
            Err(AuditError::ImmutableViolation { key }) => assert_eq!(key, "b1"),
            other => panic!("expected ImmutableViolation, got {:?}", other),
        }

        // The original batch is intact and still readable.
        let read_back = store.read("b1").unwrap();
        assert_eq!(read_back.len(), 1);
    }

    #[test]
    fn duplicate_key_rejected_even_across_instances() {
        let dir = tempdir().unwrap();
        {
            let store = AuditStore::open(dir.path()).unwrap();
            let mut chain = HashChain::new();
            store
                .append(chained_batch(&mut chain, &["dev"]).with_key("b1"))
                .unwrap();
        }
        // A fresh instance indexes existing keys at open.
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();
        assert!(matches!(
            store.append(chained_batch(&mut chain, &["dev"]).with_key("b1")),
            Err(AuditError::ImmutableViolation { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn batch_files_are_read_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();
        let key = store
            .append(chained_batch(&mut chain, &["dev"]).with_key("b1"))
            .unwrap();

        let mode = std::fs::metadata(batch_path(dir.path(), &key))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o444);
    }

    #[test]
    fn read_missing_batch_is_not_found() {
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.read("nope"),
            Err(AuditError::NotFound { .. })
        ));
    }

    #[test]
    fn checksum_mismatch_is_corrupted() {
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();
        let key = store
            .append(chained_batch(&mut chain, &["dev"]).with_key("b1"))
            .unwrap();

        // Bulk tamper: edit an entry without recomputing the checksum.
        let path = batch_path(dir.path(), &key);
        rewrite(&path, |batch| {
            batch.entries[0] = batch.entries[0].replace("dev", "eve");
        });

        match store.read(&key) {
            Err(AuditError::Corrupted { key, expected, got }) => {
                assert_eq!(key, "b1");
                assert_ne!(expected, got);
            }
            other => panic!("expected Corrupted, got {:?}", other),
        }
    }

    #[test]
    fn verify_reports_intact_chain() {
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();
        store
            .append(chained_batch(&mut chain, &["a", "b", "c"]).with_key("b1"))
            .unwrap();
        store
            .append(chained_batch(&mut chain, &["d", "e"]).with_key("b2"))
            .unwrap();

        let report = store.verify().unwrap();
        assert_eq!(report.total_batches, 2);
        assert_eq!(report.total_events, 5);
        assert_eq!(report.intact_batches, 2);
        assert_eq!(report.corrupt_batches, 0);
        assert!(report.chain_intact);
        assert!(report.chain_broken_at.is_none());
        assert!(report.first_error.is_none());
    }

    #[test]
    fn verify_detects_sophisticated_event_edit() {
        // Spec scenario 3: flip user_id on event #5 of 10 and recompute the
        // batch checksum, simulating an attacker who understands the batch
        // format but not the chain.
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();
        let users: Vec<String> = (0..10).map(|i| format!("user-{i}")).collect();
        let refs: Vec<&str> = users.iter().map(String::as_str).collect();
        store
            .append(chained_batch(&mut chain, &refs).with_key("b1"))
            .unwrap();

        rewrite(&batch_path(dir.path(), "b1"), |batch| {
            let mut event = AuditEvent::from_line(&batch.entries[5]).unwrap();
            event.user_id = "mallory".to_string();
            batch.entries[5] = event.to_line().unwrap();
            batch.checksum = Batch::compute_checksum(&batch.entries);
        });

        let report = store.verify().unwrap();
        assert_eq!(report.corrupt_batches, 0); // checksum was "fixed"
        assert!(!report.chain_intact);
        assert_eq!(report.chain_broken_at, Some(5));
        assert_eq!(report.total_events, 10);
        assert!(report.first_error.unwrap().contains("chain broken"));
    }

    #[test]
    fn verify_counts_corrupt_batches() {
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();
        store
            .append(chained_batch(&mut chain, &["a"]).with_key("b1"))
            .unwrap();
        store
            .append(chained_batch(&mut chain, &["b"]).with_key("b2"))
            .unwrap();

        rewrite(&batch_path(dir.path(), "b1"), |batch| {
            batch.entries[0] = batch.entries[0].replace("\"a\"", "\"x\"");
        });

        let report = store.verify().unwrap();
        assert_eq!(report.corrupt_batches, 1);
        assert_eq!(report.intact_batches, 1);
        assert!(!report.chain_intact);
    }

    #[test]
    fn list_is_sorted_ascending() {
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();
        store
            .append(chained_batch(&mut chain, &["a"]).with_key("b2"))
            .unwrap();
        store
            .append(chained_batch(&mut chain, &["b"]).with_key("b1"))
            .unwrap();

        assert_eq!(store.list(None, None).unwrap(), vec!["b1", "b2"]);
    }

    #[test]
    fn list_filters_by_created_at() {
        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        let mut chain = HashChain::new();

        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        store
            .append(
                chained_batch(&mut chain, &["a"])
                    .with_key("b-old")
                    .with_created_at(old),
            )
            .unwrap();
        store
            .append(
                chained_batch(&mut chain, &["b"])
                    .with_key("b-new")
                    .with_created_at(new),
            )
            .unwrap();

        let cutoff = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            store.list(Some(cutoff), None).unwrap(),
            vec!["b-new".to_string()]
        );
        assert_eq!(
            store.list(None, Some(cutoff)).unwrap(),
            vec!["b-old".to_string()]
        );
    }

    #[test]
    fn sink_failure_never_blocks_append() {
        struct DownSink;
        impl EventSink for DownSink {
            fn name(&self) -> &str {
                "down"
            }
            fn emit(&self, _batch: &Batch) -> Result<(), AuditError> {
                Err(AuditError::SinkFailed {
                    sink: "down".to_string(),
                    message: "unreachable".to_string(),
                })
            }
        }

        let dir = tempdir().unwrap();
        let store = AuditStore::open(dir.path()).unwrap();
        store.add_sink(Box::new(DownSink));

        let mut chain = HashChain::new();
        let key = store
            .append(chained_batch(&mut chain, &["dev"]).with_key("b1"))
            .unwrap();
        assert_eq!(key, "b1");
        assert!(store.read("b1").is_ok());
    }

    /// Tamper helper: make the batch file writable, apply an edit, restore
    /// read-only mode.
    fn rewrite(path: &Path, edit: impl FnOnce(&mut Batch)) {
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_readonly(false);
        std::fs::set_permissions(path, perms).unwrap();

        let mut batch: Batch =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        edit(&mut batch);
        std::fs::write(path, serde_json::to_string_pretty(&batch).unwrap()).unwrap();
        make_read_only(path).unwrap();
    }
}
