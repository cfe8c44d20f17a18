//! Change diffing against the cache manifest.
//!
//! Partitions the current file set into changed / unchanged / deleted using
//! a two-tier check: a modification-time fast path that avoids reading file
//! contents, and a content-hash slow path for everything else.

use crate::cache::CacheManifest;
use crate::EngineError;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::debug;

/// Result of diffing the current file set against the cache.
///
/// `changed` and `unchanged` together partition the current set; `deleted`
/// lists cache-known paths that no longer exist. Fingerprints and mtimes
/// computed along the way are recorded so the build never recomputes them.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Files whose content differs from the cache (or have no baseline)
    pub changed: Vec<String>,
    /// Files whose content is identical to the cache
    pub unchanged: Vec<String>,
    /// Cache-known files absent from the current set
    pub deleted: Vec<String>,
    /// Content fingerprints computed during the comparison
    pub fingerprints: HashMap<String, String>,
    /// Modification times observed during the comparison (milliseconds)
    pub mtimes: HashMap<String, u64>,
}

/// Outcome of checking one cached file against disk.
enum FileCheck {
    FastUnchanged {
        mtime_ms: u64,
    },
    HashUnchanged {
        mtime_ms: Option<u64>,
        fingerprint: String,
    },
    Changed {
        mtime_ms: Option<u64>,
        fingerprint: Option<String>,
    },
}

/// Diff the current (project-relative) paths against a loaded cache.
///
/// With no cache every path is changed and nothing is hashed or statted.
/// Slow-path I/O runs in batches of at most `concurrency` concurrent
/// operations; batches are awaited sequentially so large trees cannot
/// exhaust file-descriptor limits.
pub async fn diff(
    root: &Path,
    current: &[String],
    cache: Option<&CacheManifest>,
    concurrency: usize,
) -> Result<DiffResult, EngineError> {
    let mut result = DiffResult::default();

    let cache = match cache {
        Some(c) => c,
        None => {
            result.changed = current.to_vec();
            return Ok(result);
        }
    };

    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    result.deleted = cache
        .files
        .keys()
        .filter(|k| !current_set.contains(k.as_str()))
        .cloned()
        .collect();

    // Paths with a baseline need a disk check; the rest are changed outright.
    let mut to_check: Vec<(String, PathBuf, Option<u64>, String)> = Vec::new();
    for rel in current {
        match cache.files.get(rel) {
            Some(entry) => to_check.push((
                rel.clone(),
                root.join(rel),
                entry.mtime_ms,
                entry.fingerprint.clone(),
            )),
            None => result.changed.push(rel.clone()),
        }
    }

    let concurrency = concurrency.max(1);
    let mut checks: HashMap<String, FileCheck> = HashMap::with_capacity(to_check.len());

    for batch in to_check.chunks(concurrency) {
        let mut set = JoinSet::new();
        for (rel, abs, cached_mtime, cached_fp) in batch.iter().cloned() {
            set.spawn(async move {
                let check = check_file(&abs, cached_mtime, &cached_fp).await;
                (rel, check)
            });
        }
        while let Some(joined) = set.join_next().await {
            let (rel, check) =
                joined.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            checks.insert(rel, check);
        }
    }

    // Re-walk the input order so the partition is deterministic.
    for rel in current {
        let check = match checks.remove(rel) {
            Some(c) => c,
            None => continue, // already classified changed (no baseline)
        };
        match check {
            FileCheck::FastUnchanged { mtime_ms } => {
                result.mtimes.insert(rel.clone(), mtime_ms);
                result.unchanged.push(rel.clone());
            }
            FileCheck::HashUnchanged {
                mtime_ms,
                fingerprint,
            } => {
                if let Some(m) = mtime_ms {
                    result.mtimes.insert(rel.clone(), m);
                }
                result.fingerprints.insert(rel.clone(), fingerprint);
                result.unchanged.push(rel.clone());
            }
            FileCheck::Changed {
                mtime_ms,
                fingerprint,
            } => {
                if let Some(m) = mtime_ms {
                    result.mtimes.insert(rel.clone(), m);
                }
                if let Some(fp) = fingerprint {
                    result.fingerprints.insert(rel.clone(), fp);
                }
                result.changed.push(rel.clone());
            }
        }
    }

    debug!(
        changed = result.changed.len(),
        unchanged = result.unchanged.len(),
        deleted = result.deleted.len(),
        "Diff complete"
    );

    Ok(result)
}

/// Check one file against its cached mtime/fingerprint.
async fn check_file(abs: &Path, cached_mtime: Option<u64>, cached_fp: &str) -> FileCheck {
    let live_mtime = match tokio::fs::metadata(abs).await {
        Ok(meta) => mtime_millis(&meta),
        // Vanished between listing and statting; let extraction surface it
        Err(_) => return FileCheck::Changed {
            mtime_ms: None,
            fingerprint: None,
        },
    };

    // Fast path: identical timestamp means identical content.
    if let (Some(cached), Some(live)) = (cached_mtime, live_mtime) {
        if cached == live {
            return FileCheck::FastUnchanged { mtime_ms: live };
        }
    }

    // Slow path: the timestamp moved (or was never stored) - compare content.
    match tokio::fs::read(abs).await {
        Ok(bytes) => {
            let fingerprint = hash_bytes(&bytes);
            if fingerprint == cached_fp {
                FileCheck::HashUnchanged {
                    mtime_ms: live_mtime,
                    fingerprint,
                }
            } else {
                FileCheck::Changed {
                    mtime_ms: live_mtime,
                    fingerprint: Some(fingerprint),
                }
            }
        }
        Err(_) => FileCheck::Changed {
            mtime_ms: live_mtime,
            fingerprint: None,
        },
    }
}

/// Compute the sha256 fingerprint of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extract a file's modification time in milliseconds since the epoch.
pub fn mtime_millis(meta: &std::fs::Metadata) -> Option<u64> {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManifest, FileEntry};
    use crate::snapshot::INDEX_VERSION;
    use tempfile::tempdir;

    fn manifest_with(entries: Vec<(&str, FileEntry)>) -> CacheManifest {
        let mut m = CacheManifest::new(INDEX_VERSION, "fp".to_string(), vec![]);
        for (path, entry) in entries {
            m.files.insert(path.to_string(), entry);
        }
        m
    }

    fn entry(fingerprint: &str, mtime_ms: Option<u64>) -> FileEntry {
        FileEntry {
            fingerprint: fingerprint.to_string(),
            symbols: vec![],
            mtime_ms,
        }
    }

    fn live_mtime(path: &Path) -> u64 {
        mtime_millis(&std::fs::metadata(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_no_cache_marks_all_changed_without_hashing() {
        let dir = tempdir().unwrap();
        let current = vec!["a.ts".to_string(), "b.ts".to_string()];

        let result = diff(dir.path(), &current, None, 32).await.unwrap();

        assert_eq!(result.changed, current);
        assert!(result.unchanged.is_empty());
        assert!(result.fingerprints.is_empty());
        assert!(result.mtimes.is_empty());
    }

    #[tokio::test]
    async fn test_uncached_path_changed_without_fingerprint() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("new.ts"), "x").unwrap();

        let cache = manifest_with(vec![]);
        let result = diff(dir.path(), &["new.ts".to_string()], Some(&cache), 32)
            .await
            .unwrap();

        assert_eq!(result.changed, vec!["new.ts"]);
        assert!(result.fingerprints.is_empty());
    }

    #[tokio::test]
    async fn test_fast_path_equal_mtime_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.ts");
        std::fs::write(&path, "content").unwrap();
        let mtime = live_mtime(&path);

        // Fingerprint deliberately wrong: the fast path must not read content
        let cache = manifest_with(vec![("a.ts", entry("not-the-real-hash", Some(mtime)))]);
        let result = diff(dir.path(), &["a.ts".to_string()], Some(&cache), 32)
            .await
            .unwrap();

        assert_eq!(result.unchanged, vec!["a.ts"]);
        assert!(result.fingerprints.is_empty());
        assert_eq!(result.mtimes["a.ts"], mtime);
    }

    #[tokio::test]
    async fn test_hash_fallback_same_content_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.ts");
        std::fs::write(&path, "content").unwrap();
        let fp = hash_bytes(b"content");

        // Cached mtime differs from the live one, content does not
        let cache = manifest_with(vec![("a.ts", entry(&fp, Some(1)))]);
        let result = diff(dir.path(), &["a.ts".to_string()], Some(&cache), 32)
            .await
            .unwrap();

        assert_eq!(result.unchanged, vec!["a.ts"]);
        assert_eq!(result.fingerprints["a.ts"], fp);
        // Refreshed timestamp recorded for the next manifest
        assert_eq!(result.mtimes["a.ts"], live_mtime(&path));
    }

    #[tokio::test]
    async fn test_absent_mtime_falls_back_to_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.ts");
        std::fs::write(&path, "content").unwrap();
        let fp = hash_bytes(b"content");

        let cache = manifest_with(vec![("a.ts", entry(&fp, None))]);
        let result = diff(dir.path(), &["a.ts".to_string()], Some(&cache), 32)
            .await
            .unwrap();

        assert_eq!(result.unchanged, vec!["a.ts"]);
    }

    #[tokio::test]
    async fn test_changed_content_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.ts");
        std::fs::write(&path, "new content").unwrap();

        let cache = manifest_with(vec![("a.ts", entry(&hash_bytes(b"old content"), Some(1)))]);
        let result = diff(dir.path(), &["a.ts".to_string()], Some(&cache), 32)
            .await
            .unwrap();

        assert_eq!(result.changed, vec!["a.ts"]);
        // New fingerprint recorded so the build can reuse it
        assert_eq!(result.fingerprints["a.ts"], hash_bytes(b"new content"));
    }

    #[tokio::test]
    async fn test_deleted_files_listed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("keep.ts"), "x").unwrap();

        let cache = manifest_with(vec![
            ("keep.ts", entry(&hash_bytes(b"x"), None)),
            ("gone.ts", entry("whatever", Some(1))),
        ]);
        let result = diff(dir.path(), &["keep.ts".to_string()], Some(&cache), 32)
            .await
            .unwrap();

        assert_eq!(result.deleted, vec!["gone.ts"]);
        assert_eq!(result.unchanged, vec!["keep.ts"]);
    }

    #[tokio::test]
    async fn test_vanished_file_classified_changed() {
        let dir = tempdir().unwrap();

        let cache = manifest_with(vec![("ghost.ts", entry("fp", Some(1)))]);
        let result = diff(dir.path(), &["ghost.ts".to_string()], Some(&cache), 32)
            .await
            .unwrap();

        assert_eq!(result.changed, vec!["ghost.ts"]);
    }

    #[tokio::test]
    async fn test_partition_is_disjoint_and_complete() {
        let dir = tempdir().unwrap();
        let mut current = Vec::new();
        let mut entries = Vec::new();
        let mut keep = Vec::new();
        for i in 0..100 {
            let name = format!("f{:03}.ts", i);
            let content = format!("body {}", i);
            std::fs::write(dir.path().join(&name), &content).unwrap();
            if i % 2 == 0 {
                keep.push((name.clone(), entry(&hash_bytes(content.as_bytes()), None)));
            }
            current.push(name);
        }
        for (name, e) in &keep {
            entries.push((name.as_str(), e.clone()));
        }
        let cache = manifest_with(entries);

        // Small batch width to exercise multiple sequential batches
        let result = diff(dir.path(), &current, Some(&cache), 8).await.unwrap();

        assert_eq!(result.changed.len() + result.unchanged.len(), current.len());
        assert_eq!(result.unchanged.len(), 50);
        let overlap: Vec<_> = result
            .changed
            .iter()
            .filter(|p| result.unchanged.contains(p))
            .collect();
        assert!(overlap.is_empty());
    }

    #[test]
    fn test_hash_bytes_stable() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
        assert_eq!(hash_bytes(b"hello").len(), 64);
    }
}
