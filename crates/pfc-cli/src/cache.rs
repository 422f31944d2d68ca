//! On-disk memoisation of expensive analysis results.
//!
//! Entries live in `<output>/cache/<key>.json` and carry the schema version
//! and a fingerprint of the files they were computed from. An entry whose
//! envelope does not match is treated as absent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped whenever a cached payload changes shape.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    schema_version: u32,
    fingerprint: String,
    payload: T,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let digest = h.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Digest of canonical path, size and modification time of every file.
///
/// Files that do not exist contribute their path only, so creating one later
/// changes the fingerprint.
pub fn fingerprint(paths: &[&Path]) -> String {
    let mut text = String::new();
    for path in paths {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        text.push_str(&canonical.to_string_lossy());
        match std::fs::metadata(path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                text.push_str(&format!("|{}|{mtime}\n", meta.len()));
            }
            Err(_) => text.push_str("|missing\n"),
        }
    }
    sha256_hex(text.as_bytes())
}

pub struct Cache {
    dir: PathBuf,
    read: bool,
}

impl Cache {
    /// `read = false` recomputes everything but still refreshes the entries.
    pub fn new(dir: PathBuf, read: bool) -> Self {
        Self { dir, read }
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cached payload for `key`, if present and computed from the same inputs.
    pub fn load<T: DeserializeOwned>(&self, key: &str, fingerprint: &str) -> Option<T> {
        if !self.read {
            return None;
        }
        let path = self.path(key);
        let bytes = std::fs::read(&path).ok()?;
        let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(key, error = %e, "unreadable cache entry, recomputing");
                return None;
            }
        };
        if envelope.schema_version != CACHE_SCHEMA_VERSION {
            let version = envelope.schema_version;
            tracing::warn!(key, version, "cache schema changed, recomputing");
            return None;
        }
        if envelope.fingerprint != fingerprint {
            tracing::warn!(key, "inputs changed since caching, recomputing");
            return None;
        }
        tracing::debug!(key, "cache hit");
        Some(envelope.payload)
    }

    /// Load a payload written by another run, requiring only the schema version.
    pub fn load_foreign<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let path = self.path(key);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("missing cache entry {}", path.display()))?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse cache entry {}", path.display()))?;
        if envelope.schema_version != CACHE_SCHEMA_VERSION {
            anyhow::bail!(
                "{}: cache schema version {} (expected {CACHE_SCHEMA_VERSION})",
                path.display(),
                envelope.schema_version
            );
        }
        Ok(envelope.payload)
    }

    pub fn store<T: Serialize>(&self, key: &str, fingerprint: &str, payload: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let envelope = Envelope {
            schema_version: CACHE_SCHEMA_VERSION,
            fingerprint: fingerprint.to_string(),
            payload,
        };
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(key, "cache stored");
        Ok(())
    }

    pub fn get_or_compute<T, F>(&self, key: &str, fingerprint: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(hit) = self.load(key, fingerprint) {
            return Ok(hit);
        }
        let value = compute()?;
        self.store(key, fingerprint, &value)?;
        Ok(value)
    }

    /// Keyed payload where only the missing `wanted` keys are computed.
    ///
    /// `compute` receives the missing keys and returns their values; the merged
    /// map is written back and returned restricted to `wanted`.
    pub fn get_or_fill<V, F>(
        &self,
        key: &str,
        fingerprint: &str,
        wanted: &[String],
        compute: F,
    ) -> Result<BTreeMap<String, V>>
    where
        V: Serialize + DeserializeOwned + Clone,
        F: FnOnce(&[String]) -> Result<BTreeMap<String, V>>,
    {
        let mut map: BTreeMap<String, V> = self.load(key, fingerprint).unwrap_or_default();
        let missing: Vec<String> =
            wanted.iter().filter(|k| !map.contains_key(*k)).cloned().collect();
        if !missing.is_empty() {
            tracing::debug!(key, missing = missing.len(), "filling cache entries");
            let fresh = compute(&missing)?;
            for k in &missing {
                if !fresh.contains_key(k) {
                    anyhow::bail!("cache fill for {key} did not produce '{k}'");
                }
            }
            map.extend(fresh);
            self.store(key, fingerprint, &map)?;
        }
        Ok(wanted.iter().filter_map(|k| map.get(k).map(|v| (k.clone(), v.clone()))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir()
            .join(format!("pfcalib_cache_{tag}_{}_{}", std::process::id(), nanos));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn roundtrip_and_stale_fingerprint() {
        let cache = Cache::new(tmp_dir("rt"), true);
        cache.store("k", "fp1", &vec![1.0, 2.0]).unwrap();
        assert_eq!(cache.load::<Vec<f64>>("k", "fp1"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.load::<Vec<f64>>("k", "fp2"), None);
    }

    #[test]
    fn reads_disabled() {
        let dir = tmp_dir("noread");
        Cache::new(dir.clone(), true).store("k", "fp", &1_u32).unwrap();
        let cache = Cache::new(dir, false);
        assert_eq!(cache.load::<u32>("k", "fp"), None);
        let v = cache.get_or_compute("k", "fp", || Ok(7_u32)).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn partial_fill_only_computes_missing() {
        let cache = Cache::new(tmp_dir("fill"), true);
        let a = vec!["a".to_string()];
        cache
            .get_or_fill("m", "fp", &a, |keys| Ok(keys.iter().map(|k| (k.clone(), 1)).collect()))
            .unwrap();

        let ab = vec!["a".to_string(), "b".to_string()];
        let got = cache
            .get_or_fill("m", "fp", &ab, |keys| {
                assert_eq!(keys, ["b".to_string()]);
                Ok(keys.iter().map(|k| (k.clone(), 2)).collect())
            })
            .unwrap();
        assert_eq!(got["a"], 1);
        assert_eq!(got["b"], 2);
    }

    #[test]
    fn fingerprint_tracks_file_changes() {
        let dir = tmp_dir("fp");
        std::fs::create_dir_all(&dir).unwrap();
        let f = dir.join("x.parquet");
        let before = fingerprint(&[&f]);
        std::fs::write(&f, b"abc").unwrap();
        let after = fingerprint(&[&f]);
        assert_ne!(before, after);
        assert_eq!(after, fingerprint(&[&f]));
    }

    #[test]
    fn foreign_load_ignores_fingerprint() {
        let cache = Cache::new(tmp_dir("foreign"), false);
        cache.store("r", "whatever", &3_i32).unwrap();
        assert_eq!(cache.load_foreign::<i32>("r").unwrap(), 3);
        assert!(cache.load_foreign::<i32>("absent").is_err());
    }
}
