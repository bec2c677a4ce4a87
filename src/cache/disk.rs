//! Persistent disk tier for embedding vectors.
//!
//! Vectors are stored as little-endian f16 bytes under a filename derived
//! from the cache key. Files are safe to delete at any time; staleness is
//! detected by file mtime against the caller-supplied TTL.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use half::f16;
use tracing::{debug, warn};

use super::error::CacheError;

/// Disk-backed embedding cache.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Opens (creating if needed) a disk cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are `ohadex:<ns>:<md5-hex>`; the hex suffix is already a
        // filesystem-safe unique name.
        let name = key.rsplit(':').next().unwrap_or(key);
        self.dir.join(format!("{name}.f16"))
    }

    /// Reads a vector, treating entries older than `max_age` as absent.
    pub fn get(&self, key: &str, max_age: Duration) -> Option<Vec<f32>> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }

        if is_expired(&path, max_age) {
            debug!(key, "disk cache entry expired");
            return None;
        }

        match std::fs::read(&path) {
            Ok(bytes) => match f16_bytes_to_f32(&bytes) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(key, error = %e, "corrupt disk cache entry, ignoring");
                    None
                }
            },
            Err(e) => {
                warn!(key, error = %e, "disk cache read failed");
                None
            }
        }
    }

    /// Writes a vector atomically (tmp file + rename).
    pub fn put(&self, key: &str, vector: &[f32]) {
        let path = self.path_for(key);
        let tmp = path.with_extension("f16.tmp");
        let bytes = f32_to_f16_bytes(vector);

        let result = std::fs::write(&tmp, &bytes).and_then(|_| std::fs::rename(&tmp, &path));
        if let Err(e) = result {
            warn!(key, error = %e, "disk cache write failed");
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "f16"))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every stored entry.
    pub fn clear(&self) {
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "f16")
                    && let Err(e) = std::fs::remove_file(&path)
                {
                    warn!(path = %path.display(), error = %e, "disk cache delete failed");
                }
            }
        }
    }
}

fn is_expired(path: &Path, max_age: Duration) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

/// Converts f32 values to little-endian f16 bytes.
pub fn f32_to_f16_bytes(vector: &[f32]) -> Vec<u8> {
    vector
        .iter()
        .flat_map(|&v| f16::from_f32(v).to_le_bytes())
        .collect()
}

/// Converts little-endian f16 bytes back to f32 values.
pub fn f16_bytes_to_f32(bytes: &[u8]) -> Result<Vec<f32>, CacheError> {
    if !bytes.len().is_multiple_of(2) {
        return Err(CacheError::Decode {
            reason: format!("odd f16 byte length: {}", bytes.len()),
        });
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| {
            let bits = u16::from_le_bytes([chunk[0], chunk[1]]);
            f16::from_bits(bits).to_f32()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = DiskCache::open(dir.path()).expect("open");

        let vector = vec![0.25_f32, -1.0, 0.5, 2.0];
        cache.put("ohadex:embedding:abc123", &vector);

        let loaded = cache
            .get("ohadex:embedding:abc123", LONG_TTL)
            .expect("cached");
        assert_eq!(loaded.len(), vector.len());
        for (a, b) in loaded.iter().zip(vector.iter()) {
            assert!((a - b).abs() < 1e-2, "f16 precision within tolerance");
        }
    }

    #[test]
    fn test_missing_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = DiskCache::open(dir.path()).expect("open");
        assert!(cache.get("ohadex:embedding:missing", LONG_TTL).is_none());
    }

    #[test]
    fn test_expired_entry_treated_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = DiskCache::open(dir.path()).expect("open");

        cache.put("ohadex:embedding:old", &[1.0]);
        assert!(cache.get("ohadex:embedding:old", Duration::ZERO).is_none());
    }

    #[test]
    fn test_clear_and_len() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = DiskCache::open(dir.path()).expect("open");

        cache.put("ohadex:embedding:a", &[1.0]);
        cache.put("ohadex:embedding:b", &[2.0]);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_f16_bytes_rejects_odd_length() {
        assert!(f16_bytes_to_f32(&[0u8; 3]).is_err());
    }
}
