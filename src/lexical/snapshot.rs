//! Disk-persisted corpus snapshots for the lexical index.
//!
//! A snapshot is an 8-byte header (magic + version, both little-endian
//! friendly) followed by an rkyv-archived document list. Snapshots are
//! opaque and safe to delete; a missing, stale-version or corrupt file is
//! treated as absent and the index is rebuilt from the backing store.

use std::path::Path;

use rkyv::rancor;
use rkyv::util::AlignedVec;
use tracing::{debug, warn};

use crate::model::Metadata;

use super::CorpusDocument;
use super::error::LexicalError;

const SNAPSHOT_MAGIC: [u8; 4] = *b"OXBM";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct SnapshotDoc {
    id: String,
    text: String,
    metadata_json: String,
}

#[derive(Debug, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct IndexSnapshot {
    docs: Vec<SnapshotDoc>,
}

/// Writes a corpus snapshot atomically (tmp file + rename).
pub fn save(path: &Path, documents: &[CorpusDocument]) -> Result<(), LexicalError> {
    let snapshot = IndexSnapshot {
        docs: documents
            .iter()
            .map(|doc| SnapshotDoc {
                id: doc.id.clone(),
                text: doc.text.clone(),
                metadata_json: serde_json::to_string(&doc.metadata).unwrap_or_default(),
            })
            .collect(),
    };

    let payload =
        rkyv::to_bytes::<rancor::Error>(&snapshot).map_err(|e| LexicalError::SnapshotCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut bytes = Vec::with_capacity(8 + payload.len());
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);

    let io_err = |source| LexicalError::SnapshotIo {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = path.with_extension("snapshot.tmp");
    std::fs::write(&tmp, &bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;

    debug!(path = %path.display(), docs = documents.len(), "corpus snapshot written");
    Ok(())
}

/// Loads a corpus snapshot. Returns `Ok(None)` when the file is missing or
/// unusable (bad header, stale version, corrupt payload).
pub fn load(path: &Path) -> Result<Option<Vec<CorpusDocument>>, LexicalError> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = std::fs::read(path).map_err(|source| LexicalError::SnapshotIo {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.len() < 8 || bytes[0..4] != SNAPSHOT_MAGIC {
        warn!(path = %path.display(), "snapshot header invalid, ignoring");
        return Ok(None);
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != SNAPSHOT_VERSION {
        warn!(path = %path.display(), version, "snapshot version unsupported, ignoring");
        return Ok(None);
    }

    let mut payload = AlignedVec::<16>::new();
    payload.extend_from_slice(&bytes[8..]);

    let snapshot = match rkyv::from_bytes::<IndexSnapshot, rancor::Error>(&payload) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot payload corrupt, ignoring");
            return Ok(None);
        }
    };

    let documents = snapshot
        .docs
        .into_iter()
        .map(|doc| CorpusDocument {
            id: doc.id,
            text: doc.text,
            metadata: serde_json::from_str::<Metadata>(&doc.metadata_json).unwrap_or_default(),
        })
        .collect();

    Ok(Some(documents))
}
