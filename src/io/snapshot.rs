//! Versioned, checksummed snapshot file.
//!
//! Layout (little endian):
//!
//! | bytes | field |
//! |---|---|
//! | 4 | magic `CNX1` |
//! | 2 | format version |
//! | 2 | reserved |
//! | 8 | generation |
//! | 8 | payload length |
//! | 32 | blake3 of payload |
//! | n | bincode payload |

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

use crate::constants::{MAGIC, MAX_SNAPSHOT_BYTES, SNAPSHOT_HEADER_SIZE, SNAPSHOT_VERSION};
use crate::error::{CanonError, Result};
use crate::rank::Centrality;
use crate::store::EntityStore;
use crate::types::{CoOccurrenceGroup, Graph, ResolverOptions};

/// One committed, immutable state of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,
    pub options: ResolverOptions,
    pub store: EntityStore,
    /// Stored co-occurrence groups keyed by record id.
    pub groups: BTreeMap<String, CoOccurrenceGroup>,
    pub graph: Graph,
    pub centrality: Centrality,
}

impl Snapshot {
    #[must_use]
    pub fn empty(options: ResolverOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    version: u16,
    generation: u64,
    payload_len: u64,
    checksum: [u8; 32],
}

impl Header {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&[0u8; 2]);
        out.extend_from_slice(&self.generation.to_le_bytes());
        out.extend_from_slice(&self.payload_len.to_le_bytes());
        out.extend_from_slice(&self.checksum);
    }

    fn read(bytes: &[u8], path: &Path) -> Result<Self> {
        let invalid = |reason: &str| CanonError::InvalidSnapshot {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if bytes.len() < SNAPSHOT_HEADER_SIZE {
            return Err(invalid("truncated header"));
        }
        if bytes[0..4] != MAGIC {
            return Err(invalid("bad magic"));
        }
        let mut u16_buf = [0u8; 2];
        u16_buf.copy_from_slice(&bytes[4..6]);
        let mut u64_buf = [0u8; 8];
        u64_buf.copy_from_slice(&bytes[8..16]);
        let generation = u64::from_le_bytes(u64_buf);
        u64_buf.copy_from_slice(&bytes[16..24]);
        let payload_len = u64::from_le_bytes(u64_buf);
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&bytes[24..56]);
        Ok(Self {
            version: u16::from_le_bytes(u16_buf),
            generation,
            payload_len,
            checksum,
        })
    }
}

pub struct SnapshotCodec;

impl SnapshotCodec {
    pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
        let payload = encode_to_vec(snapshot, bincode::config::standard())?;
        let header = Header {
            version: SNAPSHOT_VERSION,
            generation: snapshot.generation,
            payload_len: payload.len() as u64,
            checksum: blake3::hash(&payload).into(),
        };
        let mut out = Vec::with_capacity(SNAPSHOT_HEADER_SIZE + payload.len());
        header.write(&mut out);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode and verify a snapshot. `path` is only used in error messages.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Snapshot> {
        let header = Header::read(bytes, path)?;
        let invalid = |reason: String| CanonError::InvalidSnapshot {
            path: path.to_path_buf(),
            reason,
        };
        if header.version != SNAPSHOT_VERSION {
            return Err(invalid(format!(
                "unsupported format version {:#06x}",
                header.version
            )));
        }
        if header.payload_len > MAX_SNAPSHOT_BYTES {
            return Err(invalid("payload exceeds safety limit".into()));
        }
        let payload = &bytes[SNAPSHOT_HEADER_SIZE..];
        if payload.len() as u64 != header.payload_len {
            return Err(invalid(format!(
                "payload is {} bytes, header says {}",
                payload.len(),
                header.payload_len
            )));
        }
        let actual: [u8; 32] = blake3::hash(payload).into();
        if actual != header.checksum {
            return Err(CanonError::ChecksumMismatch {
                path: path.to_path_buf(),
            });
        }
        let (mut snapshot, _): (Snapshot, usize) =
            decode_from_slice(payload, bincode::config::standard())?;
        if snapshot.generation != header.generation {
            return Err(invalid("generation mismatch between header and payload".into()));
        }
        snapshot.store.rebuild_indexes();
        Ok(snapshot)
    }

    pub fn read(path: &Path) -> Result<Snapshot> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes, path)
    }

    /// Atomically replace the snapshot file.
    pub fn write(path: &Path, snapshot: &Snapshot) -> Result<()> {
        let bytes = Self::encode(snapshot)?;
        super::write_atomic(path, &bytes)?;
        tracing::debug!(
            target: "canon::snapshot",
            path = %path.display(),
            generation = snapshot.generation,
            bytes = bytes.len(),
            "snapshot written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::normalize;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::empty(ResolverOptions::default());
        snapshot.generation = 3;
        snapshot
            .store
            .create_entity(&normalize("Sarah Kellen").expect("n"), "s", "r", Some(5))
            .expect("create");
        snapshot
    }

    #[test]
    fn decode_restores_indexes() {
        let path = Path::new("memory.cnx");
        let bytes = SnapshotCodec::encode(&sample()).expect("encode");
        let decoded = SnapshotCodec::decode(&bytes, path).expect("decode");
        assert_eq!(decoded.generation, 3);
        let id = decoded.store.lookup("sarah kellen").expect("alias");
        assert_eq!(decoded.store.registry().aliases_of(id).len(), 1);
        assert_eq!(
            decoded.store.registry().entities_with_token("kellen").collect::<Vec<_>>(),
            vec![id]
        );
    }

    #[test]
    fn corruption_is_detected() {
        let path = Path::new("memory.cnx");
        let mut bytes = SnapshotCodec::encode(&sample()).expect("encode");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            SnapshotCodec::decode(&bytes, path).expect_err("flipped"),
            CanonError::ChecksumMismatch { .. }
        ));

        assert!(matches!(
            SnapshotCodec::decode(&bytes[..10], path).expect_err("short"),
            CanonError::InvalidSnapshot { .. }
        ));

        let mut wrong_magic = SnapshotCodec::encode(&sample()).expect("encode");
        wrong_magic[0] = b'X';
        assert!(matches!(
            SnapshotCodec::decode(&wrong_magic, path).expect_err("magic"),
            CanonError::InvalidSnapshot { .. }
        ));
    }
}
