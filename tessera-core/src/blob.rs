//! Blob and object identifiers, and the sliver-pair/shard rotation.

use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};
use serde::{Deserialize, Serialize};

use crate::metadata::EncodingType;

const BLOB_ID_DOMAIN: &[u8] = b"tessera-blob-id-v1";

/// Content-derived identifier of a blob.
///
/// A pure function of the encoded content: identical bytes always yield the
/// same id, on any client.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(pub [u8; 32]);

/// Identifier of an on-chain object (blob registrations, system state,
/// dynamic fields).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub [u8; 32]);

impl BlobId {
    /// Derive the blob id from the Merkle root hash of the encoded blob.
    #[must_use]
    pub fn from_root_hash(
        root_hash: &[u8; 32],
        encoding_type: EncodingType,
        unencoded_length: u64,
    ) -> Self {
        let mut hasher = Blake2bVar::new(32).expect("32 is a valid blake2b output size");
        hasher.update(BLOB_ID_DOMAIN);
        hasher.update(root_hash);
        hasher.update(&[encoding_type as u8]);
        hasher.update(&unencoded_length.to_le_bytes());
        let mut output = [0u8; 32];
        hasher
            .finalize_variable(&mut output)
            .expect("output buffer matches the requested size");
        Self(output)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&const_hex::encode(self.0))
    }
}

impl std::fmt::Debug for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlobId({self})")
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&const_hex::encode(self.0))
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

/// Per-blob rotation of sliver pairs across shards, so consecutive blobs do
/// not all start on shard zero.
fn rotation_offset(blob_id: &BlobId, n_shards: u16) -> u16 {
    let modulus = u32::from(n_shards);
    let offset = blob_id
        .0
        .iter()
        .fold(0u32, |acc, byte| (acc * 256 + u32::from(*byte)) % modulus);
    offset as u16
}

/// Shard responsible for the sliver pair with index `pair_index`.
#[must_use]
pub fn to_shard_index(pair_index: u16, blob_id: &BlobId, n_shards: u16) -> u16 {
    let offset = u32::from(rotation_offset(blob_id, n_shards));
    ((u32::from(pair_index) + offset) % u32::from(n_shards)) as u16
}

/// Sliver pair index stored on `shard_index`; inverse of [`to_shard_index`].
#[must_use]
pub fn to_pair_index(shard_index: u16, blob_id: &BlobId, n_shards: u16) -> u16 {
    let offset = u32::from(rotation_offset(blob_id, n_shards));
    ((u32::from(n_shards) + u32::from(shard_index) - offset) % u32::from(n_shards)) as u16
}

/// Sliver pair index holding the secondary sliver with index `index`.
///
/// Secondary slivers are numbered in reverse: pair `p` carries secondary
/// sliver `n_shards - p - 1`.
#[must_use]
pub const fn pair_index_for_secondary(index: u16, n_shards: u16) -> u16 {
    n_shards - index - 1
}
