//! Blob metadata: the per-sliver-pair hash list every storage node keeps.

use serde::{Deserialize, Serialize};

use crate::blob::BlobId;

/// Erasure-coding family tag. One fixed family today, tagged so the wire
/// format can grow new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncodingType {
    Rs2 = 0,
}

/// A node of the blob Merkle tree: either an empty (padding) leaf or a
/// fixed-width digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MerkleNode {
    Empty,
    Digest([u8; 32]),
}

/// Merkle hashes of one sliver pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverPairHashes {
    pub primary_hash: MerkleNode,
    pub secondary_hash: MerkleNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadataV1 {
    pub encoding_type: EncodingType,
    pub unencoded_length: u64,
    /// One entry per sliver pair, ordered by pair index. The length always
    /// equals the committee shard count.
    pub hashes: Vec<SliverPairHashes>,
}

/// Versioned blob metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobMetadata {
    V1(BlobMetadataV1),
}

impl BlobMetadata {
    #[must_use]
    pub const fn unencoded_length(&self) -> u64 {
        match self {
            Self::V1(inner) => inner.unencoded_length,
        }
    }

    #[must_use]
    pub const fn encoding_type(&self) -> EncodingType {
        match self {
            Self::V1(inner) => inner.encoding_type,
        }
    }

    #[must_use]
    pub fn hashes(&self) -> &[SliverPairHashes] {
        match self {
            Self::V1(inner) => &inner.hashes,
        }
    }
}

/// Metadata as served by storage nodes, tagged with the blob it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadataWithId {
    pub blob_id: BlobId,
    pub metadata: BlobMetadata,
}
