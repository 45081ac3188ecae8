//! Blob encoding: the codec seam and the systematic reference codec.

use std::collections::BTreeMap;

use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};
use tessera_core::{
    blob::pair_index_for_secondary,
    metadata::{BlobMetadata, BlobMetadataV1, EncodingType, MerkleNode, SliverPairHashes},
    params::{sizes, source_symbols, SourceSymbols},
    sliver::{SliverData, SliverPair, Symbols},
    BlobId,
};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("blob of {length} bytes exceeds the maximum symbol size for {n_shards} shards")]
    BlobTooLarge { length: u64, n_shards: u16 },
    #[error("missing sliver {index} required for reconstruction")]
    MissingSliver { index: u16 },
    #[error("sliver {index} does not match the expected symbol size")]
    SymbolSizeMismatch { index: u16 },
}

/// The full output of encoding one blob.
#[derive(Debug, Clone)]
pub struct EncodedBlob {
    pub blob_id: BlobId,
    pub root_hash: [u8; 32],
    pub metadata: BlobMetadata,
    /// One pair per shard, ordered by pair index.
    pub sliver_pairs: Vec<SliverPair>,
}

/// Erasure codec seam. The write and read paths only rely on this trait, so
/// production Reed-Solomon coders slot in without touching orchestration.
pub trait BlobCodec: Send + Sync {
    fn encode(&self, n_shards: u16, blob: &[u8]) -> Result<EncodedBlob, CodecError>;

    /// Reconstruct the blob from primary slivers, keyed by sliver index.
    fn decode(
        &self,
        n_shards: u16,
        unencoded_length: u64,
        slivers: &BTreeMap<u16, SliverData>,
    ) -> Result<Vec<u8>, CodecError>;

    fn compute_metadata(
        &self,
        n_shards: u16,
        blob: &[u8],
    ) -> Result<(BlobId, BlobMetadata), CodecError> {
        let encoded = self.encode(n_shards, blob)?;
        Ok((encoded.blob_id, encoded.metadata))
    }
}

fn blake2b_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2bVar::new(32).expect("32 is a valid blake2b output size");
    for part in parts {
        hasher.update(part);
    }
    let mut digest = [0u8; 32];
    hasher
        .finalize_variable(&mut digest)
        .expect("output buffer matches the requested size");
    digest
}

/// Systematic reference codec over the standard symbol grid.
///
/// The blob is laid row-major into a `primary x secondary` symbol grid.
/// Primary sliver `i` is row `i` of the grid (zero rows past `primary`),
/// the secondary sliver carried by pair `p` is column `n_shards - p - 1`
/// (zero columns past `secondary`). Reconstruction needs the systematic
/// rows `0..primary`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridCodec;

impl BlobCodec for GridCodec {
    fn encode(&self, n_shards: u16, blob: &[u8]) -> Result<EncodedBlob, CodecError> {
        let unencoded_length = blob.len() as u64;
        let geometry = sizes(unencoded_length, n_shards);
        if geometry.symbol_size > u64::from(u16::MAX) {
            return Err(CodecError::BlobTooLarge {
                length: unencoded_length,
                n_shards,
            });
        }
        let SourceSymbols { primary, secondary } = source_symbols(n_shards);
        let symbol_size = geometry.symbol_size as usize;
        let row_size = geometry.row_size as usize;
        let column_size = geometry.column_size as usize;

        let mut grid = vec![0u8; row_size * usize::from(primary)];
        grid[..blob.len()].copy_from_slice(blob);

        let column = |index: usize| -> Vec<u8> {
            let mut data = Vec::with_capacity(column_size);
            for row in 0..usize::from(primary) {
                let start = row * row_size + index * symbol_size;
                data.extend_from_slice(&grid[start..start + symbol_size]);
            }
            data
        };

        let mut sliver_pairs = Vec::with_capacity(usize::from(n_shards));
        let mut hashes = Vec::with_capacity(usize::from(n_shards));
        for pair_index in 0..n_shards {
            let primary_data = if pair_index < primary {
                let start = usize::from(pair_index) * row_size;
                grid[start..start + row_size].to_vec()
            } else {
                vec![0u8; row_size]
            };

            let secondary_index = pair_index_for_secondary(pair_index, n_shards);
            let secondary_data = if secondary_index < secondary {
                column(usize::from(secondary_index))
            } else {
                vec![0u8; column_size]
            };

            hashes.push(SliverPairHashes {
                primary_hash: MerkleNode::Digest(blake2b_256(&[&primary_data])),
                secondary_hash: MerkleNode::Digest(blake2b_256(&[&secondary_data])),
            });
            sliver_pairs.push(SliverPair {
                primary: SliverData {
                    symbols: Symbols {
                        data: primary_data,
                        symbol_size: geometry.symbol_size as u16,
                    },
                    index: pair_index,
                },
                secondary: SliverData {
                    symbols: Symbols {
                        data: secondary_data,
                        symbol_size: geometry.symbol_size as u16,
                    },
                    index: secondary_index,
                },
            });
        }

        let mut leaves = Vec::with_capacity(usize::from(n_shards) * 64);
        for pair in &hashes {
            if let MerkleNode::Digest(digest) = &pair.primary_hash {
                leaves.extend_from_slice(digest);
            }
            if let MerkleNode::Digest(digest) = &pair.secondary_hash {
                leaves.extend_from_slice(digest);
            }
        }
        let root_hash = blake2b_256(&[&leaves]);
        let blob_id = BlobId::from_root_hash(&root_hash, EncodingType::Rs2, unencoded_length);

        Ok(EncodedBlob {
            blob_id,
            root_hash,
            metadata: BlobMetadata::V1(BlobMetadataV1 {
                encoding_type: EncodingType::Rs2,
                unencoded_length,
                hashes,
            }),
            sliver_pairs,
        })
    }

    fn decode(
        &self,
        n_shards: u16,
        unencoded_length: u64,
        slivers: &BTreeMap<u16, SliverData>,
    ) -> Result<Vec<u8>, CodecError> {
        let geometry = sizes(unencoded_length, n_shards);
        let SourceSymbols { primary, .. } = source_symbols(n_shards);
        let row_size = geometry.row_size as usize;

        let mut blob = Vec::with_capacity(row_size * usize::from(primary));
        for index in 0..primary {
            let sliver = slivers
                .get(&index)
                .ok_or(CodecError::MissingSliver { index })?;
            if sliver.symbols.data.len() != row_size
                || u64::from(sliver.symbols.symbol_size) != geometry.symbol_size
            {
                return Err(CodecError::SymbolSizeMismatch { index });
            }
            blob.extend_from_slice(&sliver.symbols.data);
        }
        blob.truncate(unencoded_length as usize);
        Ok(blob)
    }
}
