//! Encoding parameter derivation.
//!
//! Pure functions mapping the committee shard count and a blob length to the
//! fault-tolerance and geometry constants of the encoding scheme. An encoder
//! and an independent reader that only know `(n_shards, unencoded_length)`
//! must derive identical geometry, so nothing here may depend on runtime
//! state.

use serde::{Deserialize, Serialize};

use crate::metadata::EncodingType;

/// Byte length of a sliver-pair Merkle digest.
pub const DIGEST_LEN: u64 = 32;
/// Byte length of a blob id.
pub const BLOB_ID_LEN: u64 = 32;

const BYTES_PER_STORAGE_UNIT: u64 = 1024 * 1024;

/// Number of source symbols per primary and secondary sliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSymbols {
    pub primary: u16,
    pub secondary: u16,
}

/// Row/column geometry of one encoded blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobGeometry {
    pub symbol_size: u64,
    pub column_size: u64,
    pub row_size: u64,
}

/// Maximum number of faulty shards the scheme tolerates out of `n_shards`.
#[must_use]
pub const fn max_faulty_shards(n_shards: u16) -> u16 {
    (n_shards - 1) / 3
}

/// Whether `weight` shards are a certification quorum.
#[must_use]
pub const fn is_quorum(weight: u16, n_shards: u16) -> bool {
    weight > 2 * max_faulty_shards(n_shards)
}

/// Whether `weight` shards exceed the validity threshold, i.e. at least one
/// honest shard is among them.
#[must_use]
pub const fn is_above_validity(weight: u16, n_shards: u16) -> bool {
    weight > max_faulty_shards(n_shards)
}

/// Source symbol counts for the scheme's fault-tolerance formula.
///
/// With `f = (n - 1) / 3` faulty shards tolerated, at least `n - f` shards
/// are correct, of which another `f` may be unavailable when reading:
/// `primary = n - 2f`, `secondary = n - f`. The RS2 decoding safety limit
/// is zero, so no further symbols are subtracted.
#[must_use]
pub const fn source_symbols(n_shards: u16) -> SourceSymbols {
    let max_faulty = max_faulty_shards(n_shards);
    let min_correct = n_shards - max_faulty;
    SourceSymbols {
        primary: min_correct - max_faulty,
        secondary: min_correct,
    }
}

/// Derive the symbol/column/row geometry for a blob of `unencoded_length`
/// bytes on a committee with `n_shards` shards.
///
/// The blob is divided across `secondary` columns rounding up, the column is
/// rounded up so it divides evenly into `primary` symbols, and the row is
/// `secondary` symbols wide. Empty blobs are sized as one byte so every blob
/// has a non-zero symbol size.
#[must_use]
pub fn sizes(unencoded_length: u64, n_shards: u16) -> BlobGeometry {
    let SourceSymbols { primary, secondary } = source_symbols(n_shards);
    let (primary, secondary) = (u64::from(primary), u64::from(secondary));

    let column_size = unencoded_length.max(1).div_ceil(secondary);
    let column_size = column_size.div_ceil(primary) * primary;
    let symbol_size = column_size / primary;

    BlobGeometry {
        symbol_size,
        column_size,
        row_size: symbol_size * secondary,
    }
}

/// Total on-network size of a blob after encoding, including the replicated
/// metadata. Used for storage accounting when registering a blob.
#[must_use]
pub fn encoded_blob_length(
    unencoded_length: u64,
    n_shards: u16,
    encoding_type: EncodingType,
) -> u64 {
    let SourceSymbols { primary, secondary } = source_symbols(n_shards);
    let (primary, secondary) = (u64::from(primary), u64::from(secondary));
    let n_shards = u64::from(n_shards);

    let mut symbol_size = (unencoded_length.max(1) - 1) / (primary * secondary) + 1;
    if matches!(encoding_type, EncodingType::Rs2) && symbol_size % 2 == 1 {
        symbol_size += 1;
    }

    let slivers_size = (primary + secondary) * symbol_size * n_shards;
    let metadata_size = n_shards * DIGEST_LEN * 2 + BLOB_ID_LEN;
    n_shards * metadata_size + slivers_size
}

/// Storage units charged for `size` encoded bytes, rounding up.
#[must_use]
pub const fn storage_units_from_size(size: u64) -> u64 {
    size.div_ceil(BYTES_PER_STORAGE_UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_symbols_are_deterministic_and_ordered() {
        for n_shards in [1u16, 4, 7, 10, 101, 667, 1000] {
            let a = source_symbols(n_shards);
            let b = source_symbols(n_shards);
            assert_eq!(a, b);
            assert!(a.primary <= a.secondary, "n_shards={n_shards}");
            assert!(a.primary >= 1);
        }
    }

    #[test]
    fn known_symbol_counts() {
        let symbols = source_symbols(1000);
        assert_eq!(symbols.primary, 334);
        assert_eq!(symbols.secondary, 667);

        let symbols = source_symbols(7);
        assert_eq!(symbols.primary, 3);
        assert_eq!(symbols.secondary, 5);
    }

    #[test]
    fn sizes_geometry_invariants() {
        for n_shards in [4u16, 7, 10, 101, 1000] {
            let SourceSymbols { primary, secondary } = source_symbols(n_shards);
            for len in [0u64, 1, 13, 1024, 1_000_000, 123_456_789] {
                let geometry = sizes(len, n_shards);
                assert_eq!(geometry.column_size % u64::from(primary), 0);
                assert_eq!(
                    geometry.symbol_size * u64::from(secondary),
                    geometry.row_size
                );
                assert!(geometry.symbol_size >= 1);
                // the grid must hold the whole blob
                assert!(geometry.column_size * u64::from(secondary) >= len);
            }
        }
    }

    #[test]
    fn quorum_thresholds() {
        // f = 333 for 1000 shards
        assert!(!is_quorum(666, 1000));
        assert!(is_quorum(667, 1000));
        assert!(!is_above_validity(333, 1000));
        assert!(is_above_validity(334, 1000));
    }

    #[test]
    fn encoded_length_is_monotonic_in_blob_size() {
        let small = encoded_blob_length(1024, 1000, EncodingType::Rs2);
        let large = encoded_blob_length(10 * 1024 * 1024, 1000, EncodingType::Rs2);
        assert!(small < large);
        assert_eq!(storage_units_from_size(1), 1);
        assert_eq!(storage_units_from_size(BYTES_PER_STORAGE_UNIT + 1), 2);
    }
}
