//! Quilts: batching many small blobs into one encoded blob.
//!
//! A quilt lays its member blobs out over the same symbol grid the encoder
//! uses, one blob per run of consecutive columns, so a reader can fetch a
//! single member by retrieving only the column slivers it occupies. Column
//! zero onwards holds a serialized index mapping identifiers to column
//! ranges.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    blob::BlobId,
    params::{source_symbols, SourceSymbols},
    wire,
};

pub const QUILT_VERSION: u8 = 1;
/// Version byte plus a little-endian u32 index length.
pub const QUILT_INDEX_PREFIX_SIZE: usize = 5;
/// Version byte, little-endian u32 patch length, flag mask.
pub const QUILT_PATCH_HEADER_SIZE: usize = 6;
/// Upper bound on the columns the index may occupy.
pub const MAX_INDEX_COLUMNS: u64 = 10;
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

const IDENTIFIER_LEN_SIZE: usize = 2;
const TAGS_LEN_SIZE: usize = 2;
const HAS_TAGS_FLAG: u8 = 1;
const SYMBOL_ALIGNMENT: u64 = 2;
const MAX_SYMBOL_SIZE: u64 = u16::MAX as u64;

#[derive(Debug, thiserror::Error)]
pub enum QuiltError {
    #[error("a quilt must contain at least one blob")]
    NoBlobs,
    #[error("too many blobs: {count} exceed the {max} available columns")]
    TooManyBlobs { count: usize, max: usize },
    #[error("duplicate blob identifier: {0}")]
    DuplicateIdentifier(String),
    #[error("blob identifier longer than {max} bytes: {identifier}")]
    IdentifierTooLong { identifier: String, max: usize },
    #[error("blobs do not fit into a quilt at the maximum symbol size")]
    Oversize,
    #[error("the quilt index does not fit into the columns reserved for it")]
    IndexTooLarge,
    #[error("unsupported quilt version {0}")]
    UnsupportedVersion(u8),
    #[error("malformed quilt data: {0}")]
    Malformed(&'static str),
    #[error("quilt index codec error: {0}")]
    Index(#[from] wire::Error),
}

/// One blob to be packed into a quilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuiltBlob {
    pub identifier: String,
    pub tags: BTreeMap<String, String>,
    pub contents: Vec<u8>,
}

/// Index entry for one packed blob: the half-open column range
/// `[start_index, end_index)` it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuiltPatch {
    pub start_index: u16,
    pub end_index: u16,
    pub identifier: String,
    pub tags: BTreeMap<String, String>,
}

/// The quilt index, stored in the leading columns of the quilt. Patches are
/// ordered by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuiltIndexV1 {
    pub patches: Vec<QuiltPatch>,
}

impl QuiltIndexV1 {
    #[must_use]
    pub fn patch_ids(&self, quilt_id: &BlobId) -> Vec<QuiltPatchId> {
        self.patches
            .iter()
            .map(|patch| QuiltPatchId {
                quilt_id: *quilt_id,
                version: QUILT_VERSION,
                start_index: patch.start_index,
                end_index: patch.end_index,
            })
            .collect()
    }
}

/// Stable handle to one blob inside a certified quilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuiltPatchId {
    pub quilt_id: BlobId,
    pub version: u8,
    pub start_index: u16,
    pub end_index: u16,
}

/// A fully laid-out quilt, ready to be encoded and written like any blob.
#[derive(Debug, Clone)]
pub struct EncodedQuilt {
    pub data: Vec<u8>,
    pub index: QuiltIndexV1,
    pub symbol_size: u64,
    pub row_size: u64,
    pub column_size: u64,
}

/// Identifier, tags and contents location parsed from the head of a patch's
/// column bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPatch {
    pub identifier: String,
    pub tags: BTreeMap<String, String>,
    pub contents_offset: usize,
    pub contents_length: usize,
}

fn fits(blob_sizes: &[u64], n_columns: u64, column_size: u64) -> bool {
    blob_sizes
        .iter()
        .map(|size| size.div_ceil(column_size))
        .sum::<u64>()
        <= n_columns
}

/// Minimum symbol size at which all blobs fit into the quilt grid, each in
/// its own run of consecutive columns.
///
/// `blob_sizes[0]` is the serialized index (prefix included) and must fit in
/// `max_index_columns` columns. A binary search over integer symbol sizes
/// finds the smallest feasible value, which is then rounded up to the
/// encoder's two-byte symbol alignment.
pub fn compute_symbol_size(
    blob_sizes: &[u64],
    n_columns: u16,
    n_rows: u16,
    max_index_columns: u64,
) -> Result<u64, QuiltError> {
    if blob_sizes.is_empty() {
        return Err(QuiltError::NoBlobs);
    }
    if blob_sizes.len() > usize::from(n_columns) {
        return Err(QuiltError::TooManyBlobs {
            count: blob_sizes.len(),
            max: usize::from(n_columns),
        });
    }

    let n_columns = u64::from(n_columns);
    let n_rows = u64::from(n_rows);
    let total: u64 = blob_sizes.iter().sum();
    let max_size = *blob_sizes.iter().max().unwrap_or(&1);

    let mut lo = total
        .div_ceil(n_columns * n_rows)
        .max(blob_sizes[0].div_ceil(n_rows * max_index_columns))
        .max((QUILT_INDEX_PREFIX_SIZE as u64).div_ceil(n_rows))
        .max(1);
    let mut hi = (max_size * blob_sizes.len() as u64 * n_rows)
        .div_ceil(n_columns)
        .max(lo);

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if fits(blob_sizes, n_columns, mid * n_rows) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    let symbol_size = lo.div_ceil(SYMBOL_ALIGNMENT) * SYMBOL_ALIGNMENT;
    if !fits(blob_sizes, n_columns, symbol_size * n_rows) || symbol_size > MAX_SYMBOL_SIZE {
        return Err(QuiltError::Oversize);
    }
    Ok(symbol_size)
}

fn encode_patch_metadata(blob: &QuiltBlob) -> Result<Vec<u8>, QuiltError> {
    let identifier_bytes = blob.identifier.as_bytes();
    if identifier_bytes.len() > MAX_IDENTIFIER_LENGTH {
        return Err(QuiltError::IdentifierTooLong {
            identifier: blob.identifier.clone(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }

    let tags_bytes = if blob.tags.is_empty() {
        None
    } else {
        Some(wire::serialize(&blob.tags)?)
    };

    let mut metadata_size =
        QUILT_PATCH_HEADER_SIZE + IDENTIFIER_LEN_SIZE + identifier_bytes.len();
    let mut mask = 0u8;
    if let Some(tags) = &tags_bytes {
        metadata_size += TAGS_LEN_SIZE + tags.len();
        mask |= HAS_TAGS_FLAG;
    }

    // the patch length covers everything after the header, contents included
    let patch_length =
        (metadata_size - QUILT_PATCH_HEADER_SIZE + blob.contents.len()) as u32;

    let mut metadata = Vec::with_capacity(metadata_size);
    metadata.push(QUILT_VERSION);
    metadata.extend_from_slice(&patch_length.to_le_bytes());
    metadata.push(mask);
    metadata.extend_from_slice(&(identifier_bytes.len() as u16).to_le_bytes());
    metadata.extend_from_slice(identifier_bytes);
    if let Some(tags) = &tags_bytes {
        metadata.extend_from_slice(&(tags.len() as u16).to_le_bytes());
        metadata.extend_from_slice(tags);
    }
    Ok(metadata)
}

/// Write `segments` as one contiguous byte stream into the quilt grid,
/// column-major at symbol granularity, starting at `start_column`. Returns
/// the number of columns consumed.
fn write_into_grid(
    quilt: &mut [u8],
    row_size: u64,
    symbol_size: u64,
    start_column: u16,
    segments: &[&[u8]],
) -> u16 {
    // the grid height is the row count, not the symbols-per-row count
    let n_rows = quilt.len() as u64 / row_size;
    let column_size = symbol_size * n_rows;
    let mut written = 0u64;

    for segment in segments {
        let symbols_skipped = written / symbol_size;
        let mut within_symbol = written % symbol_size;
        let mut column = u64::from(start_column) + symbols_skipped / n_rows;
        let mut row = symbols_skipped % n_rows;

        let mut index = 0usize;
        while index < segment.len() {
            let base = (row * row_size + column * symbol_size + within_symbol) as usize;
            let len = ((symbol_size - within_symbol) as usize).min(segment.len() - index);
            quilt[base..base + len].copy_from_slice(&segment[index..index + len]);
            index += len;
            within_symbol = 0;
            row = (row + 1) % n_rows;
            if row == 0 {
                column += 1;
            }
        }
        written += segment.len() as u64;
    }

    written.div_ceil(column_size) as u16
}

/// Read `length` bytes from the quilt grid starting `offset` bytes into the
/// column run beginning at `start_column`, following the same column-major
/// symbol order the writer uses.
pub fn read_grid_bytes(
    quilt: &[u8],
    row_size: u64,
    symbol_size: u64,
    start_column: u16,
    offset: u64,
    length: usize,
) -> Result<Vec<u8>, QuiltError> {
    let mut result = Vec::with_capacity(length);
    if length == 0 {
        return Ok(result);
    }

    let n_rows = quilt.len() as u64 / row_size;
    if n_rows == 0 {
        return Err(QuiltError::Malformed("quilt shorter than one row"));
    }
    let n_columns = row_size / symbol_size;
    let symbols_skipped = offset / symbol_size;
    let mut within_symbol = offset % symbol_size;
    let mut column = u64::from(start_column) + symbols_skipped / n_rows;
    let mut row = symbols_skipped % n_rows;

    while result.len() < length {
        if column >= n_columns {
            return Err(QuiltError::Malformed("read past the last quilt column"));
        }
        let base = row * row_size + column * symbol_size + within_symbol;
        let end = (base + symbol_size - within_symbol)
            .min(base + (length - result.len()) as u64)
            .min(quilt.len() as u64);
        result.extend_from_slice(&quilt[base as usize..end as usize]);
        within_symbol = 0;
        row = (row + 1) % n_rows;
        if row == 0 {
            column += 1;
        }
    }
    Ok(result)
}

/// Pack `blobs` into a quilt for a committee of `n_shards` shards.
///
/// Blobs are sorted by identifier, assigned consecutive column runs after
/// the index columns, and the index is serialized into column zero onwards
/// with its version/length prefix.
pub fn encode_quilt(mut blobs: Vec<QuiltBlob>, n_shards: u16) -> Result<EncodedQuilt, QuiltError> {
    let SourceSymbols {
        primary: n_rows,
        secondary: n_columns,
    } = source_symbols(n_shards);

    if blobs.is_empty() {
        return Err(QuiltError::NoBlobs);
    }
    blobs.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    let mut identifiers = HashSet::new();
    for blob in &blobs {
        if !identifiers.insert(blob.identifier.as_str()) {
            return Err(QuiltError::DuplicateIdentifier(blob.identifier.clone()));
        }
    }

    let mut index = QuiltIndexV1 {
        patches: blobs
            .iter()
            .map(|blob| QuiltPatch {
                start_index: 0,
                end_index: 0,
                identifier: blob.identifier.clone(),
                tags: blob.tags.clone(),
            })
            .collect(),
    };

    // patch column ranges are fixed-width, so the serialized index keeps
    // this length once they are filled in
    let index_size = QUILT_INDEX_PREFIX_SIZE + wire::serialize(&index)?.len();

    let metadata = blobs
        .iter()
        .map(encode_patch_metadata)
        .collect::<Result<Vec<_>, _>>()?;

    let blob_sizes: Vec<u64> = std::iter::once(index_size as u64)
        .chain(
            blobs
                .iter()
                .zip(&metadata)
                .map(|(blob, metadata)| (metadata.len() + blob.contents.len()) as u64),
        )
        .collect();

    let symbol_size = compute_symbol_size(&blob_sizes, n_columns, n_rows, MAX_INDEX_COLUMNS)?;
    let row_size = symbol_size * u64::from(n_columns);
    let column_size = symbol_size * u64::from(n_rows);

    let index_columns = (index_size as u64).div_ceil(column_size);
    if index_columns > MAX_INDEX_COLUMNS {
        return Err(QuiltError::IndexTooLarge);
    }

    let mut quilt = vec![0u8; (row_size * u64::from(n_rows)) as usize];
    let mut current_column = index_columns as u16;
    for (i, blob) in blobs.iter().enumerate() {
        index.patches[i].start_index = current_column;
        current_column += write_into_grid(
            &mut quilt,
            row_size,
            symbol_size,
            current_column,
            &[&metadata[i], &blob.contents],
        );
        index.patches[i].end_index = current_column;
    }

    let index_bytes = wire::serialize(&index)?;
    let mut prefixed = Vec::with_capacity(QUILT_INDEX_PREFIX_SIZE + index_bytes.len());
    prefixed.push(QUILT_VERSION);
    prefixed.extend_from_slice(&(index_bytes.len() as u32).to_le_bytes());
    prefixed.extend_from_slice(&index_bytes);
    write_into_grid(&mut quilt, row_size, symbol_size, 0, &[&prefixed]);

    Ok(EncodedQuilt {
        data: quilt,
        index,
        symbol_size,
        row_size,
        column_size,
    })
}

/// Byte length of the serialized index, parsed from the 5-byte prefix at the
/// head of column zero.
pub fn parse_index_prefix(bytes: &[u8]) -> Result<u32, QuiltError> {
    if bytes.len() < QUILT_INDEX_PREFIX_SIZE {
        return Err(QuiltError::Malformed("truncated quilt index prefix"));
    }
    if bytes[0] != QUILT_VERSION {
        return Err(QuiltError::UnsupportedVersion(bytes[0]));
    }
    Ok(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]))
}

pub fn decode_index(bytes: &[u8]) -> Result<QuiltIndexV1, QuiltError> {
    Ok(wire::deserialize(bytes)?)
}

/// Columns reserved for the index: prefix plus serialized index, rounded up
/// to whole columns. The writer and every reader must agree on this.
#[must_use]
pub fn index_columns(index_size: u64, column_size: u64) -> u64 {
    (QUILT_INDEX_PREFIX_SIZE as u64 + index_size).div_ceil(column_size)
}

/// Parse identifier, tags and the contents location from the head of a
/// patch's column bytes.
pub fn parse_patch(bytes: &[u8]) -> Result<ParsedPatch, QuiltError> {
    if bytes.len() < QUILT_PATCH_HEADER_SIZE {
        return Err(QuiltError::Malformed("truncated patch header"));
    }
    if bytes[0] != QUILT_VERSION {
        return Err(QuiltError::UnsupportedVersion(bytes[0]));
    }
    let patch_length = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let mask = bytes[5];

    let mut offset = QUILT_PATCH_HEADER_SIZE;
    let mut contents_length = patch_length;

    let rest = &bytes[offset..];
    if rest.len() < IDENTIFIER_LEN_SIZE {
        return Err(QuiltError::Malformed("truncated patch identifier length"));
    }
    let identifier_length = usize::from(u16::from_le_bytes([rest[0], rest[1]]));
    offset += IDENTIFIER_LEN_SIZE;
    let identifier_bytes = bytes
        .get(offset..offset + identifier_length)
        .ok_or(QuiltError::Malformed("truncated patch identifier"))?;
    let identifier = std::str::from_utf8(identifier_bytes)
        .map_err(|_| QuiltError::Malformed("patch identifier is not valid utf-8"))?
        .to_owned();
    offset += identifier_length;
    contents_length = contents_length
        .checked_sub(IDENTIFIER_LEN_SIZE + identifier_length)
        .ok_or(QuiltError::Malformed("patch length underflow"))?;

    let mut tags = BTreeMap::new();
    if mask & HAS_TAGS_FLAG != 0 {
        let len_bytes = bytes
            .get(offset..offset + TAGS_LEN_SIZE)
            .ok_or(QuiltError::Malformed("truncated patch tags length"))?;
        let tags_length = usize::from(u16::from_le_bytes([len_bytes[0], len_bytes[1]]));
        offset += TAGS_LEN_SIZE;
        let tags_bytes = bytes
            .get(offset..offset + tags_length)
            .ok_or(QuiltError::Malformed("truncated patch tags"))?;
        tags = wire::deserialize(tags_bytes)?;
        offset += tags_length;
        contents_length = contents_length
            .checked_sub(TAGS_LEN_SIZE + tags_length)
            .ok_or(QuiltError::Malformed("patch length underflow"))?;
    }

    Ok(ParsedPatch {
        identifier,
        tags,
        contents_offset: offset,
        contents_length,
    })
}
