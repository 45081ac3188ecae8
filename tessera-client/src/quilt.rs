//! Reading and writing quilts.
//!
//! A quilt's columns are the blob's secondary slivers, so a single patch
//! can be retrieved by fetching only the column slivers it occupies. When
//! sliver reads fail, or the full blob is already (being) loaded, reads
//! fall back to the reconstructed blob.

use std::{collections::BTreeMap, sync::Arc};

use tessera_core::{
    quilt::{
        decode_index, encode_quilt, index_columns, parse_index_prefix, parse_patch, read_grid_bytes,
        QuiltBlob, QuiltError, QuiltIndexV1, QuiltPatchId, QUILT_INDEX_PREFIX_SIZE, QUILT_VERSION,
    },
    params::source_symbols,
};
use tracing::debug;

use crate::{
    chain::ChainAdapter,
    client::TesseraClient,
    error::ClientError,
    read::BlobStore,
    reader::{grid_geometry, BlobReader},
    transport::StorageNodeApi,
    write::{WriteBlobOptions, WriteResult},
};

/// One blob read back out of a quilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuiltPatchOutput {
    pub identifier: String,
    pub tags: BTreeMap<String, String>,
    pub contents: Vec<u8>,
}

/// Result of writing a quilt: the blob write outcome plus the patch index
/// and per-patch ids.
#[derive(Debug, Clone)]
pub struct QuiltWriteResult {
    pub write: WriteResult,
    pub index: QuiltIndexV1,
    pub patch_ids: Vec<QuiltPatchId>,
}

impl<S, C> TesseraClient<S, C>
where
    S: StorageNodeApi + 'static,
    C: ChainAdapter + 'static,
{
    /// Pack `blobs` into a quilt and write it like any other blob.
    pub async fn write_quilt(
        &self,
        blobs: Vec<QuiltBlob>,
        options: &WriteBlobOptions,
    ) -> Result<QuiltWriteResult, ClientError> {
        let encoded = encode_quilt(blobs, self.committee.n_shards)?;
        let write = self.write_blob(&encoded.data, options).await?;
        let patch_ids = encoded.index.patch_ids(&write.blob_id);
        Ok(QuiltWriteResult {
            write,
            index: encoded.index,
            patch_ids,
        })
    }
}

pub struct QuiltReader<'a, S> {
    reader: &'a BlobReader<S>,
}

impl<'a, S: BlobStore + 'static> QuiltReader<'a, S> {
    pub(crate) fn new(reader: &'a BlobReader<S>) -> Self {
        Self { reader }
    }

    /// The quilt's patch index, with start columns normalized: the first
    /// patch starts right after the index columns, each further patch at
    /// its predecessor's end.
    pub async fn read_index(&self) -> Result<QuiltIndexV1, ClientError> {
        let prefix = self.read_bytes(0, 0, QUILT_INDEX_PREFIX_SIZE).await?;
        let index_size = parse_index_prefix(&prefix)?;
        let index_bytes = self
            .read_bytes(0, QUILT_INDEX_PREFIX_SIZE as u64, index_size as usize)
            .await?;
        let mut index = decode_index(&index_bytes)?;

        let column_size = self.reader.column_size().await?;
        let mut next_start = index_columns(u64::from(index_size), column_size) as u16;
        for patch in &mut index.patches {
            patch.start_index = next_start;
            next_start = patch.end_index;
        }
        Ok(index)
    }

    pub async fn read_by_patch_id(
        &self,
        id: &QuiltPatchId,
    ) -> Result<QuiltPatchOutput, ClientError> {
        if id.quilt_id != *self.reader.blob_id() {
            return Err(ClientError::PatchNotFound(format!(
                "patch belongs to quilt {}",
                id.quilt_id
            )));
        }
        if id.version != QUILT_VERSION {
            return Err(ClientError::Quilt(QuiltError::UnsupportedVersion(id.version)));
        }
        self.read_patch(id.start_index, id.end_index).await
    }

    pub async fn read_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<QuiltPatchOutput, ClientError> {
        let index = self.read_index().await?;
        let patch = index
            .patches
            .iter()
            .find(|patch| patch.identifier == identifier)
            .ok_or_else(|| ClientError::PatchNotFound(identifier.to_owned()))?;
        self.read_patch(patch.start_index, patch.end_index).await
    }

    /// Every patch whose tags contain `key` with exactly `value`.
    pub async fn read_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<QuiltPatchOutput>, ClientError> {
        let index = self.read_index().await?;
        let mut matches = Vec::new();
        for patch in index
            .patches
            .iter()
            .filter(|patch| patch.tags.get(key).is_some_and(|tag| tag == value))
        {
            matches.push(self.read_patch(patch.start_index, patch.end_index).await?);
        }
        Ok(matches)
    }

    async fn read_patch(&self, start: u16, end: u16) -> Result<QuiltPatchOutput, ClientError> {
        if start >= end {
            return Err(ClientError::PatchNotFound(format!(
                "empty patch column range {start}..{end}"
            )));
        }
        let column_size = self.reader.column_size().await? as usize;
        let bytes = self
            .read_bytes(start, 0, usize::from(end - start) * column_size)
            .await?;
        let parsed = parse_patch(&bytes)?;
        let contents = bytes
            .get(parsed.contents_offset..parsed.contents_offset + parsed.contents_length)
            .ok_or(ClientError::Quilt(QuiltError::Malformed(
                "patch contents extend past its columns",
            )))?
            .to_vec();
        Ok(QuiltPatchOutput {
            identifier: parsed.identifier,
            tags: parsed.tags,
            contents,
        })
    }

    /// Read `length` bytes starting `offset` bytes into the column run at
    /// `start_column`, from slivers when possible, from the full blob
    /// otherwise.
    async fn read_bytes(
        &self,
        start_column: u16,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, ClientError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        if self.reader.full_blob_in_flight() {
            return self.read_from_blob(start_column, offset, length).await;
        }
        match self.read_from_slivers(start_column, offset, length).await {
            Ok(bytes) => Ok(bytes),
            Err(error) => {
                debug!(%error, "sliver read failed, falling back to the full blob");
                self.read_from_blob(start_column, offset, length).await
            }
        }
    }

    async fn read_from_slivers(
        &self,
        start_column: u16,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, ClientError> {
        let n_shards = self.reader.store().n_shards();
        let secondary = source_symbols(n_shards).secondary;

        let first = self.reader.get_secondary_sliver(start_column).await?;
        let column_size = first.len() as u64;
        if column_size == 0 {
            return Err(ClientError::Quilt(QuiltError::Malformed(
                "empty secondary sliver",
            )));
        }

        let mut column = start_column + (offset / column_size) as u16;
        let mut skip = (offset % column_size) as usize;
        let mut bytes = Vec::with_capacity(length);
        while bytes.len() < length {
            if column >= secondary {
                return Err(ClientError::Quilt(QuiltError::Malformed(
                    "read past the last quilt column",
                )));
            }
            let sliver = if column == start_column {
                Arc::clone(&first)
            } else {
                self.reader.get_secondary_sliver(column).await?
            };
            let chunk = &sliver[skip.min(sliver.len())..];
            let take = chunk.len().min(length - bytes.len());
            bytes.extend_from_slice(&chunk[..take]);
            skip = 0;
            column += 1;
        }
        Ok(bytes)
    }

    async fn read_from_blob(
        &self,
        start_column: u16,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, ClientError> {
        let blob = self.reader.get_bytes().await?;
        let (symbol_size, row_size, _) =
            grid_geometry(blob.len() as u64, self.reader.store().n_shards())?;
        Ok(read_grid_bytes(
            &blob,
            row_size,
            symbol_size,
            start_column,
            offset,
            length,
        )?)
    }
}
