//! The read path: metadata lookup and blob reconstruction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{stream::FuturesUnordered, StreamExt};
use rand::seq::SliceRandom;
use tessera_core::{
    blob::{pair_index_for_secondary, to_shard_index},
    params::{is_quorum, source_symbols, SourceSymbols},
    BlobId, BlobMetadataWithId, SliverData, SliverType,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    chain::ChainAdapter, client::TesseraClient, error::ClientError, transport::StorageNodeApi,
};

/// Blob retrieval operations the readers depend on. Implemented by the
/// client and by in-memory stores in tests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn n_shards(&self) -> u16;

    async fn read_blob(&self, blob_id: &BlobId) -> Result<Vec<u8>, ClientError>;

    async fn get_metadata(&self, blob_id: &BlobId) -> Result<BlobMetadataWithId, ClientError>;

    async fn get_secondary_sliver(
        &self,
        blob_id: &BlobId,
        index: u16,
    ) -> Result<SliverData, ClientError>;
}

impl<S, C> TesseraClient<S, C>
where
    S: StorageNodeApi + 'static,
    C: ChainAdapter + 'static,
{
    /// Fetch the blob's metadata from the committee, trying nodes in random
    /// order. Individual node failures are tolerated while their shard
    /// weight is tracked: a quorum of not-found answers means the blob was
    /// never certified, a quorum of legal blocks means it is blocked.
    pub async fn get_blob_metadata(
        &self,
        blob_id: &BlobId,
    ) -> Result<BlobMetadataWithId, ClientError> {
        let n_shards = self.committee.n_shards;
        let cancel = CancellationToken::new();

        let mut order: Vec<usize> = (0..self.committee.nodes.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        let mut not_found_weight = 0u16;
        let mut blocked_weight = 0u16;
        for node_index in order {
            let node = &self.committee.nodes[node_index];
            match self.node_api.get_metadata(node, blob_id, &cancel).await {
                Ok(metadata) if metadata.blob_id == *blob_id => return Ok(metadata),
                Ok(_) => {
                    warn!(node = %node.node_id, "node returned metadata for a different blob");
                }
                Err(error) => {
                    if error.is_not_found() {
                        not_found_weight += node.weight();
                    } else if error.is_blocked() {
                        blocked_weight += node.weight();
                    }
                    debug!(node = %node.node_id, %error, "metadata fetch failed");

                    if is_quorum(not_found_weight, n_shards) {
                        return Err(ClientError::BlobNotCertified(*blob_id));
                    }
                    if is_quorum(blocked_weight, n_shards) {
                        return Err(ClientError::BlobBlocked(*blob_id));
                    }
                }
            }
        }
        Err(ClientError::NoMetadataReceived(*blob_id))
    }

    /// Read a whole blob: fetch its metadata, retrieve the systematic
    /// slivers through a bounded request window, decode, and verify the
    /// decoded bytes against the blob id.
    pub async fn read_blob(&self, blob_id: &BlobId) -> Result<Vec<u8>, ClientError> {
        let metadata = self.get_blob_metadata(blob_id).await?;
        let unencoded_length = metadata.metadata.unencoded_length();
        let n_shards = self.committee.n_shards;
        let SourceSymbols { primary, .. } = source_symbols(n_shards);
        let cancel = CancellationToken::new();

        let mut remaining = 0..primary;
        let mut pending = FuturesUnordered::new();
        let mut slivers = BTreeMap::new();
        let window = self.settings.max_concurrent_requests.max(1);
        loop {
            while pending.len() < window {
                let Some(index) = remaining.next() else { break };
                pending.push(self.fetch_primary_sliver(*blob_id, index, cancel.clone()));
            }
            let Some((index, result)) = pending.next().await else {
                break;
            };
            match result {
                Ok(sliver) => {
                    slivers.insert(index, sliver);
                }
                Err(error) => {
                    warn!(sliver = index, %error, "sliver fetch failed");
                    cancel.cancel();
                    return Err(ClientError::NotEnoughSlivers(*blob_id));
                }
            }
        }

        let blob = self.codec.decode(n_shards, unencoded_length, &slivers)?;
        let (computed_id, _) = self.codec.compute_metadata(n_shards, &blob)?;
        if computed_id != *blob_id {
            return Err(ClientError::InconsistentBlob(*blob_id));
        }
        Ok(blob)
    }

    /// Fetch a single secondary sliver, routed through the pair-index
    /// reversal and the blob's shard rotation.
    pub async fn get_secondary_sliver(
        &self,
        blob_id: &BlobId,
        index: u16,
    ) -> Result<SliverData, ClientError> {
        let n_shards = self.committee.n_shards;
        let pair_index = pair_index_for_secondary(index, n_shards);
        let shard = to_shard_index(pair_index, blob_id, n_shards);
        let node_index = self
            .committee
            .node_for_shard(shard)
            .ok_or(ClientError::NotEnoughSlivers(*blob_id))?;
        Ok(self
            .node_api
            .get_sliver(
                &self.committee.nodes[node_index],
                blob_id,
                pair_index,
                SliverType::Secondary,
                &CancellationToken::new(),
            )
            .await?)
    }

    async fn fetch_primary_sliver(
        &self,
        blob_id: BlobId,
        index: u16,
        cancel: CancellationToken,
    ) -> (u16, Result<SliverData, ClientError>) {
        let n_shards = self.committee.n_shards;
        let shard = to_shard_index(index, &blob_id, n_shards);
        let result = match self.committee.node_for_shard(shard) {
            Some(node_index) => self
                .node_api
                .get_sliver(
                    &self.committee.nodes[node_index],
                    &blob_id,
                    index,
                    SliverType::Primary,
                    &cancel,
                )
                .await
                .map_err(ClientError::from),
            None => Err(ClientError::NotEnoughSlivers(blob_id)),
        };
        (index, result)
    }
}

#[async_trait]
impl<S, C> BlobStore for TesseraClient<S, C>
where
    S: StorageNodeApi + 'static,
    C: ChainAdapter + 'static,
{
    fn n_shards(&self) -> u16 {
        self.committee.n_shards
    }

    async fn read_blob(&self, blob_id: &BlobId) -> Result<Vec<u8>, ClientError> {
        TesseraClient::read_blob(self, blob_id).await
    }

    async fn get_metadata(&self, blob_id: &BlobId) -> Result<BlobMetadataWithId, ClientError> {
        self.get_blob_metadata(blob_id).await
    }

    async fn get_secondary_sliver(
        &self,
        blob_id: &BlobId,
        index: u16,
    ) -> Result<SliverData, ClientError> {
        TesseraClient::get_secondary_sliver(self, blob_id, index).await
    }
}
