//! Transport seam between the client and storage nodes.

use async_trait::async_trait;
use node_http_client::{NodeError, NodeHttpClient};
use url::Url;
use tessera_core::{
    BlobId, BlobMetadata, BlobMetadataWithId, BlobPersistence, SignedStorageConfirmation,
    SliverData, SliverType, StorageNode,
};
use tokio_util::sync::CancellationToken;

/// Storage node operations the orchestration layers depend on. Implemented
/// by the HTTP client and by in-memory nodes in tests.
#[async_trait]
pub trait StorageNodeApi: Send + Sync {
    async fn get_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<BlobMetadataWithId, NodeError>;

    async fn store_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError>;

    async fn get_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: u16,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> Result<SliverData, NodeError>;

    async fn store_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: u16,
        sliver: &SliverData,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError>;

    async fn get_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        persistence: &BlobPersistence,
        cancel: &CancellationToken,
    ) -> Result<SignedStorageConfirmation, NodeError>;
}

fn node_url(node: &StorageNode) -> Result<Url, NodeError> {
    Ok(Url::parse(&node.network_url)?)
}

#[async_trait]
impl StorageNodeApi for NodeHttpClient {
    async fn get_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<BlobMetadataWithId, NodeError> {
        NodeHttpClient::get_metadata(self, &node_url(node)?, blob_id, cancel).await
    }

    async fn store_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        NodeHttpClient::store_metadata(self, &node_url(node)?, blob_id, metadata, cancel).await
    }

    async fn get_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: u16,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> Result<SliverData, NodeError> {
        NodeHttpClient::get_sliver(self, &node_url(node)?, blob_id, pair_index, sliver_type, cancel)
            .await
    }

    async fn store_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: u16,
        sliver: &SliverData,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        NodeHttpClient::store_sliver(
            self,
            &node_url(node)?,
            blob_id,
            pair_index,
            sliver_type,
            sliver,
            cancel,
        )
        .await
    }

    async fn get_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        persistence: &BlobPersistence,
        cancel: &CancellationToken,
    ) -> Result<SignedStorageConfirmation, NodeError> {
        let url = node_url(node)?;
        match persistence {
            BlobPersistence::Permanent => {
                self.get_permanent_confirmation(&url, blob_id, cancel).await
            }
            BlobPersistence::Deletable { object_id } => {
                self.get_deletable_confirmation(&url, blob_id, object_id, cancel)
                    .await
            }
        }
    }
}
