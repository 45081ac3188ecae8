//! HTTP client for the storage node API.
//!
//! One client instance serves every node in the committee; the node's base
//! URL is passed per request. Metadata and slivers travel as canonical wire
//! bytes, confirmations as JSON.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tessera_core::{
    wire, BlobId, BlobMetadata, BlobMetadataWithId, ObjectId, SignedStorageConfirmation,
    SliverData, SliverType,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod error;

pub use error::{ApiError, NodeError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Success envelope wrapping every JSON response body.
#[derive(Deserialize)]
struct SuccessEnvelope<T> {
    success: SuccessBody<T>,
}

#[derive(Deserialize)]
struct SuccessBody<T> {
    data: T,
}

#[derive(Deserialize)]
struct ConfirmationData {
    signed: SignedStorageConfirmation,
}

#[derive(Clone)]
pub struct NodeHttpClient {
    client: Client,
    timeout: Duration,
}

impl NodeHttpClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self, NodeError> {
        let client = ClientBuilder::new()
            .build()
            .map_err(NodeError::Connection)?;
        Ok(Self {
            client,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    /// Fetch the metadata a node holds for `blob_id`.
    pub async fn get_metadata(
        &self,
        base_url: &Url,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<BlobMetadataWithId, NodeError> {
        let url = base_url.join(&format!("v1/blobs/{blob_id}/metadata"))?;
        let response = self.send(self.client.get(url), cancel).await?;
        decode_wire(response).await
    }

    /// Store the metadata of a registered blob on a node. Nodes reject this
    /// with a not-registered error until they observe the on-chain
    /// registration.
    pub async fn store_metadata(
        &self,
        base_url: &Url,
        blob_id: &BlobId,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        let url = base_url.join(&format!("v1/blobs/{blob_id}/metadata"))?;
        let body = wire::serialize(metadata).map_err(|e| NodeError::Decode(e.to_string()))?;
        self.send(
            self.client
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body),
            cancel,
        )
        .await?;
        Ok(())
    }

    /// Fetch the sliver of the given type for a sliver pair.
    pub async fn get_sliver(
        &self,
        base_url: &Url,
        blob_id: &BlobId,
        pair_index: u16,
        sliver_type: SliverType,
        cancel: &CancellationToken,
    ) -> Result<SliverData, NodeError> {
        let url = base_url.join(&format!(
            "v1/blobs/{blob_id}/slivers/{pair_index}/{}",
            sliver_type.as_str()
        ))?;
        let response = self.send(self.client.get(url), cancel).await?;
        decode_wire(response).await
    }

    /// Store one sliver of a sliver pair on the node owning its shard.
    pub async fn store_sliver(
        &self,
        base_url: &Url,
        blob_id: &BlobId,
        pair_index: u16,
        sliver_type: SliverType,
        sliver: &SliverData,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        let url = base_url.join(&format!(
            "v1/blobs/{blob_id}/slivers/{pair_index}/{}",
            sliver_type.as_str()
        ))?;
        let body = wire::serialize(sliver).map_err(|e| NodeError::Decode(e.to_string()))?;
        self.send(
            self.client
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body),
            cancel,
        )
        .await?;
        Ok(())
    }

    /// Get a signed confirmation that all of the node's shards hold their
    /// slivers of a permanent blob.
    pub async fn get_permanent_confirmation(
        &self,
        base_url: &Url,
        blob_id: &BlobId,
        cancel: &CancellationToken,
    ) -> Result<SignedStorageConfirmation, NodeError> {
        let url = base_url.join(&format!("v1/blobs/{blob_id}/confirmation/permanent"))?;
        let response = self.send(self.client.get(url), cancel).await?;
        let data: ConfirmationData = decode_json(response).await?;
        Ok(data.signed)
    }

    /// As [`get_permanent_confirmation`](Self::get_permanent_confirmation),
    /// for a deletable blob tied to its registration object.
    pub async fn get_deletable_confirmation(
        &self,
        base_url: &Url,
        blob_id: &BlobId,
        object_id: &ObjectId,
        cancel: &CancellationToken,
    ) -> Result<SignedStorageConfirmation, NodeError> {
        let url =
            base_url.join(&format!("v1/blobs/{blob_id}/confirmation/deletable/{object_id}"))?;
        let response = self.send(self.client.get(url), cancel).await?;
        let data: ConfirmationData = decode_json(response).await?;
        Ok(data.signed)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response, NodeError> {
        if cancel.is_cancelled() {
            return Err(NodeError::Aborted);
        }

        let request = request.timeout(self.timeout);
        let response = match cancel.run_until_cancelled(request.send()).await {
            None => return Err(NodeError::Aborted),
            Some(Ok(response)) => response,
            Some(Err(error)) if error.is_timeout() => return Err(NodeError::Timeout),
            Some(Err(error)) => return Err(NodeError::Connection(error)),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let error = NodeError::from_response(status.as_u16(), text);
            debug!(%status, %error, "storage node returned an error");
            return Err(error);
        }
        Ok(response)
    }
}

async fn decode_wire<T: DeserializeOwned>(response: Response) -> Result<T, NodeError> {
    let bytes = response.bytes().await.map_err(NodeError::Connection)?;
    wire::deserialize(&bytes).map_err(|e| NodeError::Decode(e.to_string()))
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, NodeError> {
    let envelope: SuccessEnvelope<T> = response
        .json()
        .await
        .map_err(|e| NodeError::Decode(e.to_string()))?;
    Ok(envelope.success.data)
}
