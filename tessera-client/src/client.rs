//! The client facade: committee, transport, chain and codec wired together.

use std::sync::Arc;

use node_http_client::NodeHttpClient;
use tessera_core::{wire, Committee, ObjectId};

use crate::{
    chain::{ChainAdapter, SystemState},
    config::Settings,
    encode::BlobCodec,
    error::ClientError,
    loader::ObjectLoader,
    transport::StorageNodeApi,
};

pub struct TesseraClient<S, C> {
    pub(crate) committee: Committee,
    pub(crate) node_api: Arc<S>,
    pub(crate) chain: Arc<C>,
    pub(crate) codec: Arc<dyn BlobCodec>,
    pub(crate) settings: Settings,
}

impl<S, C> TesseraClient<S, C>
where
    S: StorageNodeApi + 'static,
    C: ChainAdapter + 'static,
{
    pub fn new(
        committee: Committee,
        node_api: Arc<S>,
        chain: Arc<C>,
        codec: Arc<dyn BlobCodec>,
        settings: Settings,
    ) -> Result<Self, ClientError> {
        committee.validate()?;
        Ok(Self {
            committee,
            node_api,
            chain,
            codec,
            settings,
        })
    }

    /// Build a client by resolving the system state object and the current
    /// epoch's committee dynamic field through the object loader.
    pub async fn from_system_state(
        state_object: ObjectId,
        node_api: Arc<S>,
        chain: Arc<C>,
        codec: Arc<dyn BlobCodec>,
        settings: Settings,
    ) -> Result<Self, ClientError> {
        let loader = ObjectLoader::new(Arc::clone(&chain), settings.max_object_batch_size);
        let state: SystemState = loader.load_as(state_object).await?;
        let committee_bytes = loader
            .load_field(state.committee_parent, &state.epoch)
            .await?;
        let committee: Committee = wire::deserialize(&committee_bytes)?;
        Self::new(committee, node_api, chain, codec, settings)
    }

    #[must_use]
    pub fn committee(&self) -> &Committee {
        &self.committee
    }

    #[must_use]
    pub fn n_shards(&self) -> u16 {
        self.committee.n_shards
    }

    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.committee.epoch
    }
}

impl<C> TesseraClient<NodeHttpClient, C>
where
    C: ChainAdapter + 'static,
{
    /// Build a client over the HTTP transport, with the per-request timeout
    /// taken from the settings.
    pub fn over_http(
        committee: Committee,
        chain: Arc<C>,
        codec: Arc<dyn BlobCodec>,
        settings: Settings,
    ) -> Result<Self, ClientError> {
        let node_api = Arc::new(NodeHttpClient::new(Some(settings.request_timeout()))?);
        Self::new(committee, node_api, chain, codec, settings)
    }
}
