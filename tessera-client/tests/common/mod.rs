#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use node_http_client::NodeError;
use tessera_client::{
    BlobCertification, BlobRegistration, ChainAdapter, ChainError, GridCodec, RegisteredBlob,
    Settings, StorageNodeApi, TesseraClient,
};
use tessera_core::{
    wire, BlobId, BlobMetadata, BlobMetadataWithId, BlobPersistence, Committee, NodeId, ObjectId,
    SignedStorageConfirmation, SliverData, SliverType, StorageConfirmation, StorageNode,
};
use tokio_util::sync::CancellationToken;

pub const N_SHARDS: u16 = 7;
pub const EPOCH: u32 = 4;

pub fn committee() -> Committee {
    Committee {
        epoch: EPOCH,
        n_shards: N_SHARDS,
        nodes: vec![
            StorageNode {
                node_id: NodeId([1; 32]),
                network_url: "http://node-a.example".into(),
                shard_indices: vec![0, 1, 2],
            },
            StorageNode {
                node_id: NodeId([2; 32]),
                network_url: "http://node-b.example".into(),
                shard_indices: vec![3, 4],
            },
            StorageNode {
                node_id: NodeId([3; 32]),
                network_url: "http://node-c.example".into(),
                shard_indices: vec![5, 6],
            },
        ],
    }
}

#[derive(Default)]
struct ClusterState {
    metadata: HashMap<BlobId, BlobMetadata>,
    slivers: HashMap<(BlobId, u16, SliverType), SliverData>,
}

/// In-memory storage committee behind the transport seam, with failure
/// injection knobs.
#[derive(Default)]
pub struct TestCluster {
    epoch: u32,
    state: Mutex<ClusterState>,
    /// Nodes answering every request with a server error.
    pub failing_nodes: Mutex<HashSet<NodeId>>,
    /// Remaining number of metadata writes to reject as not-registered.
    pub metadata_rejections: AtomicUsize,
    /// Answer every metadata read with 451.
    pub block_metadata: AtomicBool,
    /// Fail every primary sliver read.
    pub fail_primary_reads: AtomicBool,
    /// Fail every secondary sliver read.
    pub fail_secondary_reads: AtomicBool,
    pub metadata_stores: Mutex<HashMap<NodeId, usize>>,
    /// Total sliver read requests, failed ones included.
    pub sliver_reads: AtomicUsize,
}

impl TestCluster {
    pub fn new(epoch: u32) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    pub fn fail_node(&self, node_id: NodeId) {
        self.failing_nodes.lock().unwrap().insert(node_id);
    }

    fn is_failing(&self, node: &StorageNode) -> bool {
        self.failing_nodes.lock().unwrap().contains(&node.node_id)
    }

    fn server_error() -> NodeError {
        NodeError::from_response(500, "node down".to_owned())
    }

    fn not_registered() -> NodeError {
        NodeError::from_response(
            400,
            r#"{"error":{"message":"blob not registered","details":[{"reason":"NOT_REGISTERED"}]}}"#
                .to_owned(),
        )
    }
}

#[async_trait]
impl StorageNodeApi for TestCluster {
    async fn get_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        _cancel: &CancellationToken,
    ) -> Result<BlobMetadataWithId, NodeError> {
        if self.block_metadata.load(Ordering::SeqCst) {
            return Err(NodeError::from_response(451, String::new()));
        }
        if self.is_failing(node) {
            return Err(Self::server_error());
        }
        let state = self.state.lock().unwrap();
        state
            .metadata
            .get(blob_id)
            .cloned()
            .map(|metadata| BlobMetadataWithId {
                blob_id: *blob_id,
                metadata,
            })
            .ok_or_else(|| NodeError::from_response(404, String::new()))
    }

    async fn store_metadata(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        metadata: &BlobMetadata,
        _cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        if self.is_failing(node) {
            return Err(Self::server_error());
        }
        let rejected = self
            .metadata_rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if rejected {
            return Err(Self::not_registered());
        }
        self.state
            .lock()
            .unwrap()
            .metadata
            .insert(*blob_id, metadata.clone());
        *self
            .metadata_stores
            .lock()
            .unwrap()
            .entry(node.node_id)
            .or_default() += 1;
        Ok(())
    }

    async fn get_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: u16,
        sliver_type: SliverType,
        _cancel: &CancellationToken,
    ) -> Result<SliverData, NodeError> {
        self.sliver_reads.fetch_add(1, Ordering::SeqCst);
        let failing = match sliver_type {
            SliverType::Primary => self.fail_primary_reads.load(Ordering::SeqCst),
            SliverType::Secondary => self.fail_secondary_reads.load(Ordering::SeqCst),
        };
        if failing || self.is_failing(node) {
            return Err(Self::server_error());
        }
        let state = self.state.lock().unwrap();
        state
            .slivers
            .get(&(*blob_id, pair_index, sliver_type))
            .cloned()
            .ok_or_else(|| NodeError::from_response(404, String::new()))
    }

    async fn store_sliver(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        pair_index: u16,
        sliver: &SliverData,
        sliver_type: SliverType,
        _cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        if self.is_failing(node) {
            return Err(Self::server_error());
        }
        self.state
            .lock()
            .unwrap()
            .slivers
            .insert((*blob_id, pair_index, sliver_type), sliver.clone());
        Ok(())
    }

    async fn get_confirmation(
        &self,
        node: &StorageNode,
        blob_id: &BlobId,
        persistence: &BlobPersistence,
        _cancel: &CancellationToken,
    ) -> Result<SignedStorageConfirmation, NodeError> {
        if self.is_failing(node) {
            return Err(Self::server_error());
        }
        let message = StorageConfirmation::new(self.epoch, *blob_id, *persistence);
        Ok(SignedStorageConfirmation {
            serialized_message: wire::serialize(&message)
                .map_err(|e| NodeError::Decode(e.to_string()))?,
            signature: node.node_id.0[..8].to_vec(),
        })
    }
}

#[derive(Default)]
pub struct MockChain {
    pub objects: Mutex<HashMap<ObjectId, Vec<u8>>>,
    pub registrations: Mutex<Vec<BlobRegistration>>,
    pub certifications: Mutex<Vec<BlobCertification>>,
    pub reject_certification: AtomicBool,
    next_object: AtomicUsize,
}

#[async_trait]
impl ChainAdapter for MockChain {
    async fn get_objects(&self, ids: &[ObjectId]) -> Result<Vec<Option<Vec<u8>>>, ChainError> {
        let objects = self.objects.lock().unwrap();
        Ok(ids.iter().map(|id| objects.get(id).cloned()).collect())
    }

    async fn register_blob(
        &self,
        registration: BlobRegistration,
    ) -> Result<RegisteredBlob, ChainError> {
        let counter = self.next_object.fetch_add(1, Ordering::SeqCst) as u64;
        let mut object_id = [0u8; 32];
        object_id[..8].copy_from_slice(&counter.to_le_bytes());
        let registered = RegisteredBlob {
            object_id: ObjectId(object_id),
            blob_id: registration.blob_id,
            registered_epoch: EPOCH,
        };
        self.registrations.lock().unwrap().push(registration);
        Ok(registered)
    }

    async fn certify_blob(&self, certification: BlobCertification) -> Result<(), ChainError> {
        if self.reject_certification.load(Ordering::SeqCst) {
            return Err(ChainError::Rejected(
                "certificate does not carry a quorum of valid signatures".to_owned(),
            ));
        }
        self.certifications.lock().unwrap().push(certification);
        Ok(())
    }
}

pub fn test_client(
    cluster: Arc<TestCluster>,
    chain: Arc<MockChain>,
) -> TesseraClient<TestCluster, MockChain> {
    let settings = Settings {
        metadata_retry_delay_ms: 1,
        ..Settings::default()
    };
    TesseraClient::new(committee(), cluster, chain, Arc::new(GridCodec), settings)
        .expect("test committee is valid")
}
