//! The chain boundary: registration and certification of blobs.
//!
//! Everything on-chain is reached through [`ChainAdapter`], so the write
//! and read paths can be exercised against an in-memory chain in tests and
//! bound to a real RPC implementation elsewhere. The chain stays
//! authoritative for quorum verification; the client only pre-validates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::{BlobId, ConfirmationCertificate, EncodingType, ObjectId};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The transaction was rejected; the chain's reason is surfaced
    /// verbatim.
    #[error("transaction rejected by the chain: {0}")]
    Rejected(String),
    #[error("chain rpc error: {0}")]
    Rpc(String),
}

/// Registration request for a new blob id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRegistration {
    pub blob_id: BlobId,
    pub encoding_type: EncodingType,
    pub unencoded_length: u64,
    /// Encoded size used for storage accounting.
    pub encoded_length: u64,
    pub epochs: u32,
    pub deletable: bool,
}

/// The on-chain object created by a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredBlob {
    pub object_id: ObjectId,
    pub blob_id: BlobId,
    pub registered_epoch: u32,
}

/// Certification request: the quorum certificate plus the signer bitmap the
/// chain verifies it against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobCertification {
    pub blob_id: BlobId,
    pub object_id: ObjectId,
    pub certificate: ConfirmationCertificate,
    pub signers_bitmap: Vec<u8>,
}

/// Top-level system state object, resolved through the object loader. The
/// per-epoch committees live in dynamic fields of `committee_parent`, keyed
/// by epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub epoch: u32,
    pub n_shards: u16,
    pub committee_parent: ObjectId,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Fetch raw object contents by id; `None` entries are unknown ids.
    async fn get_objects(&self, ids: &[ObjectId]) -> Result<Vec<Option<Vec<u8>>>, ChainError>;

    async fn register_blob(
        &self,
        registration: BlobRegistration,
    ) -> Result<RegisteredBlob, ChainError>;

    async fn certify_blob(&self, certification: BlobCertification) -> Result<(), ChainError>;
}
