use std::sync::Arc;

use node_http_client::NodeError;
use tessera_core::{committee::CommitteeError, quilt::QuiltError, BlobId, ObjectId};

use crate::{chain::ChainError, encode::CodecError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Quilt(#[from] QuiltError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Committee(#[from] CommitteeError),
    #[error("wire codec error: {0}")]
    Wire(#[from] tessera_core::wire::Error),
    #[error("only {confirmed_weight} of the required {required} shard confirmations")]
    NotEnoughConfirmations { confirmed_weight: u16, required: u16 },
    #[error("blob {0} is not certified by the committee")]
    BlobNotCertified(BlobId),
    #[error("blob {0} is blocked by a quorum of nodes")]
    BlobBlocked(BlobId),
    #[error("no committee node returned metadata for blob {0}")]
    NoMetadataReceived(BlobId),
    #[error("not enough slivers could be retrieved to reconstruct blob {0}")]
    NotEnoughSlivers(BlobId),
    #[error("decoded bytes do not certify back to blob id {0}")]
    InconsistentBlob(BlobId),
    #[error("no patch in the quilt matches {0}")]
    PatchNotFound(String),
    #[error("object not found on chain: {0}")]
    ObjectNotFound(ObjectId),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Failure observed through a deduplicated in-flight operation; the
    /// original error is shared by every waiter.
    #[error(transparent)]
    Shared(Arc<ClientError>),
}

impl From<Arc<ClientError>> for ClientError {
    fn from(error: Arc<ClientError>) -> Self {
        Self::Shared(error)
    }
}
