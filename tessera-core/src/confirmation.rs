//! Storage confirmations: the signed messages nodes return after storing a
//! blob's slivers, and the certificate a quorum of them forms.

use serde::{Deserialize, Serialize};

use crate::blob::{BlobId, ObjectId};

/// Domain separator of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntentType {
    ProofOfPossession = 0,
    BlobCertification = 1,
}

/// Intent header preceding every signed protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: IntentType,
    pub version: u8,
    pub app_id: u8,
}

impl Intent {
    #[must_use]
    pub const fn storage_certification() -> Self {
        Self {
            intent_type: IntentType::BlobCertification,
            version: 0,
            app_id: 3,
        }
    }
}

/// A message a storage node signs: intent, the epoch the signature is valid
/// for, and the typed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage<T> {
    pub intent: Intent,
    pub epoch: u32,
    pub body: T,
}

/// How a blob is held on chain. Deletable blobs are tied to the owning
/// registration object, so confirmations must name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobPersistence {
    Permanent,
    Deletable { object_id: ObjectId },
}

/// Body of a storage confirmation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationBody {
    pub blob_id: BlobId,
    pub persistence: BlobPersistence,
}

/// The full message a node attests to when confirming storage of a blob.
pub type StorageConfirmation = ProtocolMessage<ConfirmationBody>;

impl StorageConfirmation {
    #[must_use]
    pub const fn new(epoch: u32, blob_id: BlobId, persistence: BlobPersistence) -> Self {
        Self {
            intent: Intent::storage_certification(),
            epoch,
            body: ConfirmationBody {
                blob_id,
                persistence,
            },
        }
    }
}

/// A confirmation as returned by a storage node: the serialized message it
/// signed plus the signature bytes. The message is kept serialized so the
/// signature can be checked against exactly what the node signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedStorageConfirmation {
    pub serialized_message: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Quorum certificate assembled from matching signed confirmations. The
/// signer list is sorted ascending by committee index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationCertificate {
    pub signers: Vec<u16>,
    pub serialized_message: Vec<u8>,
    pub signatures: Vec<Vec<u8>>,
}

/// Bitmap of signer committee indices, little-endian per byte, as submitted
/// with the certification transaction.
#[must_use]
pub fn signers_to_bitmap(signers: &[u16], committee_size: u16) -> Vec<u8> {
    let mut bitmap = vec![0u8; usize::from(committee_size).div_ceil(8)];
    for &signer in signers {
        bitmap[usize::from(signer / 8)] |= 1 << (signer % 8);
    }
    bitmap
}
