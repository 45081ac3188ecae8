//! The write orchestrator: encode, register, distribute, confirm, certify.

use std::{
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc,
    },
    time::Duration,
};

use node_http_client::NodeError;
use tessera_core::{
    blob::to_shard_index,
    params::{encoded_blob_length, is_above_validity, is_quorum, max_faulty_shards},
    signers_to_bitmap, wire, BlobId, BlobPersistence, Committee, ConfirmationCertificate,
    ObjectId, SignedStorageConfirmation, SliverType, StorageConfirmation, StorageNode,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    chain::{BlobCertification, BlobRegistration, ChainAdapter},
    client::TesseraClient,
    encode::EncodedBlob,
    error::ClientError,
    pool::TaskPool,
    transport::StorageNodeApi,
};

/// Phase of a blob write, for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Encoding,
    Registering,
    Distributing,
    Confirming,
    Certifying,
    Certified,
}

impl WritePhase {
    #[must_use]
    pub const fn display(&self) -> &'static str {
        match self {
            Self::Encoding => "encoding blob",
            Self::Registering => "registering blob id on chain",
            Self::Distributing => "distributing slivers to storage nodes",
            Self::Confirming => "collecting storage confirmations",
            Self::Certifying => "submitting the certificate",
            Self::Certified => "blob certified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBlobOptions {
    pub epochs: u32,
    pub deletable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub blob_id: BlobId,
    pub object_id: ObjectId,
    pub certified_epoch: u32,
}

impl<S, C> TesseraClient<S, C>
where
    S: StorageNodeApi + 'static,
    C: ChainAdapter + 'static,
{
    /// Write a blob end to end. Returns only once the chain accepted the
    /// quorum certificate; anything short of that is a failure.
    pub async fn write_blob(
        &self,
        blob: &[u8],
        options: &WriteBlobOptions,
    ) -> Result<WriteResult, ClientError> {
        let n_shards = self.committee.n_shards;

        info!(phase = WritePhase::Encoding.display(), size = blob.len());
        let encoded = Arc::new(self.codec.encode(n_shards, blob)?);
        let blob_id = encoded.blob_id;

        info!(phase = WritePhase::Registering.display(), %blob_id);
        let registered = self
            .chain
            .register_blob(BlobRegistration {
                blob_id,
                encoding_type: encoded.metadata.encoding_type(),
                unencoded_length: blob.len() as u64,
                encoded_length: encoded_blob_length(
                    blob.len() as u64,
                    n_shards,
                    encoded.metadata.encoding_type(),
                ),
                epochs: options.epochs,
                deletable: options.deletable,
            })
            .await?;

        let persistence = if options.deletable {
            BlobPersistence::Deletable {
                object_id: registered.object_id,
            }
        } else {
            BlobPersistence::Permanent
        };

        info!(phase = WritePhase::Distributing.display(), %blob_id);
        let confirmations = self
            .write_encoded_to_nodes(Arc::clone(&encoded), persistence)
            .await?;

        info!(phase = WritePhase::Confirming.display(), %blob_id);
        let certificate = certificate_from_confirmations(
            &self.committee,
            self.committee.epoch,
            &blob_id,
            persistence,
            &confirmations,
        )?;
        let signers_bitmap = signers_to_bitmap(
            &certificate.signers,
            self.committee.nodes.len() as u16,
        );

        info!(phase = WritePhase::Certifying.display(), %blob_id);
        self.chain
            .certify_blob(BlobCertification {
                blob_id,
                object_id: registered.object_id,
                certificate,
                signers_bitmap,
            })
            .await?;

        info!(phase = WritePhase::Certified.display(), %blob_id);
        Ok(WriteResult {
            blob_id,
            object_id: registered.object_id,
            certified_epoch: self.committee.epoch,
        })
    }

    /// Distribute metadata and slivers to every committee node and collect
    /// signed confirmations, committee-ordered. A node's failure never stops
    /// its siblings; once the failed shard-weight passes the validity
    /// threshold the remaining requests are cancelled and the write fails.
    pub(crate) async fn write_encoded_to_nodes(
        &self,
        encoded: Arc<EncodedBlob>,
        persistence: BlobPersistence,
    ) -> Result<Vec<Option<SignedStorageConfirmation>>, ClientError> {
        let n_shards = self.committee.n_shards;

        let mut pairs_by_node: Vec<Vec<u16>> = vec![Vec::new(); self.committee.nodes.len()];
        for pair_index in 0..n_shards {
            let shard = to_shard_index(pair_index, &encoded.blob_id, n_shards);
            if let Some(node_index) = self.committee.node_for_shard(shard) {
                pairs_by_node[node_index].push(pair_index);
            }
        }

        let cancel = CancellationToken::new();
        let failed_weight = Arc::new(AtomicU16::new(0));
        let mut pool = TaskPool::new(self.settings.max_concurrent_requests);
        for (node_index, pair_indices) in pairs_by_node.into_iter().enumerate() {
            let node = self.committee.nodes[node_index].clone();
            let node_api = Arc::clone(&self.node_api);
            let encoded = Arc::clone(&encoded);
            let cancel = cancel.clone();
            let failed_weight = Arc::clone(&failed_weight);
            let attempts = self.settings.metadata_write_attempts;
            let retry_delay = self.settings.metadata_retry_delay();

            pool.spawn(async move {
                let weight = node.weight();
                match write_to_node(
                    node_api,
                    &node,
                    &encoded,
                    persistence,
                    &pair_indices,
                    attempts,
                    retry_delay,
                    &cancel,
                )
                .await
                {
                    Ok(confirmation) => Some(confirmation),
                    Err(error) => {
                        warn!(node = %node.node_id, %error, "storage node write failed");
                        let failed = failed_weight.fetch_add(weight, Ordering::SeqCst) + weight;
                        if is_above_validity(failed, n_shards) {
                            cancel.cancel();
                        }
                        None
                    }
                }
            });
        }

        let confirmations = pool.join_all().await?;
        let failed = failed_weight.load(Ordering::SeqCst);
        if is_above_validity(failed, n_shards) {
            return Err(ClientError::NotEnoughConfirmations {
                confirmed_weight: n_shards.saturating_sub(failed),
                required: 2 * max_faulty_shards(n_shards) + 1,
            });
        }
        Ok(confirmations)
    }
}

#[allow(clippy::too_many_arguments)]
async fn write_to_node<S: StorageNodeApi + ?Sized>(
    node_api: Arc<S>,
    node: &StorageNode,
    encoded: &EncodedBlob,
    persistence: BlobPersistence,
    pair_indices: &[u16],
    metadata_attempts: usize,
    retry_delay: Duration,
    cancel: &CancellationToken,
) -> Result<SignedStorageConfirmation, NodeError> {
    // nodes reject metadata until they have seen the registration event
    let mut attempt = 0;
    loop {
        attempt += 1;
        match node_api
            .store_metadata(node, &encoded.blob_id, &encoded.metadata, cancel)
            .await
        {
            Ok(()) => break,
            Err(NodeError::NotRegistered(_)) if attempt < metadata_attempts => {
                tokio::time::sleep(retry_delay).await;
            }
            Err(error) => return Err(error),
        }
    }

    for &pair_index in pair_indices {
        let pair = &encoded.sliver_pairs[usize::from(pair_index)];
        node_api
            .store_sliver(
                node,
                &encoded.blob_id,
                pair_index,
                &pair.primary,
                SliverType::Primary,
                cancel,
            )
            .await?;
        node_api
            .store_sliver(
                node,
                &encoded.blob_id,
                pair_index,
                &pair.secondary,
                SliverType::Secondary,
                cancel,
            )
            .await?;
    }

    node_api
        .get_confirmation(node, &encoded.blob_id, &persistence, cancel)
        .await
}

/// Assemble a quorum certificate from per-node confirmations.
///
/// Every kept signature attests to exactly the expected message bytes;
/// mismatched confirmations are dropped with a warning. Fails unless the
/// kept shard-weight is a quorum.
pub fn certificate_from_confirmations(
    committee: &Committee,
    epoch: u32,
    blob_id: &BlobId,
    persistence: BlobPersistence,
    confirmations: &[Option<SignedStorageConfirmation>],
) -> Result<ConfirmationCertificate, ClientError> {
    let n_shards = committee.n_shards;
    let expected = wire::serialize(&StorageConfirmation::new(epoch, *blob_id, persistence))?;

    let mut signers = Vec::new();
    let mut signatures = Vec::new();
    let mut confirmed_weight = 0u16;
    for (node_index, confirmation) in confirmations.iter().enumerate() {
        let Some(confirmation) = confirmation else {
            continue;
        };
        if confirmation.serialized_message != expected {
            warn!(
                node = %committee.nodes[node_index].node_id,
                "confirmation does not attest to the expected message; dropping it"
            );
            continue;
        }
        confirmed_weight += committee.nodes[node_index].weight();
        signers.push(node_index as u16);
        signatures.push(confirmation.signature.clone());
    }

    let required = 2 * max_faulty_shards(n_shards) + 1;
    if !is_quorum(confirmed_weight, n_shards) {
        return Err(ClientError::NotEnoughConfirmations {
            confirmed_weight,
            required,
        });
    }

    Ok(ConfirmationCertificate {
        signers,
        serialized_message: expected,
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use tessera_core::{Committee, NodeId, StorageNode};

    use super::*;

    fn committee() -> Committee {
        Committee {
            epoch: 4,
            n_shards: 7,
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

    fn confirmation(message: &[u8], seed: u8) -> SignedStorageConfirmation {
        SignedStorageConfirmation {
            serialized_message: message.to_vec(),
            signature: vec![seed; 48],
        }
    }

    #[test]
    fn certificate_requires_quorum_weight() {
        let committee = committee();
        let blob_id = BlobId([9; 32]);
        let message =
            wire::serialize(&StorageConfirmation::new(4, blob_id, BlobPersistence::Permanent))
                .unwrap();

        // f = 2 for 7 shards, quorum needs weight > 4
        let only_first = vec![Some(confirmation(&message, 1)), None, None];
        let error = certificate_from_confirmations(
            &committee,
            4,
            &blob_id,
            BlobPersistence::Permanent,
            &only_first,
        )
        .unwrap_err();
        assert!(matches!(
            error,
            ClientError::NotEnoughConfirmations {
                confirmed_weight: 3,
                required: 5,
            }
        ));

        let two_nodes = vec![
            Some(confirmation(&message, 1)),
            Some(confirmation(&message, 2)),
            None,
        ];
        let certificate = certificate_from_confirmations(
            &committee,
            4,
            &blob_id,
            BlobPersistence::Permanent,
            &two_nodes,
        )
        .unwrap();
        assert_eq!(certificate.signers, vec![0, 1]);
        assert_eq!(certificate.serialized_message, message);
        assert_eq!(certificate.signatures.len(), 2);
    }

    #[test]
    fn mismatched_confirmations_are_dropped() {
        let committee = committee();
        let blob_id = BlobId([9; 32]);
        let message =
            wire::serialize(&StorageConfirmation::new(4, blob_id, BlobPersistence::Permanent))
                .unwrap();
        // node 1 attests to a different epoch's message
        let stale =
            wire::serialize(&StorageConfirmation::new(3, blob_id, BlobPersistence::Permanent))
                .unwrap();

        let confirmations = vec![
            Some(confirmation(&message, 1)),
            Some(confirmation(&stale, 2)),
            Some(confirmation(&message, 3)),
        ];
        let certificate = certificate_from_confirmations(
            &committee,
            4,
            &blob_id,
            BlobPersistence::Permanent,
            &confirmations,
        )
        .unwrap();
        assert_eq!(certificate.signers, vec![0, 2]);

        let bitmap = signers_to_bitmap(&certificate.signers, 3);
        assert_eq!(bitmap, vec![0b0000_0101]);
    }
}
