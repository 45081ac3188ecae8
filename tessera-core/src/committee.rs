//! The epoch's assignment of shards to storage nodes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Stable identity of a storage node across epochs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&const_hex::encode(self.0))
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// One committee member and the shards it owns for the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    pub node_id: NodeId,
    pub network_url: String,
    pub shard_indices: Vec<u16>,
}

impl StorageNode {
    /// Shard-weight of this node's confirmations: one unit per owned shard.
    #[must_use]
    pub fn weight(&self) -> u16 {
        self.shard_indices.len() as u16
    }
}

/// The storage committee for one epoch.
///
/// Routes sliver indices to the responsible node and weights confirmations
/// by owned shard count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    pub epoch: u32,
    pub n_shards: u16,
    pub nodes: Vec<StorageNode>,
}

impl Committee {
    /// Index into `nodes` of the member owning `shard_index`, if any node
    /// owns it.
    #[must_use]
    pub fn node_for_shard(&self, shard_index: u16) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.shard_indices.contains(&shard_index))
    }

    /// Shard indices grouped per node id; a node appearing twice has its
    /// shard lists merged.
    #[must_use]
    pub fn shards_by_node_id(&self) -> HashMap<NodeId, Vec<u16>> {
        let mut by_node: HashMap<NodeId, Vec<u16>> = HashMap::new();
        for node in &self.nodes {
            by_node
                .entry(node.node_id)
                .or_default()
                .extend(node.shard_indices.iter().copied());
        }
        by_node
    }

    /// Every shard index must be owned by exactly one node and the owned
    /// total must equal `n_shards`.
    pub fn validate(&self) -> Result<(), CommitteeError> {
        let mut seen = vec![false; usize::from(self.n_shards)];
        for node in &self.nodes {
            for &shard in &node.shard_indices {
                let slot = seen
                    .get_mut(usize::from(shard))
                    .ok_or(CommitteeError::ShardOutOfRange(shard))?;
                if *slot {
                    return Err(CommitteeError::DuplicateShard(shard));
                }
                *slot = true;
            }
        }
        if seen.iter().all(|owned| *owned) {
            Ok(())
        } else {
            Err(CommitteeError::UnassignedShards)
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommitteeError {
    #[error("shard index {0} is outside the committee's shard range")]
    ShardOutOfRange(u16),
    #[error("shard index {0} is assigned to more than one node")]
    DuplicateShard(u16),
    #[error("not every shard index is assigned to a node")]
    UnassignedShards,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee() -> Committee {
        Committee {
            epoch: 3,
            n_shards: 6,
            nodes: vec![
                StorageNode {
                    node_id: NodeId([1; 32]),
                    network_url: "http://node-a.example".into(),
                    shard_indices: vec![0, 3, 4],
                },
                StorageNode {
                    node_id: NodeId([2; 32]),
                    network_url: "http://node-b.example".into(),
                    shard_indices: vec![1, 2],
                },
                StorageNode {
                    node_id: NodeId([3; 32]),
                    network_url: "http://node-c.example".into(),
                    shard_indices: vec![5],
                },
            ],
        }
    }

    #[test]
    fn routes_shards_to_owners() {
        let committee = committee();
        assert_eq!(committee.node_for_shard(3), Some(0));
        assert_eq!(committee.node_for_shard(2), Some(1));
        assert_eq!(committee.node_for_shard(5), Some(2));
        assert_eq!(committee.node_for_shard(6), None);
        assert_eq!(committee.nodes[0].weight(), 3);
    }

    #[test]
    fn validate_rejects_bad_assignments() {
        assert_eq!(committee().validate(), Ok(()));

        let mut duplicated = committee();
        duplicated.nodes[2].shard_indices = vec![0];
        assert_eq!(
            duplicated.validate(),
            Err(CommitteeError::DuplicateShard(0))
        );

        let mut missing = committee();
        missing.nodes[2].shard_indices.clear();
        assert_eq!(missing.validate(), Err(CommitteeError::UnassignedShards));
    }
}
