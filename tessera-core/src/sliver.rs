//! Slivers: the erasure-coded shards of one blob.

use serde::{Deserialize, Serialize};

/// Which side of a sliver pair a sliver belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SliverType {
    Primary,
    Secondary,
}

impl SliverType {
    /// Path segment used by the storage-node HTTP API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// The symbols of one sliver. All slivers of one blob share one
/// `symbol_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbols {
    pub data: Vec<u8>,
    pub symbol_size: u16,
}

/// One primary or secondary sliver, tagged with its index within the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverData {
    pub symbols: Symbols,
    pub index: u16,
}

/// The primary/secondary pair assigned to one shard. A blob always has
/// exactly as many pairs as the committee has shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliverPair {
    pub primary: SliverData,
    pub secondary: SliverData,
}

impl SliverPair {
    /// Pair index: by construction the index of the primary sliver.
    #[must_use]
    pub const fn index(&self) -> u16 {
        self.primary.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    #[test]
    fn sliver_wire_round_trip() {
        let sliver = SliverData {
            symbols: Symbols {
                data: vec![9u8; 24],
                symbol_size: 8,
            },
            index: 5,
        };
        let bytes = wire::serialize(&sliver).unwrap();
        assert_eq!(wire::deserialize::<SliverData>(&bytes).unwrap(), sliver);
    }
}
