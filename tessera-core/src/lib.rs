//! Core data model and pure algorithms for the tessera storage protocol.
//!
//! Everything in this crate is IO-free: the canonical wire format, the
//! blob/sliver/committee/confirmation types shared with storage nodes, the
//! encoding-parameter derivation and the quilt packing algorithm.

pub mod blob;
pub mod committee;
pub mod confirmation;
pub mod metadata;
pub mod params;
pub mod quilt;
pub mod sliver;
pub mod wire;

pub use blob::{BlobId, ObjectId};
pub use committee::{Committee, NodeId, StorageNode};
pub use confirmation::{
    signers_to_bitmap, BlobPersistence, ConfirmationBody, ConfirmationCertificate,
    SignedStorageConfirmation, StorageConfirmation,
};
pub use metadata::{BlobMetadata, BlobMetadataV1, BlobMetadataWithId, EncodingType, MerkleNode};
pub use params::{source_symbols, BlobGeometry, SourceSymbols};
pub use sliver::{SliverData, SliverPair, SliverType, Symbols};
