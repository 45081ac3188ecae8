//! Client-side protocol for the tessera storage network: encode blobs,
//! register them on chain, distribute slivers to the storage committee,
//! collect a quorum certificate, and read blobs or quilt patches back.

pub mod chain;
pub mod client;
pub mod config;
pub mod encode;
pub mod error;
pub mod loader;
pub mod pool;
pub mod quilt;
pub mod read;
pub mod reader;
pub mod transport;
pub mod write;

pub use chain::{
    BlobCertification, BlobRegistration, ChainAdapter, ChainError, RegisteredBlob, SystemState,
};
pub use client::TesseraClient;
pub use config::Settings;
pub use encode::{BlobCodec, CodecError, EncodedBlob, GridCodec};
pub use error::ClientError;
pub use loader::{derive_field_id, ObjectLoader};
pub use pool::TaskPool;
pub use quilt::{QuiltPatchOutput, QuiltReader, QuiltWriteResult};
pub use read::BlobStore;
pub use reader::BlobReader;
pub use transport::StorageNodeApi;
pub use write::{
    certificate_from_confirmations, WriteBlobOptions, WritePhase, WriteResult,
};
