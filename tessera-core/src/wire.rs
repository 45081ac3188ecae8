//! Serializer and Deserializer for the canonical wire format.
//!
//! The encoder, every storage node and every reader must agree byte-for-byte
//! on this encoding: fixed-width little-endian integers, length-prefixed
//! sequences, no trailing bytes. Metadata, slivers and confirmations all go
//! through here.

use bincode::{
    config::{
        Bounded, DefaultOptions, FixintEncoding, LittleEndian, RejectTrailing, WithOtherEndian,
        WithOtherIntEncoding, WithOtherLimit, WithOtherTrailing,
    },
    Options,
};
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Serialize};

pub type Error = bincode::Error;

type BincodeOptions = WithOtherTrailing<
    WithOtherIntEncoding<
        WithOtherLimit<WithOtherEndian<DefaultOptions, LittleEndian>, Bounded>,
        FixintEncoding,
    >,
    RejectTrailing,
>;

// Slivers for large blobs dominate message size. A secondary sliver is at
// most `secondary_symbols * u16::MAX` bytes, well under this cap.
const DATA_LIMIT: u64 = 256 * 1024 * 1024;

static OPTIONS: Lazy<BincodeOptions> = Lazy::new(|| {
    bincode::DefaultOptions::new()
        .with_little_endian()
        .with_limit(DATA_LIMIT)
        .with_fixint_encoding()
        .reject_trailing_bytes()
});

/// Serialize an object into the canonical wire encoding.
pub fn serialize<T: Serialize>(item: &T) -> Result<Vec<u8>, Error> {
    OPTIONS.serialize(item)
}

/// Deserialize an object from the canonical wire encoding.
///
/// Trailing bytes are rejected so a message can never smuggle extra data
/// past a reader.
pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, Error> {
    OPTIONS.deserialize(data)
}
