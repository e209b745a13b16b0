//! Pluggable value codecs.

use crate::error::CacheError;
use crate::util::PAYLOAD_LIMIT_BYTES;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts cached values to and from their on-disk bytes.
///
/// Implementations must round-trip every value a cache is asked to hold.
/// Decode failures are reported as errors and surface as corrupt entries.
pub trait Codec<V>: Send + Sync {
    fn encode(&self, value: &V) -> Result<Vec<u8>, CacheError>;
    fn decode(&self, bytes: &[u8]) -> Result<V, CacheError>;
}

/// Compact binary codec (bincode, fixed-width little-endian integers).
///
/// Decoding is bounded by [`PAYLOAD_LIMIT_BYTES`] so a corrupted length prefix
/// cannot request an enormous allocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options() -> impl bincode::Options + Copy {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
    }
}

impl<V: Serialize + DeserializeOwned> Codec<V> for BincodeCodec {
    fn encode(&self, value: &V) -> Result<Vec<u8>, CacheError> {
        Ok(Self::options().serialize(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<V, CacheError> {
        Ok(Self::options()
            .with_limit(PAYLOAD_LIMIT_BYTES as u64)
            .deserialize(bytes)?)
    }
}

/// Human-readable JSON codec. Useful when cache files should be inspectable.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl<V: Serialize + DeserializeOwned> Codec<V> for JsonCodec {
    fn encode(&self, value: &V) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<V, CacheError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
