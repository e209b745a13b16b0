use crate::error::CacheError;
use crate::key::ToKey;
use crate::value::Value;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Length of every encoded digest: 32 SHA-256 bytes in unpadded base64.
pub const DIGEST_LEN: usize = 43;

/// A stable SHA-256 digest of a key's canonical bytes, encoded with the
/// URL-safe base64 alphabet (`A-Z a-z 0-9 - _`, no padding).
///
/// Digests double as on-disk file names, so the alphabet never contains path
/// separators or characters that need escaping.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Digest raw canonical bytes.
    pub fn from_canonical_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_ref());
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    /// Accepts `name` only if it has the exact shape of an encoded digest.
    pub fn parse(name: &str) -> Option<Self> {
        let well_formed = name.len() == DIGEST_LEN
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Digest a structured key.
pub fn make_digest(value: &Value) -> Digest {
    Digest::from_canonical_bytes(value.canonical_bytes())
}

/// Digest anything with a key form; sets and maps digest by content.
pub fn make_digest_of<T: ToKey + ?Sized>(value: &T) -> Result<Digest, CacheError> {
    Ok(make_digest(&value.to_key()?))
}
