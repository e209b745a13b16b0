//! A persistent, file-backed cache and memoizer.
//!
//! Values are stored one file per entry in a single flat directory and mirrored
//! in memory once touched. Keys are structured [`Value`]s reduced to a
//! [`Digest`], so lists, sets and maps can all be keys and unordered
//! collections digest the same regardless of construction order.
//!
//! ## On-disk layout
//!
//! `<path>/<digest>`: one codec-encoded value per file (no header, no sidecar).
//! An entry's age is its file modification time. Writes go through a sibling
//! `<digest>.tmp.<pid>.<n>` file that is renamed into place.
//!
//! ## Expiration
//!
//! A cache opened with a [`Lifetime`] treats entries at least that old as
//! absent. Nothing runs in the background: aged entries are deleted when an
//! operation encounters them, or in bulk by [`Cache::prune_expired`].
//!
//! ```no_run
//! use fscache::{Cache, CacheError, Lifetime};
//!
//! # fn main() -> Result<(), CacheError> {
//! let cache: Cache<String> = Cache::with_lifetime("cache-dir", Lifetime::default().hours(1.0))?;
//! cache.set(("user", 42), "Ada".to_string())?;
//! assert!(cache.contains(("user", 42))?);
//! assert_eq!(*cache.get(("user", 42))?, "Ada");
//!
//! let square = cache.memoize("square", |n: &u64| Ok::<_, CacheError>((n * n).to_string()));
//! assert_eq!(*square(&12)?, "144");
//! # Ok(())
//! # }
//! ```

mod cache;
mod codec;
mod config;
mod digest;
mod error;
mod key;
mod lifetime;
mod memoize;
mod store;
mod util;
mod value;

pub use cache::{Cache, CacheBuilder, PruneReport};
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use config::{CacheConfig, CorruptEntryPolicy, ENV_CACHE_DIR, ENV_LIFETIME_SECS};
pub use digest::{make_digest, make_digest_of, Digest, DIGEST_LEN};
pub use error::{CacheError, Result};
pub use key::ToKey;
pub use lifetime::{
    to_seconds, Lifetime, SECONDS_PER_DAY, SECONDS_PER_HOUR, SECONDS_PER_MINUTE,
    SECONDS_PER_MONTH, SECONDS_PER_WEEK, SECONDS_PER_YEAR,
};
pub use memoize::{auto_cache_function, cache_function, Args};
pub use store::EntryStore;
pub use util::{atomic_write, PAYLOAD_LIMIT_BYTES};
pub use value::Value;
