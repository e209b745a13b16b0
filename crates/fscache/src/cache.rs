use crate::codec::{BincodeCodec, Codec};
use crate::config::{CacheConfig, CorruptEntryPolicy};
use crate::digest::{make_digest, Digest};
use crate::error::CacheError;
use crate::lifetime::Lifetime;
use crate::store::EntryStore;
use crate::util::{age_of, remove_file_best_effort};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// A persistent cache: values live in files under one directory, and the ones
/// touched by this process are also kept in memory.
///
/// Keys are anything convertible into a [`Value`]; each is reduced to a
/// [`Digest`] that names its file. Expiration is lazy: an entry older than the
/// configured lifetime is deleted the next time an operation looks at it.
///
/// `Cache` is a cheap handle; clones share the same in-memory table.
pub struct Cache<V, C = BincodeCodec> {
    inner: Arc<CacheInner<V, C>>,
}

struct CacheInner<V, C> {
    store: EntryStore<C>,
    lifetime: Option<Duration>,
    corrupt_entries: CorruptEntryPolicy,
    loaded: Mutex<HashMap<Digest, LoadedEntry<V>>>,
}

struct LoadedEntry<V> {
    value: Arc<V>,
    written_at: SystemTime,
}

/// Outcome of [`Cache::prune_expired`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Number of on-disk entries examined.
    pub scanned: usize,
    /// Entries deleted because they outlived the lifetime.
    pub removed: Vec<Digest>,
}

/// Builder for caches with a non-default codec, lifetime or corruption policy.
#[derive(Debug)]
pub struct CacheBuilder<C = BincodeCodec> {
    path: PathBuf,
    lifetime: Option<Lifetime>,
    codec: C,
    corrupt_entries: CorruptEntryPolicy,
}

impl CacheBuilder<BincodeCodec> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lifetime: None,
            codec: BincodeCodec,
            corrupt_entries: CorruptEntryPolicy::default(),
        }
    }
}

impl<C> CacheBuilder<C> {
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn codec<C2>(self, codec: C2) -> CacheBuilder<C2> {
        CacheBuilder {
            path: self.path,
            lifetime: self.lifetime,
            codec,
            corrupt_entries: self.corrupt_entries,
        }
    }

    pub fn corrupt_entries(mut self, policy: CorruptEntryPolicy) -> Self {
        self.corrupt_entries = policy;
        self
    }

    /// Validate the lifetime, create the directory and open the cache.
    pub fn build<V>(self) -> Result<Cache<V, C>, CacheError>
    where
        C: Codec<V>,
    {
        let lifetime = self.lifetime.map(|l| l.to_duration()).transpose()?;
        let store = EntryStore::with_codec(self.path, self.codec)?;
        Ok(Cache {
            inner: Arc::new(CacheInner {
                store,
                lifetime,
                corrupt_entries: self.corrupt_entries,
                loaded: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl<V> Cache<V, BincodeCodec>
where
    BincodeCodec: Codec<V>,
{
    /// Open a cache at `path` whose entries never expire.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        CacheBuilder::new(path).build()
    }

    /// Open a cache at `path` whose entries expire after `lifetime`.
    ///
    /// Fails with [`CacheError::Lifetime`] unless the lifetime is positive.
    pub fn with_lifetime(path: impl Into<PathBuf>, lifetime: Lifetime) -> Result<Self, CacheError> {
        CacheBuilder::new(path).lifetime(lifetime).build()
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let mut builder =
            CacheBuilder::new(config.path.clone()).corrupt_entries(config.corrupt_entries);
        if let Some(lifetime) = config.lifetime {
            builder = builder.lifetime(lifetime);
        }
        builder.build()
    }
}

impl<V, C> Clone for Cache<V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, C> fmt::Debug for Cache<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("path", &self.inner.store.root())
            .field("lifetime", &self.inner.lifetime)
            .field("loaded", &self.inner.loaded.lock().len())
            .finish()
    }
}

type LoadedTable<V> = HashMap<Digest, LoadedEntry<V>>;

impl<V, C> Cache<V, C>
where
    C: Codec<V>,
{
    /// The directory this cache persists into.
    pub fn path(&self) -> &Path {
        self.inner.store.root()
    }

    /// The configured maximum entry age, if any.
    pub fn lifetime(&self) -> Option<Duration> {
        self.inner.lifetime
    }

    /// Whether a fresh entry for `key` exists in memory or on disk.
    ///
    /// Does not load the entry. An aged-out entry discovered here is deleted.
    pub fn contains(&self, key: impl Into<Value>) -> Result<bool, CacheError> {
        let digest = digest_key(key);
        let mut loaded = self.inner.loaded.lock();
        if self.fresh_in_memory(&mut loaded, &digest) {
            return Ok(true);
        }
        self.fresh_on_disk(&digest)
    }

    /// Fetch the value for `key`, loading it from disk if needed.
    ///
    /// Fails with [`CacheError::Miss`] if the entry is absent, aged out (it is
    /// deleted as a side effect) or unreadable.
    pub fn get(&self, key: impl Into<Value>) -> Result<Arc<V>, CacheError> {
        let digest = digest_key(key);
        let mut loaded = self.inner.loaded.lock();
        if self.fresh_in_memory(&mut loaded, &digest) {
            if let Some(entry) = loaded.get(&digest) {
                tracing::trace!(target = "fscache", digest = %digest, "memory hit");
                return Ok(Arc::clone(&entry.value));
            }
        }
        self.load_locked(&mut loaded, digest)
    }

    /// Store `value` under `key` on disk and in memory.
    pub fn set(&self, key: impl Into<Value>, value: V) -> Result<(), CacheError> {
        let digest = digest_key(key);
        let mut loaded = self.inner.loaded.lock();
        self.store_locked(&mut loaded, digest, value)?;
        Ok(())
    }

    /// Replace the value of an existing entry, restarting its lifetime.
    ///
    /// Fails with [`CacheError::Miss`] if there is no fresh entry for `key`.
    pub fn update_item(&self, key: impl Into<Value>, value: V) -> Result<(), CacheError> {
        let digest = digest_key(key);
        let mut loaded = self.inner.loaded.lock();
        let exists = self.fresh_in_memory(&mut loaded, &digest) || self.fresh_on_disk(&digest)?;
        if !exists {
            return Err(CacheError::Miss { digest });
        }
        self.store_locked(&mut loaded, digest, value)?;
        Ok(())
    }

    /// Remove the entry for `key` from memory and disk. Idempotent.
    pub fn delete(&self, key: impl Into<Value>) -> Result<(), CacheError> {
        let digest = digest_key(key);
        let mut loaded = self.inner.loaded.lock();
        loaded.remove(&digest);
        self.inner.store.delete(&digest)
    }

    /// Evict the entry for `key` early. Same effect as [`Cache::delete`].
    pub fn expire(&self, key: impl Into<Value>) -> Result<(), CacheError> {
        let digest = digest_key(key);
        let mut loaded = self.inner.loaded.lock();
        loaded.remove(&digest);
        self.inner.store.delete(&digest)?;
        tracing::debug!(target = "fscache", digest = %digest, "expired cache entry");
        Ok(())
    }

    /// Drop the in-memory copy of `key`; the file stays on disk.
    pub fn unload(&self, key: impl Into<Value>) {
        let digest = digest_key(key);
        self.inner.loaded.lock().remove(&digest);
    }

    /// Read the entry for `key` from disk into memory, replacing any loaded copy.
    pub fn load(&self, key: impl Into<Value>) -> Result<(), CacheError> {
        let digest = digest_key(key);
        let mut loaded = self.inner.loaded.lock();
        self.load_locked(&mut loaded, digest)?;
        Ok(())
    }

    /// Whether `key` is in memory. Never touches disk, never checks age.
    pub fn is_loaded(&self, key: impl Into<Value>) -> bool {
        let digest = digest_key(key);
        self.inner.loaded.lock().contains_key(&digest)
    }

    /// Digests currently held in memory.
    pub fn get_loaded(&self) -> BTreeSet<Digest> {
        self.inner.loaded.lock().keys().cloned().collect()
    }

    /// Digests currently persisted on disk, sorted.
    pub fn get_names(&self) -> Result<Vec<Digest>, CacheError> {
        self.inner.store.list_keys()
    }

    /// Empty the in-memory table. Disk is untouched.
    pub fn clear(&self) {
        self.inner.loaded.lock().clear();
    }

    /// Remove every entry from memory and disk.
    pub fn purge(&self) -> Result<(), CacheError> {
        let mut loaded = self.inner.loaded.lock();
        loaded.clear();
        self.inner.store.purge_all()
    }

    /// Delete every on-disk entry that has outlived the lifetime.
    ///
    /// Expiration normally happens lazily on access; this is an explicit sweep
    /// for callers that want to reclaim space. Without a lifetime it only counts.
    pub fn prune_expired(&self) -> Result<PruneReport, CacheError> {
        let mut loaded = self.inner.loaded.lock();
        let names = self.inner.store.list_keys()?;
        let mut report = PruneReport {
            scanned: names.len(),
            removed: Vec::new(),
        };
        if self.inner.lifetime.is_none() {
            return Ok(report);
        }

        for digest in names {
            let age = match self.inner.store.file_age(&digest) {
                Ok(age) => age,
                Err(err) if err.is_miss() => continue,
                Err(err) => return Err(err),
            };
            if self.is_expired(age) {
                loaded.remove(&digest);
                self.inner.store.delete(&digest)?;
                report.removed.push(digest);
            }
        }

        if !report.removed.is_empty() {
            tracing::debug!(
                target = "fscache",
                path = %self.path().display(),
                scanned = report.scanned,
                removed = report.removed.len(),
                "pruned expired cache entries"
            );
        }
        Ok(report)
    }

    fn is_expired(&self, age: Duration) -> bool {
        self.inner.lifetime.is_some_and(|lifetime| age >= lifetime)
    }

    /// True if `digest` is loaded and young enough. A stale loaded copy is
    /// dropped so the caller falls through to disk.
    fn fresh_in_memory(&self, loaded: &mut LoadedTable<V>, digest: &Digest) -> bool {
        let Some(entry) = loaded.get(digest) else {
            return false;
        };
        if !self.is_expired(age_of(entry.written_at)) {
            return true;
        }
        loaded.remove(digest);
        false
    }

    /// True if a young enough file exists for `digest`; an aged file is deleted.
    fn fresh_on_disk(&self, digest: &Digest) -> Result<bool, CacheError> {
        let age = match self.inner.store.file_age(digest) {
            Ok(age) => age,
            Err(err) if err.is_miss() => return Ok(false),
            Err(err) => return Err(err),
        };
        if self.is_expired(age) {
            self.discard(digest, "expired");
            return Ok(false);
        }
        Ok(true)
    }

    fn load_locked(
        &self,
        loaded: &mut LoadedTable<V>,
        digest: Digest,
    ) -> Result<Arc<V>, CacheError> {
        let written_at = match self.inner.store.modified(&digest) {
            Ok(written_at) => written_at,
            Err(err) => {
                // Deleted behind our back; the loaded copy is no longer backed by disk.
                if err.is_miss() {
                    loaded.remove(&digest);
                }
                return Err(err);
            }
        };
        if self.is_expired(age_of(written_at)) {
            loaded.remove(&digest);
            self.discard(&digest, "expired");
            return Err(CacheError::Miss { digest });
        }

        let value = match self.inner.store.read(&digest) {
            Ok(value) => value,
            Err(CacheError::CorruptEntry { digest, message }) => {
                loaded.remove(&digest);
                tracing::debug!(
                    target = "fscache",
                    digest = %digest,
                    error = %message,
                    policy = ?self.inner.corrupt_entries,
                    "treating unreadable cache entry as a miss"
                );
                if self.inner.corrupt_entries == CorruptEntryPolicy::Delete {
                    remove_file_best_effort(&self.inner.store.entry_path(&digest), "corrupt");
                }
                return Err(CacheError::Miss { digest });
            }
            Err(err) => {
                if err.is_miss() {
                    loaded.remove(&digest);
                }
                return Err(err);
            }
        };

        let value = Arc::new(value);
        loaded.insert(
            digest,
            LoadedEntry {
                value: Arc::clone(&value),
                written_at,
            },
        );
        Ok(value)
    }

    fn store_locked(
        &self,
        loaded: &mut LoadedTable<V>,
        digest: Digest,
        value: V,
    ) -> Result<Arc<V>, CacheError> {
        let written_at = self.inner.store.write(&digest, &value)?;
        let value = Arc::new(value);
        loaded.insert(
            digest,
            LoadedEntry {
                value: Arc::clone(&value),
                written_at,
            },
        );
        Ok(value)
    }

    fn discard(&self, digest: &Digest, reason: &'static str) {
        tracing::debug!(target = "fscache", digest = %digest, reason, "dropping cache entry");
        remove_file_best_effort(&self.inner.store.entry_path(digest), reason);
    }

    /// Insert under an already computed digest; used by memoized calls so the
    /// returned handle is the one kept in memory.
    pub(crate) fn insert_digest(&self, digest: Digest, value: V) -> Result<Arc<V>, CacheError> {
        let mut loaded = self.inner.loaded.lock();
        self.store_locked(&mut loaded, digest, value)
    }

    /// Look up an already computed digest; `Ok(None)` on a miss.
    pub(crate) fn lookup_digest(&self, digest: &Digest) -> Result<Option<Arc<V>>, CacheError> {
        let mut loaded = self.inner.loaded.lock();
        if self.fresh_in_memory(&mut loaded, digest) {
            if let Some(entry) = loaded.get(digest) {
                return Ok(Some(Arc::clone(&entry.value)));
            }
        }
        match self.load_locked(&mut loaded, digest.clone()) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_miss() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn digest_key(key: impl Into<Value>) -> Digest {
    make_digest(&key.into())
}
