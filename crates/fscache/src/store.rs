use crate::codec::{BincodeCodec, Codec};
use crate::digest::Digest;
use crate::error::CacheError;
use crate::util::{age_of, atomic_write, modified_time, read_file_limited, remove_file_idempotent};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// The on-disk half of a cache: one flat directory, one file per digest.
///
/// Files hold codec-encoded values with no header or sidecar; an entry's age is
/// its file modification time. Anything in the directory whose name is not a
/// well-formed digest (temp files from interrupted writes, stray files) is
/// invisible to [`EntryStore::list_keys`].
#[derive(Clone, Debug)]
pub struct EntryStore<C = BincodeCodec> {
    root: PathBuf,
    codec: C,
}

impl EntryStore<BincodeCodec> {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::with_codec(root, BincodeCodec)
    }
}

impl<C> EntryStore<C> {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn with_codec(root: impl AsRef<Path>, codec: C) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, codec })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn entry_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.as_str())
    }

    /// Encode `value` and atomically replace the file for `digest`.
    ///
    /// Returns the new file's modification time.
    pub fn write<V>(&self, digest: &Digest, value: &V) -> Result<SystemTime, CacheError>
    where
        C: Codec<V>,
    {
        let bytes = self.codec.encode(value).map_err(|err| match err {
            CacheError::Codec { .. } => err,
            other => CacheError::Codec {
                message: other.to_string(),
            },
        })?;
        let path = self.entry_path(digest);
        atomic_write(&path, &bytes)?;
        tracing::trace!(
            target = "fscache",
            digest = %digest,
            bytes = bytes.len(),
            "wrote cache entry"
        );
        Ok(modified_time(&path)?.unwrap_or_else(SystemTime::now))
    }

    /// Read and decode the entry for `digest`.
    ///
    /// A missing file is a [`CacheError::Miss`]; unreadable contents are a
    /// [`CacheError::CorruptEntry`]. The file is never deleted here.
    pub fn read<V>(&self, digest: &Digest) -> Result<V, CacheError>
    where
        C: Codec<V>,
    {
        let path = self.entry_path(digest);
        let bytes = match read_file_limited(&path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(CacheError::Miss {
                    digest: digest.clone(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                return Err(CacheError::CorruptEntry {
                    digest: digest.clone(),
                    message: err.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        self.codec
            .decode(&bytes)
            .map_err(|err| CacheError::CorruptEntry {
                digest: digest.clone(),
                message: err.to_string(),
            })
    }

    /// Remove the entry for `digest`; removing an absent entry is not an error.
    pub fn delete(&self, digest: &Digest) -> Result<(), CacheError> {
        remove_file_idempotent(&self.entry_path(digest))?;
        Ok(())
    }

    /// Every persisted digest, sorted lexicographically.
    pub fn list_keys(&self) -> Result<Vec<Digest>, CacheError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }
            let name = entry.file_name();
            if let Some(digest) = name.to_str().and_then(Digest::parse) {
                keys.push(digest);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Time since the entry for `digest` was last written.
    pub fn file_age(&self, digest: &Digest) -> Result<Duration, CacheError> {
        Ok(age_of(self.modified(digest)?))
    }

    /// When the entry for `digest` was last written.
    pub fn modified(&self, digest: &Digest) -> Result<SystemTime, CacheError> {
        modified_time(&self.entry_path(digest))?.ok_or_else(|| CacheError::Miss {
            digest: digest.clone(),
        })
    }

    /// Remove every file in the directory, including leftovers that are not
    /// entries. Subdirectories are left untouched.
    pub fn purge_all(&self) -> Result<(), CacheError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            remove_file_idempotent(&entry.path())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::digest::make_digest;
    use crate::value::Value;

    fn digest(key: impl Into<Value>) -> Digest {
        make_digest(&key.into())
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::new(dir.path()).unwrap();
        let key = digest(1);

        store.write(&key, &"abcd".to_string()).unwrap();
        let value: String = store.read(&key).unwrap();
        assert_eq!(value, "abcd");
        assert!(store.entry_path(&key).is_file());
    }

    #[test]
    fn read_of_absent_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::new(dir.path()).unwrap();
        let err = store.read::<String>(&digest("nope")).unwrap_err();
        assert!(err.is_miss(), "{err}");
        assert!(store.file_age(&digest("nope")).unwrap_err().is_miss());
    }

    #[test]
    fn undecodable_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::with_codec(dir.path(), JsonCodec).unwrap();
        let key = digest(2);
        std::fs::write(store.entry_path(&key), b"{not json").unwrap();

        let err = store.read::<Vec<u32>>(&key).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry { .. }), "{err}");
        assert!(store.entry_path(&key).exists());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::new(dir.path()).unwrap();
        let key = digest(3);
        store.write(&key, &3u32).unwrap();
        store.delete(&key).unwrap();
        store.delete(&key).unwrap();
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[test]
    fn list_keys_is_sorted_and_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::new(dir.path()).unwrap();
        let mut expected = Vec::new();
        for i in (0..10).rev() {
            let key = digest(i);
            store.write(&key, &i).unwrap();
            expected.push(key);
        }
        expected.sort();

        std::fs::write(dir.path().join("README"), b"not an entry").unwrap();
        std::fs::write(
            dir.path().join(format!("{}.tmp.1.0", expected[0])),
            b"partial",
        )
        .unwrap();
        std::fs::create_dir(dir.path().join(digest("dir").as_str())).unwrap();

        assert_eq!(store.list_keys().unwrap(), expected);
    }

    #[test]
    fn purge_all_removes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::new(dir.path()).unwrap();
        store.write(&digest(1), &1u8).unwrap();
        std::fs::write(dir.path().join("leftover.tmp.9.9"), b"x").unwrap();

        store.purge_all().unwrap();
        store.purge_all().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        let store = EntryStore::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }
}
