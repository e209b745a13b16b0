use crate::lifetime::Lifetime;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable overriding the cache directory.
pub const ENV_CACHE_DIR: &str = "FSCACHE_DIR";
/// Environment variable overriding the lifetime, in (fractional) seconds.
pub const ENV_LIFETIME_SECS: &str = "FSCACHE_LIFETIME_SECS";

/// What to do with an on-disk entry the codec cannot decode.
///
/// Either way the read is reported as a miss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptEntryPolicy {
    /// Remove the file as soon as it is found to be unreadable.
    #[default]
    Delete,
    /// Leave the file in place, e.g. for later inspection.
    Keep,
}

/// Settings for [`crate::Cache::from_config`].
///
/// This type only derives `serde` traits so a host application can embed it in
/// its own configuration file; the crate never reads configuration files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory holding the cache files. Created if missing.
    pub path: PathBuf,
    /// Maximum entry age. `None` means entries never expire.
    #[serde(default)]
    pub lifetime: Option<Lifetime>,
    #[serde(default)]
    pub corrupt_entries: CorruptEntryPolicy,
}

impl CacheConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lifetime: None,
            corrupt_entries: CorruptEntryPolicy::default(),
        }
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Build a config for `default_path`, honouring [`ENV_CACHE_DIR`] and
    /// [`ENV_LIFETIME_SECS`] when they are set.
    pub fn from_env(default_path: impl Into<PathBuf>) -> Self {
        Self::from_vars(
            default_path.into(),
            std::env::var_os(ENV_CACHE_DIR),
            std::env::var_os(ENV_LIFETIME_SECS),
        )
    }

    fn from_vars(
        default_path: PathBuf,
        dir: Option<OsString>,
        lifetime_secs: Option<OsString>,
    ) -> Self {
        let path = dir
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or(default_path);

        let lifetime = lifetime_secs.and_then(|raw| {
            let raw = raw.to_string_lossy();
            match raw.trim().parse::<f64>() {
                Ok(seconds) => Some(Lifetime::from_seconds(seconds)),
                Err(err) => {
                    tracing::debug!(
                        target = "fscache",
                        var = ENV_LIFETIME_SECS,
                        value = %raw,
                        error = %err,
                        "ignoring unparsable cache lifetime"
                    );
                    None
                }
            }
        });

        Self {
            path,
            lifetime,
            corrupt_entries: CorruptEntryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_override_defaults() {
        let config = CacheConfig::from_vars(
            PathBuf::from("default"),
            Some(OsString::from("/tmp/override")),
            Some(OsString::from(" 90 ")),
        );
        assert_eq!(config.path, PathBuf::from("/tmp/override"));
        assert_eq!(config.lifetime, Some(Lifetime::from_seconds(90.0)));
    }

    #[test]
    fn empty_or_invalid_vars_are_ignored() {
        let config = CacheConfig::from_vars(
            PathBuf::from("default"),
            Some(OsString::new()),
            Some(OsString::from("soon")),
        );
        assert_eq!(config, CacheConfig::new("default"));
    }

    #[test]
    fn deserializes_from_json() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"path": "cache", "lifetime": {"minutes": 5}, "corrupt_entries": "keep"}"#,
        )
        .unwrap();
        assert_eq!(config.path, PathBuf::from("cache"));
        assert_eq!(config.lifetime.unwrap().to_seconds(), 300.0);
        assert_eq!(config.corrupt_entries, CorruptEntryPolicy::Keep);

        let minimal: CacheConfig = serde_json::from_str(r#"{"path": "cache"}"#).unwrap();
        assert_eq!(minimal, CacheConfig::new("cache"));
    }
}
