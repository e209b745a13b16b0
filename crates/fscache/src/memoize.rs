//! Memoizing wrappers around fallible computations.
//!
//! A wrapped computation derives a key from its arguments, returns the cached
//! result when one is fresh, and otherwise runs, stores and returns. A failing
//! computation stores nothing and its error is returned unchanged.

use crate::cache::Cache;
use crate::codec::Codec;
use crate::digest::{make_digest, Digest};
use crate::error::CacheError;
use crate::key::ToKey;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Positional plus keyword arguments, for computations whose natural calling
/// convention is `f(a, b, key = value)`.
///
/// Converts into a [`Value`] as `[positional, {keyword}]`, so keyword order is
/// irrelevant and positional order is significant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }
}

impl From<&Args> for Value {
    fn from(args: &Args) -> Self {
        Value::Seq(vec![
            Value::Seq(args.positional.clone()),
            Value::map(
                args.keyword
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.clone())),
            ),
        ])
    }
}

impl From<Args> for Value {
    fn from(args: Args) -> Self {
        Value::from(&args)
    }
}

/// Wrap `f` so results are cached under the key `key_fn` derives from the
/// arguments.
pub fn cache_function<A, V, C, E, F, K, Q>(
    f: F,
    key_fn: K,
    cache: Cache<V, C>,
) -> impl Fn(&A) -> Result<Arc<V>, E>
where
    A: ?Sized,
    C: Codec<V>,
    E: From<CacheError>,
    F: Fn(&A) -> Result<V, E>,
    K: Fn(&A) -> Q,
    Q: Into<Value>,
{
    move |args: &A| {
        let digest = make_digest(&key_fn(args).into());
        call_memoized(&cache, digest, || f(args))
    }
}

/// Wrap `f` using `name` plus the whole argument value as the key.
///
/// `name` identifies the computation, so several functions can share one cache
/// without reading each other's results. Methods get per-instance caching by
/// passing the receiver's identifying state as part of the arguments.
pub fn auto_cache_function<A, V, C, E, F>(
    name: impl Into<String>,
    f: F,
    cache: Cache<V, C>,
) -> impl Fn(&A) -> Result<Arc<V>, E>
where
    A: ToKey + ?Sized,
    C: Codec<V>,
    E: From<CacheError>,
    F: Fn(&A) -> Result<V, E>,
{
    let name = name.into();
    move |args: &A| {
        let key = Value::Seq(vec![Value::from(name.as_str()), args.to_key()?]);
        call_memoized(&cache, make_digest(&key), || f(args))
    }
}

impl<V, C> Cache<V, C>
where
    C: Codec<V>,
{
    /// Decorator form of [`auto_cache_function`] backed by this cache.
    pub fn memoize<A, E, F>(
        &self,
        name: impl Into<String>,
        f: F,
    ) -> impl Fn(&A) -> Result<Arc<V>, E>
    where
        A: ToKey + ?Sized,
        E: From<CacheError>,
        F: Fn(&A) -> Result<V, E>,
    {
        auto_cache_function(name, f, self.clone())
    }
}

fn call_memoized<V, C, E>(
    cache: &Cache<V, C>,
    digest: Digest,
    compute: impl FnOnce() -> Result<V, E>,
) -> Result<Arc<V>, E>
where
    C: Codec<V>,
    E: From<CacheError>,
{
    if let Some(hit) = cache.lookup_digest(&digest)? {
        tracing::trace!(target = "fscache", digest = %digest, "memoized hit");
        return Ok(hit);
    }
    let value = compute()?;
    Ok(cache.insert_digest(digest, value)?)
}
