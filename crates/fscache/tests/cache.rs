use fscache::{
    make_digest, Cache, CacheBuilder, CacheConfig, CacheError, CorruptEntryPolicy, Digest,
    JsonCodec, Lifetime, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tempfile::TempDir;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Stored {
    Text(String),
    Table(BTreeMap<String, i64>),
}

fn text(s: &str) -> Stored {
    Stored::Text(s.to_string())
}

fn table() -> Stored {
    Stored::Table(
        ["a", "b", "c", "d", "e", "f"]
            .iter()
            .zip(0..)
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

struct Fixture {
    tmp: TempDir,
    cache: Cache<Stored>,
    names: Vec<Digest>,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let cache: Cache<Stored> = Cache::new(tmp.path()).unwrap();
    cache.purge().unwrap();
    cache.set(1, text("abcd")).unwrap();
    cache.set(2, text("efgh")).unwrap();

    let mut names = vec![make_digest(&Value::from(1)), make_digest(&Value::from(2))];
    names.sort();
    Fixture { tmp, cache, names }
}

#[test]
fn names_are_sorted_digests() {
    let fx = fixture();
    assert_eq!(fx.cache.get_names().unwrap(), fx.names);
}

#[test]
fn names_are_sorted_regardless_of_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let cache: Cache<u32> = Cache::new(tmp.path()).unwrap();
    for i in (0..20u32).rev() {
        cache.set(format!("key-{i}"), i).unwrap();
    }
    let names = cache.get_names().unwrap();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names.len(), 20);
    assert_eq!(names, sorted);
}

#[test]
fn purge_removes_everything_and_is_repeatable() {
    let fx = fixture();
    fx.cache.purge().unwrap();
    assert!(fx.cache.get_names().unwrap().is_empty());
    assert!(fx.cache.get_loaded().is_empty());
    fx.cache.purge().unwrap();
}

#[test]
fn int_key_round_trips_map_value() {
    let fx = fixture();
    fx.cache.set(3, table()).unwrap();
    assert_eq!(*fx.cache.get(3).unwrap(), table());
}

#[test]
fn list_key_round_trips_map_value() {
    let fx = fixture();
    fx.cache.set(vec![2, 3, 4], table()).unwrap();
    assert_eq!(*fx.cache.get(vec![2, 3, 4]).unwrap(), table());
    assert!(!fx.cache.contains(vec![4, 3, 2]).unwrap());
}

#[test]
fn delete_removes_both_layers_and_is_idempotent() {
    let fx = fixture();
    assert!(fx.cache.is_loaded(2));
    fx.cache.delete(2).unwrap();
    assert!(!fx.cache.is_loaded(2));
    assert!(!fx.cache.contains(2).unwrap());
    fx.cache.delete(2).unwrap();
    assert_eq!(fx.cache.get_names().unwrap().len(), 1);
}

#[test]
fn expire_removes_both_layers() {
    let fx = fixture();
    assert!(fx.cache.is_loaded(2));
    fx.cache.expire(2).unwrap();
    assert!(!fx.cache.is_loaded(2));
    assert!(fx.cache.get(2).unwrap_err().is_miss());
}

#[test]
fn loaded_set_tracks_unload() {
    let fx = fixture();
    let loaded: Vec<Digest> = fx.cache.get_loaded().into_iter().collect();
    assert_eq!(loaded, fx.names);
    fx.cache.unload(2);
    assert!(fx.cache.is_loaded(1));
    assert!(!fx.cache.is_loaded(2));
}

#[test]
fn unloaded_entry_is_still_contained_and_loadable() {
    let fx = fixture();
    assert!(fx.cache.contains(1).unwrap());
    fx.cache.unload(1);
    assert!(!fx.cache.is_loaded(1));
    assert!(fx.cache.contains(1).unwrap());
    assert!(!fx.cache.is_loaded(1), "contains must not load");

    fx.cache.load(1).unwrap();
    assert!(fx.cache.is_loaded(1));
    assert_eq!(*fx.cache.get(1).unwrap(), text("abcd"));
}

#[test]
fn clear_keeps_disk_and_load_restores() {
    let fx = fixture();
    fx.cache.clear();
    assert!(fx.cache.get_loaded().is_empty());
    assert_eq!(fx.cache.get_names().unwrap(), fx.names);
    fx.cache.load(1).unwrap();
    assert!(fx.cache.is_loaded(1));
}

#[test]
fn get_loads_from_disk() {
    let fx = fixture();
    fx.cache.clear();
    assert_eq!(*fx.cache.get(2).unwrap(), text("efgh"));
    assert!(fx.cache.is_loaded(2));
}

#[test]
fn update_item_replaces_existing_value() {
    let fx = fixture();
    assert_eq!(*fx.cache.get(2).unwrap(), text("efgh"));
    fx.cache.update_item(2, text("ijkl")).unwrap();
    assert_eq!(*fx.cache.get(2).unwrap(), text("ijkl"));

    fx.cache.clear();
    assert_eq!(*fx.cache.get(2).unwrap(), text("ijkl"));
}

#[test]
fn update_item_requires_existing_entry() {
    let fx = fixture();
    let err = fx.cache.update_item(99, text("nope")).unwrap_err();
    assert!(err.is_miss(), "{err}");
    assert!(!fx.cache.contains(99).unwrap());

    fx.cache.unload(1);
    fx.cache.update_item(1, text("on disk only")).unwrap();
    assert_eq!(*fx.cache.get(1).unwrap(), text("on disk only"));
}

#[test]
fn path_is_reported() {
    let fx = fixture();
    assert_eq!(fx.cache.path(), fx.tmp.path());
    assert_eq!(fx.cache.lifetime(), None);
}

#[test]
fn non_positive_lifetime_is_rejected() {
    let tmp = TempDir::new().unwrap();
    for lifetime in [
        Lifetime::default().seconds(60.0).minutes(-2.0),
        Lifetime::default().seconds(180.0).minutes(-3.0),
        Lifetime::default().minutes(-2.0),
        Lifetime::default(),
    ] {
        let err = Cache::<String>::with_lifetime(tmp.path(), lifetime).unwrap_err();
        assert!(matches!(err, CacheError::Lifetime { .. }), "{err}");
    }
}

#[test]
fn missing_key_is_a_miss() {
    let fx = fixture();
    let err = fx.cache.get("absent").unwrap_err();
    assert!(err.is_miss(), "{err}");
    assert!(matches!(fx.cache.load("absent"), Err(CacheError::Miss { .. })));
}

#[test]
fn unordered_keys_share_a_slot() {
    let fx = fixture();
    let mut forward = BTreeMap::new();
    forward.insert("x".to_string(), 1);
    forward.insert("y".to_string(), 2);
    fx.cache.set(forward, text("shared")).unwrap();

    let backward = Value::map([("y", 2), ("x", 1)]);
    assert_eq!(*fx.cache.get(backward).unwrap(), text("shared"));
}

#[test]
fn second_instance_sees_persisted_entries() {
    let fx = fixture();
    let other: Cache<Stored> = Cache::new(fx.tmp.path()).unwrap();
    assert!(other.get_loaded().is_empty());
    assert!(other.contains(1).unwrap());
    assert_eq!(*other.get(2).unwrap(), text("efgh"));
}

#[test]
fn externally_deleted_file_is_a_miss_once_unloaded() {
    let fx = fixture();
    let path = fx.tmp.path().join(make_digest(&Value::from(1)).as_str());
    std::fs::remove_file(path).unwrap();

    // The loaded copy still serves reads until it is dropped.
    assert_eq!(*fx.cache.get(1).unwrap(), text("abcd"));
    fx.cache.unload(1);
    assert!(!fx.cache.contains(1).unwrap());
    assert!(fx.cache.get(1).unwrap_err().is_miss());
}

#[test]
fn corrupt_entry_is_a_miss_and_deleted() {
    let fx = fixture();
    let path = fx.tmp.path().join(make_digest(&Value::from(1)).as_str());
    std::fs::write(&path, [0xff; 3]).unwrap();
    fx.cache.unload(1);

    assert!(fx.cache.get(1).unwrap_err().is_miss());
    assert!(!path.exists());

    fx.cache.set(1, text("recomputed")).unwrap();
    assert_eq!(*fx.cache.get(1).unwrap(), text("recomputed"));
}

#[test]
fn corrupt_entry_can_be_kept_for_inspection() {
    let tmp = TempDir::new().unwrap();
    let cache: Cache<Stored> = CacheBuilder::new(tmp.path())
        .corrupt_entries(CorruptEntryPolicy::Keep)
        .build()
        .unwrap();
    let path = tmp.path().join(make_digest(&Value::from("bad")).as_str());
    std::fs::write(&path, [0xff; 3]).unwrap();

    assert!(cache.get("bad").unwrap_err().is_miss());
    assert!(path.exists());
}

#[test]
fn json_codec_writes_readable_files() {
    let tmp = TempDir::new().unwrap();
    let cache: Cache<serde_json::Value, JsonCodec> =
        CacheBuilder::new(tmp.path()).codec(JsonCodec).build().unwrap();
    let value = serde_json::json!({"answer": 42, "tags": ["a", "b"]});
    cache.set("doc", value.clone()).unwrap();

    let path = tmp.path().join(make_digest(&Value::from("doc")).as_str());
    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(on_disk, value);

    cache.clear();
    assert_eq!(*cache.get("doc").unwrap(), value);
}

#[test]
fn from_config_applies_lifetime() {
    let tmp = TempDir::new().unwrap();
    let config =
        CacheConfig::new(tmp.path().join("nested")).with_lifetime(Lifetime::default().hours(2.0));
    let cache: Cache<u8> = Cache::from_config(&config).unwrap();
    assert!(cache.path().is_dir());
    assert_eq!(
        cache.lifetime(),
        Some(std::time::Duration::from_secs(2 * 3600))
    );

    let bad = CacheConfig::new(tmp.path()).with_lifetime(Lifetime::from_seconds(-1.0));
    assert!(matches!(
        Cache::<u8>::from_config(&bad),
        Err(CacheError::Lifetime { .. })
    ));
}
