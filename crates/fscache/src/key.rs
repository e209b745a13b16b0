//! Conversion of memoized-call arguments into cache keys.

use crate::error::CacheError;
use crate::memoize::Args;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::BuildHasher;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Something that can be turned into a [`Value`] key.
///
/// Unlike a serde round trip this keeps collection semantics: `HashSet` and
/// `BTreeSet` become [`Value::Set`] and maps become [`Value::Map`], so equal
/// collections key identically whatever their iteration order.
///
/// Types without an impl can delegate to [`Value::from_serialize`]:
///
/// ```
/// use fscache::{CacheError, ToKey, Value};
///
/// #[derive(serde::Serialize)]
/// struct Query {
///     name: String,
///     limit: u32,
/// }
///
/// impl ToKey for Query {
///     fn to_key(&self) -> Result<Value, CacheError> {
///         Value::from_serialize(self)
///     }
/// }
/// ```
pub trait ToKey {
    fn to_key(&self) -> Result<Value, CacheError>;
}

macro_rules! impl_to_key_copy {
    ($($ty:ty),*) => {
        $(
            impl ToKey for $ty {
                fn to_key(&self) -> Result<Value, CacheError> {
                    Ok(Value::from(*self))
                }
            }
        )*
    };
}

impl_to_key_copy!(
    (), bool, char, f32, f64, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize
);

impl ToKey for u128 {
    fn to_key(&self) -> Result<Value, CacheError> {
        i128::try_from(*self)
            .map(Value::Int)
            .map_err(|_| CacheError::unsupported(format!("integer {self} exceeds the i128 range")))
    }
}

impl ToKey for str {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::from(self))
    }
}

impl ToKey for String {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::from(self))
    }
}

impl ToKey for Value {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(self.clone())
    }
}

impl ToKey for Args {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::from(self))
    }
}

impl ToKey for serde_json::Value {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::from(self.clone()))
    }
}

impl<T: ToKey + ?Sized> ToKey for &T {
    fn to_key(&self) -> Result<Value, CacheError> {
        (**self).to_key()
    }
}

impl<T: ToKey + ?Sized> ToKey for Box<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        (**self).to_key()
    }
}

impl<T: ToKey + ?Sized> ToKey for Rc<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        (**self).to_key()
    }
}

impl<T: ToKey + ?Sized> ToKey for Arc<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        (**self).to_key()
    }
}

impl<T: ToKey> ToKey for Option<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        match self {
            Some(inner) => inner.to_key(),
            None => Ok(Value::Unit),
        }
    }
}

fn collect_keys<'a, T: ToKey + 'a>(
    items: impl IntoIterator<Item = &'a T>,
) -> Result<Vec<Value>, CacheError> {
    items.into_iter().map(|item| item.to_key()).collect()
}

impl<T: ToKey> ToKey for [T] {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::Seq(collect_keys(self)?))
    }
}

impl<T: ToKey, const N: usize> ToKey for [T; N] {
    fn to_key(&self) -> Result<Value, CacheError> {
        self.as_slice().to_key()
    }
}

impl<T: ToKey> ToKey for Vec<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        self.as_slice().to_key()
    }
}

impl<T: ToKey> ToKey for VecDeque<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::Seq(collect_keys(self)?))
    }
}

impl<T: ToKey> ToKey for BTreeSet<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::Set(collect_keys(self)?))
    }
}

impl<T: ToKey, S: BuildHasher> ToKey for HashSet<T, S> {
    fn to_key(&self) -> Result<Value, CacheError> {
        Ok(Value::Set(collect_keys(self)?))
    }
}

fn collect_entries<'a, K: ToKey + 'a, V: ToKey + 'a>(
    entries: impl IntoIterator<Item = (&'a K, &'a V)>,
) -> Result<Value, CacheError> {
    let entries = entries
        .into_iter()
        .map(|(k, v)| -> Result<(Value, Value), CacheError> { Ok((k.to_key()?, v.to_key()?)) })
        .collect::<Result<Vec<_>, CacheError>>()?;
    Ok(Value::Map(entries))
}

impl<K: ToKey, V: ToKey> ToKey for BTreeMap<K, V> {
    fn to_key(&self) -> Result<Value, CacheError> {
        collect_entries(self)
    }
}

impl<K: ToKey, V: ToKey, S: BuildHasher> ToKey for HashMap<K, V, S> {
    fn to_key(&self) -> Result<Value, CacheError> {
        collect_entries(self)
    }
}

impl<T: ToKey + ?Sized> ToKey for RefCell<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        let inner = self
            .try_borrow()
            .map_err(|_| CacheError::unsupported("RefCell is mutably borrowed"))?;
        inner.to_key()
    }
}

impl<T: ToKey + ?Sized> ToKey for Mutex<T> {
    fn to_key(&self) -> Result<Value, CacheError> {
        let inner = self
            .lock()
            .map_err(|_| CacheError::unsupported("Mutex is poisoned"))?;
        inner.to_key()
    }
}

macro_rules! impl_to_key_tuple {
    ($($ty:ident $var:ident),+) => {
        impl<$($ty: ToKey),+> ToKey for ($($ty,)+) {
            fn to_key(&self) -> Result<Value, CacheError> {
                let ($($var,)+) = self;
                Ok(Value::Seq(vec![$($var.to_key()?),+]))
            }
        }
    };
}

impl_to_key_tuple!(A a);
impl_to_key_tuple!(A a, B b);
impl_to_key_tuple!(A a, B b, C c);
impl_to_key_tuple!(A a, B b, C c, D d);
impl_to_key_tuple!(A a, B b, C c, D d, E e);
impl_to_key_tuple!(A a, B b, C c, D d, E e, F f);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::make_digest;

    #[test]
    fn hash_sets_key_by_membership() {
        for _ in 0..20 {
            let forward: HashSet<u32> = (0..16).collect();
            let backward: HashSet<u32> = (0..16).rev().collect();
            assert_eq!(
                make_digest(&forward.to_key().unwrap()),
                make_digest(&backward.to_key().unwrap())
            );
        }
    }

    #[test]
    fn hash_and_btree_collections_agree() {
        let hashed: HashSet<&str> = ["b", "a"].into_iter().collect();
        let ordered: BTreeSet<&str> = ["a", "b"].into_iter().collect();
        assert_eq!(hashed.to_key().unwrap(), ordered.to_key().unwrap());

        let mut map = HashMap::new();
        map.insert("x", vec![1i32, 2]);
        map.insert("y", vec![3]);
        assert_eq!(
            map.to_key().unwrap(),
            Value::map([("y", Value::seq([3])), ("x", Value::seq([1, 2]))])
        );
    }

    #[test]
    fn conversions_match_value_from() {
        assert_eq!((1u8, "x", 2.5f64).to_key().unwrap(), Value::from((1, "x", 2.5)));
        assert_eq!(vec![Some(1i32), None].to_key().unwrap(), Value::from(vec![Some(1), None]));
        assert_eq!([1i32, 2, 3].to_key().unwrap(), Value::seq([1, 2, 3]));
        let args = Args::new().arg(1).kwarg("k", "v");
        assert_eq!(args.to_key().unwrap(), Value::from(&args));
    }

    #[test]
    fn sets_and_sequences_stay_distinct() {
        let seq = vec![1i32, 2];
        let set: BTreeSet<i32> = seq.iter().copied().collect();
        assert_ne!(seq.to_key().unwrap(), set.to_key().unwrap());
    }

    #[test]
    fn unavailable_interiors_are_unsupported() {
        let cell = RefCell::new(1);
        let _guard = cell.borrow_mut();
        assert!(matches!(
            cell.to_key(),
            Err(CacheError::UnsupportedType { .. })
        ));
        assert!(matches!(
            u128::MAX.to_key(),
            Err(CacheError::UnsupportedType { .. })
        ));
    }
}
