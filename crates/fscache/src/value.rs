//! Structured cache keys.
//!
//! A [`Value`] is the tagged tree every cache key is reduced to before it is
//! digested. Sets and maps are unordered: their canonical form sorts members by
//! their own canonical bytes, so construction order never leaks into a digest.

use crate::error::CacheError;
use serde::ser::{self, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

const TAG_UNIT: u8 = b'u';
const TAG_BOOL: u8 = b'b';
const TAG_INT: u8 = b'i';
const TAG_FLOAT: u8 = b'f';
const TAG_STR: u8 = b's';
const TAG_BYTES: u8 = b'y';
const TAG_SEQ: u8 = b'l';
const TAG_SET: u8 = b't';
const TAG_MAP: u8 = b'm';

/// A cache key (or key component) with a defined canonical byte form.
#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Bool(bool),
    /// Every Rust integer width normalizes here, so `1u8` and `1i64` are the same key.
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Ordered sequence; element order is significant.
    Seq(Vec<Value>),
    /// Unordered collection; duplicates collapse.
    Set(Vec<Value>),
    /// Unordered key/value mapping; a repeated key keeps its last value.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    pub fn seq<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }

    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Convert any `Serialize` type into a key.
    ///
    /// Structs and maps become [`Value::Map`], sequences and tuples become
    /// [`Value::Seq`], enum variants use serde's externally tagged shape. serde
    /// presents `HashSet` as a sequence in iteration order, so types holding hash
    /// sets should build their key with [`crate::ToKey`] or [`Value::set`].
    ///
    /// Fails with [`CacheError::UnsupportedType`] when the value refuses to
    /// serialize (a poisoned `Mutex`, a mutably borrowed `RefCell`) or holds an
    /// integer outside the `i128` range.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, CacheError> {
        value.serialize(ValueSerializer)
    }

    /// The canonical byte form hashed by [`crate::make_digest`].
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut Vec<u8>) {
        match self {
            Value::Unit => out.push(TAG_UNIT),
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float(f) => {
                out.push(TAG_FLOAT);
                let bits = if f.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    f.to_bits()
                };
                out.extend_from_slice(&bits.to_le_bytes());
            }
            Value::Str(s) => write_len_prefixed(out, TAG_STR, s.as_bytes()),
            Value::Bytes(b) => write_len_prefixed(out, TAG_BYTES, b),
            Value::Seq(items) => {
                out.push(TAG_SEQ);
                write_len(out, items.len());
                for item in items {
                    item.write_canonical(out);
                }
            }
            Value::Set(items) => {
                let members: BTreeSet<Vec<u8>> =
                    items.iter().map(Value::canonical_bytes).collect();
                out.push(TAG_SET);
                write_len(out, members.len());
                for member in members {
                    out.extend_from_slice(&member);
                }
            }
            Value::Map(entries) => {
                let mut sorted: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
                for (k, v) in entries {
                    sorted.insert(k.canonical_bytes(), v.canonical_bytes());
                }
                out.push(TAG_MAP);
                write_len(out, sorted.len());
                for (k, v) in sorted {
                    out.extend_from_slice(&k);
                    out.extend_from_slice(&v);
                }
            }
        }
    }
}

fn write_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_le_bytes());
}

fn write_len_prefixed(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    out.push(tag);
    write_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

/// Equality is canonical equality: two sets with the same members compare equal
/// regardless of construction order.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bytes() == other.canonical_bytes()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bytes().hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b[{} bytes]", b.len()),
            Value::Seq(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
            Value::Set(items) => {
                f.write_str("{")?;
                write_joined(f, items)?;
                f.write_str("}")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (idx, (k, v)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(i: $ty) -> Self {
                    Value::Int(i as i128)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Str(c.to_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Unit,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::seq(items)
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(items: &[T]) -> Self {
        Value::seq(items.iter().cloned())
    }
}

impl<T: Into<Value>> From<BTreeSet<T>> for Value {
    fn from(items: BTreeSet<T>) -> Self {
        Value::set(items)
    }
}

impl<T: Into<Value>, S: BuildHasher> From<HashSet<T, S>> for Value {
    fn from(items: HashSet<T, S>) -> Self {
        Value::set(items)
    }
}

impl<K: Into<Value>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(entries: BTreeMap<K, V>) -> Self {
        Value::map(entries)
    }
}

impl<K: Into<Value>, V: Into<Value>, S: BuildHasher> From<HashMap<K, V, S>> for Value {
    fn from(entries: HashMap<K, V, S>) -> Self {
        Value::map(entries)
    }
}

macro_rules! impl_from_tuple {
    ($($ty:ident $var:ident),+) => {
        impl<$($ty: Into<Value>),+> From<($($ty,)+)> for Value {
            fn from(($($var,)+): ($($ty,)+)) -> Self {
                Value::Seq(vec![$($var.into()),+])
            }
        }
    };
}

impl_from_tuple!(A a);
impl_from_tuple!(A a, B b);
impl_from_tuple!(A a, B b, C c);
impl_from_tuple!(A a, B b, C c, D d);
impl_from_tuple!(A a, B b, C c, D d, E e);
impl_from_tuple!(A a, B b, C c, D d, E e, F f);

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Unit,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i128::from(i))
                } else if let Some(u) = n.as_u64() {
                    Value::Int(i128::from(u))
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::seq(items),
            serde_json::Value::Object(entries) => Value::map(entries),
        }
    }
}

impl ser::Error for CacheError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CacheError::unsupported(msg.to_string())
    }
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = CacheError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, CacheError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_i128(self, v: i128) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_u8(self, v: u8) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_u128(self, v: u128) -> Result<Value, CacheError> {
        i128::try_from(v)
            .map(Value::Int)
            .map_err(|_| CacheError::unsupported(format!("integer {v} exceeds the i128 range")))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_char(self, v: char) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_str(self, v: &str) -> Result<Value, CacheError> {
        Ok(v.into())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, CacheError> {
        Ok(Value::bytes(v))
    }

    fn serialize_none(self) -> Result<Value, CacheError> {
        Ok(Value::Unit)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, CacheError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, CacheError> {
        Ok(Value::Unit)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, CacheError> {
        Ok(Value::Unit)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, CacheError> {
        Ok(variant.into())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, CacheError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, CacheError> {
        let inner = value.serialize(ValueSerializer)?;
        Ok(Value::Map(vec![(variant.into(), inner)]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, CacheError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, CacheError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, CacheError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, CacheError> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder, CacheError> {
        Ok(MapBuilder {
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, CacheError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantMapBuilder, CacheError> {
        Ok(VariantMapBuilder {
            variant,
            entries: Vec::with_capacity(len),
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CacheError> {
        Ok(Value::Seq(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, CacheError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, CacheError> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CacheError> {
        Ok(Value::Map(vec![(
            self.variant.into(),
            Value::Seq(self.items),
        )]))
    }
}

struct MapBuilder {
    entries: Vec<(Value, Value)>,
    pending_key: Option<Value>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), CacheError> {
        self.pending_key = Some(key.serialize(ValueSerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CacheError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| CacheError::unsupported("map value serialized without a key"))?;
        self.entries.push((key, value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, CacheError> {
        Ok(Value::Map(self.entries))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CacheError> {
        self.entries
            .push((key.into(), value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, CacheError> {
        Ok(Value::Map(self.entries))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    entries: Vec<(Value, Value)>,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = CacheError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CacheError> {
        self.entries
            .push((key.into(), value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, CacheError> {
        Ok(Value::Map(vec![(
            self.variant.into(),
            Value::Map(self.entries),
        )]))
    }
}
