//! Typed Cache over a Byte-Oriented Shared Store
//!
//! ## Overview
//!
//! The shared store keeps bytes and nothing else. To let independent
//! processes agree on how to decode a value without a schema registry, every
//! logical key `k` gets a shadow key `_type_var__key_k` holding a type tag.
//!
//! ```text
//! _type_var__key_pressure_kpa  →  "<class 'float'>"
//! pressure_kpa                 →  "101.3"
//!
//! _type_var__key_last_points   →  "<class 'dict'>"
//! last_points                  →  {"livingroom": {"xy": [21.5, 45.0], ...}}
//! ```
//!
//! ## Encoding per Variant
//!
//! | Variant  | Tag text              | Stored bytes                  |
//! |----------|-----------------------|-------------------------------|
//! | `Int`    | `<class 'int'>`       | decimal text                  |
//! | `Float`  | `<class 'float'>`     | shortest round-trip decimal   |
//! | `Bytes`  | `<class 'bytes'>`     | raw                           |
//! | `Bool`   | `<class 'bool'>`      | `True` / `False`              |
//! | `Json`   | `<class 'dict'>`, ... | canonical JSON                |
//! | `Opaque` | `<class 'opaque'>`    | bincode payload               |
//!
//! Tags written by a partner process that this table does not list are
//! classified by substring: `int`, then `float`, then `bytes`/`bool`; any other
//! tag is a structured value decoded as JSON or as opaque bytes depending on
//! what the caller expects.
//!
//! ## Consistency
//!
//! The tag and the value are two separate writes. A reader racing a writer on
//! the same key may pair a new tag with an old value. A read that finds only
//! one half reports the key as absent, never as a partial value. Within one
//! sequential writer (a single refresh cycle) the race cannot occur.
//!
//! A TTL applies to the tag key only. Once the tag expires the value reads as
//! absent even though its bytes are still in the store.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::constants::TYPE_TAG_PREFIX;
use crate::errors::{CacheError, CacheResult};
use crate::store::KeyValueStore;

const TAG_INT: &str = "<class 'int'>";
const TAG_FLOAT: &str = "<class 'float'>";
const TAG_BYTES: &str = "<class 'bytes'>";
const TAG_BOOL: &str = "<class 'bool'>";
const TAG_DICT: &str = "<class 'dict'>";
const TAG_LIST: &str = "<class 'list'>";
const TAG_STR: &str = "<class 'str'>";
const TAG_NONE: &str = "<class 'NoneType'>";
const TAG_JSON: &str = "<class 'json'>";
const TAG_OPAQUE: &str = "<class 'opaque'>";

/// Decoding family recovered from a stored type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// Raw byte blob
    Bytes,
    /// Boolean flag
    Bool,
    /// Structured value in canonical JSON
    Json,
    /// Structured value on the opaque (bincode) path
    Opaque,
}

impl TypeTag {
    /// Classify a tag string read from the store
    pub fn classify(raw: &str) -> Self {
        match raw {
            TAG_INT => Self::Int,
            TAG_FLOAT => Self::Float,
            TAG_BYTES => Self::Bytes,
            TAG_BOOL => Self::Bool,
            TAG_OPAQUE => Self::Opaque,
            TAG_DICT | TAG_LIST | TAG_STR | TAG_NONE | TAG_JSON => Self::Json,
            other if other.contains("int") => Self::Int,
            other if other.contains("float") => Self::Float,
            other if other.contains("bytes") || other.contains("bool") => Self::Bytes,
            _ => Self::Json,
        }
    }
}

/// A value as it travels through the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Integer scalar
    Int(i64),
    /// Float scalar
    Float(f64),
    /// Raw bytes, returned verbatim
    Bytes(Vec<u8>),
    /// Boolean flag
    Bool(bool),
    /// Structured value
    Json(Value),
    /// Pre-encoded opaque payload
    Opaque(Vec<u8>),
}

impl CacheValue {
    /// Decoding family of this value
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::Int(_) => TypeTag::Int,
            Self::Float(_) => TypeTag::Float,
            Self::Bytes(_) => TypeTag::Bytes,
            Self::Bool(_) => TypeTag::Bool,
            Self::Json(_) => TypeTag::Json,
            Self::Opaque(_) => TypeTag::Opaque,
        }
    }

    fn tag_text(&self) -> &'static str {
        match self {
            Self::Int(_) => TAG_INT,
            Self::Float(_) => TAG_FLOAT,
            Self::Bytes(_) => TAG_BYTES,
            Self::Bool(_) => TAG_BOOL,
            Self::Opaque(_) => TAG_OPAQUE,
            Self::Json(Value::Object(_)) => TAG_DICT,
            Self::Json(Value::Array(_)) => TAG_LIST,
            Self::Json(Value::String(_)) => TAG_STR,
            Self::Json(Value::Null) => TAG_NONE,
            Self::Json(_) => TAG_JSON,
        }
    }

    fn encode(&self, key: &str) -> CacheResult<Vec<u8>> {
        Ok(match self {
            Self::Int(v) => v.to_string().into_bytes(),
            Self::Float(v) => v.to_string().into_bytes(),
            Self::Bytes(v) | Self::Opaque(v) => v.clone(),
            Self::Bool(true) => b"True".to_vec(),
            Self::Bool(false) => b"False".to_vec(),
            Self::Json(v) => serde_json::to_vec(v).map_err(|e| CacheError::encode(key, e))?,
        })
    }

    fn decode(key: &str, tag: TypeTag, raw: Vec<u8>, expect_opaque: bool) -> CacheResult<Self> {
        match tag {
            TypeTag::Int => scalar_text(key, &raw)?
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|e| CacheError::decode(key, e)),
            TypeTag::Float => scalar_text(key, &raw)?
                .parse::<f64>()
                .map(Self::Float)
                .map_err(|e| CacheError::decode(key, e)),
            TypeTag::Bytes => Ok(Self::Bytes(raw)),
            TypeTag::Bool => Ok(match parse_bool(&raw) {
                Some(flag) => Self::Bool(flag),
                None => Self::Bytes(raw),
            }),
            TypeTag::Json | TypeTag::Opaque if expect_opaque => Ok(Self::Opaque(raw)),
            TypeTag::Json | TypeTag::Opaque => serde_json::from_slice(&raw)
                .map(Self::Json)
                .map_err(|e| CacheError::decode(key, e)),
        }
    }

    /// Truthiness used for flags written by any process
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Bool(v) => *v,
            Self::Bytes(v) => !(v.is_empty() || v == b"0" || v == b"False"),
            Self::Opaque(v) => !v.is_empty(),
            Self::Json(v) => match v {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                Value::String(s) => !s.is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
            },
        }
    }

    /// Numeric view of scalar and JSON-number values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    fn into_json(self, key: &str) -> CacheResult<Value> {
        match self {
            Self::Json(v) => Ok(v),
            Self::Int(v) => Ok(Value::from(v)),
            Self::Float(v) => Ok(Value::from(v)),
            Self::Bool(v) => Ok(Value::Bool(v)),
            Self::Bytes(_) | Self::Opaque(_) => Err(CacheError::decode(
                key,
                "binary value cannot be read as structured data",
            )),
        }
    }
}

fn scalar_text<'a>(key: &str, raw: &'a [u8]) -> CacheResult<&'a str> {
    std::str::from_utf8(raw)
        .map(str::trim)
        .map_err(|e| CacheError::decode(key, e))
}

fn parse_bool(raw: &[u8]) -> Option<bool> {
    match raw {
        b"True" | b"true" | b"1" => Some(true),
        b"False" | b"false" | b"0" => Some(false),
        _ => None,
    }
}

impl From<i64> for CacheValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for CacheValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for CacheValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Value> for CacheValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

/// Shadow key holding the type tag of `key`
pub fn tag_key(key: &str) -> String {
    format!("{TYPE_TAG_PREFIX}{key}")
}

/// Type-preserving cache over a shared [`KeyValueStore`]
///
/// Cloning is cheap: clones share the same store.
#[derive(Clone)]
pub struct TypedCache {
    store: Arc<dyn KeyValueStore>,
}

impl TypedCache {
    /// Wrap a shared store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Underlying store, for operations that bypass tagging
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Write `value` and its tag; the optional TTL applies to the tag
    pub fn set(&self, key: &str, value: &CacheValue, ttl: Option<Duration>) -> CacheResult<()> {
        let bytes = value.encode(key)?;
        let tag = tag_key(key);
        self.store.set(&tag, value.tag_text().as_bytes())?;
        self.store.set(key, &bytes)?;
        if let Some(ttl) = ttl {
            self.store.expire(&tag, ttl)?;
        }
        Ok(())
    }

    /// Write a structured value through the canonical JSON path
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let json = serde_json::to_value(value).map_err(|e| CacheError::encode(key, e))?;
        self.set(key, &CacheValue::Json(json), None)
    }

    /// Write a value through the opaque path
    pub fn set_opaque<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let bytes = bincode::serialize(value).map_err(|e| CacheError::encode(key, e))?;
        self.set(key, &CacheValue::Opaque(bytes), None)
    }

    /// Read a value; `Ok(None)` when either the tag or the value is absent
    pub fn get(&self, key: &str, expect_opaque: bool) -> CacheResult<Option<CacheValue>> {
        let Some(tag) = self.store.get(&tag_key(key))? else {
            return Ok(None);
        };
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        let tag = TypeTag::classify(String::from_utf8_lossy(&tag).as_ref());
        CacheValue::decode(key, tag, raw, expect_opaque).map(Some)
    }

    /// Read a value, substituting `default` when it is absent
    pub fn get_or(&self, key: &str, default: CacheValue) -> CacheResult<CacheValue> {
        Ok(self.get(key, false)?.unwrap_or(default))
    }

    /// Read and deserialize a structured value
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key, false)? {
            Some(value) => {
                let json = value.into_json(key)?;
                serde_json::from_value(json)
                    .map(Some)
                    .map_err(|e| CacheError::decode(key, e))
            }
            None => Ok(None),
        }
    }

    /// Read and deserialize a value written through the opaque path
    pub fn get_opaque<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key, true)? {
            Some(CacheValue::Opaque(bytes)) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| CacheError::decode(key, e)),
            Some(other) => Err(CacheError::decode(
                key,
                format!("expected an opaque payload, found {:?}", other.tag()),
            )),
            None => Ok(None),
        }
    }

    /// Read a numeric scalar
    pub fn get_f64(&self, key: &str) -> CacheResult<Option<f64>> {
        match self.get(key, false)? {
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| CacheError::decode(key, "not a number")),
            None => Ok(None),
        }
    }

    /// Read an integer scalar
    pub fn get_i64(&self, key: &str) -> CacheResult<Option<i64>> {
        match self.get(key, false)? {
            Some(CacheValue::Int(v)) => Ok(Some(v)),
            Some(CacheValue::Json(Value::Number(n))) if n.is_i64() => Ok(n.as_i64()),
            Some(other) => Err(CacheError::decode(
                key,
                format!("expected an integer, found {:?}", other.tag()),
            )),
            None => Ok(None),
        }
    }

    /// Read a byte blob
    pub fn get_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match self.get(key, false)? {
            Some(CacheValue::Bytes(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(CacheError::decode(
                key,
                format!("expected bytes, found {:?}", other.tag()),
            )),
            None => Ok(None),
        }
    }

    /// True when `key` holds a truthy value
    pub fn is_flag_set(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .get(key, false)?
            .is_some_and(|value| value.is_truthy()))
    }

    /// True only when both the tag and the value exist
    ///
    /// Best effort under concurrent writers: the two checks are separate reads.
    pub fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.store.exists(&tag_key(key))? && self.store.exists(key)?)
    }

    /// Delete the value and its tag; removing an absent key is a no-op
    pub fn remove(&self, key: &str) -> CacheResult<()> {
        let tag = tag_key(key);
        self.store.delete(&[key, tag.as_str()])?;
        Ok(())
    }

    /// Delete every tagged entry, returning how many logical keys were found
    pub fn clear(&self) -> CacheResult<usize> {
        let tags = self.store.keys_with_prefix(TYPE_TAG_PREFIX)?;
        if tags.is_empty() {
            return Ok(0);
        }
        let keys: Vec<&str> = tags
            .iter()
            .filter_map(|tag| tag.strip_prefix(TYPE_TAG_PREFIX))
            .collect();
        let mut doomed: Vec<&str> = Vec::with_capacity(tags.len() * 2);
        doomed.extend(keys.iter().copied());
        doomed.extend(tags.iter().map(String::as_str));
        self.store.delete(&doomed)?;
        debug!("Cleared {} cached entries", keys.len());
        Ok(keys.len())
    }
}
