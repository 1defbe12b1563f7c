//! Codec Module
//!
//! Pluggable serializer/deserializer pair used for both cached values and
//! call signatures. Codecs operate on `serde_json::Value`; typed values are
//! converted at the edges with `encode` / `decode`.

use std::fmt;
use std::sync::Arc;

use base64::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Payload ==
/// Serialized form of a value, as produced by a serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Textual output (e.g. JSON)
    Text(String),
    /// Binary output; base64-encoded when used inside a key
    Binary(Vec<u8>),
}

impl Payload {
    /// Raw bytes of the payload regardless of variant.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Text usable as the trailing segment of a cache key.
    pub fn to_key_segment(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Binary(bytes) => BASE64_STANDARD.encode(bytes),
        }
    }
}

// == Function Types ==
pub type SerializeFn = dyn Fn(&Value) -> Result<Payload> + Send + Sync;
pub type DeserializeFn = dyn Fn(&Payload) -> Result<Value> + Send + Sync;

// == Codec ==
/// A named serializer/deserializer pair.
#[derive(Clone)]
pub struct Codec {
    name: Arc<str>,
    serialize: Arc<SerializeFn>,
    deserialize: Arc<DeserializeFn>,
}

impl Codec {
    /// Builds a codec from an arbitrary function pair.
    pub fn new<S, D>(name: &str, serialize: S, deserialize: D) -> Self
    where
        S: Fn(&Value) -> Result<Payload> + Send + Sync + 'static,
        D: Fn(&Payload) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            serialize: Arc::new(serialize),
            deserialize: Arc::new(deserialize),
        }
    }

    /// JSON text codec (the default).
    pub fn json() -> Self {
        Self::new("json", json_text, json_read)
    }

    /// JSON codec producing binary payloads.
    pub fn json_bytes() -> Self {
        Self::new("json-bytes", json_binary, json_read)
    }

    /// Resolves a codec from serializer and deserializer names.
    ///
    /// Serializers: `json` / `json.dumps`, `json-bytes`.
    /// Deserializers: `json` / `json.loads`.
    pub fn resolve(serializer: &str, deserializer: &str) -> Result<Self> {
        let serialize: Arc<SerializeFn> = match serializer {
            "json" | "json.dumps" => Arc::new(json_text) as Arc<SerializeFn>,
            "json-bytes" => Arc::new(json_binary) as Arc<SerializeFn>,
            other => return Err(CacheError::UnknownCodec(format!("serializer '{}'", other))),
        };
        let deserialize: Arc<DeserializeFn> = match deserializer {
            "json" | "json.loads" => Arc::new(json_read) as Arc<DeserializeFn>,
            other => {
                return Err(CacheError::UnknownCodec(format!(
                    "deserializer '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            name: Arc::from(format!("{}/{}", serializer, deserializer)),
            serialize,
            deserialize,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serialize(&self, value: &Value) -> Result<Payload> {
        (self.serialize)(value)
    }

    pub fn deserialize(&self, payload: &Payload) -> Result<Value> {
        (self.deserialize)(payload)
    }

    /// Serializes a typed value.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Payload> {
        self.serialize(&serde_json::to_value(value)?)
    }

    /// Deserializes a payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self, payload: &Payload) -> Result<T> {
        Ok(serde_json::from_value(self.deserialize(payload)?)?)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::json()
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("name", &self.name).finish()
    }
}

fn json_text(value: &Value) -> Result<Payload> {
    Ok(Payload::Text(serde_json::to_string(value)?))
}

fn json_binary(value: &Value) -> Result<Payload> {
    Ok(Payload::Binary(serde_json::to_vec(value)?))
}

fn json_read(payload: &Payload) -> Result<Value> {
    Ok(serde_json::from_slice(payload.as_bytes())?)
}
