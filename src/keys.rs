//! Key Layout
//!
//! Every key lives under `{prefix}:{namespace}:`; the namespace index used for
//! population limits is `{prefix}:{namespace}:keys`.

use serde::Serialize;
use serde_json::{json, Value};

use crate::codec::Codec;
use crate::error::{CacheError, Result};

/// Suffix of the per-namespace index key.
pub const INDEX_SUFFIX: &str = "keys";

/// Namespace used by facade operations when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Splits serialized call arguments into `[positional, keyword]`.
///
/// Tuples and sequences are positional, structs and maps are keyword
/// arguments, `()` is an empty call and any scalar is one positional argument.
pub fn call_signature(args: Value) -> Value {
    match args {
        Value::Null => json!([[], {}]),
        Value::Array(positional) => json!([positional, {}]),
        Value::Object(keyword) => json!([[], keyword]),
        scalar => json!([[scalar], {}]),
    }
}

/// Builds the data key for a call.
pub fn call_key<A: Serialize + ?Sized>(
    codec: &Codec,
    prefix: &str,
    namespace: &str,
    args: &A,
) -> Result<String> {
    let signature = call_signature(serde_json::to_value(args)?);
    let encoded = codec.serialize(&signature)?.to_key_segment();
    Ok(data_key(prefix, namespace, &encoded))
}

pub fn data_key(prefix: &str, namespace: &str, segment: &str) -> String {
    format!("{}:{}:{}", prefix, namespace, segment)
}

pub fn index_key(prefix: &str, namespace: &str) -> String {
    data_key(prefix, namespace, INDEX_SUFFIX)
}

/// Literal prefix shared by every key of a namespace.
pub fn namespace_prefix(prefix: &str, namespace: &str) -> String {
    format!("{}:{}:", prefix, namespace)
}

/// Glob pattern matching every key of a namespace, with metacharacters escaped.
pub fn namespace_pattern(prefix: &str, namespace: &str) -> String {
    format!("{}*", escape_glob(&namespace_prefix(prefix, namespace)))
}

fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Checks an explicitly supplied namespace.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::Config("namespace cannot be empty".to_string()));
    }
    if namespace.contains(':') {
        return Err(CacheError::Config(format!(
            "namespace '{}' must not contain ':'",
            namespace
        )));
    }
    Ok(())
}

/// Checks a key prefix: non-empty and free of `:`.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || prefix.contains(':') {
        return Err(CacheError::Config(format!(
            "prefix '{}' must be non-empty and free of ':'",
            prefix
        )));
    }
    Ok(())
}

/// Derives a namespace from the path of a function item.
///
/// Only named items qualify. Closures, function pointers and trait objects
/// name a signature rather than one computation and are rejected.
pub fn function_namespace<F>() -> Result<String> {
    let path = std::any::type_name::<F>();
    if !is_item_path(path) {
        return Err(CacheError::Config(format!(
            "cannot derive a namespace from '{}'; pass one explicitly",
            path
        )));
    }
    Ok(path.replace("::", "."))
}

fn is_item_path(path: &str) -> bool {
    !path.contains("{{closure}}") && !path.contains("fn(") && !path.contains("dyn ")
}
