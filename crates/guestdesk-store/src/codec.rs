//! Encode/decode boundary for JSON-in-a-text-column fields.
//!
//! The session `data` object and the VIP `permissions` array live in plain
//! TEXT columns. Decoding is deliberately forgiving: NULL, malformed JSON,
//! or JSON of the wrong shape all resolve to an empty map/sequence so that
//! conversational and permission logic degrades gracefully on legacy or
//! corrupted rows instead of crashing.

use serde_json::{Map, Value};

use crate::error::StoreResult;

/// The in-memory shape of a session's structured payload.
pub type DataMap = Map<String, Value>;

/// Encode a session payload for storage. An empty map encodes as `"{}"`.
pub fn encode_map(map: &DataMap) -> StoreResult<String> {
    Ok(serde_json::to_string(map)?)
}

/// Decode a stored session payload. NULL or anything that is not a JSON
/// object yields an empty map, never an error.
pub fn decode_map(raw: Option<&str>) -> DataMap {
    raw.and_then(|s| serde_json::from_str::<Value>(s).ok())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

/// Encode a permission label list for storage.
pub fn encode_permissions(permissions: &[String]) -> StoreResult<String> {
    Ok(serde_json::to_string(permissions)?)
}

/// Decode a stored permission list. NULL, malformed JSON, or a non-array
/// yield an empty list; non-string array entries are dropped.
pub fn decode_permissions(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Value>(s).ok())
        .and_then(|v| match v {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}

// ── tests ────────────────────────────────────────────────────────────
