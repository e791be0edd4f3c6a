//! Core types shared across the cache

use std::sync::Arc;

use serde::Serialize;

/// Unique identifier for a monitored item
pub type ItemId = u64;

/// Unix timestamp in whole seconds
pub type Timestamp = u32;

/// Sentinel used to initialize low-water marks before any store fetch
pub const FAR_FUTURE: Timestamp = Timestamp::MAX;

/// The kind of value an item produces
///
/// Every cache entry holds values of exactly one type; a sample of a
/// different type flushes and retypes the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Entry created but no value seen yet
    None,
    /// 64-bit floating point sample
    Float,
    /// Unsigned 64-bit counter sample
    Uint,
    /// Textual sample
    Text,
    /// Error message produced instead of a sample
    Error,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::None => "none",
            ValueType::Float => "float",
            ValueType::Uint => "uint",
            ValueType::Text => "text",
            ValueType::Error => "error",
        };
        f.write_str(name)
    }
}

/// A single sample payload
///
/// Owned string payloads are released on drop; the enclosing entry is
/// responsible for returning their bytes to the memory budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// No payload (placeholder for metadata-only entries)
    None,
    /// Floating point sample
    Float(f64),
    /// Unsigned counter sample
    Uint(u64),
    /// Textual sample
    Text(String),
    /// Error message sample
    Error(String),
}

impl Value {
    /// The type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::None => ValueType::None,
            Value::Float(_) => ValueType::Float,
            Value::Uint(_) => ValueType::Uint,
            Value::Text(_) => ValueType::Text,
            Value::Error(_) => ValueType::Error,
        }
    }

    /// Heap bytes owned by the payload, for budget accounting
    pub fn payload_size(&self) -> usize {
        match self {
            Value::Text(s) | Value::Error(s) => s.len(),
            _ => 0,
        }
    }
}

/// A timestamped sample inside a ring buffer
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    /// Sample time in unix seconds
    pub ts: Timestamp,
    /// Sample payload
    pub value: Value,
}

/// An incoming write: one sample for one item
#[derive(Debug, Clone)]
pub struct ValueRecord {
    /// Target item
    pub itemid: ItemId,
    /// Sample time in unix seconds
    pub ts: Timestamp,
    /// Sample payload
    pub value: Value,
}

/// Polling state of an item as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// No state reported yet
    Unknown,
    /// Item is polled normally
    Normal,
    /// Item polling failed; `error` carries the message
    NotSupported,
}

/// Per-item metadata kept alongside the value buffer
#[derive(Debug, Clone)]
pub struct ItemMetadata {
    /// Time of the most recent data, merged via max
    pub lastdata: Timestamp,
    /// Next scheduled poll
    pub nextcheck: Timestamp,
    /// Current polling state
    pub state: ItemState,
    /// Last polling error, interned in the string pool
    pub error: Option<Arc<str>>,
}

impl Default for ItemMetadata {
    fn default() -> Self {
        Self {
            lastdata: 0,
            nextcheck: 0,
            state: ItemState::Unknown,
            error: None,
        }
    }
}

/// A partial metadata update; absent fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct MetaUpdate {
    /// New lastdata candidate, applied only if newer than the stored one
    pub lastdata: Option<Timestamp>,
    /// New nextcheck, overwrites when present
    pub nextcheck: Option<Timestamp>,
    /// New state, overwrites when present
    pub state: Option<ItemState>,
    /// New error message, interned and overwrites when present
    pub error: Option<String>,
}
