//! Decoded command results
//!
//! A [`DmResult`] is the key/value view of a validated DM response. Parsers
//! build one through [`ResultBuilder`]; callers only ever read from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::ResultError;

/// A single typed result value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DmValue {
    U8(u8),
    U16(u16),
    U32(u32),
    I32(i32),
    String(String),
    Bytes(Vec<u8>),
}

impl DmValue {
    fn type_name(&self) -> &'static str {
        match self {
            DmValue::U8(_) => "u8",
            DmValue::U16(_) => "u16",
            DmValue::U32(_) => "u32",
            DmValue::I32(_) => "i32",
            DmValue::String(_) => "string",
            DmValue::Bytes(_) => "bytes",
        }
    }
}

/// Immutable key/value result of a parsed response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmResult {
    values: BTreeMap<String, DmValue>,
}

macro_rules! typed_getter {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty, $label:literal) => {
        $(#[$doc])*
        pub fn $name(&self, key: &str) -> Result<$ty, ResultError> {
            match self.get(key) {
                Some(DmValue::$variant(v)) => Ok(*v),
                Some(other) => Err(ResultError::WrongType {
                    key: key.to_string(),
                    wanted: $label,
                    actual: other.type_name(),
                }),
                None => Err(ResultError::Missing(key.to_string())),
            }
        }
    };
}

impl DmResult {
    /// Raw access to a value
    pub fn get(&self, key: &str) -> Option<&DmValue> {
        self.values.get(key)
    }

    /// Whether the result carries `key`
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for results of commands that only acknowledge
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DmValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    typed_getter!(
        /// Read an 8-bit value
        get_u8, U8, u8, "u8"
    );
    typed_getter!(
        /// Read a 16-bit value
        get_u16, U16, u16, "u16"
    );
    typed_getter!(
        /// Read a 32-bit value
        get_u32, U32, u32, "u32"
    );
    typed_getter!(
        /// Read a signed 32-bit value
        get_i32, I32, i32, "i32"
    );

    /// Read a string value
    pub fn get_string(&self, key: &str) -> Result<&str, ResultError> {
        match self.get(key) {
            Some(DmValue::String(s)) => Ok(s),
            Some(other) => Err(ResultError::WrongType {
                key: key.to_string(),
                wanted: "string",
                actual: other.type_name(),
            }),
            None => Err(ResultError::Missing(key.to_string())),
        }
    }

    /// Read a byte array value
    pub fn get_bytes(&self, key: &str) -> Result<&[u8], ResultError> {
        match self.get(key) {
            Some(DmValue::Bytes(b)) => Ok(b),
            Some(other) => Err(ResultError::WrongType {
                key: key.to_string(),
                wanted: "bytes",
                actual: other.type_name(),
            }),
            None => Err(ResultError::Missing(key.to_string())),
        }
    }
}

/// Accumulates values while a parser decodes a response
#[derive(Debug, Default)]
pub(crate) struct ResultBuilder {
    values: BTreeMap<String, DmValue>,
}

impl ResultBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn u8(mut self, key: &str, v: u8) -> Self {
        self.values.insert(key.to_string(), DmValue::U8(v));
        self
    }

    pub(crate) fn u16(mut self, key: &str, v: u16) -> Self {
        self.values.insert(key.to_string(), DmValue::U16(v));
        self
    }

    pub(crate) fn u32(mut self, key: &str, v: u32) -> Self {
        self.values.insert(key.to_string(), DmValue::U32(v));
        self
    }

    pub(crate) fn i32(mut self, key: &str, v: i32) -> Self {
        self.values.insert(key.to_string(), DmValue::I32(v));
        self
    }

    pub(crate) fn string(mut self, key: &str, v: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), DmValue::String(v.into()));
        self
    }

    pub(crate) fn bytes(mut self, key: &str, v: impl Into<Vec<u8>>) -> Self {
        self.values.insert(key.to_string(), DmValue::Bytes(v.into()));
        self
    }

    pub(crate) fn build(self) -> DmResult {
        DmResult {
            values: self.values,
        }
    }
}
