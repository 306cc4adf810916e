//! Reading declared fields out of a wire payload and assembling responses.
//!
//! Mirrors the provider SDK's own parameter validation: a missing required
//! field or a value of the wrong type is reported before any request is sent.

use std::collections::HashMap;

use aws_sdk_s3::primitives::{DateTime, DateTimeFormat};
use serde_json::{Map, Value};

use crate::model::error::{Error, Result};

/// A request payload in the remote convention (`Bucket`, `Key`, ...).
pub struct Fields {
    map: Map<String, Value>,
}

impl Fields {
    pub fn new(input: Value) -> Result<Self> {
        match input {
            Value::Object(map) => Ok(Self { map }),
            Value::Null => Ok(Self { map: Map::new() }),
            other => Err(Error::Param(format!(
                "Expected params to be a structure, got: {}",
                other
            ))),
        }
    }

    pub fn required_str(&self, key: &str) -> Result<String> {
        self.str(key)?
            .ok_or_else(|| Error::Param(format!("Missing required key '{}' in params", key)))
    }

    pub fn str(&self, key: &str) -> Result<Option<String>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(expected(key, "a string")),
        }
    }

    /// Like [`Fields::str`] but an empty string counts as absent.
    pub fn non_empty_str(&self, key: &str) -> Result<Option<String>> {
        Ok(self.str(key)?.filter(|value| !value.is_empty()))
    }

    pub fn i64(&self, key: &str) -> Result<Option<i64>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(value)) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| expected(key, "an integer")),
            Some(_) => Err(expected(key, "a number")),
        }
    }

    pub fn i32(&self, key: &str) -> Result<Option<i32>> {
        self.i64(key)?
            .map(|value| i32::try_from(value).map_err(|_| expected(key, "a 32-bit integer")))
            .transpose()
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(_) => Err(expected(key, "a boolean")),
        }
    }

    pub fn metadata(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(name, value)| match value {
                    Value::String(value) => Ok((name.clone(), value.clone())),
                    _ => Err(expected(&format!("{}.{}", key, name), "a string")),
                })
                .collect::<Result<HashMap<_, _>>>()
                .map(Some),
            Some(_) => Err(expected(key, "a map")),
        }
    }

    pub fn structure(&self, key: &str) -> Result<Option<Fields>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value @ Value::Object(_)) => Fields::new(value.clone()).map(Some),
            Some(_) => Err(expected(key, "a structure")),
        }
    }

    pub fn list(&self, key: &str) -> Result<Vec<Fields>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().cloned().map(Fields::new).collect(),
            Some(_) => Err(expected(key, "a list")),
        }
    }

    /// Takes the body out of the payload; absent means an empty body.
    pub fn take_body(&mut self, key: &str) -> Result<Vec<u8>> {
        match self.map.remove(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => {
                body_bytes(&value).ok_or_else(|| expected(key, "a string or byte array"))
            }
        }
    }
}

fn expected(key: &str, kind: &str) -> Error {
    Error::Param(format!("Expected params.{} to be {}", key, kind))
}

/// Bytes of a `Body` value: a UTF-8 string or an array of byte values.
pub fn body_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(text) => Some(text.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
            .collect(),
        _ => None,
    }
}

/// Builds a response payload, skipping fields the remote left unset.
#[derive(Default)]
pub struct Output {
    map: Map<String, Value>,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn time(self, key: &str, value: Option<&DateTime>) -> Self {
        self.set(key, value.and_then(format_time))
    }

    pub fn metadata(self, key: &str, value: Option<&HashMap<String, String>>) -> Self {
        let value = value.map(|entries| {
            entries
                .iter()
                .map(|(name, value)| (name.clone(), Value::from(value.as_str())))
                .collect::<Map<String, Value>>()
        });
        self.set(key, value)
    }

    pub fn build(self) -> Value {
        Value::Object(self.map)
    }
}

pub fn format_time(value: &DateTime) -> Option<String> {
    value.fmt(DateTimeFormat::DateTime).ok()
}
