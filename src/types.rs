use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EncodingError;

/// Caller-supplied block contents. Always a JSON object so the nonce has a
/// top-level slot to go into; field order is kept as given.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn from_value(value: Value) -> Result<Self, EncodingError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EncodingError::NotAnObject(value_kind(&other))),
        }
    }

    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, EncodingError> {
        let value =
            serde_json::to_value(value).map_err(|e| EncodingError::Serialize(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for Payload {
    type Error = EncodingError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Payload> for Value {
    fn from(p: Payload) -> Value {
        Value::Object(p.0)
    }
}

pub(crate) fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of testing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub nonce: u64,
    pub valid: bool,
}

/// Optional limits on one search. Both unset means scan until found or exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn attempts(max_attempts: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Found,
    /// Every nonce in `[1, 2^d]` was tested.
    Exhausted,
    /// The attempt or time budget ran out first.
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub nonce: Option<u64>,
    pub stop: StopReason,
    pub tested: u64,
    pub elapsed: Duration,
}

impl SearchResult {
    pub fn found(&self) -> bool {
        self.nonce.is_some()
    }

    pub fn hashrate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.tested as f64 / secs } else { 0.0 }
    }
}

/// Problem document served by the challenge endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub difficulty: i64,
    pub block: Value,
}

/// Body posted back to the challenge endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub nonce: u64,
}

/// Summary of a solved problem, printed by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReceipt {
    pub difficulty: u32,
    pub nonce: u64,
    pub digest_hex: String,
    pub tested: u64,
    pub elapsed_ms: u64,
    pub workers: usize,
    pub solved_at: DateTime<Utc>,
}
