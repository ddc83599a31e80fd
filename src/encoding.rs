//! Canonical candidate encoding.
//!
//! A candidate is the payload object with one extra top-level field,
//! `"nonce"`, holding the trial nonce. The canonical form is compact JSON
//! (no whitespace) written the way the challenge verifier marshals it:
//!
//! - every number is a float64 in shortest form: `2.0` is `2`, `3.25e10` is
//!   `32500000000`, `-0.0` is `-0`. Magnitudes below `1e-6` or from `1e21` up
//!   use an exponent (`1e+21`, `1.5e-7`). Integers beyond 2^53 lose precision
//!   the same way the verifier's do.
//! - strings escape `<`, `>`, `&`, U+2028 and U+2029 as `\uXXXX`; everything
//!   else is escaped as `serde_json` does.
//!
//! Object keys follow a [`KeyOrder`]: `Sorted` orders every object by the
//! UTF-8 bytes of its keys, which is what the challenge verifier does;
//! `Insertion` keeps the order of the problem definition.
//!
//! An existing `"nonce"` field keeps its slot and only its value is
//! replaced. Otherwise the field is appended (`Insertion`) or placed at its
//! sorted position (`Sorted`). No other field moves.

use std::io::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CandidateError, EncodingError};
use crate::types::Payload;

pub const NONCE_KEY: &str = "nonce";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOrder {
    #[default]
    Sorted,
    Insertion,
}

impl FromStr for KeyOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sorted" => Ok(KeyOrder::Sorted),
            "insertion" => Ok(KeyOrder::Insertion),
            other => Err(format!("unknown key order '{other}'")),
        }
    }
}

/// Writes the canonical bytes of the candidate for `nonce` into `buf`.
///
/// `buf` is owned by the calling worker and reused across candidates;
/// implementations must clear it first.
pub trait CandidateEncoder: Send + Sync {
    fn encode_into(&self, nonce: u64, buf: &mut Vec<u8>) -> Result<(), CandidateError>;
}

/// Payload encoded once, split around the nonce value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTemplate {
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

impl CandidateTemplate {
    pub fn new(payload: &Payload, order: KeyOrder) -> Result<Self, EncodingError> {
        let map = payload.as_map();
        let mut fields: Vec<(&str, Option<&Value>)> = map
            .iter()
            .map(|(k, v)| {
                if k == NONCE_KEY {
                    (k.as_str(), None)
                } else {
                    (k.as_str(), Some(v))
                }
            })
            .collect();
        if !map.contains_key(NONCE_KEY) {
            fields.push((NONCE_KEY, None));
        }
        if order == KeyOrder::Sorted {
            fields.sort_by(|a, b| a.0.cmp(b.0));
        }

        let mut prefix = Vec::with_capacity(64);
        let mut suffix = Vec::new();
        let mut out = &mut prefix;
        out.push(b'{');
        for (i, (key, value)) in fields.into_iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            write_string(out, key)?;
            out.push(b':');
            match value {
                Some(v) => write_value(out, v, order)?,
                None => out = &mut suffix,
            }
        }
        out.push(b'}');

        Ok(Self { prefix, suffix })
    }

    /// Length of the encoding without the nonce digits.
    pub fn fixed_len(&self) -> usize {
        self.prefix.len() + self.suffix.len()
    }
}

impl CandidateEncoder for CandidateTemplate {
    fn encode_into(&self, nonce: u64, buf: &mut Vec<u8>) -> Result<(), CandidateError> {
        buf.clear();
        buf.extend_from_slice(&self.prefix);
        // Writing to a Vec cannot fail.
        let _ = write!(buf, "{nonce}");
        buf.extend_from_slice(&self.suffix);
        Ok(())
    }
}

/// Canonical bytes of `payload` with `nonce` merged in.
pub fn encode(payload: &Payload, nonce: u64, order: KeyOrder) -> Result<Vec<u8>, EncodingError> {
    let template = CandidateTemplate::new(payload, order)?;
    let mut buf = Vec::with_capacity(template.fixed_len() + 20);
    template.encode_into(nonce, &mut buf).map_err(|e| match e {
        CandidateError::Encoding(e) => e,
        CandidateError::Transient(msg) => EncodingError::Serialize(msg),
    })?;
    Ok(buf)
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), EncodingError> {
    let quoted = serde_json::to_string(s).map_err(|e| EncodingError::Serialize(e.to_string()))?;
    for c in quoted.chars() {
        match c {
            '<' => out.extend_from_slice(b"\\u003c"),
            '>' => out.extend_from_slice(b"\\u003e"),
            '&' => out.extend_from_slice(b"\\u0026"),
            '\u{2028}' => out.extend_from_slice(b"\\u2028"),
            '\u{2029}' => out.extend_from_slice(b"\\u2029"),
            c => out.extend_from_slice(c.encode_utf8(&mut [0u8; 4]).as_bytes()),
        }
    }
    Ok(())
}

fn write_number(out: &mut Vec<u8>, n: &serde_json::Number) -> Result<(), EncodingError> {
    let f = n
        .as_f64()
        .ok_or_else(|| EncodingError::Serialize(format!("number {n} has no float64 form")))?;
    let abs = f.abs();
    // Writing to a Vec cannot fail.
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let sci = format!("{f:e}");
        match sci.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => {
                let _ = write!(out, "{mantissa}e+{exp}");
            }
            _ => out.extend_from_slice(sci.as_bytes()),
        }
    } else {
        let _ = write!(out, "{f}");
    }
    Ok(())
}

fn write_value(out: &mut Vec<u8>, value: &Value, order: KeyOrder) -> Result<(), EncodingError> {
    match value {
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item, order)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            if order == KeyOrder::Sorted {
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }
            out.push(b'{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, k)?;
                out.push(b':');
                write_value(out, v, order)?;
            }
            out.push(b'}');
        }
        Value::String(s) => write_string(out, s)?,
        Value::Number(n) => write_number(out, n)?,
        scalar => {
            serde_json::to_writer(out, scalar).map_err(|e| EncodingError::Serialize(e.to_string()))?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Payload {
        Payload::from_value(v).unwrap()
    }

    fn encode_str(p: &Payload, nonce: u64, order: KeyOrder) -> String {
        String::from_utf8(encode(p, nonce, order).unwrap()).unwrap()
    }

    #[test]
    fn deterministic() {
        let p = payload(json!({"data": [["a", 1], ["b", 2.5, true, null]]}));
        let a = encode(&p, 42, KeyOrder::Sorted).unwrap();
        let b = encode(&p, 42, KeyOrder::Sorted).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            String::from_utf8(a).unwrap(),
            r#"{"data":[["a",1],["b",2.5,true,null]],"nonce":42}"#
        );
    }

    #[test]
    fn sorted_ignores_insertion_order() {
        let a = payload(json!({"z": 1, "data": {"y": 1, "b": [ {"k": 1, "a": 2} ]}}));
        let b = payload(json!({"data": {"b": [ {"a": 2, "k": 1} ], "y": 1}, "z": 1}));
        assert_eq!(
            encode(&a, 3, KeyOrder::Sorted).unwrap(),
            encode(&b, 3, KeyOrder::Sorted).unwrap()
        );
        assert_eq!(
            encode_str(&a, 3, KeyOrder::Sorted),
            r#"{"data":{"b":[{"a":2,"k":1}],"y":1},"nonce":3,"z":1}"#
        );
    }

    #[test]
    fn existing_nonce_replaced_in_place() {
        let p = payload(json!({"nonce": null, "data": [["a", 1]]}));
        assert_eq!(
            encode_str(&p, 7, KeyOrder::Insertion),
            r#"{"nonce":7,"data":[["a",1]]}"#
        );
        assert_eq!(
            encode_str(&p, 7, KeyOrder::Sorted),
            r#"{"data":[["a",1]],"nonce":7}"#
        );
    }

    #[test]
    fn insertion_matches_merged_serde_json() {
        let original = json!({"b": "x\"y\n", "a": [1, -2, 3.25, "\u{e9}"], "c": {"q": null}});
        let p = payload(original.clone());
        let mut merged = original.clone();
        merged["nonce"] = json!(1234567);
        assert_eq!(
            encode(&p, 1234567, KeyOrder::Insertion).unwrap(),
            serde_json::to_vec(&merged).unwrap()
        );
        // merging into the candidate never touches the caller's payload
        assert_eq!(Value::from(p), original);
    }

    #[test]
    fn numbers_and_markup_match_verifier() {
        let p = payload(json!({"data": [["a<b&c>", 2.0, 3.25e10, 1e21, -0.0]]}));
        assert_eq!(
            encode_str(&p, 1, KeyOrder::Sorted),
            r#"{"data":[["a\u003cb\u0026c\u003e",2,32500000000,1e+21,-0]],"nonce":1}"#
        );
    }

    #[test]
    fn float_edge_forms() {
        let p = payload(json!({"v": [1.5e-7, 0.000001, -1e22, 0.1, 12345678901234567890u64, "\u{2028}"]}));
        assert_eq!(
            encode_str(&p, 2, KeyOrder::Sorted),
            r#"{"nonce":2,"v":[1.5e-7,0.000001,-1e+22,0.1,12345678901234567000,"\u2028"]}"#
        );
    }

    #[test]
    fn template_reuses_buffer() {
        let p = payload(json!({"data": []}));
        let t = CandidateTemplate::new(&p, KeyOrder::Sorted).unwrap();
        let mut buf = Vec::new();
        t.encode_into(u64::MAX, &mut buf).unwrap();
        assert_eq!(buf, br#"{"data":[],"nonce":18446744073709551615}"#);
        t.encode_into(1, &mut buf).unwrap();
        assert_eq!(buf, br#"{"data":[],"nonce":1}"#);
        assert_eq!(t.fixed_len(), br#"{"data":[],"nonce":}"#.len());
    }

    #[test]
    fn empty_payload() {
        let p = Payload::default();
        assert_eq!(encode_str(&p, 9, KeyOrder::Insertion), r#"{"nonce":9}"#);
    }

    #[test]
    fn parse_key_order() {
        assert_eq!("Sorted".parse::<KeyOrder>(), Ok(KeyOrder::Sorted));
        assert_eq!("insertion".parse::<KeyOrder>(), Ok(KeyOrder::Insertion));
        assert!("random".parse::<KeyOrder>().is_err());
    }
}
