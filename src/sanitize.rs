//! Cleaning of untrusted text before it reaches validation or storage.

use crate::{ImportError, ImportResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

static SCRIPT_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript\s*:").unwrap());

static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon[a-z]{3,}\s*=").unwrap());

/// Strip angle brackets, `javascript:` schemes and inline `on*=` handler patterns.
///
/// Removal can splice a new pattern together (`javajavascript:script:`), so passes repeat
/// until nothing changes. The result is a fixed point, which makes this idempotent.
pub fn sanitize_str(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next: String = current.chars().filter(|c| *c != '<' && *c != '>').collect();
        let next = SCRIPT_SCHEME.replace_all(&next, "");
        let next = EVENT_HANDLER.replace_all(&next, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Sanitize every string leaf and every mapping key; other leaves pass through.
///
/// Mappings keep every entry. A key whose cleaned form is already taken (by a clean
/// key or an earlier cleaned one) gets the first free `_2`, `_3`, ... suffix.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(sanitize_map(map)),
        other => other.clone(),
    }
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    let clean_keys: HashSet<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|k| sanitize_str(k) == *k)
        .collect();

    let mut out = Map::with_capacity(map.len());
    for (k, v) in map {
        let cleaned = sanitize_str(k);
        let mut key = cleaned.clone();
        if cleaned != *k {
            let mut n = 2;
            while clean_keys.contains(key.as_str()) || out.contains_key(&key) {
                key = format!("{cleaned}_{n}");
                n += 1;
            }
        }
        out.insert(key, sanitize(v));
    }
    out
}

/// Sanitize, then fail with `PayloadTooLarge` if the JSON form exceeds `max_bytes`.
pub fn sanitize_bounded(value: &Value, max_bytes: usize) -> ImportResult<Value> {
    let clean = sanitize(value);
    let size = serde_json::to_vec(&clean)?.len();
    if size > max_bytes {
        return Err(ImportError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(clean)
}
