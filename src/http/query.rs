//! Query string and form body codec.
//!
//! # Responsibilities
//! - Parse `a=1&a=2&b` style strings into a typed map
//! - Best-effort scalar coercion (bool, integer, float, string)
//! - Bracket groups (`user[name]=x`, `tags[]=a`) nest recursively
//! - Encode a typed map back into a query string
//!
//! # Design Decisions
//! - Never fails: malformed tokens are kept as strings
//! - Repeated keys accumulate; a single value collapses to a scalar
//! - A bare token without `=` is kept as a key holding an empty sequence

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use url::form_urlencoded;

/// Typed key/value structure produced by [`parse`].
pub type QueryMap = Map<String, Value>;

/// Intermediate accumulation tree before coercion.
#[derive(Debug)]
enum Slot {
    Values(Vec<String>),
    Group(BTreeMap<String, Slot>),
}

/// Parse a query string (or form body) into a typed map.
pub fn parse(input: &str) -> QueryMap {
    let mut root: BTreeMap<String, Slot> = BTreeMap::new();

    for pair in input.split(['&', ';']).filter(|p| !p.is_empty()) {
        let has_value = pair.contains('=');
        let Some((key, value)) = form_urlencoded::parse(pair.as_bytes()).next() else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let segments = key_segments(&key);
        let value = has_value.then(|| value.into_owned());
        insert(&mut root, &segments, value);
    }

    finish_group(root)
}

/// Encode a typed map as a query string.
///
/// Scalars are written with the same textual form [`coerce`] accepts, so
/// `parse(encode(map))` yields an equivalent map for scalar values.
pub fn encode(map: &QueryMap) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        encode_value(&mut serializer, key, value);
    }
    serializer.finish()
}

/// Best-effort conversion of a single token to its "true" type.
pub fn coerce(token: &str) -> Value {
    match token {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(int) = token.parse::<i64>() {
        if int.to_string() == token {
            return Value::Number(int.into());
        }
    }

    if let Ok(float) = token.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            if number.to_string() == token {
                return Value::Number(number);
            }
        }
    }

    Value::String(token.to_string())
}

/// Split `a[b][]` into `["a", "b", ""]`. Keys that are not well formed
/// bracket groups are returned whole.
fn key_segments(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![key.to_string()];
    }

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return vec![key.to_string()];
        };
        let Some(close) = inner.find(']') else {
            return vec![key.to_string()];
        };
        segments.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }
    segments
}

fn insert(group: &mut BTreeMap<String, Slot>, segments: &[String], value: Option<String>) {
    let (head, tail) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };

    // `key[]` accumulates like a repeated plain key.
    let is_leaf = tail.is_empty() || (tail.len() == 1 && tail[0].is_empty());

    if is_leaf {
        let slot = group
            .entry(head.clone())
            .or_insert_with(|| Slot::Values(Vec::new()));
        if let Slot::Group(_) = slot {
            *slot = Slot::Values(Vec::new());
        }
        if let (Slot::Values(values), Some(value)) = (slot, value) {
            values.push(value);
        }
        return;
    }

    let slot = group
        .entry(head.clone())
        .or_insert_with(|| Slot::Group(BTreeMap::new()));
    if let Slot::Values(_) = slot {
        *slot = Slot::Group(BTreeMap::new());
    }
    if let Slot::Group(children) = slot {
        insert(children, tail, value);
    }
}

fn finish_group(group: BTreeMap<String, Slot>) -> QueryMap {
    group
        .into_iter()
        .map(|(key, slot)| (key, finish_slot(slot)))
        .collect()
}

fn finish_slot(slot: Slot) -> Value {
    match slot {
        Slot::Group(children) => Value::Object(finish_group(children)),
        Slot::Values(values) => {
            let mut coerced: Vec<Value> = values.iter().map(|v| coerce(v)).collect();
            if coerced.len() == 1 {
                coerced.remove(0)
            } else {
                Value::Array(coerced)
            }
        }
    }
}

fn encode_value(serializer: &mut form_urlencoded::Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Object(children) => {
            for (child, nested) in children {
                encode_value(serializer, &format!("{key}[{child}]"), nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Some(text) = scalar_text(item) {
                    serializer.append_pair(key, &text);
                }
            }
        }
        other => {
            if let Some(text) = scalar_text(other) {
                serializer.append_pair(key, &text);
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
