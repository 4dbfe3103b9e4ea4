//! Shape normalisation for loosely typed engine results.
//!
//! Engines backed by foreign runtimes hand back "sequences" in several shapes:
//! true arrays, objects with a numeric `length` and indexed entries, or objects
//! that only carry numeric-looking keys. Everything is funnelled through
//! [`to_ordered_sequence`] so callers never sniff shapes themselves.

use serde_json::{Map, Value};

/// Normalise a sequence-like value into its ordered elements.
///
/// Null entries are skipped. Non-sequence values yield an empty vec.
pub fn to_ordered_sequence(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        Value::Object(map) => object_elements(map),
        _ => Vec::new(),
    }
}

fn object_elements(map: &Map<String, Value>) -> Vec<&Value> {
    let length = map.get("length").and_then(Value::as_u64).unwrap_or(0);

    // A length larger than the key count means a sparse object; walking the
    // keys is both correct and bounded in that case.
    if length > 0 && length <= map.len() as u64 {
        return (0..length)
            .filter_map(|i| map.get(&i.to_string()))
            .filter(|v| !v.is_null())
            .collect();
    }

    let mut indexed: Vec<(u64, &Value)> = map
        .iter()
        .filter_map(|(key, v)| key.parse::<u64>().ok().map(|i| (i, v)))
        .filter(|(_, v)| !v.is_null())
        .collect();
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, v)| v).collect()
}

/// Coerce a sample payload into `f32` samples.
///
/// Arrays keep their positions (non-numeric entries become silence), array-like
/// objects go through [`to_ordered_sequence`], anything else is empty.
pub fn coerce_samples(value: &Value) -> Vec<f32> {
    match value {
        Value::Array(items) => items.iter().map(sample_value).collect(),
        Value::Object(_) => to_ordered_sequence(value).into_iter().map(sample_value).collect(),
        _ => Vec::new(),
    }
}

fn sample_value(value: &Value) -> f32 {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32).unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        Value::String(s) => s.trim().parse::<f32>().ok().filter(|f| f.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}
