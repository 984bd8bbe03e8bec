//! Lookups in JSON attribute trees.
//!
//! Recursive searches are depth-first and pre-order: an object's own members are checked before
//! any of its descendants, and descendants are visited in document order.
//! The first match wins; there is no other tie-break.
use serde_json::{Map, Value};

/// Follow a path of object member names from `value`.
pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.as_object()?.get(*key))
}

/// Visit every object in the tree depth-first, returning the first non-`None` result of `f`.
pub fn find_map<'a, T>(
    value: &'a Value,
    f: &mut impl FnMut(&'a Map<String, Value>) -> Option<T>,
) -> Option<T> {
    match value {
        Value::Object(map) => {
            if let Some(found) = f(map) {
                return Some(found);
            }
            map.values().find_map(|child| find_map(child, f))
        }
        Value::Array(items) => items.iter().find_map(|child| find_map(child, f)),
        _ => None,
    }
}

/// First member named `key` anywhere in the tree.
pub fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    find_map(value, &mut |map| map.get(key))
}

/// First member named `key` anywhere in the tree for which `convert` succeeds.
pub fn find_key_with<'a, T>(
    value: &'a Value,
    key: &str,
    mut convert: impl FnMut(&'a Value) -> Option<T>,
) -> Option<T> {
    find_map(value, &mut |map| map.get(key).and_then(&mut convert))
}

/// A number, or a string holding one.
pub fn as_f64_lenient(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// An integer, or a string holding one (`"32632"`, `"EPSG:32632"`).
pub fn as_i64_lenient(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            let digits = s
                .rsplit_once(':')
                .map_or(s, |(_, code)| code)
                .trim();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// The first four elements of a numeric array.
pub fn as_quad(value: &Value) -> Option<[f64; 4]> {
    let items = value.as_array()?;
    if items.len() < 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = as_f64_lenient(item)?;
    }
    Some(out)
}

/// A non-empty string member.
pub fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Render a flat metadata value: strings verbatim, everything else as compact JSON.
pub fn to_metadata_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
