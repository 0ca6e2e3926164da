//! Equality, merge and traversal rules for dynamically typed JSON values.
//!
//! Everything that flows through a test — parameters, request bodies,
//! responses, shadow-store entries — is a `serde_json::Value`. The match
//! semantics here are lookup semantics, not strict equality: a criteria
//! value matches an existing value when everything the criteria states can
//! be found on the existing side.

use std::ops::ControlFlow;

use chrono::{DateTime, Timelike};
use serde_json::{Number, Value};

/// Ordered JSON object map (`preserve_order` is enabled workspace-wide).
pub type JsonMap = serde_json::Map<String, Value>;

/// Numeric equality across serde_json's integer and float storage.
pub fn number_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Timestamp-tolerant string equality.
///
/// When both sides parse as RFC 3339 they compare as instants. When only
/// one side does, the other is accepted if it contains the parsed minute
/// and second rendered in decimal — enough to recognize the same moment in
/// a different format without knowing that format.
pub fn time_equal(a: &str, b: &str) -> bool {
    let ta = DateTime::parse_from_rfc3339(a).ok();
    let tb = DateTime::parse_from_rfc3339(b).ok();
    match (ta, tb) {
        (Some(x), Some(y)) => x == y,
        (None, None) => false,
        (Some(t), None) => loose_time_match(&t, b),
        (None, Some(t)) => loose_time_match(&t, a),
    }
}

fn loose_time_match(t: &DateTime<chrono::FixedOffset>, s: &str) -> bool {
    s.contains(&t.second().to_string()) && s.contains(&t.minute().to_string())
}

/// Whether everything stated in `criteria` can be found on `existing`.
///
/// - `Null` criteria matches `Null` and any container (an absent filter).
/// - Arrays compare by shape only: any array matches any array.
/// - Objects recurse field-wise over the criteria's keys.
/// - Strings get the [`time_equal`] tolerance; a number matches a string
///   only when its lexical form equals the string.
pub fn values_match(criteria: &Value, existing: &Value) -> bool {
    match (criteria, existing) {
        (Value::Null, Value::Null | Value::Object(_) | Value::Array(_)) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => number_equal(a, b),
        (Value::String(a), Value::String(b)) => a == b || time_equal(a, b),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        (Value::Array(_), Value::Array(_)) => true,
        (Value::Object(c), Value::Object(e)) => c
            .iter()
            .all(|(k, v)| values_match(v, e.get(k).unwrap_or(&Value::Null))),
        _ => false,
    }
}

/// Whether `big` has every key that `small` has.
pub fn map_is_compatible(big: &JsonMap, small: &JsonMap) -> bool {
    small.keys().all(|k| big.contains_key(k))
}

/// Merge `src` into `dst`, overwriting on conflict.
pub fn map_combine(dst: &mut JsonMap, src: &JsonMap) {
    for (k, v) in src {
        dst.insert(k.clone(), v.clone());
    }
}

/// Merge `src` into `dst`, keeping the `dst` value on conflict.
pub fn map_add(dst: &mut JsonMap, src: &JsonMap) {
    for (k, v) in src {
        dst.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

/// Replace values in `dst` with the `src` values under matching keys.
/// Keys that only exist in `src` are not copied over.
pub fn map_replace(dst: &mut JsonMap, src: &JsonMap) {
    for (k, v) in src {
        if let Some(slot) = dst.get_mut(k) {
            *slot = v.clone();
        }
    }
}

/// Drop all top-level null entries.
pub fn remove_nulls(map: &mut JsonMap) {
    map.retain(|_, v| !v.is_null());
}

/// Visit every object field nested anywhere inside `value`, parents first.
/// The callback can stop the walk early with `ControlFlow::Break`.
pub fn iterate_fields<F>(value: &Value, f: &mut F) -> ControlFlow<()>
where
    F: FnMut(&str, &Value) -> ControlFlow<()>,
{
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                f(k, v)?;
            }
            for v in map.values() {
                iterate_fields(v, f)?;
            }
            ControlFlow::Continue(())
        }
        Value::Array(items) => {
            for item in items {
                iterate_fields(item, f)?;
            }
            ControlFlow::Continue(())
        }
        _ => ControlFlow::Continue(()),
    }
}

/// Visit every object nested anywhere inside `value`, parents first.
pub fn iterate_maps<F>(value: &Value, f: &mut F) -> ControlFlow<()>
where
    F: FnMut(&JsonMap) -> ControlFlow<()>,
{
    match value {
        Value::Object(map) => {
            f(map)?;
            for v in map.values() {
                iterate_maps(v, f)?;
            }
            ControlFlow::Continue(())
        }
        Value::Array(items) => {
            for item in items {
                iterate_maps(item, f)?;
            }
            ControlFlow::Continue(())
        }
        _ => ControlFlow::Continue(()),
    }
}

/// Render a value for a query/header/form slot. Strings are bare, arrays
/// join their elements with commas, containers fall back to compact JSON.
pub fn to_param_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(to_param_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}
