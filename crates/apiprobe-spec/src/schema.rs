//! Operations on schema fragments: reference resolution, traversal, and
//! the structural response checker.
//!
//! The checker is deliberately tolerant: real-world OpenAPI documents
//! under-declare their objects, so an object is accepted when at least
//! [`SchemaParseOptions::field_coverage`] of its keys are recognized.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use apiprobe_error::{ProbeError, Result};
use apiprobe_types::MeqaTag;
use serde_json::Value;

use crate::document::{ApiSpec, Schema};

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Values collected while parsing a response: definition name → matching
/// objects, plus `class.property` → field values for tagged fields.
pub type Collection = BTreeMap<String, Vec<Value>>;

/// Knobs for the structural checker.
#[derive(Debug, Clone, Copy)]
pub struct SchemaParseOptions {
    /// Minimum fraction of an object's keys that must be recognized by the
    /// schema for the object to parse.
    pub field_coverage: f64,
}

impl Default for SchemaParseOptions {
    fn default() -> Self {
        Self {
            field_coverage: 0.75,
        }
    }
}

/// The tag embedded in this schema's description, if any.
pub fn tag_of(schema: &Schema) -> Option<MeqaTag> {
    MeqaTag::from_description(schema.description.as_deref())
}

/// Follow a single `$ref`. Returns `None` when the schema is not a
/// reference; fails on any form other than `#/definitions/<Name>` or a
/// missing target.
pub fn resolve_ref<'a>(schema: &Schema, spec: &'a ApiSpec) -> Result<Option<(String, &'a Schema)>> {
    let Some(reference) = &schema.reference else {
        return Ok(None);
    };
    let name = reference
        .strip_prefix(DEFINITIONS_PREFIX)
        .ok_or_else(|| ProbeError::InvalidRef {
            reference: reference.clone(),
        })?;
    if name.is_empty() || name.contains('/') {
        return Err(ProbeError::InvalidRef {
            reference: reference.clone(),
        });
    }
    let target = spec
        .definition(name)
        .ok_or_else(|| ProbeError::RefNotFound {
            name: name.to_owned(),
        })?;
    Ok(Some((name.to_owned(), target)))
}

/// Parent-first traversal of a schema tree.
///
/// The callback receives the referent's definition name when a node is
/// reached through a `$ref` (refs are not descended into), `None`
/// otherwise. A schema tagged *weak* is pruned when `follow_weak` is
/// false.
pub fn iterate<'a, F>(
    schema: &'a Schema,
    spec: &'a ApiSpec,
    follow_weak: bool,
    f: &mut F,
) -> Result<ControlFlow<()>>
where
    F: FnMut(Option<&str>, &Schema) -> Result<ControlFlow<()>>,
{
    if !follow_weak {
        if let Some(tag) = tag_of(schema) {
            if tag.is_weak() {
                return Ok(ControlFlow::Continue(()));
            }
        }
    }

    if let Some((name, referred)) = resolve_ref(schema, spec)? {
        // Invoke on the referent, no nested descent.
        return f(Some(&name), referred);
    }

    if let ControlFlow::Break(()) = f(None, schema)? {
        return Ok(ControlFlow::Break(()));
    }

    for branch in &schema.all_of {
        if let ControlFlow::Break(()) = iterate(branch, spec, follow_weak, f)? {
            return Ok(ControlFlow::Break(()));
        }
    }
    for prop in schema.properties.values() {
        if let ControlFlow::Break(()) = iterate(prop, spec, follow_weak, f)? {
            return Ok(ControlFlow::Break(()));
        }
    }
    if let Some(items) = &schema.items {
        if let ControlFlow::Break(()) = iterate(items, spec, follow_weak, f)? {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// Whether the schema tree references a definition with the given name.
pub fn contains(schema: &Schema, name: &str, spec: &ApiSpec) -> bool {
    let result = iterate(schema, spec, true, &mut |ref_name, _| {
        if ref_name == Some(name) {
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    });
    matches!(result, Ok(ControlFlow::Break(())))
}

fn mismatch(detail: impl Into<String>) -> ProbeError {
    ProbeError::SchemaMismatch {
        detail: detail.into(),
    }
}

fn value_is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        // A numeric string is the decoded form of a JSON number wrapper.
        Value::String(s) => s.parse::<f64>().is_ok(),
        _ => false,
    }
}

fn value_is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.as_i64().is_some() || n.as_u64().is_some() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        Value::String(s) => s.parse::<i64>().is_ok(),
        _ => false,
    }
}

/// Structural check of `value` against `schema`.
///
/// `name` is the definition name when the schema was reached through a
/// `$ref`; a named object that parses cleanly is emitted into
/// `collection[name]`. With `follow_ref` false, refs are treated as opaque
/// and fields tagged `class.property` emit their value under that dotted
/// key instead (used to pick up server-assigned fields).
pub fn parses(
    schema: &Schema,
    spec: &ApiSpec,
    name: &str,
    value: &Value,
    collection: &mut Collection,
    follow_ref: bool,
    opts: &SchemaParseOptions,
) -> Result<()> {
    if let Some((ref_name, referred)) = resolve_ref(schema, spec)? {
        // Without follow_ref the referent is still walked (tagged fields
        // live inside it) but stays anonymous, so no named object is
        // emitted for it.
        let name = if follow_ref { ref_name } else { String::new() };
        return parses(referred, spec, &name, value, collection, follow_ref, opts);
    }

    if !follow_ref {
        if let Some(tag) = tag_of(schema) {
            if !tag.class.is_empty() && !tag.property.is_empty() {
                collection
                    .entry(format!("{}.{}", tag.class, tag.property))
                    .or_default()
                    .push(value.clone());
            }
        }
    }

    if !schema.all_of.is_empty() {
        let obj = value
            .as_object()
            .ok_or_else(|| mismatch(format!("expected an object for an allOf schema, got {value}")))?;
        let mut covered: Vec<&str> = Vec::new();
        for branch in &schema.all_of {
            let resolved = match resolve_ref(branch, spec)? {
                Some((_, referred)) => referred,
                None => branch,
            };
            for (key, prop_schema) in &resolved.properties {
                if let Some(field) = obj.get(key) {
                    parses(prop_schema, spec, "", field, collection, follow_ref, opts)?;
                    if !covered.contains(&key.as_str()) {
                        covered.push(key);
                    }
                }
            }
        }
        if (covered.len() as f64) < opts.field_coverage * obj.len() as f64 {
            return Err(mismatch(format!(
                "allOf branches cover {} of {} fields",
                covered.len(),
                obj.len()
            )));
        }
        if !name.is_empty() {
            collection
                .entry(name.to_owned())
                .or_default()
                .push(value.clone());
        }
        return Ok(());
    }

    match schema.effective_type() {
        "boolean" => {
            if !value.is_boolean() {
                return Err(mismatch(format!("expected a boolean, got {value}")));
            }
        }
        "integer" => {
            if !value_is_integer(value) {
                return Err(mismatch(format!("expected an integer, got {value}")));
            }
        }
        "number" => {
            if !value_is_numeric(value) {
                return Err(mismatch(format!("expected a number, got {value}")));
            }
        }
        "string" => {
            if !value.is_string() {
                return Err(mismatch(format!("expected a string, got {value}")));
            }
        }
        "array" => {
            let items = value
                .as_array()
                .ok_or_else(|| mismatch(format!("expected an array, got {value}")))?;
            let Some(item_schema) = &schema.items else {
                return Ok(());
            };
            for item in items {
                parses(item_schema, spec, name, item, collection, follow_ref, opts)?;
            }
        }
        "object" => {
            let obj = value
                .as_object()
                .ok_or_else(|| mismatch(format!("expected an object, got {value}")))?;
            for required in &schema.required {
                if !obj.contains_key(required) {
                    return Err(mismatch(format!("required field '{required}' is missing")));
                }
            }
            let mut recognized = 0usize;
            for (key, field) in obj {
                if let Some(prop_schema) = schema.properties.get(key) {
                    parses(prop_schema, spec, "", field, collection, follow_ref, opts)?;
                    recognized += 1;
                }
            }
            if !schema.properties.is_empty()
                && (recognized as f64) < opts.field_coverage * obj.len() as f64
            {
                return Err(mismatch(format!(
                    "schema recognizes {recognized} of {} fields",
                    obj.len()
                )));
            }
            if !name.is_empty() {
                collection
                    .entry(name.to_owned())
                    .or_default()
                    .push(value.clone());
            }
        }
        // `file` and vendor types carry nothing checkable.
        _ => {}
    }
    Ok(())
}

/// Error-as-false variant of [`parses`], anonymous and ref-following.
pub fn matches(schema: &Schema, spec: &ApiSpec, value: &Value) -> bool {
    let mut collection = Collection::new();
    parses(
        schema,
        spec,
        "",
        value,
        &mut collection,
        true,
        &SchemaParseOptions::default(),
    )
    .is_ok()
}

/// Find the first definition the object structurally matches.
pub fn find_matching_schema<'a>(spec: &'a ApiSpec, value: &Value) -> Option<(&'a str, &'a Schema)> {
    spec.definitions.iter().find_map(|(def_name, schema)| {
        if !schema.properties.is_empty() && matches(schema, spec, value) {
            Some((def_name.as_str(), schema))
        } else {
            None
        }
    })
}

/// Walk refs and arrays down to the root object type of a schema. Returns
/// the tag naming the object's class (inherited from the ref chain when
/// the description carries none) alongside the object schema.
pub fn schema_root_type<'a>(
    schema: &'a Schema,
    spec: &'a ApiSpec,
    parent_tag: Option<MeqaTag>,
) -> Result<Option<(MeqaTag, &'a Schema)>> {
    let tag = tag_of(schema).or(parent_tag);
    if let Some((ref_name, referred)) = resolve_ref(schema, spec)? {
        let tag = tag.or_else(|| Some(MeqaTag::new(ref_name, "", "", 0)));
        return schema_root_type(referred, spec, tag);
    }
    if schema.schema_type.as_deref() == Some("array") {
        let Some(items) = &schema.items else {
            return Ok(None);
        };
        return schema_root_type(items, spec, tag);
    }
    if schema.is_object_like() {
        return Ok(tag.map(|t| (t, schema)));
    }
    Ok(None)
}
