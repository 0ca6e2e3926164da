//! Schema-driven data generation.
//!
//! Values are produced in precedence order: reference reuse, enums, allOf
//! composition, objects, arrays, primitives. Tagged parameters first try
//! to *borrow* a live value from the shadow store (that is what makes
//! `GET /pets/{id}` reach for a previously created pet's id), and every
//! generated parameter leaf records a comparison so the executor knows
//! what the call was meant to do.

use std::collections::HashSet;
use std::sync::Arc;

use apiprobe_error::{ProbeError, Result};
use apiprobe_spec::{
    resolve_ref, tag_of, ApiSpec, ParamLocation, Parameter, Schema, METHOD_GET, METHOD_PATCH,
    METHOD_POST, METHOD_PUT,
};
use apiprobe_store::{match_always, Associations, ShadowDb};
use apiprobe_types::{map_combine, sample_pattern, JsonMap, MeqaTag};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use rand::rngs::SmallRng;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::compare::Comparison;
use crate::model::Test;

const EMAIL_PATTERN: &str = r"^\w+@[a-zA-Z_]+?\.[a-zA-Z]{2,3}$";

/// The generator: schema in, value out, comparisons recorded on the test.
pub struct Generator<'a> {
    pub spec: &'a ApiSpec,
    pub plan_db: &'a ShadowDb,
    pub suite_db: &'a ShadowDb,
    pub rng: &'a mut SmallRng,
}

impl<'a> Generator<'a> {
    /// Record a single-field comparison for a tagged parameter value.
    pub fn add_basic_comparison(
        &mut self,
        test: &mut Test,
        tag: Option<&MeqaTag>,
        param: Option<&Parameter>,
        value: &Value,
    ) {
        let Some(param) = param else { return };
        let Some(tag) = tag else { return };
        if tag.class.is_empty() || tag.property.is_empty() {
            return;
        }
        let op = if !tag.operation.is_empty() {
            tag.operation.clone()
        } else if matches!(param.location, ParamLocation::Body | ParamLocation::FormData) {
            METHOD_PUT.to_owned()
        } else {
            METHOD_GET.to_owned()
        };

        if let Some(comps) = test.comparisons.get_mut(&tag.class) {
            if let Some(last) = comps.last_mut() {
                if let Some(spill) = last.set_for_op(&op, &tag.property, value.clone()) {
                    comps.push(spill);
                }
                return;
            }
        }
        let mut comp = Comparison::with_schema(self.plan_db.schema_of(&tag.class));
        comp.set_for_op(&op, &tag.property, value.clone());
        test.comparisons.entry(tag.class.clone()).or_default().push(comp);
    }

    /// Record a whole-object comparison under the tag's class (or the
    /// first definition the object matches).
    pub fn add_object_comparison(
        &mut self,
        test: &mut Test,
        tag: &MeqaTag,
        obj: JsonMap,
        schema: &Schema,
    ) {
        let mut method = tag.operation.clone();
        if method.is_empty() {
            method = match &test.tag {
                Some(op_tag) if !op_tag.operation.is_empty() => op_tag.operation.clone(),
                _ => test.method.clone(),
            };
        }
        let class = if tag.class.is_empty() {
            match self.plan_db.find_matching_class(&Value::Object(obj.clone())) {
                Some(c) => c,
                None => {
                    warn!("cannot find a known schema for a generated object");
                    return;
                }
            }
        } else {
            tag.class.clone()
        };

        if method == METHOD_POST || method == METHOD_PUT || method == METHOD_PATCH {
            let comps = test.comparisons.entry(class.clone()).or_default();
            if let Some(last) = comps.last_mut() {
                if last.new.is_none() {
                    last.new = Some(obj);
                    return;
                }
            }
            let mut comp = Comparison::with_schema(
                self.plan_db
                    .schema_of(&class)
                    .or_else(|| Some(Arc::new(schema.clone()))),
            );
            comp.new = Some(obj);
            comps.push(comp);
        } else {
            warn!(class = %class, "unexpected object generation for a read operation");
        }
    }

    /// Generate the value for one operation parameter.
    pub fn generate_parameter(&mut self, test: &mut Test, param: &Parameter) -> Result<Value> {
        let tag = MeqaTag::from_description(param.description.as_deref());
        if let Some(schema) = &param.schema {
            return self.generate_schema(test, "", tag.as_ref(), schema, 3);
        }
        if !param.enum_values.is_empty() {
            return self.pick_enum(&param.enum_values);
        }
        if param.param_type.is_none() {
            return Err(ProbeError::UntypedSchema {
                context: param.name.clone(),
            });
        }
        let schema = param.to_schema();
        match schema.schema_type.as_deref() {
            Some("object") => self.generate_object(test, "", tag.as_ref(), &schema, 3),
            Some("array") => self.generate_array(test, "", tag.as_ref(), &schema, 3),
            _ => self.generate_by_type(test, &schema, &param.name, tag.as_ref(), Some(param)),
        }
    }

    /// Generate a value satisfying a schema. `prefix` is non-empty when
    /// the schema is a field of a containing object, which turns refs
    /// into store lookups instead of fresh objects.
    pub fn generate_schema(
        &mut self,
        test: &mut Test,
        prefix: &str,
        parent_tag: Option<&MeqaTag>,
        schema: &Schema,
        depth: usize,
    ) -> Result<Value> {
        let own_tag = tag_of(schema);
        let tag = own_tag.as_ref().or(parent_tag);

        if let Some((ref_name, referred)) = resolve_ref(schema, self.spec)? {
            if !prefix.is_empty() {
                // A foreign key: reuse an existing object or leave null.
                let mut found = self.suite_db.find(
                    &ref_name,
                    &Value::Null,
                    &Associations::new(),
                    match_always,
                    1,
                );
                if found.is_empty() {
                    found = self.plan_db.find(
                        &ref_name,
                        &Value::Null,
                        &Associations::new(),
                        match_always,
                        1,
                    );
                }
                debug!(class = %ref_name, hit = !found.is_empty(), "field reference lookup");
                return Ok(found.into_iter().next().unwrap_or(Value::Null));
            }
            let ref_tag = MeqaTag::new(ref_name, "", "", 0);
            let referred = referred.clone();
            return self.generate_schema(test, prefix, Some(&ref_tag), &referred, depth);
        }

        if !schema.enum_values.is_empty() {
            return self.pick_enum(&schema.enum_values);
        }

        if !schema.all_of.is_empty() {
            return self.generate_all_of(test, prefix, tag.cloned(), schema, depth);
        }

        match schema.effective_type() {
            "object" => {
                let tag = tag.cloned();
                self.generate_object(test, prefix, tag.as_ref(), schema, depth)
            }
            "array" => {
                let tag = tag.cloned();
                self.generate_array(test, prefix, tag.as_ref(), schema, depth)
            }
            _ => {
                let tag = tag.cloned();
                self.generate_by_type(test, schema, prefix, tag.as_ref(), None)
            }
        }
    }

    /// Merge every branch's object. The discriminator, when present, is
    /// overwritten with the tagged class name so polymorphic consumers
    /// route the payload; the source behavior is preserved even for
    /// server-assigned discriminators.
    fn generate_all_of(
        &mut self,
        test: &mut Test,
        prefix: &str,
        tag: Option<MeqaTag>,
        schema: &Schema,
        depth: usize,
    ) -> Result<Value> {
        let mut combined = JsonMap::new();
        let mut discriminator = String::new();
        for branch in &schema.all_of {
            let value = self.generate_schema(test, prefix, None, branch, depth)?;
            match value {
                Value::Object(map) => map_combine(&mut combined, &map),
                other => {
                    return Err(ProbeError::AllOfNotObject {
                        context: other.to_string(),
                    })
                }
            }
            if let Some(d) = &branch.discriminator {
                discriminator = d.clone();
            } else if let Some((_, referred)) = resolve_ref(branch, self.spec)? {
                if let Some(d) = &referred.discriminator {
                    discriminator = d.clone();
                }
            }
        }
        if let Some(tag) = &tag {
            if !discriminator.is_empty() && !tag.class.is_empty() {
                combined.insert(discriminator, Value::from(tag.class.clone()));
            }
            self.add_object_comparison(test, tag, combined.clone(), schema);
        }
        Ok(Value::Object(combined))
    }

    fn generate_object(
        &mut self,
        test: &mut Test,
        _prefix: &str,
        parent_tag: Option<&MeqaTag>,
        schema: &Schema,
        depth: usize,
    ) -> Result<Value> {
        let mut obj = JsonMap::new();
        for (key, prop) in &schema.properties {
            let value = self.generate_schema(test, &format!("{key}_"), None, prop, depth + 1)?;
            obj.insert(key.clone(), value);
        }
        let tag = tag_of(schema).or_else(|| parent_tag.cloned());
        if let Some(tag) = tag {
            self.add_object_comparison(test, &tag, obj.clone(), schema);
        }
        Ok(Value::Object(obj))
    }

    fn generate_array(
        &mut self,
        test: &mut Test,
        prefix: &str,
        parent_tag: Option<&MeqaTag>,
        schema: &Schema,
        depth: usize,
    ) -> Result<Value> {
        let rolled = if schema.max_items.is_some() || schema.min_items.is_some() {
            let max_items = match schema.max_items {
                Some(m) if m >= 1 => m as usize,
                Some(_) => 1,
                None => 10,
            };
            let min_items = match schema.min_items {
                Some(m) if m >= 1 => m as usize,
                _ => 0,
            };
            let diff = max_items.saturating_sub(min_items).max(1);
            self.rng.gen_range(0..diff) + min_items
        } else {
            self.rng.gen_range(0..10)
        };
        let num_items = rolled.max(1);

        let item_schema = schema.items.as_deref().ok_or_else(|| ProbeError::UntypedSchema {
            context: format!("array '{prefix}' without items"),
        })?;
        let tag = tag_of(schema).or_else(|| parent_tag.cloned());

        let mut seen: Option<HashSet<String>> = schema.unique_items.then(HashSet::new);
        let mut items = Vec::new();
        for _ in 0..=num_items {
            let entry = self.generate_schema(test, prefix, tag.as_ref(), item_schema, depth)?;
            if entry.is_null() {
                continue;
            }
            if let Some(seen) = &mut seen {
                if !seen.insert(entry.to_string()) {
                    continue;
                }
            }
            items.push(entry);
        }
        Ok(Value::Array(items))
    }

    /// Primitive dispatch, preceded by the tagged-parameter borrow: when a
    /// parameter is tagged `class.property`, a live object's field is
    /// reused before anything is generated.
    fn generate_by_type(
        &mut self,
        test: &mut Test,
        schema: &Schema,
        prefix: &str,
        parent_tag: Option<&MeqaTag>,
        param: Option<&Parameter>,
    ) -> Result<Value> {
        let own_tag = tag_of(schema);
        let tag = own_tag.as_ref().or(parent_tag);

        if param.is_some() {
            if let Some(tag) = tag {
                if !tag.property.is_empty() {
                    if let Some(value) = self.borrow_tagged_value(test, tag) {
                        return Ok(value);
                    }
                }
            }
        }

        let value = match schema.effective_type() {
            "boolean" => Value::Bool(self.rng.gen_bool(0.5)),
            "integer" => Value::from(self.generate_int(schema)?),
            "number" => {
                let f = self.generate_float(schema)?;
                json!(f)
            }
            "string" => Value::from(self.generate_string(schema, prefix)?),
            "file" => {
                return Err(ProbeError::FileParameter {
                    name: prefix.to_owned(),
                })
            }
            other => {
                return Err(ProbeError::UntypedSchema {
                    context: format!("{prefix}: unrecognized type '{other}'"),
                })
            }
        };
        let tag = tag.cloned();
        self.add_basic_comparison(test, tag.as_ref(), param, &value);
        Ok(value)
    }

    /// Reuse a value for a `class.property` tag: first from an existing
    /// comparison's lookup object, then from the suite store, then from
    /// the plan store. Records the borrow on a comparison either way.
    fn borrow_tagged_value(&mut self, test: &mut Test, tag: &MeqaTag) -> Option<Value> {
        if let Some(comps) = test.comparisons.get_mut(&tag.class) {
            for comp in comps.iter_mut() {
                if let Some(old) = &comp.old {
                    let value = old.get(&tag.property).cloned().unwrap_or(Value::Null);
                    comp.old_used.insert(tag.property.clone(), value.clone());
                    debug!(class = %tag.class, property = %tag.property, "borrowed from comparison");
                    return Some(value);
                }
            }
        }

        let mut found = self.suite_db.find(
            &tag.class,
            &Value::Null,
            &Associations::new(),
            match_always,
            5,
        );
        if found.is_empty() {
            found = self.plan_db.find(
                &tag.class,
                &Value::Null,
                &Associations::new(),
                match_always,
                5,
            );
        }
        if found.is_empty() {
            return None;
        }
        let picked = found.swap_remove(self.rng.gen_range(0..found.len()));
        let obj = picked.as_object().cloned().unwrap_or_default();
        let value = obj.get(&tag.property).cloned().unwrap_or(Value::Null);
        let mut comp = Comparison::with_schema(self.plan_db.schema_of(&tag.class));
        comp.old = Some(obj);
        comp.old_used.insert(tag.property.clone(), value.clone());
        test.comparisons.entry(tag.class.clone()).or_default().push(comp);
        debug!(class = %tag.class, property = %tag.property, "borrowed from shadow store");
        Some(value)
    }

    fn pick_enum(&mut self, values: &[Value]) -> Result<Value> {
        Ok(values[self.rng.gen_range(0..values.len())].clone())
    }

    fn generate_float(&mut self, schema: &Schema) -> Result<f64> {
        let mut real_min = schema
            .minimum
            .map(|m| if schema.exclusive_minimum { m + 0.01 } else { m })
            .unwrap_or(0.0);
        let mut real_max = schema
            .maximum
            .map(|m| if schema.exclusive_maximum { m - 0.01 } else { m })
            .unwrap_or(0.0);
        if real_min >= real_max {
            match (schema.minimum, schema.maximum) {
                (None, None) => {
                    real_min = -1.0;
                    real_max = 1.0;
                }
                (Some(_), None) => real_max = real_min + real_min.abs(),
                (None, Some(_)) => real_min = real_max - real_max.abs(),
                (Some(min), Some(max)) => {
                    return Err(ProbeError::BadBounds { min, max });
                }
            }
        }
        if real_min >= real_max {
            return Ok(real_min);
        }
        Ok(self.rng.gen_range(real_min..real_max))
    }

    fn generate_int(&mut self, schema: &Schema) -> Result<i64> {
        let mut schema = schema.clone();
        if schema.maximum.is_none() && schema.minimum.is_none() {
            schema.maximum = Some(1_000_000.0);
        }
        let f = self.generate_float(&schema)?;
        let mut i = f as i64;
        if let Some(min) = schema.minimum {
            if i <= min as i64 {
                i += 1;
            }
        }
        Ok(i)
    }

    fn generate_string(&mut self, schema: &Schema, prefix: &str) -> Result<String> {
        let format = schema.format.as_deref().unwrap_or_default();
        match format {
            "date-time" => {
                let back = self.rng.gen_range(0..60 * 60 * 24 * 30);
                let t = Utc::now() - ChronoDuration::seconds(back);
                return Ok(t.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            "date" => {
                let back = self.rng.gen_range(0..60 * 60 * 24 * 30);
                let t = Utc::now() - ChronoDuration::seconds(back);
                return Ok(t.format("%Y-%m-%d").to_string());
            }
            "uuid" => return Ok(Uuid::new_v4().to_string()),
            _ => {}
        }

        let (pattern, limit) = match (&schema.pattern, format) {
            (_, "email") => (EMAIL_PATTERN.to_owned(), 6),
            (Some(p), _) => (p.clone(), p.len() * 2),
            (None, _) => (format!("{prefix}\\d+"), prefix.len() + 5),
        };
        let sampled = sample_pattern(&pattern, limit, self.rng)?;

        match format {
            "" | "password" | "email" => Ok(sampled),
            "byte" => Ok(BASE64_STANDARD.encode(sampled.as_bytes())),
            "binary" => Ok(hex::encode(sampled.as_bytes())),
            "uri" | "url" => Ok(format!("https://www.google.com/search?q={sampled}")),
            other => Err(ProbeError::UnknownFormat {
                format: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiprobe_spec::ApiSpec;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn spec() -> Arc<ApiSpec> {
        Arc::new(
            ApiSpec::from_str_any(
                r#"
swagger: "2.0"
definitions:
  Pet:
    type: object
    properties:
      id: { type: integer }
      name: { type: string }
"#,
            )
            .unwrap(),
        )
    }

    struct Fixture {
        spec: Arc<ApiSpec>,
        plan_db: ShadowDb,
        suite_db: ShadowDb,
        rng: SmallRng,
    }

    impl Fixture {
        fn new() -> Self {
            let spec = spec();
            let plan_db = ShadowDb::new(Arc::clone(&spec));
            let suite_db = plan_db.clone_schema();
            Self {
                spec,
                plan_db,
                suite_db,
                rng: SmallRng::seed_from_u64(11),
            }
        }

        fn generator(&mut self) -> Generator<'_> {
            Generator {
                spec: &self.spec,
                plan_db: &self.plan_db,
                suite_db: &self.suite_db,
                rng: &mut self.rng,
            }
        }
    }

    fn int_param(name: &str, description: &str) -> Parameter {
        Parameter {
            name: name.to_owned(),
            location: ParamLocation::Path,
            description: Some(description.to_owned()),
            param_type: Some("integer".to_owned()),
            ..Parameter::default()
        }
    }

    #[test]
    fn tagged_parameter_borrows_from_store() {
        let mut fx = Fixture::new();
        fx.plan_db
            .insert("Pet", json!({"id": 7, "name": "fido"}), Associations::new())
            .unwrap();
        let mut test = Test {
            method: "get".into(),
            ..Test::default()
        };
        let param = int_param("id", "the pet <meqa Pet.id>");
        let mut generator = fx.generator();
        let value = generator.generate_parameter(&mut test, &param).unwrap();
        assert_eq!(value, json!(7));

        let comps = &test.comparisons["Pet"];
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].old_used["id"], json!(7));
        assert_eq!(comps[0].old.as_ref().unwrap()["name"], json!("fido"));
    }

    #[test]
    fn suite_store_preferred_over_plan_store() {
        let mut fx = Fixture::new();
        fx.plan_db
            .insert("Pet", json!({"id": 1}), Associations::new())
            .unwrap();
        fx.suite_db
            .insert("Pet", json!({"id": 2}), Associations::new())
            .unwrap();
        let mut test = Test::default();
        let param = int_param("id", "<meqa Pet.id>");
        let mut generator = fx.generator();
        let value = generator.generate_parameter(&mut test, &param).unwrap();
        assert_eq!(value, json!(2));
    }

    #[test]
    fn untagged_parameter_generates_and_skips_comparisons() {
        let mut fx = Fixture::new();
        let mut test = Test::default();
        let param = int_param("limit", "page size");
        let mut generator = fx.generator();
        let value = generator.generate_parameter(&mut test, &param).unwrap();
        let n = value.as_i64().unwrap();
        assert!((0..1_000_000).contains(&n));
        assert!(test.comparisons.is_empty());
    }

    #[test]
    fn body_ref_generates_object_and_records_new() {
        let mut fx = Fixture::new();
        let mut test = Test {
            method: "post".into(),
            ..Test::default()
        };
        let param = Parameter {
            name: "body".into(),
            location: ParamLocation::Body,
            schema: Some(Schema {
                reference: Some("#/definitions/Pet".into()),
                ..Schema::default()
            }),
            ..Parameter::default()
        };
        let mut generator = fx.generator();
        let value = generator.generate_parameter(&mut test, &param).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("id"));
        assert!(obj["name"].is_string());

        let comps = &test.comparisons["Pet"];
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].new.as_ref().unwrap(), obj);
        assert!(comps[0].old.is_none());
    }

    #[test]
    fn field_reference_reuses_or_nulls() {
        let mut fx = Fixture::new();
        let field = Schema {
            reference: Some("#/definitions/Pet".into()),
            ..Schema::default()
        };
        let mut test = Test::default();
        // Empty stores: the foreign key is left null.
        let mut generator = fx.generator();
        let value = generator
            .generate_schema(&mut test, "pet_", None, &field, 1)
            .unwrap();
        assert!(value.is_null());
        drop(generator);

        fx.plan_db
            .insert("Pet", json!({"id": 3}), Associations::new())
            .unwrap();
        let mut generator = fx.generator();
        let value = generator
            .generate_schema(&mut test, "pet_", None, &field, 1)
            .unwrap();
        assert_eq!(value, json!({"id": 3}));
    }

    #[test]
    fn enums_pick_members() {
        let mut fx = Fixture::new();
        let schema = Schema {
            schema_type: Some("string".into()),
            enum_values: vec![json!("a"), json!("b"), json!("c")],
            ..Schema::default()
        };
        let mut test = Test::default();
        let mut generator = fx.generator();
        for _ in 0..10 {
            let v = generator
                .generate_schema(&mut test, "", None, &schema, 1)
                .unwrap();
            assert!(schema.enum_values.contains(&v));
        }
    }

    #[test]
    fn string_formats() {
        let mut fx = Fixture::new();
        let mut test = Test::default();
        let mut generator = fx.generator();
        let mut schema_for = |format: &str| Schema {
            schema_type: Some("string".into()),
            format: Some(format.to_owned()),
            ..Schema::default()
        };

        let dt = generator
            .generate_schema(&mut test, "", None, &schema_for("date-time"), 1)
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(dt.as_str().unwrap()).is_ok());

        let date = generator
            .generate_schema(&mut test, "", None, &schema_for("date"), 1)
            .unwrap();
        assert!(chrono::NaiveDate::parse_from_str(date.as_str().unwrap(), "%Y-%m-%d").is_ok());

        let id = generator
            .generate_schema(&mut test, "", None, &schema_for("uuid"), 1)
            .unwrap();
        assert!(Uuid::parse_str(id.as_str().unwrap()).is_ok());

        let email = generator
            .generate_schema(&mut test, "", None, &schema_for("email"), 1)
            .unwrap();
        assert!(email.as_str().unwrap().contains('@'));

        let b64 = generator
            .generate_schema(&mut test, "tok_", None, &schema_for("byte"), 1)
            .unwrap();
        assert!(BASE64_STANDARD.decode(b64.as_str().unwrap()).is_ok());

        let bin = generator
            .generate_schema(&mut test, "tok_", None, &schema_for("binary"), 1)
            .unwrap();
        assert!(hex::decode(bin.as_str().unwrap()).is_ok());

        let uri = generator
            .generate_schema(&mut test, "link_", None, &schema_for("uri"), 1)
            .unwrap();
        assert!(uri.as_str().unwrap().starts_with("https://"));

        let err = generator
            .generate_schema(&mut test, "", None, &schema_for("quaternion"), 1)
            .unwrap_err();
        assert!(matches!(err, ProbeError::UnknownFormat { .. }));
    }

    #[test]
    fn plain_strings_use_prefix() {
        let mut fx = Fixture::new();
        let mut test = Test::default();
        let schema = Schema {
            schema_type: Some("string".into()),
            ..Schema::default()
        };
        let mut generator = fx.generator();
        let v = generator
            .generate_schema(&mut test, "name_", None, &schema, 1)
            .unwrap();
        assert!(v.as_str().unwrap().starts_with("name_"));
    }

    #[test]
    fn float_bounds_respected() {
        let mut fx = Fixture::new();
        let schema = Schema {
            schema_type: Some("number".into()),
            minimum: Some(5.0),
            maximum: Some(6.0),
            exclusive_minimum: true,
            ..Schema::default()
        };
        let mut test = Test::default();
        let mut generator = fx.generator();
        for _ in 0..20 {
            let v = generator
                .generate_schema(&mut test, "", None, &schema, 1)
                .unwrap();
            let f = v.as_f64().unwrap();
            assert!(f >= 5.01 && f < 6.0, "{f}");
        }

        let conflicting = Schema {
            schema_type: Some("number".into()),
            minimum: Some(9.0),
            maximum: Some(2.0),
            ..Schema::default()
        };
        assert!(matches!(
            generator.generate_schema(&mut test, "", None, &conflicting, 1),
            Err(ProbeError::BadBounds { .. })
        ));
    }

    #[test]
    fn arrays_honor_bounds_and_uniqueness() {
        let mut fx = Fixture::new();
        let schema = Schema {
            schema_type: Some("array".into()),
            min_items: Some(2),
            max_items: Some(4),
            unique_items: true,
            items: Some(Box::new(Schema {
                schema_type: Some("integer".into()),
                minimum: Some(0.0),
                maximum: Some(3.0),
                ..Schema::default()
            })),
            ..Schema::default()
        };
        let mut test = Test::default();
        let mut generator = fx.generator();
        for _ in 0..10 {
            let v = generator
                .generate_schema(&mut test, "n_", None, &schema, 1)
                .unwrap();
            let items = v.as_array().unwrap();
            let mut seen = HashSet::new();
            for item in items {
                assert!(seen.insert(item.to_string()), "duplicates in {items:?}");
            }
        }
    }

    #[test]
    fn file_parameters_are_rejected() {
        let mut fx = Fixture::new();
        let mut test = Test::default();
        let schema = Schema {
            schema_type: Some("file".into()),
            ..Schema::default()
        };
        let mut generator = fx.generator();
        let err = generator
            .generate_schema(&mut test, "upload_", None, &schema, 1)
            .unwrap_err();
        assert!(matches!(err, ProbeError::FileParameter { .. }));
    }
}
