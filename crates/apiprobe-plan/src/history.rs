//! Execution history and `{{test.section.field}}` reference resolution.
//!
//! Later tests reach into earlier tests' resolved parameters and observed
//! outputs. The history is append-only and concurrency-safe; lookups by
//! name return the most recent match.

use std::ops::ControlFlow;

use apiprobe_types::{iterate_fields, JsonMap};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::model::{Test, EXPECT_BODY};

/// Append-only record of executed tests.
#[derive(Debug, Default)]
pub struct TestHistory {
    tests: Mutex<Vec<Test>>,
}

impl TestHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, test: Test) {
        self.tests.lock().push(test);
    }

    /// The most recent executed test with this name.
    pub fn get_test(&self, name: &str) -> Option<Test> {
        self.tests
            .lock()
            .iter()
            .rev()
            .find(|t| t.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.lock().is_empty()
    }
}

impl Test {
    /// Look a dotted path up on this test. `path[0]` names the section;
    /// the rest walks maps. When the exact walk misses and only one
    /// trailing field is given, all nested maps are searched and the
    /// first hit wins.
    pub fn get_param(&self, path: &[&str]) -> Option<Value> {
        if path.len() < 2 {
            return None;
        }
        let section: Option<Value> = match path[0] {
            "pathParams" => Some(Value::Object(self.params.path.clone())),
            "queryParams" => Some(Value::Object(self.params.query.clone())),
            "headerParams" => Some(Value::Object(self.params.header.clone())),
            "formParams" => Some(Value::Object(self.params.form.clone())),
            "bodyParams" => self.params.body.clone(),
            "outputs" => self.expect.as_ref().and_then(|e| e.get(EXPECT_BODY)).cloned(),
            _ => None,
        };
        let section = section?;

        let mut cursor = Some(&section);
        for field in &path[1..] {
            cursor = cursor
                .and_then(Value::as_object)
                .and_then(|m| m.get(*field));
        }
        if let Some(found) = cursor {
            return Some(found.clone());
        }

        if path.len() == 2 {
            let mut found = None;
            let _ = iterate_fields(&section, &mut |key, value| {
                if key == path[1] {
                    found = Some(value.clone());
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
            return found;
        }
        None
    }
}

/// Resolve one `{{testName.section.field}}` template against the history.
/// Returns `None` when the string holds no template or nothing resolves.
pub fn resolve_string(value: &str, history: &TestHistory) -> Option<Value> {
    let begin = value.find("{{")?;
    let end = value.find("}}")?;
    if end <= begin {
        return None;
    }
    let inner = value[begin + 2..end].trim();
    let parts: Vec<&str> = inner.split('.').collect();
    if parts.len() < 3 {
        warn!(
            template = inner,
            "invalid parameter reference, expected {{{{testName.section.field}}}}"
        );
        return None;
    }
    let test = history.get_test(parts[0])?;
    test.get_param(&parts[1..])
}

/// Resolve templates in every string value of a map, in place.
pub fn resolve_map(map: &mut JsonMap, history: &TestHistory) {
    for value in map.values_mut() {
        if let Value::String(s) = value {
            if let Some(resolved) = resolve_string(s, history) {
                *value = resolved;
            }
        }
    }
}

fn resolve_array(items: &mut [Value], history: &TestHistory) {
    for item in items {
        match item {
            Value::Object(map) => resolve_map(map, history),
            Value::String(s) => {
                if let Some(resolved) = resolve_string(s, history) {
                    *item = resolved;
                }
            }
            _ => {}
        }
    }
}

impl Test {
    /// Resolve every history template in this test's parameter buckets.
    pub fn resolve_history_params(&mut self, history: &TestHistory) {
        resolve_map(&mut self.params.path, history);
        resolve_map(&mut self.params.form, history);
        resolve_map(&mut self.params.header, history);
        resolve_map(&mut self.params.query, history);
        match &mut self.params.body {
            Some(Value::Object(map)) => resolve_map(map, history),
            Some(Value::Array(items)) => resolve_array(items, history),
            Some(Value::String(s)) => {
                if let Some(resolved) = resolve_string(s, history) {
                    self.params.body = Some(resolved);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn seeded_history() -> TestHistory {
        let history = TestHistory::new();
        let mut t = Test {
            name: "post_pets_1".into(),
            path: "/pets".into(),
            method: "post".into(),
            ..Test::default()
        };
        t.params.path.insert("id".into(), json!(7));
        t.set_expect_to_observed(200, Some(&json!({"pet": {"id": 42, "name": "fido"}})));
        history.append(t);
        history
    }

    #[test]
    fn exact_path_resolution() {
        let history = seeded_history();
        let resolved = resolve_string("{{post_pets_1.pathParams.id}}", &history).unwrap();
        assert_eq!(resolved, json!(7));
        let resolved = resolve_string("{{post_pets_1.outputs.pet.id}}", &history).unwrap();
        assert_eq!(resolved, json!(42));
    }

    #[test]
    fn single_trailing_field_searches_nested_maps() {
        let history = seeded_history();
        // `outputs.id` misses the exact walk (id is nested under pet) but
        // the deep search finds it.
        let resolved = resolve_string("{{post_pets_1.outputs.id}}", &history).unwrap();
        assert_eq!(resolved, json!(42));
    }

    #[test]
    fn unresolvable_forms() {
        let history = seeded_history();
        assert!(resolve_string("no template", &history).is_none());
        assert!(resolve_string("{{too.short}}", &history).is_none());
        assert!(resolve_string("{{ghost.pathParams.id}}", &history).is_none());
        assert!(resolve_string("{{post_pets_1.outputs.nope}}", &history).is_none());
    }

    #[test]
    fn latest_match_wins() {
        let history = seeded_history();
        let mut newer = Test {
            name: "post_pets_1".into(),
            ..Test::default()
        };
        newer.params.path.insert("id".into(), json!(99));
        history.append(newer);
        let resolved = resolve_string("{{post_pets_1.pathParams.id}}", &history).unwrap();
        assert_eq!(resolved, json!(99));
    }

    #[test]
    fn buckets_resolve_in_place() {
        let history = seeded_history();
        let mut t = Test::default();
        t.params
            .path
            .insert("id".into(), json!("{{post_pets_1.pathParams.id}}"));
        t.params.body = Some(json!({"owner": "{{post_pets_1.outputs.name}}"}));
        t.resolve_history_params(&history);
        assert_eq!(t.params.path["id"], json!(7));
        assert_eq!(t.params.body.unwrap()["owner"], json!("fido"));
    }

    #[test]
    fn concurrent_append_and_get() {
        let history = Arc::new(TestHistory::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let h = Arc::clone(&history);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    let t = Test {
                        name: format!("t{i}_{j}"),
                        ..Test::default()
                    };
                    h.append(t);
                    // Anything appended before the query must be found.
                    let found = h.get_test(&format!("t{i}_{j}")).unwrap();
                    assert_eq!(found.name, format!("t{i}_{j}"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(history.len(), 200);
    }
}
