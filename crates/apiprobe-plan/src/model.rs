//! The plan at rest: tests, suites, the plan itself, and the YAML stream
//! format they travel in.
//!
//! A plan file is a stream of YAML documents separated by `---`; each
//! document maps one suite name to its ordered test list. The suite (and
//! plan) named `meqa_init` is configuration, not dispatchable work.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use apiprobe_error::{ProbeError, Result};
use apiprobe_types::{map_add, map_combine, JsonMap, MeqaTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::compare::Comparison;

/// Name of the configuration suite / configuration test.
pub const MEQA_INIT: &str = "meqa_init";
/// Key of the expected status inside `expect`.
pub const EXPECT_STATUS: &str = "status";
/// Key of the expected body inside `expect`.
pub const EXPECT_BODY: &str = "body";

/// The five parameter buckets a test carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestParams {
    #[serde(rename = "queryParams", skip_serializing_if = "JsonMap::is_empty")]
    pub query: JsonMap,
    #[serde(rename = "formParams", skip_serializing_if = "JsonMap::is_empty")]
    pub form: JsonMap,
    #[serde(rename = "pathParams", skip_serializing_if = "JsonMap::is_empty")]
    pub path: JsonMap,
    #[serde(rename = "headerParams", skip_serializing_if = "JsonMap::is_empty")]
    pub header: JsonMap,
    #[serde(rename = "bodyParams", skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl TestParams {
    /// Overwrite with `src`: source values win on conflict. Map bodies
    /// merge; any other body shape is replaced wholesale.
    pub fn copy_from(&mut self, src: &TestParams) {
        map_combine(&mut self.query, &src.query);
        map_combine(&mut self.form, &src.form);
        map_combine(&mut self.path, &src.path);
        map_combine(&mut self.header, &src.header);
        if let (Some(Value::Object(dst)), Some(Value::Object(src_map))) =
            (self.body.as_mut(), src.body.as_ref())
        {
            map_combine(dst, src_map);
            return;
        }
        self.body = src.body.clone();
    }

    /// Add from `src`: destination values win on conflict. Map bodies
    /// merge; a non-map destination body is kept.
    pub fn add_from(&mut self, src: &TestParams) {
        map_add(&mut self.query, &src.query);
        map_add(&mut self.form, &src.form);
        map_add(&mut self.path, &src.path);
        map_add(&mut self.header, &src.header);
        if let (Some(Value::Object(dst)), Some(Value::Object(src_map))) =
            (self.body.as_mut(), src.body.as_ref())
        {
            map_add(dst, src_map);
            return;
        }
        if self.body.is_none() {
            self.body = src.body.clone();
        }
    }
}

/// The response captured for reporting, decoupled from any HTTP client
/// type so the validator can be driven without sockets.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn decode_json(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }
}

/// One test: an operation to invoke (or a suite to reference) plus its
/// parameters and expectations. Run-time state lives in the skipped
/// fields; duplicate a test before running it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Test {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(rename = "ref", skip_serializing_if = "String::is_empty")]
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect: Option<JsonMap>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub strict: bool,
    #[serde(flatten)]
    pub params: TestParams,

    /// Class name → recorded mutations, rebuilt per run.
    #[serde(skip)]
    pub comparisons: BTreeMap<String, Vec<Comparison>>,
    /// The operation-level tag, resolved during parameter resolution.
    #[serde(skip)]
    pub tag: Option<MeqaTag>,
    #[serde(skip)]
    pub response: Option<StoredResponse>,
    /// Status/body mismatch, kept for the error log.
    #[serde(skip)]
    pub response_error: Option<String>,
    /// Non-fatal schema mismatch, kept for the error log.
    #[serde(skip)]
    pub schema_error: Option<String>,
    #[serde(skip)]
    pub error: Option<String>,
    #[serde(skip)]
    pub duration: Option<Duration>,
}

impl Test {
    /// Normalize a freshly loaded test.
    pub fn init(&mut self) {
        self.method = self.method.to_lowercase();
    }

    /// A runnable copy: same declaration, fresh run state.
    pub fn duplicate(&self) -> Test {
        let mut dup = self.clone();
        dup.comparisons = BTreeMap::new();
        dup.tag = None;
        dup.response = None;
        dup.response_error = None;
        dup.schema_error = None;
        dup.error = None;
        dup.duration = None;
        dup
    }

    /// Inherit from the test that referenced this suite: strictness and
    /// expectations come over verbatim, parameters with add semantics.
    pub fn copy_parent(&mut self, parent: &Test) {
        self.strict = parent.strict;
        self.expect = parent.expect.clone();
        self.params.add_from(&parent.params);
    }

    pub fn expect_status(&self) -> Option<&Value> {
        self.expect.as_ref().and_then(|m| m.get(EXPECT_STATUS))
    }

    pub fn expect_body(&self) -> Option<&Value> {
        self.expect.as_ref().and_then(|m| m.get(EXPECT_BODY))
    }

    /// Rewrite `expect` to the observed outcome, making the result file a
    /// regression input for the next run.
    pub fn set_expect_to_observed(&mut self, status: u16, body: Option<&Value>) {
        let mut expect = JsonMap::new();
        expect.insert(EXPECT_STATUS.to_owned(), Value::from(status));
        if let Some(body) = body {
            expect.insert(EXPECT_BODY.to_owned(), body.clone());
        }
        self.expect = Some(expect);
    }
}

/// An ordered list of tests sharing parameters, credentials and a shadow
/// overlay for the duration of one run.
#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<Test>,
    pub params: TestParams,
    pub strict: bool,
    pub username: String,
    pub password: String,
    pub api_token: String,
    pub comment: String,
}

impl TestSuite {
    /// A suite inherits the plan's defaults at creation.
    pub fn new(name: impl Into<String>, plan: &TestPlan) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
            params: plan.params.clone(),
            strict: plan.strict,
            username: plan.username.clone(),
            password: plan.password.clone(),
            api_token: plan.api_token.clone(),
            comment: String::new(),
        }
    }
}

/// The whole plan: ordered suites, plan-wide defaults, run counters.
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    suites: Vec<TestSuite>,
    index: HashMap<String, usize>,
    pub params: TestParams,
    pub strict: bool,
    pub username: String,
    pub password: String,
    pub api_token: String,
    pub comment: String,
}

impl TestPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suites(&self) -> &[TestSuite] {
        &self.suites
    }

    pub fn suite(&self, name: &str) -> Option<&TestSuite> {
        self.index.get(name).map(|&i| &self.suites[i])
    }

    pub fn add(&mut self, suite: TestSuite) -> Result<()> {
        if self.index.contains_key(&suite.name) {
            return Err(ProbeError::DuplicateSuite { name: suite.name });
        }
        self.index.insert(suite.name.clone(), self.suites.len());
        self.suites.push(suite);
        Ok(())
    }

    /// Parse one YAML document: suite name → test list. The `meqa_init`
    /// suite configures the plan instead of adding a suite.
    pub fn add_from_chunk(&mut self, chunk: &str) -> Result<()> {
        if chunk.trim().is_empty() {
            return Ok(());
        }
        let suite_map: BTreeMap<String, Vec<Test>> = serde_yaml::from_str(chunk)?;
        for (name, mut tests) in suite_map {
            for t in &mut tests {
                t.init();
            }
            if name == MEQA_INIT {
                for t in &tests {
                    self.params.copy_from(&t.params);
                    self.strict = t.strict;
                }
                continue;
            }
            let mut suite = TestSuite::new(name, self);
            suite.tests = tests;
            self.add(suite)?;
        }
        Ok(())
    }

    /// Load a plan file. Invalid chunks are logged and skipped; the load
    /// only fails when nothing can be read at all.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let mut plan = Self::new();
        for chunk in split_documents(&data) {
            if let Err(err) = plan.add_from_chunk(chunk) {
                warn!(
                    file = %path.as_ref().display(),
                    "skipping invalid plan chunk: {err}"
                );
            }
        }
        Ok(plan)
    }

    /// Serialize the plan back into the document stream format.
    pub fn dump_to_string(&self) -> Result<String> {
        let mut out = String::new();
        if !self.comment.is_empty() {
            write_comment(&mut out, &self.comment);
        }
        for suite in &self.suites {
            out.push_str("\n\n");
            if !suite.comment.is_empty() {
                write_comment(&mut out, &suite.comment);
            }
            out.push_str("---\n");
            let mut doc = BTreeMap::new();
            doc.insert(suite.name.clone(), &suite.tests);
            out.push_str(&serde_yaml::to_string(&doc)?);
        }
        Ok(out)
    }

    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(self.dump_to_string()?.as_bytes())?;
        Ok(())
    }

    /// Install command-line credentials: plan-wide, and onto every suite
    /// that did not configure its own through `meqa_init`.
    pub fn set_credentials(&mut self, username: &str, password: &str, api_token: &str) {
        self.username = username.to_owned();
        self.password = password.to_owned();
        self.api_token = api_token.to_owned();
        for suite in &mut self.suites {
            if suite.username.is_empty() && suite.api_token.is_empty() {
                suite.username = username.to_owned();
                suite.password = password.to_owned();
                suite.api_token = api_token.to_owned();
            }
        }
    }
}

/// Render a comment block as `#`-prefixed lines.
fn write_comment(out: &mut String, comment: &str) {
    for line in comment.lines() {
        out.push_str("# ");
        out.push_str(line);
        out.push('\n');
    }
}

/// Split a plan file into YAML documents on `---` separator lines.
pub fn split_documents(data: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in data.split_inclusive('\n') {
        if line.trim_end() == "---" {
            chunks.push(&data[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    chunks.push(&data[start..]);
    chunks
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect()
}

/// Write executed tests as a result file: one suite named by the run
/// timestamp, `expect` already rewritten to the observations.
pub fn write_result_file(
    results: &[Test],
    timestamp: &str,
    path: impl AsRef<Path>,
) -> Result<()> {
    let mut plan = TestPlan::new();
    let mut suite = TestSuite::new(timestamp, &plan);
    suite.tests = results.to_vec();
    plan.add(suite)?;
    plan.dump_to_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params_with(body: Option<Value>, query: &[(&str, Value)]) -> TestParams {
        let mut p = TestParams::default();
        for (k, v) in query {
            p.query.insert((*k).to_owned(), v.clone());
        }
        p.body = body;
        p
    }

    #[test]
    fn copy_overwrites_add_preserves() {
        let mut dst = params_with(None, &[("a", json!(1))]);
        let src = params_with(None, &[("a", json!(2)), ("b", json!(3))]);
        dst.copy_from(&src);
        assert_eq!(dst.query["a"], json!(2));
        assert_eq!(dst.query["b"], json!(3));

        let mut dst = params_with(None, &[("a", json!(1))]);
        dst.add_from(&src);
        assert_eq!(dst.query["a"], json!(1));
        assert_eq!(dst.query["b"], json!(3));
    }

    #[test]
    fn body_merging_rules() {
        // Map into map merges.
        let mut dst = params_with(Some(json!({"x": 1})), &[]);
        dst.copy_from(&params_with(Some(json!({"y": 2})), &[]));
        assert_eq!(dst.body.unwrap(), json!({"x": 1, "y": 2}));

        // Non-map source replaces.
        let mut dst = params_with(Some(json!({"x": 1})), &[]);
        dst.copy_from(&params_with(Some(json!([1, 2])), &[]));
        assert_eq!(dst.body.unwrap(), json!([1, 2]));

        // Add keeps the existing non-map body.
        let mut dst = params_with(Some(json!("keep")), &[]);
        dst.add_from(&params_with(Some(json!("ignored")), &[]));
        assert_eq!(dst.body.unwrap(), json!("keep"));
    }

    #[test]
    fn duplicate_clears_run_state() {
        let mut t = Test {
            name: "t1".into(),
            method: "GET".into(),
            ..Test::default()
        };
        t.init();
        assert_eq!(t.method, "get");
        t.error = Some("boom".into());
        t.comparisons.insert("Pet".into(), vec![Comparison::default()]);
        let dup = t.duplicate();
        assert!(dup.error.is_none());
        assert!(dup.comparisons.is_empty());
        assert_eq!(dup.name, "t1");
    }

    #[test]
    fn plan_round_trip() {
        let yaml = r#"
/pets:
  - name: post_pets_1
    path: /pets
    method: post
    bodyParams:
      name: fido
  - name: get_pets_2
    path: /pets/{id}
    method: get
    pathParams:
      id: "{{post_pets_1.outputs.id}}"
    expect:
      status: 200
"#;
        let mut plan = TestPlan::new();
        plan.add_from_chunk(yaml).unwrap();
        let suite = plan.suite("/pets").unwrap();
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.tests[1].params.path["id"], json!("{{post_pets_1.outputs.id}}"));

        let dumped = plan.dump_to_string().unwrap();
        let mut reloaded = TestPlan::new();
        for chunk in split_documents(&dumped) {
            reloaded.add_from_chunk(chunk).unwrap();
        }
        let suite = reloaded.suite("/pets").unwrap();
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.tests[0].params.body, Some(json!({"name": "fido"})));
        assert_eq!(suite.tests[1].expect.as_ref().unwrap()["status"], json!(200));
    }

    #[test]
    fn meqa_init_sets_plan_defaults() {
        let yaml = r#"
meqa_init:
  - name: meqa_init
    strict: true
    headerParams:
      X-Env: staging
"#;
        let mut plan = TestPlan::new();
        plan.add_from_chunk(yaml).unwrap();
        assert!(plan.strict);
        assert_eq!(plan.params.header["X-Env"], json!("staging"));
        assert!(plan.suite(MEQA_INIT).is_none());

        // Suites created afterwards inherit the defaults.
        let suite = TestSuite::new("s", &plan);
        assert!(suite.strict);
        assert_eq!(suite.params.header["X-Env"], json!("staging"));
    }

    #[test]
    fn duplicate_suites_rejected() {
        let mut plan = TestPlan::new();
        plan.add(TestSuite::new("s", &TestPlan::new())).unwrap();
        let err = plan.add(TestSuite::new("s", &TestPlan::new())).unwrap_err();
        assert!(matches!(err, ProbeError::DuplicateSuite { .. }));
    }

    #[test]
    fn invalid_chunks_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yml");
        std::fs::write(
            &path,
            "---\nsuite_a:\n  - name: t1\n    path: /a\n    method: get\n---\n: : : garbage\n---\nsuite_b:\n  - name: t2\n    path: /b\n    method: get\n",
        )
        .unwrap();
        let plan = TestPlan::from_file(&path).unwrap();
        assert!(plan.suite("suite_a").is_some());
        assert!(plan.suite("suite_b").is_some());
    }

    #[test]
    fn comments_rendered_as_hash_lines() {
        let mut plan = TestPlan::new();
        plan.comment = "plan wide\ncomment".into();
        let mut suite = TestSuite::new("s", &plan);
        suite.comment = "suite note".into();
        suite.tests.push(Test {
            name: "t".into(),
            path: "/x".into(),
            method: "get".into(),
            ..Test::default()
        });
        plan.add(suite).unwrap();
        let out = plan.dump_to_string().unwrap();
        assert!(out.starts_with("# plan wide\n# comment\n"));
        assert!(out.contains("# suite note\n---\n"));
    }

    #[test]
    fn result_file_loads_back_as_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.yml");
        let mut t = Test {
            name: "get_pets_1".into(),
            path: "/pets".into(),
            method: "get".into(),
            ..Test::default()
        };
        t.set_expect_to_observed(200, Some(&json!([{"id": 1}])));
        write_result_file(&[t], "2026-08-02T10:00:00Z", &path).unwrap();

        let plan = TestPlan::from_file(&path).unwrap();
        let suite = plan.suite("2026-08-02T10:00:00Z").unwrap();
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(
            suite.tests[0].expect.as_ref().unwrap()["status"],
            json!(200)
        );
        assert_eq!(
            suite.tests[0].expect.as_ref().unwrap()["body"],
            json!([{"id": 1}])
        );
    }
}
