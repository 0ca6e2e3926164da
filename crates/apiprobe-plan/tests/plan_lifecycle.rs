//! End-to-end plan lifecycle: build the DAG from a spec, generate a path
//! plan, round-trip it through the file format, execute it against a
//! scripted server, and verify the shadow store plus the result file.

use std::sync::Arc;

use apiprobe_plan::{
    split_documents, write_result_file, Runtime, ScriptedDispatcher, StoredResponse, TestPlan,
    MEQA_INIT,
};
use apiprobe_spec::{build_dag, ApiSpec};
use serde_json::{json, Value};

const PET_SPEC: &str = r##"
swagger: "2.0"
host: pets.example.com
schemes: [http]
paths:
  /pet:
    post:
      operationId: addPet
      parameters:
        - name: body
          in: body
          schema:
            $ref: "#/definitions/Pet"
      responses:
        "200":
          description: ok
          schema:
            $ref: "#/definitions/Pet"
  /pet/{id}:
    get:
      operationId: getPet
      parameters:
        - name: id
          in: path
          required: true
          type: integer
          description: <meqa Pet.id>
      responses:
        "200":
          description: ok
          schema:
            $ref: "#/definitions/Pet"
    delete:
      operationId: deletePet
      parameters:
        - name: id
          in: path
          required: true
          type: integer
          description: <meqa Pet.id>
      responses:
        "200":
          description: ok
definitions:
  Pet:
    type: object
    properties:
      id: { type: integer }
      name: { type: string }
"##;

fn json_response(status: u16, body: Value) -> StoredResponse {
    StoredResponse {
        status,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

#[test]
fn generated_path_plan_runs_end_to_end() {
    let spec = Arc::new(ApiSpec::from_str_any(PET_SPEC).unwrap());
    let dag = build_dag(&spec).unwrap();
    let plan = apiprobe_plan::generate_path_plan(&dag, None).unwrap();

    // Round-trip through the on-disk format before running.
    let dir = tempfile::tempdir().unwrap();
    let plan_file = dir.path().join("path.yml");
    plan.dump_to_file(&plan_file).unwrap();
    let plan = TestPlan::from_file(&plan_file).unwrap();

    // After the reload the meqa_init suite has become plan configuration.
    assert!(plan.suite(MEQA_INIT).is_none());
    let suite = &plan.suites()[0];
    assert_eq!(suite.tests.len(), 4);
    assert_eq!(suite.tests[0].method, "post");
    assert_eq!(suite.tests[1].method, "get");
    assert_eq!(suite.tests[2].method, "delete");
    assert_eq!(suite.tests[3].method, "get");
    assert_eq!(
        suite.tests[3].expect.as_ref().unwrap()["status"],
        json!("fail")
    );

    let responses = vec![
        json_response(200, json!({"id": 1, "name": "fido"})),
        json_response(200, json!({"id": 1, "name": "fido"})),
        json_response(200, json!({})),
        StoredResponse {
            status: 404,
            body: Vec::new(),
        },
    ];
    let mut runtime = Runtime::new(Arc::clone(&spec), Box::new(ScriptedDispatcher::new(responses)));
    let counts = runtime.run_plan(&plan, None);

    assert_eq!(counts.passed, 4);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.schema_mismatch, 0);

    // The create/read/delete cycle leaves the shadow store empty.
    assert_eq!(runtime.db.entry_count("Pet"), 0);

    // The GET found the created pet's id through the history reference.
    let get = runtime.history.get_test(&suite.tests[1].name).unwrap();
    assert_eq!(get.params.path["id"], json!(1));
    // The negative repeat reused the deleted id.
    let negative = &runtime.results[3];
    assert_eq!(negative.params.path["id"], json!(1));
    assert_eq!(negative.expect.as_ref().unwrap()["status"], json!(404));

    // The result file loads back as a plan with observed expectations.
    let result_file = dir.path().join("result.yml");
    write_result_file(&runtime.results, "2026-08-02T12:00:00Z", &result_file).unwrap();
    let reloaded = TestPlan::from_file(&result_file).unwrap();
    let result_suite = reloaded.suite("2026-08-02T12:00:00Z").unwrap();
    assert_eq!(result_suite.tests.len(), 4);
    assert_eq!(
        result_suite.tests[0].expect.as_ref().unwrap()["body"]["name"],
        json!("fido")
    );
    let dumped = std::fs::read_to_string(&result_file).unwrap();
    assert_eq!(split_documents(&dumped).len(), 1);
}

#[test]
fn referenced_suite_inherits_parent_parameters() {
    let spec = Arc::new(ApiSpec::from_str_any(PET_SPEC).unwrap());
    let plan_yaml = r#"
unit:
  - name: get_pet_1
    path: /pet/{id}
    method: get
---
caller:
  - name: call
    ref: unit
    pathParams:
      id: 9
"#;
    let dir = tempfile::tempdir().unwrap();
    let plan_file = dir.path().join("plan.yml");
    std::fs::write(&plan_file, plan_yaml).unwrap();
    let plan = TestPlan::from_file(&plan_file).unwrap();

    let responses = vec![json_response(200, json!({"id": 9, "name": "x"}))];
    let mut runtime = Runtime::new(spec, Box::new(ScriptedDispatcher::new(responses)));
    let counts = runtime.run_plan(&plan, Some("caller"));

    assert_eq!(counts.passed, 1);
    assert_eq!(counts.failed, 0);
    // The referenced test ran under the caller's name with the caller's
    // path parameter.
    assert_eq!(runtime.results.len(), 1);
    assert_eq!(runtime.results[0].name, "call");
    assert_eq!(runtime.results[0].params.path["id"], json!(9));
}

#[test]
fn object_plan_covers_the_lifecycle_too() {
    let spec = Arc::new(ApiSpec::from_str_any(PET_SPEC).unwrap());
    let dag = build_dag(&spec).unwrap();
    let plan = apiprobe_plan::generate_object_plan(&dag).unwrap();
    let suite = plan
        .suites()
        .iter()
        .find(|s| s.name.contains("-- Pet -- all"))
        .expect("object suite");

    // create, read, delete, re-create.
    let methods: Vec<&str> = suite.tests.iter().map(|t| t.method.as_str()).collect();
    assert_eq!(methods, vec!["post", "get", "delete", "post"]);

    let responses = vec![
        json_response(200, json!({"id": 5, "name": "rex"})),
        json_response(200, json!({"id": 5, "name": "rex"})),
        json_response(200, json!({})),
        json_response(200, json!({"id": 6, "name": "bob"})),
    ];
    let mut runtime = Runtime::new(Arc::clone(&spec), Box::new(ScriptedDispatcher::new(responses)));
    let counts = runtime.run_plan(&plan, Some(&suite.name));
    assert_eq!(counts.passed, 4);

    // The re-create leaves exactly the second object behind.
    assert_eq!(runtime.db.entry_count("Pet"), 1);
}
