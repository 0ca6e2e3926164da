//! Plan generators: turn the weight-sorted DAG into a test plan.
//!
//! Three strategies share the scaffolding: `simple` samples up to ten
//! operations in weighted order, `object` builds one suite per
//! (creator, created class) pair, and `path` groups operations by path and
//! wires id references between them.

use std::collections::{BTreeMap, HashSet};

use apiprobe_error::{ProbeError, Result};
use apiprobe_graph::{NodeId, NodeKind, DAG_DEPTH};
use apiprobe_spec::{NodePayload, SpecDag, METHOD_DELETE, METHOD_POST};
use serde_json::{json, Value};
use tracing::warn;

use crate::model::{Test, TestPlan, TestSuite, EXPECT_STATUS, MEQA_INIT};

fn create_init_task() -> Test {
    Test {
        name: MEQA_INIT.to_owned(),
        ..Test::default()
    }
}

fn add_init_suite(plan: &mut TestPlan) -> Result<()> {
    let mut suite = TestSuite::new(MEQA_INIT, plan);
    suite.comment =
        "The meqa_init section initializes parameters (e.g. pathParams) that are applied to all suites"
            .to_owned();
    suite.tests.push(create_init_task());
    plan.add(suite)
}

/// The last path segment that is not a `{param}`.
pub fn last_path_element(path: &str) -> &str {
    path.rsplit('/')
        .find(|seg| !seg.is_empty() && !seg.starts_with('{'))
        .unwrap_or_default()
}

/// The trailing `{param}` of a path, if the path ends in one.
pub fn last_path_param(path: &str) -> Option<&str> {
    let last = path.rsplit('/').find(|seg| !seg.is_empty())?;
    last.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

/// Strip a trailing `{param}` segment and any trailing slash: the grouping
/// key of the path strategy.
fn trim_path(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    while let Some(last) = segments.last() {
        if last.is_empty() {
            segments.pop();
            continue;
        }
        break;
    }
    if let Some(last) = segments.last() {
        if last.starts_with('{') && last.ends_with('}') {
            segments.pop();
        }
    }
    segments.join("/")
}

fn test_from_op(dag: &SpecDag, id: NodeId, test_id: usize) -> Test {
    let node = dag.node(id);
    let path = node.name().to_owned();
    let method = node.method().to_owned();
    let op_id = match &node.data {
        NodePayload::Operation {
            operation_id: Some(op_id),
            ..
        } if !op_id.is_empty() => op_id.clone(),
        _ => last_path_element(&path).to_owned(),
    };
    Test {
        name: format!("{method}_{op_id}_{test_id}"),
        path,
        method,
        ..Test::default()
    }
}

/// Whether the node is an operation that effectively performs `method`
/// (description tags override the verb).
fn operation_matches(dag: &SpecDag, id: NodeId, method: &str) -> bool {
    let node = dag.node(id);
    node.kind() == NodeKind::Operation && node.data.effective_method(node.method()) == method
}

fn add_suite_or_warn(plan: &mut TestPlan, suite: TestSuite) {
    let name = suite.name.clone();
    if let Err(err) = plan.add(suite) {
        if matches!(err, ProbeError::DuplicateSuite { .. }) {
            warn!(suite = %name, "dropping duplicate generated suite");
        }
    }
}

/// A smoke plan: one suite of up to ten operations in weighted order.
pub fn generate_simple_plan(dag: &SpecDag) -> Result<TestPlan> {
    let mut plan = TestPlan::new();
    plan.comment =
        "\nThis is a simple and short test plan. We just sampled up to 10 REST calls into one test suite.\n"
            .to_owned();
    add_init_suite(&mut plan)?;

    let mut suite = TestSuite::new("simple test suite", &plan);
    suite.comment =
        "The meqa_init task within a test suite initializes parameters that are applied to all tests within this suite"
            .to_owned();
    suite.tests.push(create_init_task());

    let mut test_id = 0;
    for id in dag.by_weight() {
        if test_id >= 10 {
            break;
        }
        if dag.node(id).kind() != NodeKind::Operation {
            continue;
        }
        test_id += 1;
        suite.tests.push(test_from_op(dag, id, test_id));
    }
    plan.add(suite)?;
    Ok(plan)
}

/// For the object the creator reaches, emit create-then-exercise suites:
/// the create call followed by each operation depending on the object,
/// re-creating after every delete so later reads find something.
fn generate_tests_for_object(
    dag: &SpecDag,
    create: NodeId,
    obj: NodeId,
    plan: &mut TestPlan,
) -> Result<()> {
    if dag.node(obj).kind() != NodeKind::Definition
        || dag.node(create).kind() != NodeKind::Operation
    {
        return Ok(());
    }
    let create_path = dag.node(create).name().to_owned();
    let obj_name = dag.node(obj).name().to_owned();

    let mut test_id = 1;
    let mut suite = TestSuite::new(format!("{create_path} -- {obj_name} -- all"), plan);
    suite.tests.push(test_from_op(dag, create, test_id));
    for &child in dag.node(obj).children() {
        if dag.node(child).kind() != NodeKind::Operation {
            continue;
        }
        test_id += 1;
        suite.tests.push(test_from_op(dag, child, test_id));
        if operation_matches(dag, child, METHOD_DELETE) {
            test_id += 1;
            suite.tests.push(test_from_op(dag, create, test_id));
        }
    }
    if !suite.tests.is_empty() {
        add_suite_or_warn(plan, suite);
    }
    Ok(())
}

/// One suite per (operation, definition child) pair.
pub fn generate_object_plan(dag: &SpecDag) -> Result<TestPlan> {
    let mut plan = TestPlan::new();
    plan.comment = "\nThis test plan has test suites that are about objects. Each test suite create an object,\nthen exercise REST calls that use that object as an input.\n".to_owned();
    add_init_suite(&mut plan)?;

    let ids: Vec<NodeId> = dag.by_weight().collect();
    for id in ids {
        if dag.node(id).kind() != NodeKind::Operation {
            continue;
        }
        for &child in dag.node(id).children() {
            generate_tests_for_object(dag, id, child, &mut plan)?;
        }
    }
    Ok(plan)
}

/// One suite for all operations of one path, ordered by method priority.
/// The POST anchors id references; deletes get a trailing negative repeat.
fn generate_path_suite(dag: &SpecDag, operations: &[NodeId], plan: &mut TestPlan) {
    if operations.is_empty() {
        return;
    }
    let suite_name = dag.node(operations[0]).name().to_owned();
    let mut ops = operations.to_vec();
    dag.sort_by_method_priority(&mut ops);

    let mut suite = TestSuite::new(suite_name, plan);
    let mut test_id = 0;
    let mut create_test_name: Option<String> = None;
    let id_tag = "id";

    for &op in &ops {
        test_id += 1;
        let mut current = test_from_op(dag, op, test_id);
        if operation_matches(dag, op, METHOD_POST) {
            create_test_name = Some(current.name.clone());
        } else if dag.node(op).name().contains(id_tag) {
            if let Some(create_name) = &create_test_name {
                current.params.path.insert(
                    id_tag.to_owned(),
                    json!(format!("{{{{{create_name}.outputs.{id_tag}}}}}")),
                );
            }
        }
        suite.tests.push(current);

        if operation_matches(dag, op, METHOD_DELETE) {
            let delete_name = suite
                .tests
                .last()
                .map(|t| t.name.clone())
                .unwrap_or_default();
            let Some(last_param) = last_path_param(dag.node(op).name()) else {
                continue;
            };
            // A negative repeat: the same lookup against a deleted object
            // must fail.
            for &repeat in &ops {
                if last_path_param(dag.node(repeat).name()) == Some(last_param)
                    && !operation_matches(dag, repeat, METHOD_DELETE)
                    && !operation_matches(dag, repeat, METHOD_POST)
                {
                    test_id += 1;
                    let mut negative = test_from_op(dag, repeat, test_id);
                    negative.params.path.insert(
                        last_param.to_owned(),
                        json!(format!("{{{{{delete_name}.pathParams.{last_param}}}}}")),
                    );
                    let mut expect = apiprobe_types::JsonMap::new();
                    expect.insert(EXPECT_STATUS.to_owned(), Value::from("fail"));
                    negative.expect = Some(expect);
                    suite.tests.push(negative);
                    break;
                }
            }
        }
    }
    if !suite.tests.is_empty() {
        add_suite_or_warn(plan, suite);
    }
}

/// Group operations by path (ignoring a trailing `{param}`), order groups
/// by their heaviest member, and emit one suite per group. `whitelist`
/// filters groups by their trimmed path name.
pub fn generate_path_plan(dag: &SpecDag, whitelist: Option<&HashSet<String>>) -> Result<TestPlan> {
    let mut plan = TestPlan::new();
    plan.comment = "\nIn this test plan, the test suites are the REST paths, and the tests are the different\noperations under the path. The tests under the same suite will share each others'\nparameters by default.\n".to_owned();
    add_init_suite(&mut plan)?;

    let mut path_map: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    let mut path_weight: BTreeMap<String, i64> = BTreeMap::new();
    for id in dag.by_weight() {
        let node = dag.node(id);
        if node.kind() != NodeKind::Operation {
            continue;
        }
        let trimmed = trim_path(node.name());
        let weight = node.weight as i64 * DAG_DEPTH as i64 + node.priority;
        let entry = path_weight.entry(trimmed.clone()).or_insert(weight);
        *entry = (*entry).max(weight);
        path_map.entry(trimmed).or_default().push(id);
    }

    let mut ordered: Vec<(String, i64)> = path_weight.into_iter().collect();
    ordered.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));

    for (path, _) in ordered {
        if let Some(whitelist) = whitelist {
            if !whitelist.contains(&path) {
                continue;
            }
        }
        generate_path_suite(dag, &path_map[&path], &mut plan);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiprobe_spec::{build_dag, ApiSpec};
    use serde_json::json;

    fn pet_spec() -> ApiSpec {
        ApiSpec::from_str_any(
            r##"
swagger: "2.0"
host: example.com
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
"##,
        )
        .unwrap()
    }

    #[test]
    fn path_helpers() {
        assert_eq!(last_path_element("/pet/{id}"), "pet");
        assert_eq!(last_path_element("/store/order"), "order");
        assert_eq!(last_path_param("/pet/{id}"), Some("id"));
        assert_eq!(last_path_param("/pet"), None);
        assert_eq!(trim_path("/pet/{id}"), "/pet");
        assert_eq!(trim_path("/pet/"), "/pet");
        assert_eq!(trim_path("/pet"), "/pet");
    }

    #[test]
    fn path_plan_orders_and_binds_references() {
        let spec = pet_spec();
        let dag = build_dag(&spec).unwrap();
        let plan = generate_path_plan(&dag, None).unwrap();

        // init suite plus the single /pet group.
        assert!(plan.suite(MEQA_INIT).is_some());
        let suite = plan
            .suites()
            .iter()
            .find(|s| s.name != MEQA_INIT)
            .expect("path suite");

        // POST, GET, DELETE, then the negative GET.
        assert_eq!(suite.tests.len(), 4);
        assert_eq!(suite.tests[0].method, "post");
        assert_eq!(suite.tests[1].method, "get");
        assert_eq!(suite.tests[2].method, "delete");
        assert_eq!(suite.tests[3].method, "get");

        let post_name = &suite.tests[0].name;
        assert_eq!(
            suite.tests[1].params.path["id"],
            json!(format!("{{{{{post_name}.outputs.id}}}}"))
        );

        let delete_name = &suite.tests[2].name;
        let negative = &suite.tests[3];
        assert_eq!(
            negative.params.path["id"],
            json!(format!("{{{{{delete_name}.pathParams.id}}}}"))
        );
        assert_eq!(negative.expect.as_ref().unwrap()[EXPECT_STATUS], json!("fail"));
    }

    #[test]
    fn whitelist_filters_suites() {
        let spec = pet_spec();
        let dag = build_dag(&spec).unwrap();
        let mut keep = HashSet::new();
        keep.insert("/nothing".to_owned());
        let plan = generate_path_plan(&dag, Some(&keep)).unwrap();
        assert_eq!(plan.suites().len(), 1); // only meqa_init

        keep.insert("/pet".to_owned());
        let plan = generate_path_plan(&dag, Some(&keep)).unwrap();
        assert_eq!(plan.suites().len(), 2);
    }

    #[test]
    fn object_plan_recreates_after_delete() {
        let spec = pet_spec();
        let dag = build_dag(&spec).unwrap();
        let plan = generate_object_plan(&dag).unwrap();
        let suite = plan
            .suites()
            .iter()
            .find(|s| s.name.contains("-- Pet -- all"))
            .expect("object suite");

        // create, then children in sorted order with re-create after the
        // delete.
        assert_eq!(suite.tests[0].method, "post");
        let deletes: Vec<usize> = suite
            .tests
            .iter()
            .enumerate()
            .filter(|(_, t)| t.method == "delete")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(deletes.len(), 1);
        let after_delete = &suite.tests[deletes[0] + 1];
        assert_eq!(after_delete.method, "post");
    }

    #[test]
    fn simple_plan_caps_at_ten() {
        let spec = pet_spec();
        let dag = build_dag(&spec).unwrap();
        let plan = generate_simple_plan(&dag).unwrap();
        let suite = plan.suite("simple test suite").unwrap();
        // init task + the three operations.
        assert_eq!(suite.tests.len(), 4);
        assert_eq!(suite.tests[0].name, MEQA_INIT);
        assert!(suite.tests.len() <= 11);
    }
}
