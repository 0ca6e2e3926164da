//! Dependency collection: derive, for every operation, which definition
//! classes it produces and consumes, and wire the DAG accordingly.
//!
//! Producers become children of the operation (the object exists because
//! the call creates it); consumed classes become parents (the call needs
//! the object to exist first). A second pass assigns intra-layer
//! priorities once the weights have settled.

use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;

use apiprobe_error::Result;
use apiprobe_graph::{dag_name, method_weight, Dag, NodeId, NodeKind};
use apiprobe_types::MeqaTag;
use tracing::{debug, warn};

use crate::document::{merge_parameters, ApiSpec, Operation, ParamLocation, PathItem, Schema};
use crate::document::METHOD_POST;
use crate::schema::{iterate, resolve_ref, tag_of};

/// Payload carried by DAG nodes. The composite key already holds the
/// definition name or path/method; operations additionally keep what the
/// plan generators need for naming and method overrides.
#[derive(Debug, Clone)]
pub enum NodePayload {
    Definition,
    Operation {
        operation_id: Option<String>,
        description: Option<String>,
    },
}

impl NodePayload {
    /// The method the operation effectively performs: a tag on its
    /// description overrides the HTTP verb.
    pub fn effective_method(&self, verb: &str) -> String {
        if let Self::Operation { description, .. } = self {
            if let Some(tag) = MeqaTag::from_description(description.as_deref()) {
                if !tag.operation.is_empty() {
                    return tag.operation;
                }
            }
        }
        verb.to_owned()
    }
}

/// A DAG over one spec's definitions and operations.
pub type SpecDag = Dag<NodePayload>;

/// Per-operation class sets, transient during graph build.
#[derive(Debug, Default)]
struct Dependencies {
    produces: BTreeSet<String>,
    consumes: BTreeSet<String>,
    is_post: bool,
}

/// Walk a tag-less schema and gather every class it references, through
/// `$ref`s and `class`-bearing tags. Weak-tagged branches are pruned.
fn collect_classes(schema: &Schema, spec: &ApiSpec, out: &mut BTreeSet<String>) -> Result<()> {
    iterate(schema, spec, false, &mut |ref_name, s| {
        if let Some(name) = ref_name {
            out.insert(name.to_owned());
        }
        if let Some(tag) = tag_of(s) {
            if !tag.class.is_empty() && !tag.is_weak() {
                out.insert(tag.class);
            }
        }
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(())
}

/// Route one parameter's classes into the produces/consumes sets.
fn collect_parameter(
    spec: &ApiSpec,
    param_schema: Option<&Schema>,
    tag: Option<MeqaTag>,
    to_produces: bool,
    deps: &mut Dependencies,
) -> Result<()> {
    let bucket = if to_produces {
        &mut deps.produces
    } else {
        &mut deps.consumes
    };

    if let Some(tag) = tag {
        if !tag.class.is_empty() {
            if !tag.is_weak() {
                bucket.insert(tag.class);
            }
            return Ok(());
        }
    }

    let Some(schema) = param_schema else {
        return Ok(());
    };

    // An object-valued (or object-ref'd) parameter contributes its class;
    // for producers, the produced object's own references become inputs.
    if let Some((class, referred)) = resolve_ref(schema, spec)? {
        bucket.insert(class.clone());
        if to_produces {
            let mut inputs = BTreeSet::new();
            collect_classes(referred, spec, &mut inputs)?;
            inputs.remove(&class);
            deps.consumes.extend(inputs);
        }
        return Ok(());
    }
    if schema.schema_type.as_deref() == Some("array") {
        if let Some(items) = &schema.items {
            return collect_parameter(spec, Some(items), None, to_produces, deps);
        }
        return Ok(());
    }
    collect_classes(schema, spec, bucket)
}

/// Derive the produces/consumes sets for one operation.
fn operation_dependencies(
    spec: &ApiSpec,
    path_item: &PathItem,
    op: &Operation,
    method: &str,
) -> Result<Dependencies> {
    let mut deps = Dependencies::default();
    let op_tag = MeqaTag::from_description(op.description.as_deref());
    let effective = match &op_tag {
        Some(tag) if !tag.operation.is_empty() => tag.operation.as_str(),
        _ => method,
    };
    deps.is_post = effective == METHOD_POST;

    for param in merge_parameters(&op.parameters, &path_item.parameters) {
        let to_produces = deps.is_post
            && matches!(param.location, ParamLocation::Body | ParamLocation::FormData);
        let tag = MeqaTag::from_description(param.description.as_deref());
        let simple;
        let schema = match &param.schema {
            Some(s) => Some(s),
            None if param.items.is_some() => {
                simple = param.to_schema();
                Some(&simple)
            }
            None => None,
        };
        collect_parameter(spec, schema, tag, to_produces, &mut deps)?;
    }

    // Success responses name what the call hands back; tag-less walks of
    // non-ref content are discarded as too speculative.
    for (status, resp) in &op.responses {
        let is_success = status
            .parse::<u16>()
            .map(|s| (200..300).contains(&s))
            .unwrap_or(false);
        if !is_success {
            continue;
        }
        if let Some(tag) = MeqaTag::from_description(resp.description.as_deref()) {
            if !tag.class.is_empty() && !tag.is_weak() {
                deps.produces.insert(tag.class);
            }
        }
        if let Some(schema) = &resp.schema {
            iterate(schema, spec, false, &mut |ref_name, _| {
                if let Some(name) = ref_name {
                    deps.produces.insert(name.to_owned());
                }
                Ok(ControlFlow::Continue(()))
            })?;
        }
    }

    // Self-filled fields: a creator does not consume what it creates; a
    // reader does not create what it reads.
    if deps.is_post {
        deps.consumes = &deps.consumes - &deps.produces;
    } else {
        deps.produces = &deps.produces - &deps.consumes;
    }
    Ok(deps)
}

fn link(dag: &mut SpecDag, parent: NodeId, child: NodeId) {
    if let Err(err) = dag.add_child(parent, child) {
        // The edge is rejected; the rest of the graph stands. Weak tags in
        // the document are the sanctioned way to break the ring.
        warn!("dependency edge rejected: {err}");
    }
}

/// Build the full DAG for a spec: definition nodes, definition-to-definition
/// reference edges, operation nodes with their produces/consumes wiring,
/// then the priority pass and the final sort.
pub fn build_dag(spec: &ApiSpec) -> Result<SpecDag> {
    let mut dag = Dag::new();

    for name in spec.definitions.keys() {
        dag.new_node(
            dag_name(NodeKind::Definition, name, ""),
            NodePayload::Definition,
        )?;
    }

    // An embedded reference means the referencing definition depends on the
    // referenced one.
    for (name, schema) in &spec.definitions {
        let mut referenced = BTreeSet::new();
        collect_classes(schema, spec, &mut referenced)?;
        referenced.remove(name);
        let Some(child) = dag.find(&dag_name(NodeKind::Definition, name, "")) else {
            continue;
        };
        for class in referenced {
            if let Some(parent) = dag.find(&dag_name(NodeKind::Definition, &class, "")) {
                link(&mut dag, parent, child);
            }
        }
    }

    for (path, item) in &spec.paths {
        for (method, op) in item.operations() {
            let deps = operation_dependencies(spec, item, op, method)?;
            debug!(
                path,
                method,
                produces = ?deps.produces,
                consumes = ?deps.consumes,
                "collected operation dependencies"
            );
            let op_id = dag.new_node(
                dag_name(NodeKind::Operation, path, method),
                NodePayload::Operation {
                    operation_id: op.operation_id.clone(),
                    description: op.description.clone(),
                },
            )?;
            for class in &deps.produces {
                if let Some(def) = dag.find(&dag_name(NodeKind::Definition, class, "")) {
                    link(&mut dag, op_id, def);
                }
            }
            for class in &deps.consumes {
                if let Some(def) = dag.find(&dag_name(NodeKind::Definition, class, "")) {
                    link(&mut dag, def, op_id);
                }
            }
        }
    }

    assign_priorities(&mut dag);
    dag.sort();
    dag.check_weights()?;
    Ok(dag)
}

/// Count `{param}` segments in a path template.
pub fn path_param_count(path: &str) -> usize {
    path.split('/')
        .filter(|seg| seg.starts_with('{') && seg.ends_with('}'))
        .count()
}

/// Second traversal once weights have settled:
/// `priority = max_parent_weight · 100 + path_param_count · 10 + method_weight`.
fn assign_priorities(dag: &mut SpecDag) {
    let ids: Vec<NodeId> = dag.by_weight().collect();
    let mut max_parent: HashMap<NodeId, usize> = HashMap::new();
    for &id in &ids {
        let weight = dag.node(id).weight;
        for &child in dag.node(id).children() {
            let entry = max_parent.entry(child).or_insert(0);
            *entry = (*entry).max(weight);
        }
    }
    for &id in &ids {
        let node = dag.node(id);
        if !matches!(node.data, NodePayload::Operation { .. }) {
            continue;
        }
        let verb = node.method().to_owned();
        let path = node.name().to_owned();
        let effective = dag.node(id).data.effective_method(&verb);
        let parent_weight = max_parent.get(&id).copied().unwrap_or(0);
        dag.node_mut(id).priority = parent_weight as i64 * 100
            + path_param_count(&path) as i64 * 10
            + method_weight(&effective);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiprobe_graph::DAG_DEPTH;

    fn tagged_petstore() -> ApiSpec {
        ApiSpec::from_str_any(
            r##"
swagger: "2.0"
host: example.com
paths:
  /pets:
    post:
      operationId: addPet
      parameters:
        - name: body
          in: body
          schema:
            $ref: "#/definitions/Pet"
      responses:
        "200":
          description: created
          schema:
            $ref: "#/definitions/Pet"
  /pets/{id}:
    get:
      operationId: getPet
      parameters:
        - name: id
          in: path
          required: true
          type: integer
          description: pet to fetch <meqa Pet.id>
      responses:
        "200":
          description: ok
          schema:
            $ref: "#/definitions/Pet"
definitions:
  Category:
    type: object
    properties:
      id: { type: integer }
  Pet:
    type: object
    properties:
      id: { type: integer }
      name: { type: string }
      category:
        $ref: "#/definitions/Category"
"##,
        )
        .unwrap()
    }

    #[test]
    fn weights_follow_dependencies() {
        let spec = tagged_petstore();
        let dag = build_dag(&spec).unwrap();

        let category = dag
            .find(&dag_name(NodeKind::Definition, "Category", ""))
            .unwrap();
        let pet = dag.find(&dag_name(NodeKind::Definition, "Pet", "")).unwrap();
        let post = dag
            .find(&dag_name(NodeKind::Operation, "/pets", "post"))
            .unwrap();
        let get = dag
            .find(&dag_name(NodeKind::Operation, "/pets/{id}", "get"))
            .unwrap();

        // Category ← POST ← Pet ← GET, strictly layered.
        assert!(dag.node(category).weight < dag.node(post).weight);
        assert!(dag.node(post).weight < dag.node(pet).weight);
        assert!(dag.node(pet).weight < dag.node(get).weight);
        dag.check_weights().unwrap();
    }

    #[test]
    fn priorities_encode_parents_params_and_method() {
        let spec = tagged_petstore();
        let dag = build_dag(&spec).unwrap();
        let post = dag
            .find(&dag_name(NodeKind::Operation, "/pets", "post"))
            .unwrap();
        let get = dag
            .find(&dag_name(NodeKind::Operation, "/pets/{id}", "get"))
            .unwrap();

        // POST's only parent is Category at weight 0: 0·100 + 0·10 + 1.
        assert_eq!(dag.node(post).priority, 1);
        // GET's parent Pet sits two layers up; one path param; method 2.
        let pet_weight = dag
            .node(dag.find(&dag_name(NodeKind::Definition, "Pet", "")).unwrap())
            .weight as i64;
        assert_eq!(dag.node(get).priority, pet_weight * 100 + 10 + 2);
    }

    #[test]
    fn iteration_visits_each_node_once() {
        let spec = tagged_petstore();
        let dag = build_dag(&spec).unwrap();
        let visited: Vec<_> = dag.by_weight().collect();
        assert_eq!(visited.len(), dag.len());
        for id in &visited {
            assert!(dag.node(*id).weight < DAG_DEPTH);
        }
    }

    #[test]
    fn tagged_operation_overrides_verb() {
        let payload = NodePayload::Operation {
            operation_id: None,
            description: Some("recreate the pet <meqa Pet..post>".into()),
        };
        assert_eq!(payload.effective_method("put"), "post");
        let untagged = NodePayload::Operation {
            operation_id: None,
            description: None,
        };
        assert_eq!(untagged.effective_method("put"), "put");
    }

    #[test]
    fn path_param_counting() {
        assert_eq!(path_param_count("/pets"), 0);
        assert_eq!(path_param_count("/pets/{id}"), 1);
        assert_eq!(path_param_count("/stores/{sid}/pets/{pid}"), 2);
    }

    #[test]
    fn weak_reference_breaks_ring() {
        let spec = ApiSpec::from_str_any(
            r##"
swagger: "2.0"
paths: {}
definitions:
  Owner:
    type: object
    properties:
      pet:
        $ref: "#/definitions/Pet"
  Pet:
    type: object
    properties:
      owner:
        description: <meqa Owner weak>
        $ref: "#/definitions/Owner"
"##,
        )
        .unwrap();
        // Pet → Owner is weak, so only Owner-depends-on-Pet is wired and
        // the build succeeds with a clean layering.
        let dag = build_dag(&spec).unwrap();
        let pet = dag.find(&dag_name(NodeKind::Definition, "Pet", "")).unwrap();
        let owner = dag
            .find(&dag_name(NodeKind::Definition, "Owner", ""))
            .unwrap();
        assert!(dag.node(pet).weight < dag.node(owner).weight);
    }
}
