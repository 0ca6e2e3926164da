//! OpenAPI 2.0 document model, schema checking and dependency collection.
//!
//! This crate owns everything that reads the spec: the typed document
//! model and its YAML/JSON loader, the schema operations (reference
//! resolution, traversal, the tolerant structural checker), and the
//! dependency collector that turns a document into a weighted DAG of
//! definitions and operations.

pub mod deps;
pub mod document;
pub mod schema;

pub use deps::{build_dag, path_param_count, NodePayload, SpecDag};
pub use document::{
    merge_parameters, select_response, ApiSpec, Operation, ParamLocation, Parameter, PathItem,
    Response, Responses, Schema, METHODS, METHOD_DELETE, METHOD_GET, METHOD_HEAD, METHOD_OPTIONS,
    METHOD_PATCH, METHOD_POST, METHOD_PUT,
};
pub use schema::{
    contains, find_matching_schema, iterate, matches, parses, resolve_ref, schema_root_type,
    tag_of, Collection, SchemaParseOptions,
};
