//! Typed model of the OpenAPI 2.0 (Swagger) subset the tool consumes.
//!
//! Documents may be YAML or JSON on disk; YAML is a superset, so everything
//! loads through serde_yaml. Unknown fields are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use apiprobe_error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const METHOD_GET: &str = "get";
pub const METHOD_PUT: &str = "put";
pub const METHOD_POST: &str = "post";
pub const METHOD_DELETE: &str = "delete";
pub const METHOD_OPTIONS: &str = "options";
pub const METHOD_HEAD: &str = "head";
pub const METHOD_PATCH: &str = "patch";

/// The seven verbs a path item can carry, in spec order.
pub const METHODS: [&str; 7] = [
    METHOD_GET,
    METHOD_PUT,
    METHOD_POST,
    METHOD_DELETE,
    METHOD_OPTIONS,
    METHOD_HEAD,
    METHOD_PATCH,
];

/// An OpenAPI schema fragment.
///
/// One struct covers definitions, body schemas, response schemas and the
/// simple-schema shape of non-body parameters; absent fields stay `None`
/// or empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(rename = "allOf", skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "exclusiveMinimum", skip_serializing_if = "std::ops::Not::not")]
    pub exclusive_minimum: bool,
    #[serde(rename = "exclusiveMaximum", skip_serializing_if = "std::ops::Not::not")]
    pub exclusive_maximum: bool,
    #[serde(rename = "minItems", skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(rename = "maxItems", skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(rename = "uniqueItems", skip_serializing_if = "std::ops::Not::not")]
    pub unique_items: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Schema {
    /// The declared type, with the OpenAPI convention that an absent type
    /// on a schema with properties means `object`.
    pub fn effective_type(&self) -> &str {
        match self.schema_type.as_deref() {
            Some(t) => t,
            None => "object",
        }
    }

    pub fn is_object_like(&self) -> bool {
        self.schema_type.is_none() || self.schema_type.as_deref() == Some("object")
    }
}

/// Where a parameter lives on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamLocation {
    Query,
    Header,
    Path,
    FormData,
    Body,
}

/// One operation parameter: either a body parameter carrying a full schema
/// or a simple parameter with an inline type and validations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParamLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "exclusiveMinimum", skip_serializing_if = "std::ops::Not::not")]
    pub exclusive_minimum: bool,
    #[serde(rename = "exclusiveMaximum", skip_serializing_if = "std::ops::Not::not")]
    pub exclusive_maximum: bool,
    #[serde(rename = "minItems", skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(rename = "maxItems", skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(rename = "uniqueItems", skip_serializing_if = "std::ops::Not::not")]
    pub unique_items: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            name: String::new(),
            location: ParamLocation::Query,
            description: None,
            required: false,
            schema: None,
            param_type: None,
            format: None,
            items: None,
            enum_values: Vec::new(),
            minimum: None,
            maximum: None,
            exclusive_minimum: false,
            exclusive_maximum: false,
            min_items: None,
            max_items: None,
            unique_items: false,
            pattern: None,
            min_length: None,
            max_length: None,
        }
    }
}

impl Parameter {
    /// Lift a simple (non-body) parameter into a full schema so one
    /// generator path serves both shapes.
    pub fn to_schema(&self) -> Schema {
        Schema {
            schema_type: self.param_type.clone(),
            format: self.format.clone(),
            items: self.items.clone(),
            enum_values: self.enum_values.clone(),
            minimum: self.minimum,
            maximum: self.maximum,
            exclusive_minimum: self.exclusive_minimum,
            exclusive_maximum: self.exclusive_maximum,
            min_items: self.min_items,
            max_items: self.max_items,
            unique_items: self.unique_items,
            pattern: self.pattern.clone(),
            min_length: self.min_length,
            max_length: self.max_length,
            ..Schema::default()
        }
    }
}

/// A declared response: description plus optional body schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

/// Status-keyed response table. Keys are numeric strings plus `default`.
pub type Responses = BTreeMap<String, Response>;

/// Select the response spec for a status code: exact match, then
/// `default`, then nothing.
pub fn select_response(responses: &Responses, status: u16) -> Option<&Response> {
    responses
        .get(&status.to_string())
        .or_else(|| responses.get("default"))
}

/// An (HTTP method, path) pair's definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Operation {
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: Responses,
}

/// All operations under one path template, plus path-level parameters that
/// apply to each of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl PathItem {
    pub fn operation(&self, method: &str) -> Option<&Operation> {
        match method {
            METHOD_GET => self.get.as_ref(),
            METHOD_PUT => self.put.as_ref(),
            METHOD_POST => self.post.as_ref(),
            METHOD_DELETE => self.delete.as_ref(),
            METHOD_OPTIONS => self.options.as_ref(),
            METHOD_HEAD => self.head.as_ref(),
            METHOD_PATCH => self.patch.as_ref(),
            _ => None,
        }
    }

    /// Present operations in [`METHODS`] order.
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &Operation)> {
        METHODS
            .iter()
            .filter_map(move |m| self.operation(m).map(|op| (*m, op)))
    }
}

/// The parsed OpenAPI 2.0 document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swagger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "basePath", skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<String, PathItem>,
}

impl ApiSpec {
    /// Parse a document from a string (YAML or JSON).
    pub fn from_str_any(data: &str) -> Result<Self> {
        let spec: Self = serde_yaml::from_str(data)?;
        if let Some(version) = &spec.swagger {
            if version != "2.0" {
                warn!(version = %version, "document does not declare swagger 2.0, proceeding anyway");
            }
        }
        Ok(spec)
    }

    /// Load a document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(file = %path.display(), "loading OpenAPI document");
        let data = std::fs::read_to_string(path)?;
        Self::from_str_any(&data)
    }

    /// Look a definition up by name.
    pub fn definition(&self, name: &str) -> Option<&Schema> {
        self.definitions.get(name)
    }

    /// The base URL all request paths are resolved against. Prefers the
    /// `http` scheme, then `https`, then the first listed; `http` when no
    /// schemes are declared.
    pub fn base_url(&self) -> String {
        let scheme = if self.schemes.is_empty() {
            "http"
        } else if self.schemes.iter().any(|s| s == "http") {
            "http"
        } else if self.schemes.iter().any(|s| s == "https") {
            "https"
        } else {
            &self.schemes[0]
        };
        format!(
            "{scheme}://{}{}",
            self.host.as_deref().unwrap_or_default(),
            self.base_path.as_deref().unwrap_or_default()
        )
    }

    /// Find the operation for a path/method pair.
    pub fn operation(&self, path: &str, method: &str) -> Result<(&PathItem, &Operation)> {
        let item = self
            .paths
            .get(path)
            .ok_or_else(|| ProbeError::OperationNotFound {
                path: path.to_owned(),
                method: method.to_owned(),
            })?;
        let op = item
            .operation(method)
            .ok_or_else(|| ProbeError::OperationNotFound {
                path: path.to_owned(),
                method: method.to_owned(),
            })?;
        Ok((item, op))
    }
}

/// Merge path-level parameters into an operation's list without
/// duplicating names; operation-level parameters win.
pub fn merge_parameters(op_params: &[Parameter], path_params: &[Parameter]) -> Vec<Parameter> {
    let mut merged: Vec<Parameter> = op_params.to_vec();
    for p in path_params {
        if !merged.iter().any(|existing| existing.name == p.name) {
            merged.push(p.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE: &str = r##"
swagger: "2.0"
host: petstore.example.com
basePath: /v2
schemes: [https, http]
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
          description: ok
          schema:
            $ref: "#/definitions/Pet"
  /pets/{id}:
    parameters:
      - name: id
        in: path
        type: integer
        required: true
    get:
      operationId: getPet
      responses:
        "200":
          description: ok
          schema:
            $ref: "#/definitions/Pet"
        default:
          description: error
definitions:
  Pet:
    type: object
    required: [name]
    properties:
      id:
        type: integer
        format: int64
      name:
        type: string
"##;

    #[test]
    fn parses_petstore_shape() {
        let spec = ApiSpec::from_str_any(PETSTORE).unwrap();
        assert_eq!(spec.swagger.as_deref(), Some("2.0"));
        assert_eq!(spec.definitions.len(), 1);
        let (_, op) = spec.operation("/pets", METHOD_POST).unwrap();
        assert_eq!(op.operation_id.as_deref(), Some("addPet"));
        assert!(spec.operation("/pets", METHOD_DELETE).is_err());
    }

    #[test]
    fn base_url_prefers_http() {
        let spec = ApiSpec::from_str_any(PETSTORE).unwrap();
        assert_eq!(spec.base_url(), "http://petstore.example.com/v2");

        let mut https_only = spec.clone();
        https_only.schemes = vec!["ws".into(), "https".into()];
        assert_eq!(https_only.base_url(), "https://petstore.example.com/v2");

        let mut odd = spec.clone();
        odd.schemes = vec!["ws".into()];
        assert_eq!(odd.base_url(), "ws://petstore.example.com/v2");

        let mut none = spec;
        none.schemes.clear();
        assert_eq!(none.base_url(), "http://petstore.example.com/v2");
    }

    #[test]
    fn path_level_parameters_merge() {
        let spec = ApiSpec::from_str_any(PETSTORE).unwrap();
        let (item, op) = spec.operation("/pets/{id}", METHOD_GET).unwrap();
        let merged = merge_parameters(&op.parameters, &item.parameters);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "id");
        assert_eq!(merged[0].location, ParamLocation::Path);
    }

    #[test]
    fn response_selection() {
        let spec = ApiSpec::from_str_any(PETSTORE).unwrap();
        let (_, op) = spec.operation("/pets/{id}", METHOD_GET).unwrap();
        assert!(select_response(&op.responses, 200).unwrap().schema.is_some());
        // 404 falls back to default.
        let resp = select_response(&op.responses, 404).unwrap();
        assert_eq!(resp.description.as_deref(), Some("error"));
        assert!(select_response(&BTreeMap::new(), 200).is_none());
    }

    #[test]
    fn json_documents_load_too() {
        let json = r#"{"swagger": "2.0", "host": "x", "paths": {}, "definitions": {}}"#;
        let spec = ApiSpec::from_str_any(json).unwrap();
        assert_eq!(spec.host.as_deref(), Some("x"));
    }
}
