use thiserror::Error;

/// Primary error type for apiprobe operations.
///
/// Structured variants for the common cases; every variant maps to one of
/// the six coarse [`ErrorKind`]s that drive suite abort and exit-code
/// decisions.
#[derive(Error, Debug)]
pub enum ProbeError {
    // === Spec shape ===
    /// A `$ref` that is not of the form `#/definitions/<Name>`.
    #[error("invalid reference: '{reference}', only #/definitions/<Name> is supported")]
    InvalidRef { reference: String },

    /// A `$ref` target that does not exist in the definitions table.
    #[error("reference object not found: '{name}'")]
    RefNotFound { name: String },

    /// A schema fragment without a usable type.
    #[error("schema for '{context}' has no type and no properties")]
    UntypedSchema { context: String },

    /// A string format the generator does not know how to satisfy.
    #[error("invalid format string: '{format}'")]
    UnknownFormat { format: String },

    /// A `file` parameter that must be supplied by the plan author.
    #[error("cannot generate a file upload, parameter '{name}' must be provided")]
    FileParameter { name: String },

    /// Conflicting numeric bounds on a schema.
    #[error("specified minimum {min} is bigger than maximum {max}")]
    BadBounds { min: f64, max: f64 },

    /// `allOf` branches that generate to something other than objects.
    #[error("cannot combine allOf branches that are not objects: {context}")]
    AllOfNotObject { context: String },

    // === Graph ===
    /// Two nodes registered under the same composite key.
    #[error("a DAG node named '{name}' already exists")]
    DuplicateNode { name: String },

    /// An edge insertion that would close a cycle. The chain lists the ring
    /// top-down (top depends on bottom).
    #[error("circular dependency detected (top depends on bottom):\n{chain}")]
    CycleDetected { chain: String },

    /// A weight adjustment addressed to a node the DAG does not own.
    #[error("node '{name}' is not registered in this DAG")]
    UnknownNode { name: String },

    // === Plan shape ===
    /// A suite name used twice within one plan.
    #[error("duplicate suite name '{name}' in test plan")]
    DuplicateSuite { name: String },

    /// A named suite that the plan does not contain.
    #[error("test suite not found: '{name}'")]
    SuiteNotFound { name: String },

    /// A path/method pair missing from the spec.
    #[error("operation {method} {path} not found in the API spec")]
    OperationNotFound { path: String, method: String },

    /// A method string outside the seven supported verbs.
    #[error("unknown HTTP method in test '{test}': '{method}'")]
    UnknownMethod { test: String, method: String },

    // === Run-time assertion failures ===
    /// The response status did not match the test's expectation.
    #[error("test failed, response code {status}")]
    ExpectStatus { status: u16 },

    /// The response body did not match the literal `expect.body`.
    #[error("test failed, expecting body:\n{expected}\ngot body:\n{actual}")]
    ExpectBody { expected: String, actual: String },

    // === Transport & lookup failures ===
    /// The HTTP call itself failed.
    #[error("HTTP request failed: {detail}")]
    Transport { detail: String },

    /// A GET returned an entry that does not match the query parameters.
    #[error("result returned doesn't match query parameters:\n{entry}")]
    QueryMismatch { entry: String },

    /// Strict mode: a GET returned an entry the shadow store does not hold.
    #[error("result returned is not found on client:\n{entry}")]
    ResultNotFound { entry: String },

    // === Server response shape ===
    /// The response body does not parse against the response schema.
    #[error("server response doesn't match the schema: {detail}")]
    SchemaMismatch { detail: String },

    // === Wrappers ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal ===
    /// Invariant violation inside apiprobe itself.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classes, matching the failure taxonomy of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input shape (spec, plan, or parameters).
    Invalid,
    /// Path, operation or suite missing.
    NotFound,
    /// An assertion on status or body failed.
    Expect,
    /// Transport failed or the result didn't match the lookup.
    Http,
    /// The server response doesn't match the declared schema.
    ServerResp,
    /// apiprobe invariant violated.
    Internal,
}

impl ProbeError {
    /// Map this error to its coarse kind.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRef { .. }
            | Self::RefNotFound { .. }
            | Self::UntypedSchema { .. }
            | Self::UnknownFormat { .. }
            | Self::FileParameter { .. }
            | Self::BadBounds { .. }
            | Self::AllOfNotObject { .. }
            | Self::DuplicateNode { .. }
            | Self::CycleDetected { .. }
            | Self::DuplicateSuite { .. }
            | Self::UnknownMethod { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => ErrorKind::Invalid,
            Self::UnknownNode { .. } | Self::Internal(_) => ErrorKind::Internal,
            Self::SuiteNotFound { .. } | Self::OperationNotFound { .. } => ErrorKind::NotFound,
            Self::ExpectStatus { .. } | Self::ExpectBody { .. } => ErrorKind::Expect,
            Self::Transport { .. } | Self::QueryMismatch { .. } | Self::ResultNotFound { .. } => {
                ErrorKind::Http
            }
            Self::SchemaMismatch { .. } => ErrorKind::ServerResp,
        }
    }

    /// Whether this error marks a test failure (tallied in the counters)
    /// rather than a broken invocation.
    pub const fn is_test_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::Expect | ErrorKind::Http)
    }

    /// Process exit code for this error. Test failures exit 0 and are
    /// surfaced through the summary counters; everything else is a usage,
    /// I/O or parse error.
    pub const fn exit_code(&self) -> i32 {
        if self.is_test_failure() {
            0
        } else {
            1
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a transport error from any displayable source.
    pub fn transport(detail: impl ToString) -> Self {
        Self::Transport {
            detail: detail.to_string(),
        }
    }

    /// Create a schema-mismatch error.
    pub fn schema_mismatch(detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            detail: detail.into(),
        }
    }
}

/// Result type alias using [`ProbeError`].
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProbeError::InvalidRef {
            reference: "#/parameters/foo".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "invalid reference: '#/parameters/foo', only #/definitions/<Name> is supported"
        );
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(
            ProbeError::RefNotFound {
                name: "Pet".to_owned()
            }
            .kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            ProbeError::OperationNotFound {
                path: "/pets".to_owned(),
                method: "get".to_owned()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ProbeError::ExpectStatus { status: 500 }.kind(),
            ErrorKind::Expect
        );
        assert_eq!(
            ProbeError::transport("connection refused").kind(),
            ErrorKind::Http
        );
        assert_eq!(
            ProbeError::schema_mismatch("missing field id").kind(),
            ErrorKind::ServerResp
        );
        assert_eq!(ProbeError::internal("bug").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_failures_exit_zero() {
        assert_eq!(ProbeError::ExpectStatus { status: 404 }.exit_code(), 0);
        assert_eq!(
            ProbeError::QueryMismatch {
                entry: "{}".to_owned()
            }
            .exit_code(),
            0
        );
        assert_eq!(ProbeError::internal("bug").exit_code(), 1);
        assert_eq!(
            ProbeError::DuplicateSuite {
                name: "s".to_owned()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ProbeError = io_err.into();
        assert!(matches!(err, ProbeError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn cycle_report_lists_chain() {
        let err = ProbeError::CycleDetected {
            chain: "\to|/pets|post\n\td|Pet|".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("circular dependency"));
        assert!(msg.contains("o|/pets|post"));
    }
}
