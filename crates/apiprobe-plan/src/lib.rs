//! Test plans: the YAML model, the three plan generators, the
//! schema-driven data generator, and the executor that runs plans against
//! a live server while reconciling a shadow store.

pub mod compare;
pub mod exec;
pub mod generate;
pub mod history;
pub mod model;
pub mod report;
pub mod strategy;

pub use compare::Comparison;
pub use exec::{
    build_request, process_result, resolve_parameters, Auth, HttpDispatcher, PreparedRequest,
    ReqwestDispatcher, RunCounts, Runtime, ScriptedDispatcher,
};
pub use generate::Generator;
pub use history::{resolve_string, TestHistory};
pub use model::{
    split_documents, write_result_file, StoredResponse, Test, TestParams, TestPlan, TestSuite,
    EXPECT_BODY, EXPECT_STATUS, MEQA_INIT,
};
pub use strategy::{
    generate_object_plan, generate_path_plan, generate_simple_plan, last_path_element,
    last_path_param,
};
