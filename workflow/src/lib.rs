//! Pipeline and sub-workflow configuration, the sub-workflow plugin
//! contract, BIDS input discovery, and the derivatives output layout
//! (§6) — the external interfaces wired around the `execution-graph`/
//! `executor` core.

mod config;
mod context;
mod error;
mod inputs;
mod locator;
mod output;
mod pipeline;
mod subworkflow;

pub use config::{
    parse_pipeline_config, parse_workflow_spec, validate_inputs, workflow_spec_schema, InputSpec,
    PipelineClass, PipelineConfig, Step, StepEntry, WorkflowClass, WorkflowSpecConfig,
};
pub use context::Context;
pub use error::WorkflowError;
pub use inputs::load_inputs;
pub use locator::{resolve_to_path, spec_file_in, WorkflowLocator, WorkflowSource};
pub use output::{category_for_suffix, copy_into_derivatives, derivative_location, extension_of};
pub use pipeline::Pipeline;
pub use subworkflow::{SubWorkflow, WorkflowRegistry, WorkflowSpec};
