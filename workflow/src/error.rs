//! The small set of matchable error kinds raised while resolving and
//! wiring sub-workflows (§7's "configuration" and part of "graph
//! construction" kinds); everything else crosses module boundaries as
//! `eyre::Result` with a `.wrap_err()` breadcrumb.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow locator \"{0}\" could not be resolved")]
    UnresolvedLocator(String),

    #[error("unsupported locator scheme in \"{0}\"")]
    UnsupportedScheme(String),

    #[error("step \"{step}\" input \"{input}\" is required but was not provided")]
    MissingInput { step: String, input: String },

    #[error("step \"{step}\" input \"{input}\" is not declared by the workflow's schema")]
    UnknownInput { step: String, input: String },

    #[error("pipeline configuration is not class \"pipeline\" (got \"{0}\")")]
    WrongConfigClass(String),
}
