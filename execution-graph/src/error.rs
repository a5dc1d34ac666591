use thiserror::Error;

/// Errors a graph node can fail with while being invoked (§4.5, §7).
///
/// Distinguished from `eyre::Error` (used pervasively elsewhere in this
/// workspace for unmatched errors) because callers — the gather phase and
/// the executors — need to tell "this job's own body failed" apart from
/// "one of its dependencies never produced a value" in order to decide
/// whether to keep walking the graph or stop.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("a dependency of this job was never produced")]
    MissingDependencies,

    #[error("resolving an invalid resource: {0}")]
    Invalid(String),

    #[error("no output field named \"{0}\"")]
    UnknownField(String),

    #[error("dependency graph contains a cycle")]
    Cycle,

    #[error("inconsistent binding: {0}")]
    InconsistentBinding(String),

    #[error(transparent)]
    Io(std::sync::Arc<std::io::Error>),
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Io(std::sync::Arc::new(err))
    }
}
