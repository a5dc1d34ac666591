//! The sequential executor (§4.5, §5): single-threaded, no suspension
//! points, deterministic order by topological sort within each weakly
//! connected component.

use std::collections::HashMap;
use std::path::PathBuf;

use common::async_trait::async_trait;
use common::tracing::{debug, warn};
use execution_graph::{ExecutionError, ExecutionGraph, Executor, JobOutcome, State};

/// Runs every node of a graph on the calling task, one at a time, in
/// topological order. Each weakly connected component is walked in full
/// before moving to the next, matching the parallel executor's
/// component-at-a-time grouping even though nothing here actually overlaps.
pub struct SequentialExecutor {
    scratch_root: PathBuf,
    keep_working_dirs: bool,
}

impl SequentialExecutor {
    pub fn new(scratch_root: impl Into<PathBuf>, keep_working_dirs: bool) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            keep_working_dirs,
        }
    }
}

#[async_trait]
impl Executor for SequentialExecutor {
    async fn execute(&self, graph: &ExecutionGraph) -> HashMap<String, JobOutcome> {
        let mut results: HashMap<String, JobOutcome> = HashMap::new();

        for component in graph.weakly_connected_components() {
            for idx in graph.topological_order_within(&component) {
                let node = graph.node(idx);
                let node_hash = node.long_hash();
                debug!(hash = %node_hash, "invoking node");

                let state = match State::enter(&self.scratch_root, &node_hash, self.keep_working_dirs)
                {
                    Ok(state) => state,
                    Err(err) => {
                        warn!(hash = %node_hash, %err, "failed to create scratch directory");
                        results.insert(node_hash, JobOutcome::Failed(err.to_string()));
                        continue;
                    }
                };

                let outcome = match node.invoke(&results, state.path()) {
                    Ok(outputs) => JobOutcome::Success(outputs),
                    Err(ExecutionError::MissingDependencies) => JobOutcome::MissingDependencies,
                    Err(err) => {
                        warn!(hash = %node_hash, %err, "node failed");
                        JobOutcome::Failed(err.to_string())
                    }
                };
                results.insert(node_hash, outcome);
            }
        }

        results
    }
}
