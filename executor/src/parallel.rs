//! The parallel executor (§4.5, §5): partitions the graph into weakly
//! connected components, runs each component concurrently, and inside a
//! component dispatches every node as a future that awaits its own
//! dependencies before admitting itself against the shared `{cpu, memory}`
//! budget. A component's storage requirement is reserved once, for the
//! whole component, rather than per job (prevents scratch fragmentation).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::async_trait::async_trait;
use common::futures::future::{BoxFuture, FutureExt, Shared};
use common::futures::stream::{FuturesUnordered, StreamExt};
use common::tokio::sync::Semaphore;
use common::tracing::{debug, warn};
use execution_graph::{
    ExecutionError, ExecutionGraph, Executor, GraphNode, JobOutcome, ResourceEstimate, State,
};
use petgraph::stable_graph::NodeIndex;

use crate::admission::AdmissionController;

type NodeFuture = Shared<BoxFuture<'static, (String, JobOutcome)>>;

/// A worker pool with a fixed `{cpu, memory, storage}` capacity and a bound
/// on the number of jobs invoked concurrently (§5's "N workers, each with a
/// thread budget").
pub struct ParallelExecutor {
    scratch_root: PathBuf,
    keep_working_dirs: bool,
    admission: Arc<AdmissionController>,
    workers: Arc<Semaphore>,
}

impl ParallelExecutor {
    pub fn new(
        scratch_root: impl Into<PathBuf>,
        keep_working_dirs: bool,
        capacity: ResourceEstimate,
        worker_count: usize,
    ) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            keep_working_dirs,
            admission: Arc::new(AdmissionController::new(capacity)),
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }
}

#[async_trait]
impl Executor for ParallelExecutor {
    async fn execute(&self, graph: &ExecutionGraph) -> HashMap<String, JobOutcome> {
        let components = graph.weakly_connected_components();
        debug!(count = components.len(), "partitioned graph into components");

        let mut component_futures: FuturesUnordered<BoxFuture<'_, HashMap<String, JobOutcome>>> =
            FuturesUnordered::new();
        for component in components {
            component_futures.push(self.run_component(graph, component).boxed());
        }

        let mut results = HashMap::new();
        while let Some(component_results) = component_futures.next().await {
            results.extend(component_results);
        }
        results
    }
}

impl ParallelExecutor {
    /// Run one weakly connected component to completion, reserving its
    /// total storage estimate for the component's whole lifetime and
    /// admitting each node's `{cpu, memory}` requirement individually as it
    /// becomes runnable.
    async fn run_component(
        &self,
        graph: &ExecutionGraph,
        component: std::collections::BTreeSet<NodeIndex>,
    ) -> HashMap<String, JobOutcome> {
        let order = graph.topological_order_within(&component);

        let storage_needed: f64 = order
            .iter()
            .map(|idx| graph.node(*idx).estimate().storage)
            .sum();
        let _storage_guard = self
            .admission
            .admit(ResourceEstimate {
                cpu: 0.0,
                memory: 0.0,
                storage: storage_needed,
            })
            .await;

        let mut futures_by_node: HashMap<NodeIndex, NodeFuture> = HashMap::new();

        for idx in &order {
            let node = graph.node(*idx).clone();
            let dependency_futures: Vec<NodeFuture> = graph
                .dependency_edges(*idx)
                .into_iter()
                .map(|(_, dep_idx)| {
                    futures_by_node
                        .get(&dep_idx)
                        .expect("dependencies are visited before their consumers")
                        .clone()
                })
                .collect();

            let admission = self.admission.clone();
            let workers = self.workers.clone();
            let scratch_root = self.scratch_root.clone();
            let keep = self.keep_working_dirs;

            let future: BoxFuture<'static, (String, JobOutcome)> = Box::pin(async move {
                invoke_node(node, dependency_futures, admission, workers, scratch_root, keep).await
            });
            futures_by_node.insert(*idx, future.shared());
        }

        let mut results = HashMap::new();
        for (_, future) in futures_by_node {
            let (hash, outcome) = future.await;
            results.insert(hash, outcome);
        }
        results
    }
}

/// Await this node's dependencies, admit its `{cpu, memory}` requirement,
/// and invoke it on a blocking thread (a job's `run` is a synchronous,
/// potentially long-running call, e.g. spawning an external process).
async fn invoke_node(
    node: GraphNode,
    dependency_futures: Vec<NodeFuture>,
    admission: Arc<AdmissionController>,
    workers: Arc<Semaphore>,
    scratch_root: PathBuf,
    keep: bool,
) -> (String, JobOutcome) {
    let mut dependency_results = HashMap::new();
    for dependency in dependency_futures {
        let (hash, outcome) = dependency.await;
        dependency_results.insert(hash, outcome);
    }

    let node_hash = node.long_hash();
    let estimate = node.estimate();
    let _worker_permit = workers
        .acquire()
        .await
        .expect("worker semaphore is never closed while jobs are running");
    let _resource_guard = admission
        .admit(ResourceEstimate {
            cpu: estimate.cpu,
            memory: estimate.memory,
            storage: 0.0,
        })
        .await;

    debug!(hash = %node_hash, "invoking node");
    let outcome = match State::enter(&scratch_root, &node_hash, keep) {
        Ok(state) => {
            let work_dir = state.path().to_path_buf();
            invoke_blocking(node, dependency_results, work_dir).await
        }
        Err(err) => {
            warn!(hash = %node_hash, %err, "failed to create scratch directory");
            JobOutcome::Failed(err.to_string())
        }
    };
    (node_hash, outcome)
}

async fn invoke_blocking(
    node: GraphNode,
    results: HashMap<String, JobOutcome>,
    work_dir: PathBuf,
) -> JobOutcome {
    let join_result = common::tokio::task::spawn_blocking(move || {
        invoke_sync(&node, &results, &work_dir)
    })
    .await;

    match join_result {
        Ok(Ok(outputs)) => JobOutcome::Success(outputs),
        Ok(Err(ExecutionError::MissingDependencies)) => JobOutcome::MissingDependencies,
        Ok(Err(err)) => {
            warn!(%err, "node failed");
            JobOutcome::Failed(err.to_string())
        }
        Err(join_err) => JobOutcome::Failed(format!("job panicked: {join_err}")),
    }
}

fn invoke_sync(
    node: &GraphNode,
    results: &HashMap<String, JobOutcome>,
    work_dir: &Path,
) -> std::result::Result<std::collections::BTreeMap<String, execution_graph::ResourceValue>, ExecutionError>
{
    node.invoke(results, work_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::str::FromStr;
    use std::time::{Duration, Instant};

    use execution_graph::{DependencySolver, FunctionJob, JobHandle, MockJob, Resource, ResourceValue};
    use resource_key::ResourceKey;
    use resource_pool::{Lookup, ResourcePool};

    fn key(s: &str) -> ResourceKey {
        ResourceKey::from_str(s).unwrap()
    }

    fn default_capacity() -> ResourceEstimate {
        ResourceEstimate {
            cpu: 8.0,
            memory: 32.0,
            storage: 16.0,
        }
    }

    #[tokio::test]
    async fn basic_chain_resolves_to_its_literal_value() {
        let producer = JobHandle::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([("path".to_string(), ResourceValue::from("c.nii.gz"))]),
        ));
        let mut pool: ResourcePool<Resource> = ResourcePool::new();
        pool.set(key("sub-001_label-base_T1w"), producer.output("path"))
            .unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let executor = ParallelExecutor::new(scratch.path(), false, default_capacity(), 2);
        let gathered = DependencySolver::execute(&pool, &executor).await.unwrap();

        match gathered.get(&key("sub-001_label-base_T1w")).unwrap() {
            Lookup::One(Resource::Literal(l)) => {
                assert_eq!(l.value(), &ResourceValue::from("c.nii.gz"));
            }
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn independent_components_run_concurrently_on_two_workers() {
        let sleep_job = |name: &str| {
            FunctionJob::new(
                name.to_string(),
                None,
                BTreeMap::new(),
                ResourceEstimate::default(),
                |_inputs, _work_dir| {
                    std::thread::sleep(Duration::from_secs(2));
                    Ok(BTreeMap::from([(
                        "path".to_string(),
                        ResourceValue::from("done"),
                    )]))
                },
            )
        };

        let a = JobHandle::new(sleep_job("sleep-a"));
        let b = JobHandle::new(sleep_job("sleep-b"));

        let mut pool: ResourcePool<Resource> = ResourcePool::new();
        pool.set(key("sub-001_label-a_T1w"), a.output("path"))
            .unwrap();
        pool.set(key("sub-001_label-b_T1w"), b.output("path"))
            .unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let executor = ParallelExecutor::new(scratch.path(), false, default_capacity(), 2);

        let start = Instant::now();
        let gathered = DependencySolver::execute(&pool, &executor).await.unwrap();
        let elapsed = start.elapsed();

        assert!(matches!(
            gathered.get(&key("sub-001_label-a_T1w")).unwrap(),
            Lookup::One(Resource::Literal(_))
        ));
        assert!(matches!(
            gathered.get(&key("sub-001_label-b_T1w")).unwrap(),
            Lookup::One(Resource::Literal(_))
        ));
        assert!(
            elapsed < Duration::from_secs(4),
            "two 2s sleeps on two workers should overlap, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn a_failed_job_does_not_abort_an_unrelated_sibling() {
        let failing = JobHandle::new(MockJob::failing(None, BTreeMap::new(), "boom"));
        let ok = JobHandle::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([("path".to_string(), ResourceValue::from("ok.nii.gz"))]),
        ));

        let mut pool: ResourcePool<Resource> = ResourcePool::new();
        pool.set(key("sub-001_label-a_T1w"), failing.output("path"))
            .unwrap();
        pool.set(key("sub-001_label-b_T1w"), ok.output("path"))
            .unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let executor = ParallelExecutor::new(scratch.path(), false, default_capacity(), 2);
        let gathered = DependencySolver::execute(&pool, &executor).await.unwrap();

        assert!(matches!(
            gathered.get(&key("sub-001_label-a_T1w")).unwrap(),
            Lookup::One(Resource::Invalid(_))
        ));
        match gathered.get(&key("sub-001_label-b_T1w")).unwrap() {
            Lookup::One(Resource::Literal(l)) => {
                assert_eq!(l.value(), &ResourceValue::from("ok.nii.gz"))
            }
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }
}
