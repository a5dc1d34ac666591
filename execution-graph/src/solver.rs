//! The execution graph itself: building it from a pool of resources keyed
//! by object identity (§4.5), detecting cycles, finalizing hashes in
//! topological order, running it through an [`Executor`], and gathering the
//! results back into a pool.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use common::async_trait::async_trait;
use common::eyre::Result;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use resource_key::ResourceKey;
use resource_pool::ResourcePool;

use crate::error::ExecutionError;
use crate::job::Job;
use crate::resource::{ComputedResource, InvalidResource, Resource, ResourceValue};

/// The outcome of running one graph node, keyed by its content hash in the
/// map an [`Executor`] returns (§4.5, §7).
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Success(BTreeMap<String, ResourceValue>),
    Failed(String),
    MissingDependencies,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }
}

/// One node of the execution graph: either a real job, or a projection of
/// one named field (or the whole output map) out of a job's result.
///
/// A [`Resource::Computed`] does not fold its producer job into a single
/// node; it becomes its own node whose only dependency is its producer,
/// under the implicit field name `"state"`. This mirrors the source system,
/// where a computed resource is itself job-like: it is "run" by projecting
/// a field out of an already-computed result, never by recursing into the
/// producer's own computation.
#[derive(Clone)]
pub enum GraphNode {
    Job(Arc<dyn Job>),
    Projection(ComputedResource),
}

impl GraphNode {
    pub fn identity(&self) -> usize {
        match self {
            GraphNode::Job(job) => Arc::as_ptr(job) as *const () as usize,
            GraphNode::Projection(cr) => cr.identity(),
        }
    }

    pub fn long_hash(&self) -> String {
        match self {
            GraphNode::Job(job) => job.long_hash(),
            GraphNode::Projection(cr) => cr.long_hash(),
        }
    }

    pub fn estimate(&self) -> crate::job::ResourceEstimate {
        match self {
            GraphNode::Job(job) => job.estimate(),
            GraphNode::Projection(_) => crate::job::ResourceEstimate::projection(),
        }
    }

    fn dependencies(&self) -> Vec<(String, GraphNode)> {
        match self {
            GraphNode::Job(job) => job
                .inputs()
                .iter()
                .filter_map(|(name, resource)| match resource {
                    Resource::Computed(cr) => {
                        Some((name.clone(), GraphNode::Projection(cr.clone())))
                    }
                    _ => None,
                })
                .collect(),
            GraphNode::Projection(cr) => {
                vec![("state".to_string(), GraphNode::Job(cr.job()))]
            }
        }
    }

    /// Run this node: resolve its inputs (pulling already-computed results
    /// for computed dependencies, resolving literal/file/invalid resources
    /// directly) and invoke it.
    pub fn invoke(
        &self,
        results: &HashMap<String, JobOutcome>,
        work_dir: &Path,
    ) -> std::result::Result<BTreeMap<String, ResourceValue>, ExecutionError> {
        match self {
            GraphNode::Job(job) => {
                let mut resolved = BTreeMap::new();
                for (name, resource) in job.inputs() {
                    let value = match resource {
                        Resource::Computed(cr) => project(results, cr)?,
                        other => other
                            .resolve_leaf(work_dir)
                            .map_err(|err| ExecutionError::Invalid(err.to_string()))?,
                    };
                    resolved.insert(name.clone(), value);
                }
                job.run(resolved, work_dir)
                    .map_err(|err| ExecutionError::Failed(err.to_string()))
            }
            GraphNode::Projection(cr) => {
                let value = project(results, cr)?;
                let mut outputs = BTreeMap::new();
                outputs.insert("value".to_string(), value);
                Ok(outputs)
            }
        }
    }
}

fn project(
    results: &HashMap<String, JobOutcome>,
    cr: &ComputedResource,
) -> std::result::Result<ResourceValue, ExecutionError> {
    match results.get(&cr.job().long_hash()) {
        Some(JobOutcome::Success(outputs)) => match cr.field() {
            Some(field) => outputs
                .get(field)
                .cloned()
                .ok_or_else(|| ExecutionError::UnknownField(field.to_string())),
            None => Ok(ResourceValue::Map(outputs.clone())),
        },
        _ => Err(ExecutionError::MissingDependencies),
    }
}

/// The dependency graph built by [`DependencySolver::build`]: nodes are
/// [`GraphNode`]s keyed during construction by object identity, edges carry
/// the input field name the consumer expects (§4.5).
pub struct ExecutionGraph {
    graph: StableDiGraph<GraphNode, String>,
    index_of: HashMap<usize, NodeIndex>,
    references: HashMap<NodeIndex, BTreeSet<ResourceKey>>,
}

impl ExecutionGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    pub fn node_indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Dependency node indices for `idx`, paired with the field name under
    /// which the consumer expects each one's result.
    pub fn dependency_edges(&self, idx: NodeIndex) -> Vec<(String, NodeIndex)> {
        self.graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .map(|edge| (edge.weight().clone(), edge.source()))
            .collect()
    }

    pub fn references(&self, idx: NodeIndex) -> BTreeSet<ResourceKey> {
        self.references.get(&idx).cloned().unwrap_or_default()
    }

    /// A full topological order over every node in the graph.
    pub fn topological_order(&self) -> std::result::Result<Vec<NodeIndex>, ExecutionError> {
        petgraph::algo::toposort(&self.graph, None).map_err(|_| ExecutionError::Cycle)
    }

    /// Weakly connected components, each as a set of node indices (§5).
    pub fn weakly_connected_components(&self) -> Vec<BTreeSet<NodeIndex>> {
        let mut union_find: HashMap<NodeIndex, NodeIndex> = self
            .graph
            .node_indices()
            .map(|idx| (idx, idx))
            .collect();

        fn find(union_find: &mut HashMap<NodeIndex, NodeIndex>, x: NodeIndex) -> NodeIndex {
            let parent = union_find[&x];
            if parent == x {
                x
            } else {
                let root = find(union_find, parent);
                union_find.insert(x, root);
                root
            }
        }

        for edge in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                let ra = find(&mut union_find, a);
                let rb = find(&mut union_find, b);
                if ra != rb {
                    union_find.insert(ra, rb);
                }
            }
        }

        let mut components: HashMap<NodeIndex, BTreeSet<NodeIndex>> = HashMap::new();
        for idx in self.graph.node_indices() {
            let root = find(&mut union_find, idx);
            components.entry(root).or_default().insert(idx);
        }
        components.into_values().collect()
    }

    /// Topological order restricted to the given subset of nodes.
    pub fn topological_order_within(&self, nodes: &BTreeSet<NodeIndex>) -> Vec<NodeIndex> {
        self.topological_order()
            .unwrap_or_default()
            .into_iter()
            .filter(|idx| nodes.contains(idx))
            .collect()
    }

    /// Finalize every job's hash in topological order, so a consumer never
    /// reads a dependency's hash before it has been computed.
    fn finalize_hashes(&self) -> std::result::Result<(), ExecutionError> {
        for idx in self.topological_order()? {
            self.graph[idx].long_hash();
        }
        Ok(())
    }

    /// Gather final results back into a pool keyed by each node's original
    /// reference keys (§4.5). Missing or failed results become
    /// [`Resource::Invalid`] tombstones rather than failing the whole
    /// gather.
    pub fn gather(
        &self,
        results: &HashMap<String, JobOutcome>,
    ) -> Result<ResourcePool<Resource>> {
        let mut pool = ResourcePool::new();
        for idx in self.graph.node_indices() {
            let keys = match self.references.get(&idx) {
                Some(keys) if !keys.is_empty() => keys,
                _ => continue,
            };
            let node = &self.graph[idx];
            let resource = match results.get(&node.long_hash()) {
                Some(JobOutcome::Success(outputs)) => match node {
                    // `invoke` already projected the requested field (or the
                    // whole output map) into the single `"value"` entry;
                    // re-projecting by `cr.field()` here would look the
                    // field name up in the *producer's* raw outputs, which
                    // is a different map.
                    GraphNode::Projection(_) => match outputs.get("value") {
                        Some(value) => resource_value_to_resource(value.clone()),
                        None => Resource::Invalid(InvalidResource::new(
                            "projection produced no value",
                        )),
                    },
                    GraphNode::Job(_) => {
                        resource_value_to_resource(ResourceValue::Map(outputs.clone()))
                    }
                },
                Some(JobOutcome::Failed(message)) => {
                    Resource::Invalid(InvalidResource::new(message.clone()))
                }
                Some(JobOutcome::MissingDependencies) | None => {
                    Resource::Invalid(InvalidResource::new("a dependency was never produced"))
                }
            };
            for key in keys {
                pool.set(key.clone(), resource.clone())?;
            }
        }
        Ok(pool)
    }
}

fn resource_value_to_resource(value: ResourceValue) -> Resource {
    match value {
        ResourceValue::Path(path) => Resource::File(
            crate::resource::FileResource::new(path.to_string_lossy().to_string())
                .unwrap_or_else(|_| {
                    crate::resource::FileResource::new(".").expect("\".\" is a valid path")
                }),
        ),
        other => Resource::literal(other),
    }
}

/// The executor contract: run an [`ExecutionGraph`] to completion and
/// return each node's outcome keyed by its content hash. Implemented by
/// the `executor` crate's `Sequential` and `Parallel` executors; defined
/// here (rather than there) so [`DependencySolver::execute`] does not need
/// a dependency back on that crate.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, graph: &ExecutionGraph) -> HashMap<String, JobOutcome>;
}

/// Builds the execution graph from a pool of resources, runs it through an
/// [`Executor`], and gathers the results back into a pool (§4.5).
pub struct DependencySolver;

impl DependencySolver {
    /// Build the execution graph, seeding it from every [`Resource::Computed`]
    /// entry in `pool` and walking backward through producer jobs. Returns
    /// an error if the resulting graph contains a cycle.
    pub fn build(pool: &ResourcePool<Resource>) -> std::result::Result<ExecutionGraph, ExecutionError> {
        let mut graph = StableDiGraph::new();
        let mut index_of: HashMap<usize, NodeIndex> = HashMap::new();
        let mut references: HashMap<NodeIndex, BTreeSet<ResourceKey>> = HashMap::new();
        let mut queue: VecDeque<GraphNode> = VecDeque::new();

        let mut get_or_insert = |graph: &mut StableDiGraph<GraphNode, String>,
                                  index_of: &mut HashMap<usize, NodeIndex>,
                                  node: GraphNode|
         -> (NodeIndex, bool) {
            let identity = node.identity();
            if let Some(&idx) = index_of.get(&identity) {
                (idx, false)
            } else {
                let idx = graph.add_node(node);
                index_of.insert(identity, idx);
                (idx, true)
            }
        };

        for (key, resource) in pool.iter() {
            if let Resource::Computed(cr) = resource {
                let node = GraphNode::Projection(cr.clone());
                let (idx, is_new) = get_or_insert(&mut graph, &mut index_of, node.clone());
                references.entry(idx).or_default().insert(key.clone());
                if is_new {
                    queue.push_back(node);
                }
            }
        }

        let mut visited: HashSet<usize> = HashSet::new();
        while let Some(node) = queue.pop_front() {
            let identity = node.identity();
            if !visited.insert(identity) {
                continue;
            }
            let consumer_idx = index_of[&identity];
            for (field, dependency) in node.dependencies() {
                let (dep_idx, is_new) =
                    get_or_insert(&mut graph, &mut index_of, dependency.clone());
                graph.add_edge(dep_idx, consumer_idx, field);
                if is_new {
                    queue.push_back(dependency);
                }
            }
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(ExecutionError::Cycle);
        }

        let built = ExecutionGraph {
            graph,
            index_of,
            references,
        };
        built.finalize_hashes()?;
        Ok(built)
    }

    /// Run the graph through `executor` and gather the results back into a
    /// pool of resolved resources.
    pub async fn execute(
        pool: &ResourcePool<Resource>,
        executor: &dyn Executor,
    ) -> Result<ResourcePool<Resource>> {
        let graph = Self::build(pool)?;
        if graph.node_count() == 0 {
            return Ok(ResourcePool::new());
        }
        let results = executor.execute(&graph).await;
        graph.gather(&results)
    }
}

impl std::fmt::Debug for ExecutionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobHandle, MockJob};
    use std::str::FromStr;

    fn key(s: &str) -> ResourceKey {
        ResourceKey::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn single_job_chain_executes_and_gathers() {
        let producer = JobHandle::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([("path".to_string(), ResourceValue::from("a.nii.gz"))]),
        ));
        let mut pool = ResourcePool::new();
        pool.set(key("sub-001_T1w"), producer.output("path"))
            .unwrap();

        let graph = DependencySolver::build(&pool).unwrap();
        assert_eq!(graph.node_count(), 2); // the job node plus its projection

        struct Seq;
        #[common::async_trait::async_trait]
        impl Executor for Seq {
            async fn execute(&self, graph: &ExecutionGraph) -> HashMap<String, JobOutcome> {
                let dir = tempfile::tempdir().unwrap();
                let mut results = HashMap::new();
                for idx in graph.topological_order().unwrap() {
                    let node = graph.node(idx);
                    let outcome = match node.invoke(&results, dir.path()) {
                        Ok(outputs) => JobOutcome::Success(outputs),
                        Err(ExecutionError::MissingDependencies) => JobOutcome::MissingDependencies,
                        Err(err) => JobOutcome::Failed(err.to_string()),
                    };
                    results.insert(node.long_hash(), outcome);
                }
                results
            }
        }

        let gathered = DependencySolver::execute(&pool, &Seq).await.unwrap();
        match gathered.get(&key("sub-001_T1w")).unwrap() {
            resource_pool::Lookup::One(Resource::Literal(l)) => {
                assert_eq!(l.value(), &ResourceValue::from("a.nii.gz"));
            }
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn cyclic_bindings_are_rejected() {
        // Two jobs cannot reference each other directly (Arc construction
        // forbids it structurally), but a self-referential chain through a
        // shared Arc can still be built manually to exercise the cycle
        // check: skip here since Job trait objects are immutable once
        // constructed, which already makes true cycles unconstructible by
        // the public API. This test instead checks that a normal diamond
        // (two consumers sharing one producer) is *not* flagged as cyclic.
        let producer = JobHandle::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([
                ("path".to_string(), ResourceValue::from("a.nii.gz")),
                ("mask".to_string(), ResourceValue::from("a_mask.nii.gz")),
            ]),
        ));
        let consumer = JobHandle::new(MockJob::new(
            None,
            BTreeMap::from([
                ("image".to_string(), producer.output("path")),
                ("mask".to_string(), producer.output("mask")),
            ]),
            BTreeMap::from([("result".to_string(), ResourceValue::from("done"))]),
        ));
        let mut pool = ResourcePool::new();
        pool.set(key("sub-001_T1w"), consumer.output("result"))
            .unwrap();
        let graph = DependencySolver::build(&pool);
        assert!(graph.is_ok());
    }

    #[test]
    fn unreferenced_jobs_share_a_single_node() {
        let producer = JobHandle::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([("path".to_string(), ResourceValue::from("a.nii.gz"))]),
        ));
        let mut pool = ResourcePool::new();
        pool.set(key("sub-001_T1w"), producer.output("path"))
            .unwrap();
        pool.set(key("sub-001_brain"), producer.output("path"))
            .unwrap();
        let graph = DependencySolver::build(&pool).unwrap();
        // the same job, projected twice (two distinct ComputedResource
        // instances) plus the shared producer job: three nodes, not four.
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn missing_output_field_gathers_as_invalid() {
        let producer = JobHandle::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([("path".to_string(), ResourceValue::from("a.nii.gz"))]),
        ));
        let mut pool = ResourcePool::new();
        pool.set(key("sub-001_T1w"), producer.output("missing"))
            .unwrap();
        let graph = DependencySolver::build(&pool).unwrap();
        let mut results = HashMap::new();
        for idx in graph.topological_order().unwrap() {
            let node = graph.node(idx);
            let dir = tempfile::tempdir().unwrap();
            let outcome = match node.invoke(&results, dir.path()) {
                Ok(outputs) => JobOutcome::Success(outputs),
                Err(err) => JobOutcome::Failed(err.to_string()),
            };
            results.insert(node.long_hash(), outcome);
        }
        let gathered = graph.gather(&results).unwrap();
        match gathered.get(&key("sub-001_T1w")).unwrap() {
            resource_pool::Lookup::One(Resource::Invalid(_)) => {}
            other => panic!("expected an invalid tombstone, got {other:?}"),
        }
    }
}
