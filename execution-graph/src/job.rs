//! [`Job`], the unit of computation in the execution graph, and its three
//! kinds: a named Rust closure, an external process invocation, and a mock
//! used only in tests.
//!
//! A job is built complete: all of its named input bindings are supplied at
//! construction and never reassigned afterward. This sidesteps the
//! mutate-then-invalidate contract of the system this crate is modeled on
//! (where attributes are bound one at a time and each assignment invalidates
//! a cached hash) in favor of build-then-freeze, which is both simpler and
//! sufficient: nothing here ever needs to rebind an input after a job has
//! been handed to the solver. The hash itself is still lazily memoized, via
//! [`common::once_cell::sync::OnceCell`], the first time it is read.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use common::eyre::{bail, Result};
use common::once_cell::sync::OnceCell;
use hash_utils::{content_digest, HashContent, Hashable};

use crate::resource::{ComputedResource, Resource, ResourceValue};

/// The estimated resources a job needs while running, used by executors for
/// admission control (§5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceEstimate {
    pub cpu: f64,
    pub memory: f64,
    pub storage: f64,
}

impl Default for ResourceEstimate {
    /// Mirrors the default estimate of a generic job: one CPU, 3 GB memory,
    /// 5 MB of scratch storage.
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: 3.0,
            storage: 5.0 / 1024.0,
        }
    }
}

impl ResourceEstimate {
    /// The (much lighter) default estimate used for a resource projection
    /// node, which does no real work beyond reading an already-computed
    /// result.
    pub fn projection() -> Self {
        Self {
            cpu: 1.0,
            memory: 0.2,
            storage: 5.0 / 1024.0,
        }
    }
}

/// Core state shared by every job kind: its optional display reference, its
/// named input bindings, its resource estimate, and its memoized hash.
pub struct JobCore {
    reference: Option<String>,
    inputs: BTreeMap<String, Resource>,
    estimate: ResourceEstimate,
    cached_hash: OnceCell<String>,
}

impl fmt::Debug for JobCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCore")
            .field("reference", &self.reference)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("estimate", &self.estimate)
            .finish()
    }
}

impl JobCore {
    pub fn new(
        reference: Option<String>,
        inputs: BTreeMap<String, Resource>,
        estimate: ResourceEstimate,
    ) -> Self {
        Self {
            reference,
            inputs,
            estimate,
            cached_hash: OnceCell::new(),
        }
    }
}

/// A unit of computation: a set of named input bindings, a resource
/// estimate, and a side-effect-free `run` that turns resolved inputs into a
/// map of named outputs (§4.3).
///
/// Jobs are shared via `Arc<dyn Job>` so that the same instance can be
/// referenced as an input to more than one consumer; the execution graph is
/// built over these shared allocations (§4.5).
pub trait Job: fmt::Debug + Send + Sync {
    fn core(&self) -> &JobCore;

    /// The part of this job's identity beyond its reference and inputs: for
    /// example, the name of the function it runs, or the external process's
    /// class/operation/parameters.
    fn kind_hash_content(&self) -> HashContent;

    /// Run this job against its already-resolved inputs, inside the given
    /// scratch working directory. Must be free of side effects beyond what
    /// it writes under `work_dir` (§4.3).
    fn run(
        &self,
        inputs: BTreeMap<String, ResourceValue>,
        work_dir: &Path,
    ) -> Result<BTreeMap<String, ResourceValue>>;

    fn reference(&self) -> Option<&str> {
        self.core().reference.as_deref()
    }

    fn inputs(&self) -> &BTreeMap<String, Resource> {
        &self.core().inputs
    }

    fn estimate(&self) -> ResourceEstimate {
        self.core().estimate
    }

    fn cached_hash(&self) -> Option<String> {
        self.core().cached_hash.get().cloned()
    }

    /// Compute (if not already memoized) and return this job's content hash.
    ///
    /// Folds in each input's own hash by name, sorted, plus this job's
    /// `kind_hash_content`. Inputs that are themselves [`Resource::Computed`]
    /// read their producer job's hash, recursively finalizing it if
    /// necessary; this always terminates because the solver guarantees the
    /// dependency graph is acyclic before any hash is read (§4.5).
    fn finalize_hash(&self) -> String {
        self.core()
            .cached_hash
            .get_or_init(|| {
                let mut pairs: Vec<(String, String)> = self
                    .core()
                    .inputs
                    .iter()
                    .map(|(name, resource)| (name.clone(), resource.long_hash()))
                    .collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                let content = HashContent::Seq(vec![
                    self.reference().map(str::to_string).into(),
                    HashContent::Seq(
                        pairs
                            .into_iter()
                            .map(|(k, v)| HashContent::Seq(vec![k.into(), v.into()]))
                            .collect(),
                    ),
                    self.kind_hash_content(),
                ]);
                content_digest(&content)
            })
            .clone()
    }

    fn long_hash(&self) -> String {
        self.finalize_hash()
    }

    fn short_hash(&self) -> String {
        hash_utils::short_digest(&self.long_hash())
    }
}

/// A convenience handle around `Arc<dyn Job>`, used by sub-workflows to
/// build [`Resource::Computed`] promises against a job's named output
/// fields without constructing [`ComputedResource`] by hand.
#[derive(Clone)]
pub struct JobHandle(Arc<dyn Job>);

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JobHandle").field(&self.0).finish()
    }
}

impl JobHandle {
    pub fn new(job: impl Job + 'static) -> Self {
        JobHandle(Arc::new(job))
    }

    pub fn from_arc(job: Arc<dyn Job>) -> Self {
        JobHandle(job)
    }

    /// A promise for one named output field of this job.
    pub fn output(&self, field: impl Into<String>) -> Resource {
        Resource::Computed(ComputedResource::new(self.0.clone(), Some(field.into())))
    }

    /// A promise for this job's entire output map.
    pub fn whole(&self) -> Resource {
        Resource::Computed(ComputedResource::new(self.0.clone(), None))
    }

    pub fn inner(&self) -> Arc<dyn Job> {
        self.0.clone()
    }

    pub fn long_hash(&self) -> String {
        self.0.long_hash()
    }
}

/// A job that runs a named Rust closure. The closure itself cannot be
/// content-hashed, so `name` stands in for it the way a registry key would:
/// two `FunctionJob`s with the same name and inputs are considered the same
/// job (§4.1's "two structurally identical jobs collapse").
pub struct FunctionJob {
    core: JobCore,
    name: String,
    func: Arc<
        dyn Fn(&BTreeMap<String, ResourceValue>, &Path) -> Result<BTreeMap<String, ResourceValue>>
            + Send
            + Sync,
    >,
}

impl fmt::Debug for FunctionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionJob")
            .field("name", &self.name)
            .field("core", &self.core)
            .finish()
    }
}

impl FunctionJob {
    pub fn new(
        name: impl Into<String>,
        reference: Option<String>,
        inputs: BTreeMap<String, Resource>,
        estimate: ResourceEstimate,
        func: impl Fn(&BTreeMap<String, ResourceValue>, &Path) -> Result<BTreeMap<String, ResourceValue>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            core: JobCore::new(reference, inputs, estimate),
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl Job for FunctionJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn kind_hash_content(&self) -> HashContent {
        HashContent::Seq(vec!["function".into(), self.name.clone().into()])
    }

    fn run(
        &self,
        inputs: BTreeMap<String, ResourceValue>,
        work_dir: &Path,
    ) -> Result<BTreeMap<String, ResourceValue>> {
        (self.func)(&inputs, work_dir)
    }
}

/// A job whose body is an external process: `class_name`/`op_name` identify
/// which third-party tool and operation to invoke (opaque to this crate,
/// per §1's "integration with specific third-party image-processing tools"
/// being out of scope), and `params` are additional fixed arguments folded
/// into both the command line and the content hash alongside the resolved
/// named inputs.
#[derive(Debug)]
pub struct ExternalProcessJob {
    core: JobCore,
    class_name: String,
    op_name: String,
    params: BTreeMap<String, ResourceValue>,
}

impl ExternalProcessJob {
    pub fn new(
        class_name: impl Into<String>,
        op_name: impl Into<String>,
        reference: Option<String>,
        inputs: BTreeMap<String, Resource>,
        params: BTreeMap<String, ResourceValue>,
        estimate: ResourceEstimate,
    ) -> Self {
        Self {
            core: JobCore::new(reference, inputs, estimate),
            class_name: class_name.into(),
            op_name: op_name.into(),
            params,
        }
    }
}

impl Job for ExternalProcessJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn kind_hash_content(&self) -> HashContent {
        HashContent::Seq(vec![
            self.class_name.clone().into(),
            self.op_name.clone().into(),
            HashContent::Map(
                self.params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.hash_content()))
                    .collect(),
            ),
        ])
    }

    fn run(
        &self,
        inputs: BTreeMap<String, ResourceValue>,
        work_dir: &Path,
    ) -> Result<BTreeMap<String, ResourceValue>> {
        let mut command = std::process::Command::new(&self.op_name);
        command.current_dir(work_dir);
        for (name, value) in inputs.iter().chain(self.params.iter()) {
            command.arg(format!("--{name}={}", value.display()));
        }
        let output = command
            .output()
            .map_err(|err| common::eyre::eyre!("failed to spawn {}: {err}", self.op_name))?;
        if !output.status.success() {
            bail!(
                "{} ({}) exited with {}",
                self.op_name,
                self.class_name,
                output.status
            );
        }
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "stdout".to_string(),
            ResourceValue::Str(String::from_utf8_lossy(&output.stdout).into_owned()),
        );
        Ok(outputs)
    }
}

/// A job that returns a fixed set of outputs without doing any work, used
/// only in tests to exercise the graph/solver/executor machinery without an
/// external process.
#[derive(Debug)]
pub struct MockJob {
    core: JobCore,
    outputs: BTreeMap<String, ResourceValue>,
}

impl MockJob {
    pub fn new(
        reference: Option<String>,
        inputs: BTreeMap<String, Resource>,
        outputs: BTreeMap<String, ResourceValue>,
    ) -> Self {
        Self {
            core: JobCore::new(reference, inputs, ResourceEstimate::default()),
            outputs,
        }
    }

    /// A mock job that fails with the given message instead of producing
    /// any output.
    pub fn failing(reference: Option<String>, inputs: BTreeMap<String, Resource>, message: impl Into<String>) -> FailingMockJob {
        FailingMockJob {
            core: JobCore::new(reference, inputs, ResourceEstimate::default()),
            message: message.into(),
        }
    }
}

impl Job for MockJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn kind_hash_content(&self) -> HashContent {
        HashContent::Seq(vec![
            "mock".into(),
            HashContent::Map(
                self.outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.hash_content()))
                    .collect(),
            ),
        ])
    }

    fn run(
        &self,
        _inputs: BTreeMap<String, ResourceValue>,
        _work_dir: &Path,
    ) -> Result<BTreeMap<String, ResourceValue>> {
        Ok(self.outputs.clone())
    }
}

/// A mock job that always fails, used in tests to exercise failure
/// propagation and missing-dependency handling.
#[derive(Debug)]
pub struct FailingMockJob {
    core: JobCore,
    message: String,
}

impl Job for FailingMockJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn kind_hash_content(&self) -> HashContent {
        HashContent::Str(format!("failing-mock:{}", self.message))
    }

    fn run(
        &self,
        _inputs: BTreeMap<String, ResourceValue>,
        _work_dir: &Path,
    ) -> Result<BTreeMap<String, ResourceValue>> {
        bail!("{}", self.message)
    }
}
