//! [`SubWorkflow`], the contract an external module implements to
//! participate in a pipeline (§6): validate its `config` against its own
//! schema, read resources from the pool by filter key, and append jobs
//! whose outputs are placed back under concrete keys.
//!
//! Mirrors this codebase's `async_trait`-with-default-no-op-hooks plugin
//! pattern (see `provider::ProviderTrait`).

use std::collections::BTreeMap;

use common::async_trait::async_trait;
use common::eyre::Result;
use execution_graph::Resource;
use resource_pool::ResourcePool;

use crate::config::WorkflowSpecConfig;
use crate::context::Context;
use crate::error::WorkflowError;

/// A specification for an in-process sub-workflow, analogous to
/// `provider::Provider`: every `SubWorkflow` implementation returns one
/// from `spec()` so it can be registered under a stable name.
#[derive(Debug, Clone)]
pub struct WorkflowSpec {
    pub name: String,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The sub-workflow plugin contract (§6). A loaded module must expose
/// `create_workflow`: given its own schema-validated config, the shared
/// resource pool, and the run's [`Context`], it appends jobs to the pool
/// and returns once graph construction for that step is done. The call is
/// synchronous in effect (it only builds the graph; nothing here runs a
/// job), but is `async` to match the rest of this codebase's plugin
/// surfaces and to allow implementations backed by remote or I/O-bound
/// loaders.
#[async_trait]
pub trait SubWorkflow: Send + Sync {
    /// The workflow's own specification, loaded from its `spec.yml`.
    fn spec(&self) -> &WorkflowSpecConfig;

    /// Append jobs to `pool` for this step. `provided_inputs` is the
    /// step's `in:` mapping from the pipeline config, each value a
    /// resource-key filter string that this workflow resolves against
    /// `pool` itself.
    async fn create_workflow(
        &self,
        provided_inputs: &BTreeMap<String, String>,
        pool: &mut ResourcePool<Resource>,
        context: &Context,
    ) -> Result<()>;

    /// Validate `provided_inputs` against this workflow's declared
    /// `inputs:` schema before `create_workflow` runs. The default
    /// implementation defers to [`crate::config::validate_inputs`]; a
    /// workflow with additional cross-field rules may override this.
    fn validate_inputs(
        &self,
        step_name: &str,
        provided_inputs: &BTreeMap<String, String>,
    ) -> Result<()> {
        crate::config::validate_inputs(step_name, self.spec(), provided_inputs)
    }
}

/// An in-process registry of [`SubWorkflow`] implementations, keyed by the
/// name a pipeline step's `run:` locator resolves to (§6's "an in-process
/// registration (by name, for workflows compiled into the binary)").
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, std::sync::Arc<dyn SubWorkflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, workflow: std::sync::Arc<dyn SubWorkflow>) {
        self.workflows.insert(name.into(), workflow);
    }

    pub fn get(&self, name: &str) -> Result<std::sync::Arc<dyn SubWorkflow>> {
        self.workflows
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::UnresolvedLocator(name.to_string()).into())
    }
}
