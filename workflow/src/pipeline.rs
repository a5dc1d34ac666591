//! [`Pipeline::run`]: the end-to-end drive of a pipeline config through
//! input loading, every sub-workflow step, the dependency solver, and
//! derivative materialization (§2's data flow, §6).

use std::path::PathBuf;

use common::eyre::{bail, Context as _, Result};
use common::tracing::info;
use execution_graph::{DependencySolver, Executor, Resource};
use resource_pool::ResourcePool;

use crate::context::Context;
use crate::error::WorkflowError;
use crate::inputs::load_inputs;
use crate::locator::WorkflowLocator;
use crate::output::{copy_into_derivatives, derivative_location, extension_of};
use crate::subworkflow::WorkflowRegistry;

pub struct Pipeline;

impl Pipeline {
    /// Run the pipeline described by `context.pipeline_config` to
    /// completion: load BIDS inputs, run every step's `create_workflow`
    /// against the shared pool, solve and execute the resulting graph, and
    /// copy gathered file outputs into the derivatives layout.
    pub async fn run(
        context: &Context,
        registry: &WorkflowRegistry,
        executor: &dyn Executor,
    ) -> Result<ResourcePool<Resource>> {
        let mut pool = ResourcePool::new();
        let loaded = load_inputs(&context.inputs_dir, &mut pool)
            .wrap_err("failed to scan the inputs directory")?;
        info!(
            "loaded {loaded} input resources from {}",
            context.inputs_dir.display()
        );

        for (step_name, step) in context.pipeline_config.steps() {
            let locator = WorkflowLocator::parse(&step.run)
                .wrap_err_with(|| format!("step \"{step_name}\" has an invalid locator"))?;
            let workflow = match locator {
                WorkflowLocator::Name(name) => registry.get(&name)?,
                WorkflowLocator::Path(_) | WorkflowLocator::Git { .. } => {
                    return Err(WorkflowError::UnresolvedLocator(step.run.clone()).into())
                }
            };

            workflow
                .validate_inputs(step_name, &step.inputs)
                .wrap_err_with(|| format!("step \"{step_name}\" failed input validation"))?;

            workflow
                .create_workflow(&step.inputs, &mut pool, context)
                .await
                .wrap_err_with(|| format!("step \"{step_name}\" failed to build its jobs"))?;
        }

        let gathered = DependencySolver::execute(&pool, executor)
            .await
            .wrap_err("failed to solve and execute the dependency graph")?;

        materialize_outputs(&gathered, context)
    }
}

/// Copy every gathered [`Resource::File`] result into the derivatives
/// layout, replacing it with the destination path (§4.5 gather, §6 output
/// layout). Non-file resources and tombstones pass through unchanged.
fn materialize_outputs(
    gathered: &ResourcePool<Resource>,
    context: &Context,
) -> Result<ResourcePool<Resource>> {
    let mut result = ResourcePool::new();
    for (key, resource) in gathered.iter() {
        let materialized = match resource {
            Resource::File(file) => {
                let source = PathBuf::from(file.path());
                if source.exists() {
                    let extension = extension_of(&source);
                    let destination = derivative_location(
                        &context.outputs_dir,
                        &context.pipeline_config.name,
                        key,
                        &extension,
                    );
                    copy_into_derivatives(&destination, &source).wrap_err_with(|| {
                        format!("failed to gather output for {key}")
                    })?;
                    Resource::file(destination.to_string_lossy().into_owned())?
                } else {
                    resource.clone()
                }
            }
            other => other.clone(),
        };
        result.set(key.clone(), materialized)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::subworkflow::SubWorkflow;
    use common::async_trait::async_trait;
    use execution_graph::{FunctionJob, JobHandle, ResourceEstimate, ResourceValue};
    use executor::SequentialExecutor;
    use std::collections::BTreeMap;
    use std::str::FromStr;
    use std::sync::Arc;

    struct Basename(crate::config::WorkflowSpecConfig);

    #[async_trait]
    impl SubWorkflow for Basename {
        fn spec(&self) -> &crate::config::WorkflowSpecConfig {
            &self.0
        }

        async fn create_workflow(
            &self,
            provided_inputs: &BTreeMap<String, String>,
            pool: &mut ResourcePool<Resource>,
            _context: &Context,
        ) -> Result<()> {
            let filter = resource_key::ResourceKey::from_str(&provided_inputs["T1w"])?;
            let (key, resource) = match pool.get(&filter) {
                Some(resource_pool::Lookup::One(value)) => {
                    (filter.clone(), value.clone())
                }
                _ => bail!("no input bound to {filter}"),
            };
            let _ = key;
            let path = match &resource {
                Resource::File(f) => f.path().to_string(),
                _ => bail!("expected a file resource"),
            };

            let job = JobHandle::new(FunctionJob::new(
                "basename",
                Some("basename".to_string()),
                BTreeMap::from([("input".to_string(), resource)]),
                ResourceEstimate::default(),
                move |_inputs, _work_dir| {
                    let path = std::path::Path::new(&path);
                    let base = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let dirname = path
                        .parent()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Ok(BTreeMap::from([
                        ("path".to_string(), ResourceValue::from(base)),
                        ("dirname".to_string(), ResourceValue::from(dirname)),
                    ]))
                },
            ));

            pool.set(
                resource_key::ResourceKey::from_str("sub-001_label-base_T1w")?,
                job.output("path"),
            )?;
            pool.set(
                resource_key::ResourceKey::from_str("sub-001_label-dir_T1w")?,
                job.output("dirname"),
            )?;
            Ok(())
        }
    }

    fn basename_spec() -> crate::config::WorkflowSpecConfig {
        crate::config::parse_workflow_spec(
            r#"
radiomeSchemaVersion: "1.0"
class: workflow
name: basename
inputs:
  T1w:
    type: File
    required: true
"#,
        )
        .unwrap()
    }

    fn pipeline_config() -> PipelineConfig {
        crate::config::parse_pipeline_config(
            r#"
radiomeSchemaVersion: "1.0"
class: pipeline
name: basename-pipeline
steps:
  - split:
      run: basename
      in:
        T1w: sub-001_T1w
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn basic_chain_scenario_resolves_basename_and_dirname() {
        let inputs_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(inputs_dir.path().join("a/b")).unwrap();
        std::fs::write(inputs_dir.path().join("a/b/sub-001_T1w.nii.gz"), b"").unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let outputs_dir = tempfile::tempdir().unwrap();

        let context = Context::new(
            scratch.path().to_path_buf(),
            inputs_dir.path().to_path_buf(),
            outputs_dir.path().to_path_buf(),
            Vec::new(),
            1,
            1024,
            false,
            pipeline_config(),
            false,
        );

        let mut registry = WorkflowRegistry::new();
        registry.register("basename", Arc::new(Basename(basename_spec())));

        let executor = SequentialExecutor::new(scratch.path().to_path_buf(), false);
        let gathered = Pipeline::run(&context, &registry, &executor).await.unwrap();

        match gathered
            .get(&resource_key::ResourceKey::from_str("sub-001_label-base_T1w").unwrap())
            .unwrap()
        {
            resource_pool::Lookup::One(Resource::Literal(l)) => {
                assert_eq!(l.value(), &ResourceValue::from("sub-001_T1w.nii.gz"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn an_unregistered_step_locator_fails_the_run() {
        let inputs_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let outputs_dir = tempfile::tempdir().unwrap();

        let context = Context::new(
            scratch.path().to_path_buf(),
            inputs_dir.path().to_path_buf(),
            outputs_dir.path().to_path_buf(),
            Vec::new(),
            1,
            1024,
            false,
            pipeline_config(),
            false,
        );

        let registry = WorkflowRegistry::new();
        let executor = SequentialExecutor::new(scratch.path().to_path_buf(), false);
        assert!(Pipeline::run(&context, &registry, &executor).await.is_err());
    }
}
