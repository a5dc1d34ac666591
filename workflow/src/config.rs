//! Pipeline and sub-workflow YAML configuration (§6, §10): `serde`-derived
//! structs parsed with `serde_yaml`, with a `schemars`-derived JSON Schema
//! for the `inputs:` block so a sub-workflow's parameter schema can be
//! validated structurally before `create_workflow` runs. Cross-field
//! business-rule validation beyond "does this deserialize and match its
//! schema" is out of scope (§1).

use std::collections::BTreeMap;

use common::eyre::{Context as _, Result};
use common::serde::{Deserialize, Serialize};
use common::serde_json::Value;
use schemars::JsonSchema;

use crate::error::WorkflowError;

/// Top-level pipeline configuration: `class: pipeline` (§6).
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(crate = "common::serde")]
pub struct PipelineConfig {
    #[serde(rename = "radiomeSchemaVersion")]
    pub schema_version: String,
    pub class: PipelineClass,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case", crate = "common::serde")]
pub enum PipelineClass {
    Pipeline,
}

/// One entry of the `steps:` list: a single-key mapping from step name to
/// its [`Step`] body, matching the source YAML's `- <step-name>: {...}`
/// shape.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(transparent, crate = "common::serde")]
pub struct StepEntry(pub BTreeMap<String, Step>);

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(crate = "common::serde")]
pub struct Step {
    /// A module locator: a path, a fully-qualified in-process name, or a
    /// `gh://org/repo[@rev]` git locator (§6).
    pub run: String,
    #[serde(rename = "in", default)]
    pub inputs: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Flatten `steps` into `(name, step)` pairs in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = (&str, &Step)> {
        self.steps
            .iter()
            .flat_map(|entry| entry.0.iter().map(|(name, step)| (name.as_str(), step)))
    }
}

/// A sub-workflow's own `spec.yml`: `class: workflow` plus its typed
/// `inputs:` schema (§6).
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(crate = "common::serde")]
pub struct WorkflowSpecConfig {
    #[serde(rename = "radiomeSchemaVersion")]
    pub schema_version: String,
    pub class: WorkflowClass,
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case", crate = "common::serde")]
pub enum WorkflowClass {
    Workflow,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(crate = "common::serde")]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Parse a top-level pipeline configuration document.
pub fn parse_pipeline_config(yaml: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig =
        common::serde_yaml::from_str(yaml).wrap_err("failed to parse pipeline configuration")?;
    if config.class != PipelineClass::Pipeline {
        return Err(WorkflowError::WrongConfigClass(format!("{:?}", config.class)).into());
    }
    Ok(config)
}

/// Parse a sub-workflow's own `spec.yml`.
pub fn parse_workflow_spec(yaml: &str) -> Result<WorkflowSpecConfig> {
    common::serde_yaml::from_str(yaml).wrap_err("failed to parse workflow spec.yml")
}

/// The JSON Schema for a sub-workflow's `spec.yml`, generated from
/// [`WorkflowSpecConfig`]'s `schemars` derive.
pub fn workflow_spec_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(WorkflowSpecConfig)
}

/// Validate a step's `in:` mapping against the workflow's declared
/// `inputs:` schema: every required input must be provided, and every
/// provided input must be declared (mirrors `schema.py`'s
/// `validate_inputs`).
pub fn validate_inputs(
    step_name: &str,
    spec: &WorkflowSpecConfig,
    provided: &BTreeMap<String, String>,
) -> Result<()> {
    for (name, input_spec) in &spec.inputs {
        if input_spec.required && input_spec.default.is_none() && !provided.contains_key(name) {
            return Err(WorkflowError::MissingInput {
                step: step_name.to_string(),
                input: name.clone(),
            }
            .into());
        }
    }
    for name in provided.keys() {
        if !spec.inputs.contains_key(name) {
            return Err(WorkflowError::UnknownInput {
                step: step_name.to_string(),
                input: name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_basic_pipeline_document() {
        let yaml = r#"
radiomeSchemaVersion: "1.0"
class: pipeline
name: anat-preproc
steps:
  - skullstrip:
      run: anat_skullstrip
      in:
        T1w: sub-*_T1w
"#;
        let config = parse_pipeline_config(yaml).unwrap();
        assert_eq!(config.name, "anat-preproc");
        let steps: Vec<_> = config.steps().collect();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].0, "skullstrip");
        assert_eq!(steps[0].1.run, "anat_skullstrip");
    }

    #[test]
    fn rejects_a_document_that_is_not_class_pipeline() {
        let yaml = r#"
radiomeSchemaVersion: "1.0"
class: workflow
name: not-a-pipeline
"#;
        assert!(parse_pipeline_config(yaml).is_err());
    }

    #[test]
    fn parses_a_workflow_spec_with_inputs() {
        let yaml = r#"
radiomeSchemaVersion: "1.0"
class: workflow
name: anat_skullstrip
inputs:
  T1w:
    type: File
    required: true
"#;
        let spec = parse_workflow_spec(yaml).unwrap();
        assert_eq!(spec.inputs.len(), 1);
        assert!(spec.inputs["T1w"].required);
    }

    #[test]
    fn validate_inputs_rejects_missing_required_field() {
        let spec = parse_workflow_spec(
            r#"
radiomeSchemaVersion: "1.0"
class: workflow
name: anat_skullstrip
inputs:
  T1w:
    type: File
    required: true
"#,
        )
        .unwrap();
        let provided = BTreeMap::new();
        let err = validate_inputs("skullstrip", &spec, &provided).unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn validate_inputs_rejects_unknown_field() {
        let spec = parse_workflow_spec(
            r#"
radiomeSchemaVersion: "1.0"
class: workflow
name: anat_skullstrip
inputs: {}
"#,
        )
        .unwrap();
        let provided = BTreeMap::from([("bogus".to_string(), "x".to_string())]);
        let err = validate_inputs("skullstrip", &spec, &provided).unwrap_err();
        assert!(err.to_string().contains("not declared"));
    }

    #[test]
    fn validate_inputs_allows_missing_optional_fields_with_defaults() {
        let spec = parse_workflow_spec(
            r#"
radiomeSchemaVersion: "1.0"
class: workflow
name: anat_skullstrip
inputs:
  space:
    type: String
    required: true
    default: orig
"#,
        )
        .unwrap();
        let provided = BTreeMap::new();
        assert!(validate_inputs("skullstrip", &spec, &provided).is_ok());
    }
}
