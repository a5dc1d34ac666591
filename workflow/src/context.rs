//! [`Context`]: the immutable record handed to every sub-workflow (§6).

use std::path::PathBuf;

use crate::config::PipelineConfig;

/// Everything a sub-workflow needs to know about the run it is part of,
/// besides the resource pool it is wired against. Built once by the
/// `radiome` binary and never mutated afterward.
#[derive(Debug, Clone)]
pub struct Context {
    pub working_dir: PathBuf,
    pub inputs_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub participant_labels: Vec<String>,
    pub n_cpus: usize,
    pub memory_mb: u64,
    pub save_working_dir: bool,
    pub pipeline_config: PipelineConfig,
    pub diagnostics: bool,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        working_dir: PathBuf,
        inputs_dir: PathBuf,
        outputs_dir: PathBuf,
        participant_labels: Vec<String>,
        n_cpus: usize,
        memory_mb: u64,
        save_working_dir: bool,
        pipeline_config: PipelineConfig,
        diagnostics: bool,
    ) -> Self {
        Self {
            working_dir,
            inputs_dir,
            outputs_dir,
            participant_labels,
            n_cpus,
            memory_mb,
            save_working_dir,
            pipeline_config,
            diagnostics,
        }
    }

    /// True when this context scopes the run to a subset of participants.
    pub fn has_participant_filter(&self) -> bool {
        !self.participant_labels.is_empty()
    }
}
