//! The job graph: resources, jobs, the dependency solver, and per-job
//! scratch directory lifecycle.
//!
//! A [`resource_pool::ResourcePool`] of [`Resource`] values describes what a
//! sub-workflow has bound so far, without running anything. [`job::Job`]
//! and its [`resource::ComputedResource`] counterpart turn a subset of that
//! pool into a dependency graph ([`solver::ExecutionGraph`]), built by
//! [`solver::DependencySolver`]; running that graph through an
//! [`solver::Executor`] and gathering the results produces a new pool of
//! resolved resources.

mod error;
mod job;
mod resource;
mod solver;
mod state;

pub use error::ExecutionError;
pub use job::{
    ExternalProcessJob, FailingMockJob, FunctionJob, Job, JobCore, JobHandle, MockJob,
    ResourceEstimate,
};
pub use resource::{
    ComputedResource, FileResource, InvalidResource, LiteralResource, Resource, ResourceValue,
};
pub use solver::{DependencySolver, Executor, ExecutionGraph, GraphNode, JobOutcome};
pub use state::State;
