//! The two interchangeable executors (§4.5, §5): [`SequentialExecutor`]
//! walks the graph on the calling task with no suspension points;
//! [`ParallelExecutor`] runs each weakly connected component concurrently
//! on a bounded worker pool with resource-budgeted admission control.
//!
//! Both implement `execution_graph::Executor`, so `DependencySolver::execute`
//! is agnostic to which one is used.

mod admission;
mod parallel;
mod sequential;

pub use admission::{AdmissionController, AdmissionGuard};
pub use parallel::ParallelExecutor;
pub use sequential::SequentialExecutor;
