//! A keyed container ([`ResourcePool`]) of resource values addressed by
//! [`resource_key::ResourceKey`], supporting lookup by filter and the
//! `extract` query that expands a set of requests across every observed
//! branching-entity and strategy-fork combination.
//!
//! `ResourcePool` is generic over its value type: this crate has no notion
//! of jobs or computation, only of keyed storage and the matching algebra
//! `resource-key` provides.

mod pool;
mod scoped;

pub use pool::{Lookup, ResourcePool};
pub use scoped::StrategyResourcePool;
