//! Test tooling for the hierarchical namespace controller: an in-memory
//! orchestrator with the storage semantics the core relies on (finalizers,
//! cascading namespace deletion, discovery), a static authorizer, and a
//! harness that drives the reconcilers to quiescence without watches.

pub mod cluster;
pub mod harness;

pub use cluster::{InMemoryCluster, StaticAuthorizer};
pub use harness::Harness;
