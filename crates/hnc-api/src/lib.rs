//! Stored entity shapes and wire constants for the hierarchical namespace
//! controller.
//!
//! Everything here is pure data: the three entities persisted in the
//! orchestrator (per-namespace hierarchy configuration, subnamespace anchors,
//! the cluster-wide configuration singleton), the dynamic manifest shape used
//! for managed objects of arbitrary kinds, and the label/annotation keys the
//! controller reads and writes on namespaces and objects. Behavior lives in
//! `hnc-core`; consumers can `use hnc_api::*` without reaching into
//! submodules.

pub mod anchor;
pub mod condition;
pub mod config;
pub mod hierarchy;
pub mod keys;
pub mod kind;
pub mod manifest;
pub mod meta;
pub mod review;

pub use anchor::*;
pub use condition::*;
pub use config::*;
pub use hierarchy::*;
pub use kind::*;
pub use manifest::*;
pub use meta::*;
pub use review::*;

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
