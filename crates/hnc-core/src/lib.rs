//! Core of the hierarchical namespace controller: the forest model, the four
//! reconcilers, the five admission validators, and the seams they share.
//!
//! The forest is the only inter-component shared state. Reconcilers follow
//! one flow: read from the orchestrator, lock the forest, compute, unlock,
//! write back, lock again to record the outcome. Enqueue intents produced
//! while the lock is held are buffered and dispatched afterwards, never
//! through a callback under the lock.

pub mod cluster;
pub mod forest;
pub mod kinds;
pub mod log;
pub mod reconcile;
pub mod selectors;
pub mod settings;
pub mod validate;

pub use ::hnc_api as api;

pub use thiserror::Error as ThisError;

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifier this controller writes into manager fields; a namespace whose
/// managed-by annotation names anything else is external.
pub const MANAGER_ID: &str = "hnc.dev";

///
/// Error
///
/// Top-level envelope; every layer error converts into it so public entry
/// points can return one type.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Cluster(#[from] cluster::ClusterError),

    #[error(transparent)]
    Reconcile(#[from] reconcile::ReconcileError),

    #[error(transparent)]
    Selector(#[from] selectors::SelectorError),

    #[error(transparent)]
    Settings(#[from] settings::SettingsError),
}
