//! Pure-logic core of the PlotWeave selection validator.
//!
//! Nothing in this crate performs I/O. Content and rules are handed in by the
//! caller, loaded into per-fandom snapshots, and validated synchronously.

pub mod config;
pub mod error;
pub mod graph;
pub mod snapshot;
pub mod types;
pub mod validation;

pub use config::ValidationConfig;
pub use error::CoreError;
pub use snapshot::{FandomSnapshot, SnapshotStore};
pub use validation::engine::ValidationEngine;
pub use validation::result::ValidationResult;
pub use validation::selection::{SelectionContext, SelectionItem};
