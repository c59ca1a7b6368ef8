//! Selection validation engine.
//!
//! Provides the result taxonomy, the dependency resolver, tag-class
//! constraints, admin rule compilation and execution, warning templates,
//! pairwise conflict checks and the orchestrating [`engine::ValidationEngine`],
//! all without database dependencies.

pub mod conflict;
pub mod dependencies;
pub mod engine;
pub mod evaluator;
pub mod result;
pub mod rules;
pub mod selection;
pub mod tag_classes;
pub mod templates;
