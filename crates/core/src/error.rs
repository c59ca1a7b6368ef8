use crate::types::{DbId, EntityKind};

/// Errors raised while building or looking up rule-graph snapshots.
///
/// Validation passes themselves never fail; they report problems as items in a
/// [`ValidationResult`](crate::validation::result::ValidationResult).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: duplicate {} id {id}", kind.as_str())]
    Conflict { kind: EntityKind, id: DbId },
}
