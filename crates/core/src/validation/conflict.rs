//! Pairwise conflict checks over a small set of selected items.
//!
//! Used by the UI when a user drags a new tag or plot block next to existing
//! ones. Static conflicts come from the rule graph; an optional
//! [`ConflictLookup`] collaborator supplies conflicts stored elsewhere.

use std::future::Future;

use serde_json::json;

use super::result::{IssueType, ValidationError, ValidationResult};
use super::selection::SelectionItem;
use crate::graph::{RuleGraph, Tag};
use crate::types::EntityKind;

/// External source of conflicts between two selected items.
pub trait ConflictLookup: Send + Sync {
    /// Reason the two items conflict, or `None` when they are compatible.
    fn find_conflict(
        &self,
        a: SelectionItem,
        b: SelectionItem,
    ) -> impl Future<Output = Option<String>> + Send;
}

/// Lookup used until a conflict store exists: nothing ever conflicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalConflicts;

impl ConflictLookup for NoExternalConflicts {
    async fn find_conflict(&self, _a: SelectionItem, _b: SelectionItem) -> Option<String> {
        None
    }
}

/// Check every unordered pair of distinct items.
///
/// Tag pairs are checked against their classes' mutual-exclusion rules and
/// plot-block pairs against `conflicts_with` in either direction. Every pair
/// is then passed to `lookup` exactly once. Unknown ids only reach the
/// external lookup.
pub async fn check_conflicts<L: ConflictLookup>(
    graph: &RuleGraph,
    lookup: &L,
    items: &[SelectionItem],
) -> ValidationResult {
    let mut unique: Vec<SelectionItem> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(item) {
            unique.push(*item);
        }
    }

    let mut result = ValidationResult::valid();
    let mut pairs = 0usize;

    for (i, &a) in unique.iter().enumerate() {
        for &b in &unique[i + 1..] {
            pairs += 1;
            match (a.kind, b.kind) {
                (EntityKind::Tag, EntityKind::Tag) => tag_pair(graph, a, b, &mut result),
                (EntityKind::PlotBlock, EntityKind::PlotBlock) => {
                    plot_block_pair(graph, a, b, &mut result)
                }
                _ => {}
            }

            if let Some(reason) = lookup.find_conflict(a, b).await {
                result.push_error(
                    ValidationError::new(IssueType::ExternalConflict, reason)
                        .with_value(pair_value(a, b))
                        .with_ids([a.id, b.id]),
                );
            }
        }
    }

    tracing::debug!(
        items = unique.len(),
        pairs,
        conflicts = result.errors.len(),
        "Pairwise conflict check finished"
    );
    result
}

fn pair_value(a: SelectionItem, b: SelectionItem) -> serde_json::Value {
    json!({ "items": [a, b] })
}

fn tag_pair(graph: &RuleGraph, a: SelectionItem, b: SelectionItem, result: &mut ValidationResult) {
    let (Some(first), Some(second)) = (graph.tag(a.id), graph.tag(b.id)) else {
        return;
    };
    let push = |result: &mut ValidationResult, kind: IssueType, message: String| {
        result.push_error(
            ValidationError::new(kind, message)
                .with_field(EntityKind::Tag.field())
                .with_value(pair_value(a, b))
                .with_ids([a.id, b.id]),
        );
    };

    if first.tag_class_id.is_some() && first.tag_class_id == second.tag_class_id {
        let within = first
            .tag_class_id
            .and_then(|id| graph.tag_class(id))
            .and_then(|class| class.validation_rules.mutual_exclusion.as_ref())
            .is_some_and(|rule| rule.within_class);
        if within {
            push(
                result,
                IssueType::MutualExclusionViolation,
                format!(
                    "\"{}\" and \"{}\" belong to the same exclusive class",
                    first.name, second.name
                ),
            );
        }
    }

    if lists_tag(graph, first, second) || lists_tag(graph, second, first) {
        push(
            result,
            IssueType::TagConflict,
            format!("\"{}\" conflicts with \"{}\"", first.name, second.name),
        );
    }

    if lists_class(graph, first, second) || lists_class(graph, second, first) {
        push(
            result,
            IssueType::ClassConflict,
            format!(
                "The classes of \"{}\" and \"{}\" cannot be combined",
                first.name, second.name
            ),
        );
    }
}

/// `owner`'s class names `other` in `conflicting_tags`.
fn lists_tag(graph: &RuleGraph, owner: &Tag, other: &Tag) -> bool {
    owner
        .tag_class_id
        .and_then(|id| graph.tag_class(id))
        .and_then(|class| class.validation_rules.mutual_exclusion.as_ref())
        .is_some_and(|rule| rule.conflicting_tags.contains(&other.id))
}

/// `owner`'s class names `other`'s class in `conflicting_classes`.
fn lists_class(graph: &RuleGraph, owner: &Tag, other: &Tag) -> bool {
    let Some(other_class) = other.tag_class_id else {
        return false;
    };
    owner
        .tag_class_id
        .and_then(|id| graph.tag_class(id))
        .and_then(|class| class.validation_rules.mutual_exclusion.as_ref())
        .is_some_and(|rule| rule.conflicting_classes.contains(&other_class))
}

fn plot_block_pair(
    graph: &RuleGraph,
    a: SelectionItem,
    b: SelectionItem,
    result: &mut ValidationResult,
) {
    let (Some(first), Some(second)) = (graph.plot_block(a.id), graph.plot_block(b.id)) else {
        return;
    };
    if first.conflicts_with.contains(&second.id) || second.conflicts_with.contains(&first.id) {
        result.push_error(
            ValidationError::new(
                IssueType::PlotBlockConflict,
                format!("\"{}\" conflicts with \"{}\"", first.name, second.name),
            )
            .with_field(EntityKind::PlotBlock.field())
            .with_value(pair_value(a, b))
            .with_ids([a.id, b.id]),
        );
    }
}
