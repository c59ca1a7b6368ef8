//! Validation orchestrator.
//!
//! [`ValidationEngine`] is the entry point used by the API layer. It holds
//! only configuration; every call receives the [`FandomSnapshot`] to validate
//! against, so concurrent passes over the same snapshot need no locking.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use super::conflict::{self, ConflictLookup};
use super::dependencies::{
    detect_circular_dependencies, suggest_enhancements, suggest_unlocks, validate_dependencies,
};
use super::evaluator::execute_rules;
use super::result::{IssueType, ValidationError, ValidationResult, ValidationWarning};
use super::selection::{SelectionContext, SelectionIndex, SelectionItem};
use super::tag_classes::validate_tag_classes;
use super::templates::evaluate_templates;
use crate::config::ValidationConfig;
use crate::snapshot::FandomSnapshot;
use crate::types::DbId;

const FIELD_PATHWAY: &str = "pathway";
const FIELD_FANDOM: &str = "fandom_id";

#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(ValidationConfig::from_env())
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Run a full validation pass and merge every component's output.
    ///
    /// Order: dependencies, tag classes, custom rules, warning templates,
    /// enhancement suggestions. A context for another fandom yields a single
    /// `fandom_mismatch` error and nothing else.
    pub fn validate(
        &self,
        snapshot: &FandomSnapshot,
        context: &SelectionContext,
    ) -> ValidationResult {
        let graph = &snapshot.graph;
        let mut result = ValidationResult::valid();

        if context.fandom_id != graph.fandom_id() {
            tracing::warn!(
                requested = context.fandom_id,
                loaded = graph.fandom_id(),
                "Selection validated against another fandom's snapshot"
            );
            result.push_error(
                ValidationError::new(
                    IssueType::FandomMismatch,
                    format!(
                        "Selection belongs to fandom {} but fandom {} is loaded",
                        context.fandom_id,
                        graph.fandom_id()
                    ),
                )
                .with_field(FIELD_FANDOM)
                .with_value(json!(context.fandom_id)),
            );
            return result;
        }

        result.merge(validate_dependencies(graph, context).to_result(graph));
        result.merge(validate_tag_classes(graph, context));

        if self.config.custom_rules {
            result.merge(execute_rules(
                &snapshot.rules,
                graph,
                context,
                self.config.slow_rule_threshold,
            ));
        }
        if self.config.warning_templates {
            result.merge(evaluate_templates(graph, context));
        }
        if self.config.enhancement_suggestions {
            for enhancement in suggest_enhancements(graph, context) {
                result.push_suggestion(enhancement.to_suggestion());
            }
            for suggestion in suggest_unlocks(graph, context) {
                result.push_suggestion(suggestion);
            }
        }

        tracing::debug!(
            fandom_id = context.fandom_id,
            is_valid = result.is_valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            suggestions = result.suggestions.len(),
            "Validation pass finished"
        );
        result
    }

    /// Structural check of the loaded content, independent of any selection.
    pub fn check_graph(&self, snapshot: &FandomSnapshot) -> ValidationResult {
        detect_circular_dependencies(&snapshot.graph)
    }

    /// Validate a selection together with the order the user arranged it in.
    ///
    /// Pathway problems are warnings: items outside the selection, repeated
    /// items, and entries placed before one of their hard requirements.
    pub fn validate_pathway(
        &self,
        snapshot: &FandomSnapshot,
        fandom_id: DbId,
        tags: &[DbId],
        plot_blocks: &[DbId],
        pathway: &[SelectionItem],
    ) -> ValidationResult {
        let context = SelectionContext::new(fandom_id)
            .with_tags(tags.iter().copied())
            .with_plot_blocks(plot_blocks.iter().copied());
        let mut result = self.validate(snapshot, &context);
        if context.fandom_id != snapshot.fandom_id() {
            return result;
        }

        let graph = &snapshot.graph;
        let index = SelectionIndex::new(&context);
        let mut positions: HashMap<SelectionItem, usize> = HashMap::new();

        for (position, item) in pathway.iter().enumerate() {
            let name = graph.display_name(item.kind, item.id);
            if positions.contains_key(item) {
                result.push_warning(
                    ValidationWarning::new(
                        IssueType::DuplicatePathwayItem,
                        format!("\"{name}\" appears more than once in the pathway"),
                    )
                    .with_field(FIELD_PATHWAY)
                    .with_ids([item.id]),
                );
                continue;
            }
            positions.insert(*item, position);

            if !index.contains(item.kind, item.id) {
                result.push_warning(
                    ValidationWarning::new(
                        IssueType::PathwayItemNotSelected,
                        format!("\"{name}\" is in the pathway but not in the selection"),
                    )
                    .with_field(FIELD_PATHWAY)
                    .with_suggestion(format!("Select \"{name}\" or remove it from the pathway"))
                    .with_ids([item.id]),
                );
            }
        }

        let mut reported = HashSet::new();
        for item in pathway {
            let Some(&position) = positions.get(item) else {
                continue;
            };
            if !reported.insert(*item) {
                continue;
            }
            for &required in graph.hard_requirements(item.kind, item.id) {
                let requirement = SelectionItem {
                    kind: item.kind,
                    id: required,
                };
                let Some(&required_at) = positions.get(&requirement) else {
                    continue;
                };
                if required_at > position {
                    result.push_warning(
                        ValidationWarning::new(
                            IssueType::PathwayOrder,
                            format!(
                                "\"{}\" comes before its requirement \"{}\"",
                                graph.display_name(item.kind, item.id),
                                graph.display_name(item.kind, required)
                            ),
                        )
                        .with_field(FIELD_PATHWAY)
                        .with_suggestion(format!(
                            "Move \"{}\" earlier in the pathway",
                            graph.display_name(item.kind, required)
                        ))
                        .with_ids([item.id, required]),
                    );
                }
            }
        }

        result
    }

    /// Pairwise conflict check over a handful of items.
    pub async fn check_conflicts<L: ConflictLookup>(
        &self,
        snapshot: &FandomSnapshot,
        lookup: &L,
        fandom_id: DbId,
        items: &[SelectionItem],
    ) -> ValidationResult {
        if fandom_id != snapshot.fandom_id() {
            let mut result = ValidationResult::valid();
            result.push_error(
                ValidationError::new(
                    IssueType::FandomMismatch,
                    format!(
                        "Items belong to fandom {fandom_id} but fandom {} is loaded",
                        snapshot.fandom_id()
                    ),
                )
                .with_field(FIELD_FANDOM)
                .with_value(json!(fandom_id)),
            );
            return result;
        }
        conflict::check_conflicts(&snapshot.graph, lookup, items).await
    }
}
