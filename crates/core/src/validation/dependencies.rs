//! Dependency resolution over the requirement graph.
//!
//! Computes missing hard/soft requirements for a selection, dependency levels,
//! enhancement suggestions, and detects requirement cycles across the whole
//! loaded graph. All functions are pure; traversals carry their own
//! visited/path sets so malformed (cyclic) content can never loop forever.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::result::{
    IssueType, Severity, SuggestionAction, ValidationError, ValidationResult,
    ValidationSuggestion, ValidationWarning,
};
use super::selection::{SelectionContext, SelectionIndex};
use crate::graph::RuleGraph;
use crate::types::{DbId, EntityKind};

/// Kinds checked by the resolver, in reporting order.
const RESOLVED_KINDS: [EntityKind; 3] =
    [EntityKind::PlotBlock, EntityKind::Condition, EntityKind::Tag];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    Hard,
    Soft,
}

/// A requirement of a selected entity that the selection does not satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRequirement {
    pub source_id: DbId,
    pub source_kind: EntityKind,
    pub required_id: DbId,
    pub requirement_type: RequirementType,
    pub severity: Severity,
    pub message: String,
}

/// One selected entity with its position in the requirement hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyChainEntry {
    pub id: DbId,
    pub kind: EntityKind,
    pub name: String,
    /// 0 for entities without requirements, otherwise 1 + deepest requirement.
    pub level: usize,
    pub requires: Vec<DbId>,
}

/// Output of [`validate_dependencies`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyValidation {
    pub is_valid: bool,
    pub missing_requirements: Vec<MissingRequirement>,
    pub dependency_chain: Vec<DependencyChainEntry>,
}

impl DependencyValidation {
    /// Convert missing requirements into result items.
    ///
    /// Hard requirements become errors and soft requirements warnings. The
    /// [`dependency_suggestions`] for the hard ones are appended.
    pub fn to_result(&self, graph: &RuleGraph) -> ValidationResult {
        let mut result = ValidationResult::valid();

        for missing in &self.missing_requirements {
            let field = missing.source_kind.field();
            match missing.requirement_type {
                RequirementType::Hard => {
                    result.push_error(
                        ValidationError::new(
                            IssueType::HardRequirementViolation,
                            missing.message.clone(),
                        )
                        .with_field(field)
                        .with_value(json!({
                            "source_id": missing.source_id,
                            "required_id": missing.required_id,
                        }))
                        .with_ids([missing.source_id, missing.required_id]),
                    );
                }
                RequirementType::Soft => {
                    let name = graph.display_name(missing.source_kind, missing.required_id);
                    result.push_warning(
                        ValidationWarning::new(
                            IssueType::SoftRequirementViolation,
                            missing.message.clone(),
                        )
                        .with_field(field)
                        .with_suggestion(format!("Consider adding \"{name}\""))
                        .with_ids([missing.source_id, missing.required_id]),
                    );
                }
            }
        }

        for suggestion in dependency_suggestions(graph, self) {
            result.push_suggestion(suggestion);
        }
        result
    }
}

/// One `add` suggestion per hard missing requirement that names a known,
/// distinct entity. Repeated targets are suggested once.
pub fn dependency_suggestions(
    graph: &RuleGraph,
    validation: &DependencyValidation,
) -> Vec<ValidationSuggestion> {
    let mut seen = HashSet::new();
    validation
        .missing_requirements
        .iter()
        .filter(|m| m.requirement_type == RequirementType::Hard)
        .filter(|m| m.required_id != m.source_id && graph.contains(m.source_kind, m.required_id))
        .filter(|m| seen.insert((m.source_kind, m.required_id)))
        .map(|m| {
            let name = graph.display_name(m.source_kind, m.required_id);
            ValidationSuggestion::new(
                IssueType::MissingRequirementFix,
                format!("Add \"{name}\" to satisfy a requirement"),
                SuggestionAction::Add,
            )
            .with_target(m.required_id)
        })
        .collect()
}

/// How strongly an enhancement is recommended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementImpact {
    /// A selected block names this one in `enhances`.
    Recommended,
    /// This block is `enabled_by` something in the selection.
    Enhancement,
}

/// A plot block worth adding to the current selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementSuggestion {
    pub id: DbId,
    pub name: String,
    pub impact: EnhancementImpact,
    /// The selected plot block that triggered the suggestion.
    pub source_id: DbId,
    pub reason: String,
}

impl EnhancementSuggestion {
    pub fn to_suggestion(&self) -> ValidationSuggestion {
        ValidationSuggestion::new(
            IssueType::PlotEnhancement,
            self.reason.clone(),
            SuggestionAction::Add,
        )
        .with_target(self.id)
    }
}

// ---------------------------------------------------------------------------
// Requirement checking
// ---------------------------------------------------------------------------

/// Check every selected plot block, condition and tag for unmet requirements.
///
/// A requirement is satisfied only by a selected entity of the same kind that
/// exists in the graph and is not the requiring entity itself. Selected ids
/// unknown to the graph are skipped.
pub fn validate_dependencies(
    graph: &RuleGraph,
    context: &SelectionContext,
) -> DependencyValidation {
    let index = SelectionIndex::new(context);
    let mut missing_requirements = Vec::new();
    let mut dependency_chain = Vec::new();

    for kind in RESOLVED_KINDS {
        let mut seen = HashSet::new();
        for &id in context.ids(kind) {
            if !seen.insert(id) {
                continue;
            }
            if !graph.contains(kind, id) {
                tracing::debug!(kind = kind.as_str(), id, "Selected entity not in rule graph");
                continue;
            }

            let hard = graph.hard_requirements(kind, id);
            for &required_id in hard {
                if !is_satisfied(graph, &index, kind, id, required_id) {
                    missing_requirements.push(missing(
                        graph,
                        kind,
                        id,
                        required_id,
                        RequirementType::Hard,
                    ));
                }
            }

            let soft_source = match kind {
                EntityKind::PlotBlock => graph.plot_block(id),
                _ => None,
            };
            if let Some(block) = soft_source {
                for &required_id in &block.soft_requires {
                    if !is_satisfied(graph, &index, kind, id, required_id) {
                        missing_requirements.push(missing(
                            graph,
                            kind,
                            id,
                            required_id,
                            RequirementType::Soft,
                        ));
                    }
                }
            }

            dependency_chain.push(DependencyChainEntry {
                id,
                kind,
                name: graph.display_name(kind, id),
                level: dependency_level(graph, kind, id),
                requires: hard.to_vec(),
            });
        }
    }

    let is_valid = !missing_requirements
        .iter()
        .any(|m| m.severity == Severity::Error);

    DependencyValidation {
        is_valid,
        missing_requirements,
        dependency_chain,
    }
}

fn is_satisfied(
    graph: &RuleGraph,
    index: &SelectionIndex,
    kind: EntityKind,
    source_id: DbId,
    required_id: DbId,
) -> bool {
    required_id != source_id
        && graph.contains(kind, required_id)
        && index.contains(kind, required_id)
}

fn missing(
    graph: &RuleGraph,
    kind: EntityKind,
    source_id: DbId,
    required_id: DbId,
    requirement_type: RequirementType,
) -> MissingRequirement {
    let source = graph.display_name(kind, source_id);
    let (requirement_type, severity, message) = if source_id == required_id {
        (
            RequirementType::Hard,
            Severity::Error,
            format!("\"{source}\" lists itself as a requirement"),
        )
    } else {
        let required = graph.display_name(kind, required_id);
        match requirement_type {
            RequirementType::Hard => (
                requirement_type,
                Severity::Error,
                format!("\"{source}\" requires \"{required}\""),
            ),
            RequirementType::Soft => (
                requirement_type,
                Severity::Warning,
                format!("\"{source}\" works best with \"{required}\""),
            ),
        }
    };

    MissingRequirement {
        source_id,
        source_kind: kind,
        required_id,
        requirement_type,
        severity,
        message,
    }
}

// ---------------------------------------------------------------------------
// Dependency levels
// ---------------------------------------------------------------------------

/// Level of an entity in the hard-requirement hierarchy.
///
/// Entities without requirements (and unknown ids) sit at level 0. A
/// requirement already on the current path contributes 0 instead of recursing.
pub fn dependency_level(graph: &RuleGraph, kind: EntityKind, id: DbId) -> usize {
    let mut path = HashSet::new();
    level_on_path(graph, kind, id, &mut path)
}

fn level_on_path(graph: &RuleGraph, kind: EntityKind, id: DbId, path: &mut HashSet<DbId>) -> usize {
    if !path.insert(id) {
        return 0;
    }

    let requirements = graph.hard_requirements(kind, id);
    let level = requirements
        .iter()
        .map(|&required| level_on_path(graph, kind, required, path))
        .max()
        .map_or(0, |deepest| deepest + 1);

    path.remove(&id);
    level
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Check the whole graph for circular hard requirements.
///
/// Independent of any selection: every plot block, condition and tag is
/// visited exactly once. Each back edge produces one `circular_dependency`
/// error whose message spells out the closing path.
pub fn detect_circular_dependencies(graph: &RuleGraph) -> ValidationResult {
    let mut result = ValidationResult::valid();

    for kind in RESOLVED_KINDS {
        for cycle in find_cycles(graph, kind) {
            let path = cycle
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            let names = cycle
                .iter()
                .map(|&id| graph.display_name(kind, id))
                .collect::<Vec<_>>();

            let mut members = cycle.clone();
            members.pop();
            result.push_error(
                ValidationError::new(
                    IssueType::CircularDependency,
                    format!("Circular dependency detected: {path}"),
                )
                .with_field(kind.field())
                .with_value(json!({ "path": cycle, "names": names }))
                .with_ids(members),
            );
        }
    }

    if !result.is_valid {
        tracing::warn!(
            fandom_id = graph.fandom_id(),
            cycles = result.errors.len(),
            "Rule graph contains circular requirements"
        );
    }

    result
}

/// Iterative depth-first search with an explicit recursion stack.
///
/// Returns each cycle as the path from the re-entered node back to itself,
/// e.g. `[a, b, c, a]`. Edges to unknown ids are ignored.
fn find_cycles(graph: &RuleGraph, kind: EntityKind) -> Vec<Vec<DbId>> {
    let mut visited: HashSet<DbId> = HashSet::new();
    let mut cycles = Vec::new();

    for start in graph.ids(kind) {
        if !visited.insert(start) {
            continue;
        }

        let mut stack: Vec<(DbId, usize)> = vec![(start, 0)];
        let mut on_stack: HashSet<DbId> = HashSet::from([start]);

        while let Some(&(node, next_edge)) = stack.last() {
            let edges = graph.hard_requirements(kind, node);
            if next_edge >= edges.len() {
                on_stack.remove(&node);
                stack.pop();
                continue;
            }

            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let target = edges[next_edge];
            if !graph.contains(kind, target) {
                continue;
            }

            if on_stack.contains(&target) {
                if let Some(pos) = stack.iter().position(|&(n, _)| n == target) {
                    let mut cycle: Vec<DbId> = stack[pos..].iter().map(|&(n, _)| n).collect();
                    cycle.push(target);
                    cycles.push(cycle);
                }
            } else if visited.insert(target) {
                on_stack.insert(target);
                stack.push((target, 0));
            }
        }
    }

    cycles
}

// ---------------------------------------------------------------------------
// Enhancements
// ---------------------------------------------------------------------------

/// Suggest plot blocks that would enrich the current selection.
///
/// Targets of a selected block's `enhances` are `recommended`; unselected
/// blocks whose `enabled_by` intersects the selection are `enhancement`s.
/// Each block is suggested at most once and unknown ids are never suggested.
pub fn suggest_enhancements(
    graph: &RuleGraph,
    context: &SelectionContext,
) -> Vec<EnhancementSuggestion> {
    let index = SelectionIndex::new(context);
    let mut suggested = HashSet::new();
    let mut suggestions = Vec::new();

    let mut seen = HashSet::new();
    for &id in &context.selected_plot_blocks {
        if !seen.insert(id) {
            continue;
        }
        let Some(block) = graph.plot_block(id) else {
            continue;
        };
        for &target_id in &block.enhances {
            if index.has_plot_block(target_id) {
                continue;
            }
            let Some(target) = graph.plot_block(target_id) else {
                continue;
            };
            if suggested.insert(target_id) {
                suggestions.push(EnhancementSuggestion {
                    id: target_id,
                    name: target.name.clone(),
                    impact: EnhancementImpact::Recommended,
                    source_id: id,
                    reason: format!("\"{}\" is enhanced by \"{}\"", block.name, target.name),
                });
            }
        }
    }

    for block in graph.plot_blocks() {
        if index.has_plot_block(block.id) || suggested.contains(&block.id) {
            continue;
        }
        let Some(&source_id) = block.enabled_by.iter().find(|&&e| index.has_plot_block(e)) else {
            continue;
        };
        suggested.insert(block.id);
        suggestions.push(EnhancementSuggestion {
            id: block.id,
            name: block.name.clone(),
            impact: EnhancementImpact::Enhancement,
            source_id,
            reason: format!(
                "\"{}\" is unlocked by \"{}\"",
                block.name,
                graph.display_name(EntityKind::PlotBlock, source_id)
            ),
        });
    }

    suggestions
}

/// Suggest tags named in an applied tag's `enhances` and conditions named in
/// a selected condition's `enables`.
///
/// Only known, unselected targets are suggested, each at most once.
pub fn suggest_unlocks(
    graph: &RuleGraph,
    context: &SelectionContext,
) -> Vec<ValidationSuggestion> {
    let index = SelectionIndex::new(context);
    let mut suggested = HashSet::new();
    let mut suggestions = Vec::new();

    for &id in &context.applied_tags {
        let Some(tag) = graph.tag(id) else {
            continue;
        };
        for &target_id in &tag.enhances {
            if target_id == id || index.has_tag(target_id) {
                continue;
            }
            let Some(target) = graph.tag(target_id) else {
                continue;
            };
            if suggested.insert((EntityKind::Tag, target_id)) {
                suggestions.push(
                    ValidationSuggestion::new(
                        IssueType::TagEnhancement,
                        format!("\"{}\" pairs well with \"{}\"", target.name, tag.name),
                        SuggestionAction::Add,
                    )
                    .with_target(target_id),
                );
            }
        }
    }

    for &id in &context.selected_conditions {
        let Some(condition) = graph.condition(id) else {
            continue;
        };
        for &target_id in &condition.enables {
            if target_id == id || index.contains(EntityKind::Condition, target_id) {
                continue;
            }
            let Some(target) = graph.condition(target_id) else {
                continue;
            };
            if suggested.insert((EntityKind::Condition, target_id)) {
                suggestions.push(
                    ValidationSuggestion::new(
                        IssueType::FeatureUnlock,
                        format!("\"{}\" is unlocked by \"{}\"", target.name, condition.name),
                        SuggestionAction::Add,
                    )
                    .with_target(target_id),
                );
            }
        }
    }

    suggestions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
