//! Tag-class constraint validation.
//!
//! Applied tags are grouped by their tag class and every class with
//! configured rules is checked for mutual exclusion, instance limits,
//! required context, category restrictions and declared dependencies. The
//! five checks are independent: one class can report several violations in a
//! single pass.

use std::collections::{BTreeMap, HashSet};

use serde_json::json;

use super::result::{
    IssueType, SuggestionAction, ValidationError, ValidationResult, ValidationSuggestion,
};
use super::selection::{SelectionContext, SelectionIndex};
use crate::graph::{
    CategoryRestrictions, ClassDependencies, InstanceLimits, MutualExclusion, RequiredContext,
    RuleGraph, Tag, TagClass,
};
use crate::types::{DbId, EntityKind};

const FIELD_TAGS: &str = "tags";
const FIELD_METADATA: &str = "metadata";
const FIELD_PLOT_BLOCKS: &str = "plot_blocks";

/// Applied tags keyed by tag class id, in selection order within a class.
type ClassGroups<'g> = BTreeMap<DbId, Vec<&'g Tag>>;

/// Evaluate every tag class with applied members against its rules.
pub fn validate_tag_classes(graph: &RuleGraph, context: &SelectionContext) -> ValidationResult {
    let index = SelectionIndex::new(context);
    let groups = group_by_class(graph, context);
    let mut result = ValidationResult::valid();

    for (&class_id, tags) in &groups {
        let Some(class) = graph.tag_class(class_id) else {
            tracing::debug!(class_id, "Applied tag references unknown tag class");
            continue;
        };
        let rules = &class.validation_rules;
        if rules.is_empty() {
            continue;
        }

        let check = ClassCheck {
            graph,
            class,
            tags,
            index: &index,
            groups: &groups,
        };

        if let Some(rule) = &rules.mutual_exclusion {
            check.mutual_exclusion(rule, &mut result);
        }
        if let Some(rule) = &rules.instance_limits {
            check.instance_limits(rule, &mut result);
        }
        if let Some(rule) = &rules.required_context {
            check.required_context(rule, context, &mut result);
        }
        if let Some(rule) = &rules.category_restrictions {
            check.category_restrictions(rule, &mut result);
        }
        if let Some(rule) = &rules.dependencies {
            check.dependencies(rule, &mut result);
        }
    }

    result
}

fn group_by_class<'g>(graph: &'g RuleGraph, context: &SelectionContext) -> ClassGroups<'g> {
    let mut groups: ClassGroups<'g> = BTreeMap::new();
    let mut seen = HashSet::new();

    for &tag_id in &context.applied_tags {
        if !seen.insert(tag_id) {
            continue;
        }
        let Some(tag) = graph.tag(tag_id) else {
            continue;
        };
        if let Some(class_id) = tag.tag_class_id {
            groups.entry(class_id).or_default().push(tag);
        }
    }

    groups
}

/// Everything the individual checks need for one class.
struct ClassCheck<'a, 'g> {
    graph: &'g RuleGraph,
    class: &'g TagClass,
    tags: &'a [&'g Tag],
    index: &'a SelectionIndex,
    groups: &'a ClassGroups<'g>,
}

impl ClassCheck<'_, '_> {
    fn tag_ids(&self) -> impl Iterator<Item = DbId> + '_ {
        self.tags.iter().map(|t| t.id)
    }

    fn class_name(&self) -> &str {
        &self.class.name
    }

    fn tag_name(&self, id: DbId) -> String {
        self.graph.display_name(EntityKind::Tag, id)
    }

    /// Selected or listed in metadata, and present in the graph.
    fn mentions_known_plot_block(&self, id: DbId) -> bool {
        self.index.mentions_plot_block(id) && self.graph.plot_block(id).is_some()
    }

    fn class_display_name(&self, id: DbId) -> String {
        self.graph
            .tag_class(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("tag class {id}"))
    }

    fn mutual_exclusion(&self, rule: &MutualExclusion, result: &mut ValidationResult) {
        if rule.within_class && self.tags.len() > 1 {
            let names: Vec<&str> = self.tags.iter().map(|t| t.name.as_str()).collect();
            result.push_error(
                ValidationError::new(
                    IssueType::MutualExclusionViolation,
                    format!(
                        "Only one tag from \"{}\" can be applied: {}",
                        self.class_name(),
                        names.join(", ")
                    ),
                )
                .with_field(FIELD_TAGS)
                .with_value(json!(names))
                .with_ids(self.tag_ids()),
            );
            result.push_suggestion(
                ValidationSuggestion::new(
                    IssueType::MutualExclusionViolation,
                    format!(
                        "Keep \"{}\" and remove the other \"{}\" tags",
                        self.tags[0].name,
                        self.class_name()
                    ),
                    SuggestionAction::Remove,
                )
                .with_alternatives(self.tag_ids().skip(1)),
            );
        }

        let own: HashSet<DbId> = self.tag_ids().collect();
        for &conflict_id in &rule.conflicting_tags {
            if own.contains(&conflict_id) || !self.index.has_tag(conflict_id) {
                continue;
            }
            result.push_error(
                ValidationError::new(
                    IssueType::TagConflict,
                    format!(
                        "\"{}\" conflicts with tags from \"{}\"",
                        self.tag_name(conflict_id),
                        self.class_name()
                    ),
                )
                .with_field(FIELD_TAGS)
                .with_ids(std::iter::once(conflict_id).chain(self.tag_ids())),
            );
        }

        for &other_class in &rule.conflicting_classes {
            if other_class == self.class.id {
                continue;
            }
            let Some(other_tags) = self.groups.get(&other_class).filter(|t| !t.is_empty()) else {
                continue;
            };
            result.push_error(
                ValidationError::new(
                    IssueType::ClassConflict,
                    format!(
                        "Tags from \"{}\" cannot be combined with tags from \"{}\"",
                        self.class_name(),
                        self.class_display_name(other_class)
                    ),
                )
                .with_field(FIELD_TAGS)
                .with_value(json!({
                    "class_id": self.class.id,
                    "conflicting_class_id": other_class,
                }))
                .with_ids(self.tag_ids().chain(other_tags.iter().map(|t| t.id))),
            );
        }
    }

    /// The max check has no zero-count guard, unlike min and exact.
    fn instance_limits(&self, rule: &InstanceLimits, result: &mut ValidationResult) {
        let count = self.tags.len();

        if let Some(max) = rule.max_instances {
            if count > max {
                result.push_error(
                    ValidationError::new(
                        IssueType::InstanceLimitExceeded,
                        format!(
                            "At most {max} tag(s) from \"{}\" can be applied, found {count}",
                            self.class_name()
                        ),
                    )
                    .with_field(FIELD_TAGS)
                    .with_value(json!({ "current_count": count, "max_instances": max }))
                    .with_ids(self.tag_ids()),
                );
            }
        }

        if let Some(min) = rule.min_instances {
            if count > 0 && count < min {
                result.push_error(
                    ValidationError::new(
                        IssueType::InstanceLimitNotMet,
                        format!(
                            "At least {min} tag(s) from \"{}\" are required, found {count}",
                            self.class_name()
                        ),
                    )
                    .with_field(FIELD_TAGS)
                    .with_value(json!({ "current_count": count, "min_instances": min }))
                    .with_ids(self.tag_ids()),
                );
            }
        }

        if let Some(exact) = rule.exact_instances {
            if count > 0 && count != exact {
                result.push_error(
                    ValidationError::new(
                        IssueType::InstanceLimitMismatch,
                        format!(
                            "Exactly {exact} tag(s) from \"{}\" are required, found {count}",
                            self.class_name()
                        ),
                    )
                    .with_field(FIELD_TAGS)
                    .with_value(json!({ "current_count": count, "exact_instances": exact }))
                    .with_ids(self.tag_ids()),
                );
            }
        }
    }

    fn required_context(
        &self,
        rule: &RequiredContext,
        context: &SelectionContext,
        result: &mut ValidationResult,
    ) {
        for &tag_id in &rule.required_tags {
            if self.index.has_tag(tag_id) && self.graph.tag(tag_id).is_some() {
                continue;
            }
            result.push_error(
                ValidationError::new(
                    IssueType::MissingRequiredTag,
                    format!(
                        "\"{}\" requires the tag \"{}\"",
                        self.class_name(),
                        self.tag_name(tag_id)
                    ),
                )
                .with_field(FIELD_TAGS)
                .with_ids([tag_id]),
            );
        }

        for key in &rule.required_metadata {
            let present = context.metadata.get(key).is_some_and(|v| !v.is_null());
            if !present {
                result.push_error(
                    ValidationError::new(
                        IssueType::MissingRequiredMetadata,
                        format!("\"{}\" requires metadata \"{key}\"", self.class_name()),
                    )
                    .with_field(FIELD_METADATA)
                    .with_value(json!(key)),
                );
            }
        }

        for &class_id in &rule.required_classes {
            let applied = self.groups.get(&class_id).is_some_and(|t| !t.is_empty());
            if !applied {
                result.push_error(
                    ValidationError::new(
                        IssueType::MissingRequiredClass,
                        format!(
                            "\"{}\" requires at least one tag from \"{}\"",
                            self.class_name(),
                            self.class_display_name(class_id)
                        ),
                    )
                    .with_field(FIELD_TAGS)
                    .with_value(json!({ "required_class_id": class_id })),
                );
            }
        }
    }

    fn category_restrictions(&self, rule: &CategoryRestrictions, result: &mut ValidationResult) {
        for tag in self.tags {
            if rule.excluded_categories.contains(&tag.category) {
                result.push_error(
                    ValidationError::new(
                        IssueType::ExcludedCategory,
                        format!(
                            "\"{}\" uses category \"{}\", which \"{}\" excludes",
                            tag.name,
                            tag.category,
                            self.class_name()
                        ),
                    )
                    .with_field(FIELD_TAGS)
                    .with_value(json!(tag.category))
                    .with_ids([tag.id]),
                );
            }
            if !rule.applicable_categories.is_empty()
                && !rule.applicable_categories.contains(&tag.category)
            {
                result.push_error(
                    ValidationError::new(
                        IssueType::InvalidCategory,
                        format!(
                            "\"{}\" uses category \"{}\", expected one of: {}",
                            tag.name,
                            tag.category,
                            rule.applicable_categories.join(", ")
                        ),
                    )
                    .with_field(FIELD_TAGS)
                    .with_value(json!(tag.category))
                    .with_ids([tag.id]),
                );
            }
        }

        let satisfied = rule
            .required_plot_blocks
            .iter()
            .any(|&id| self.mentions_known_plot_block(id));
        if !rule.required_plot_blocks.is_empty() && !satisfied {
            result.push_error(
                ValidationError::new(
                    IssueType::MissingRequiredPlotBlock,
                    format!(
                        "\"{}\" requires one of these plot blocks: {}",
                        self.class_name(),
                        rule.required_plot_blocks
                            .iter()
                            .map(|&id| self.graph.display_name(EntityKind::PlotBlock, id))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
                .with_field(FIELD_PLOT_BLOCKS)
                .with_value(json!(rule.required_plot_blocks))
                .with_ids(rule.required_plot_blocks.iter().copied()),
            );
        }
    }

    fn dependencies(&self, rule: &ClassDependencies, result: &mut ValidationResult) {
        for &tag_id in &rule.requires {
            if self.index.has_tag(tag_id) && self.graph.tag(tag_id).is_some() {
                continue;
            }
            result.push_error(
                ValidationError::new(
                    IssueType::MissingRequiredDependency,
                    format!(
                        "Tags from \"{}\" depend on \"{}\"",
                        self.class_name(),
                        self.tag_name(tag_id)
                    ),
                )
                .with_field(FIELD_TAGS)
                .with_ids([tag_id]),
            );
        }

        for &tag_id in &rule.enhances {
            if !self.index.has_tag(tag_id) {
                continue;
            }
            result.push_suggestion(
                ValidationSuggestion::new(
                    IssueType::TagEnhancement,
                    format!(
                        "\"{}\" works well with \"{}\"",
                        self.tag_name(tag_id),
                        self.class_name()
                    ),
                    SuggestionAction::Keep,
                )
                .with_target(tag_id),
            );
        }

        for &tag_id in &rule.enables {
            if self.index.has_tag(tag_id) {
                continue;
            }
            let Some(tag) = self.graph.tag(tag_id) else {
                continue;
            };
            result.push_suggestion(
                ValidationSuggestion::new(
                    IssueType::FeatureUnlock,
                    format!("\"{}\" unlocks \"{}\"", self.class_name(), tag.name),
                    SuggestionAction::Add,
                )
                .with_target(tag_id),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
