//! Admin-authored warning templates.
//!
//! A template is a canned message attached to a pattern of selected tags or
//! plot blocks ("angst without comfort", "three or more major character
//! deaths"). Templates never invalidate a selection: they fire either a
//! `template_warning` or an informational `template_guidance` suggestion.

use serde::{Deserialize, Serialize};

use super::result::{
    IssueType, SuggestionAction, ValidationResult, ValidationSuggestion, ValidationWarning,
};
use super::selection::{SelectionContext, SelectionIndex};
use crate::graph::RuleGraph;
use crate::types::{DbId, EntityKind};

/// How prominently a template is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSeverity {
    #[default]
    Warning,
    Info,
}

/// Which part of the selection a condition looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateField {
    Tags,
    PlotBlocks,
}

impl TemplateField {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Tags => EntityKind::Tag,
            Self::PlotBlocks => EntityKind::PlotBlock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateCheck {
    Contains { id: DbId },
    ContainsAll { ids: Vec<DbId> },
    ContainsAny { ids: Vec<DbId> },
    /// At least `threshold` of `ids` are selected.
    ContainsMultiple { ids: Vec<DbId>, threshold: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCondition {
    pub field: TemplateField,
    #[serde(flatten)]
    pub check: TemplateCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningTemplate {
    pub id: DbId,
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub severity: TemplateSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub conditions: Vec<TemplateCondition>,
}

impl TemplateCondition {
    /// Selected, known ids among the condition's targets, or `None` when the
    /// condition does not hold.
    fn matches(&self, graph: &RuleGraph, index: &SelectionIndex) -> Option<Vec<DbId>> {
        let kind = self.field.kind();
        let present = |ids: &[DbId]| -> Vec<DbId> {
            ids.iter()
                .copied()
                .filter(|&id| index.contains(kind, id) && graph.contains(kind, id))
                .collect()
        };

        match &self.check {
            TemplateCheck::Contains { id } => {
                let hit = present(std::slice::from_ref(id));
                (!hit.is_empty()).then_some(hit)
            }
            TemplateCheck::ContainsAll { ids } => {
                let hit = present(ids);
                (!ids.is_empty() && hit.len() == ids.len()).then_some(hit)
            }
            TemplateCheck::ContainsAny { ids } => {
                let hit = present(ids);
                (!hit.is_empty()).then_some(hit)
            }
            TemplateCheck::ContainsMultiple { ids, threshold } => {
                let hit = present(ids);
                (!hit.is_empty() && hit.len() >= *threshold).then_some(hit)
            }
        }
    }
}

impl WarningTemplate {
    /// Ids that made every condition hold, or `None` if the template does
    /// not fire. A template without conditions never fires.
    pub fn evaluate(&self, graph: &RuleGraph, index: &SelectionIndex) -> Option<Vec<DbId>> {
        if self.conditions.is_empty() {
            return None;
        }
        let mut matched: Vec<DbId> = Vec::new();
        for condition in &self.conditions {
            for id in condition.matches(graph, index)? {
                if !matched.contains(&id) {
                    matched.push(id);
                }
            }
        }
        Some(matched)
    }
}

/// Run every template in the graph against a selection.
pub fn evaluate_templates(graph: &RuleGraph, context: &SelectionContext) -> ValidationResult {
    let index = SelectionIndex::new(context);
    let mut result = ValidationResult::valid();

    for template in graph.warning_templates() {
        let Some(matched) = template.evaluate(graph, &index) else {
            continue;
        };
        tracing::debug!(
            template_id = template.id,
            matched = matched.len(),
            "Warning template fired"
        );

        match template.severity {
            TemplateSeverity::Warning => {
                let field = template.conditions[0].field.kind().field();
                let mut warning =
                    ValidationWarning::new(IssueType::TemplateWarning, template.message.clone())
                        .with_field(field)
                        .with_ids(matched);
                if let Some(suggestion) = &template.suggestion {
                    warning = warning.with_suggestion(suggestion.clone());
                }
                result.push_warning(warning);
            }
            TemplateSeverity::Info => {
                let message = match &template.suggestion {
                    Some(suggestion) => format!("{} {suggestion}", template.message),
                    None => template.message.clone(),
                };
                result.push_suggestion(
                    ValidationSuggestion::new(
                        IssueType::TemplateGuidance,
                        message,
                        SuggestionAction::Keep,
                    )
                    .with_alternatives(matched),
                );
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::*;
    use serde_json::json;

    fn template(
        id: DbId,
        severity: TemplateSeverity,
        conditions: Vec<TemplateCondition>,
    ) -> WarningTemplate {
        WarningTemplate {
            id,
            name: format!("template {id}"),
            message: format!("template {id} fired"),
            severity,
            suggestion: None,
            conditions,
        }
    }

    fn on_tags(check: TemplateCheck) -> TemplateCondition {
        TemplateCondition {
            field: TemplateField::Tags,
            check,
        }
    }

    fn test_graph(templates: Vec<WarningTemplate>) -> RuleGraph {
        let mut c = content();
        c.tags = vec![
            tag(1, "angst", "mood", None),
            tag(2, "major character death", "warning", None),
            tag(3, "hurt/comfort", "trope", None),
        ];
        c.plot_blocks = vec![block(10, "Time loop")];
        c.warning_templates = templates;
        graph(c)
    }

    #[test]
    fn deserializes_template() {
        let parsed: WarningTemplate = serde_json::from_value(json!({
            "id": 4,
            "name": "Heavy content",
            "message": "This combination is intense",
            "conditions": [
                { "field": "tags", "type": "contains_multiple", "ids": [1, 2], "threshold": 2 },
                { "field": "plot_blocks", "type": "contains", "id": 10 }
            ]
        }))
        .unwrap();

        assert_eq!(parsed.severity, TemplateSeverity::Warning);
        assert_eq!(
            parsed.conditions[0].check,
            TemplateCheck::ContainsMultiple {
                ids: vec![1, 2],
                threshold: 2
            }
        );
        assert_eq!(parsed.conditions[1].field, TemplateField::PlotBlocks);
    }

    #[test]
    fn warning_fires_when_all_conditions_hold() {
        let mut t = template(
            1,
            TemplateSeverity::Warning,
            vec![
                on_tags(TemplateCheck::ContainsAll { ids: vec![1, 2] }),
                TemplateCondition {
                    field: TemplateField::PlotBlocks,
                    check: TemplateCheck::Contains { id: 10 },
                },
            ],
        );
        t.suggestion = Some("Add a content note".to_string());
        let g = test_graph(vec![t]);

        let context = SelectionContext::new(FANDOM)
            .with_tags([1, 2])
            .with_plot_blocks([10]);
        let result = evaluate_templates(&g, &context);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, IssueType::TemplateWarning);
        assert_eq!(result.warnings[0].affected_ids, vec![1, 2, 10]);
        assert_eq!(
            result.warnings[0].suggestion.as_deref(),
            Some("Add a content note")
        );

        let partial = SelectionContext::new(FANDOM).with_tags([1, 2]);
        assert!(evaluate_templates(&g, &partial).is_empty());
    }

    #[test]
    fn info_templates_become_guidance() {
        let g = test_graph(vec![template(
            2,
            TemplateSeverity::Info,
            vec![on_tags(TemplateCheck::ContainsAny { ids: vec![3, 404] })],
        )]);
        let result = evaluate_templates(&g, &SelectionContext::new(FANDOM).with_tags([3]));

        assert!(result.warnings.is_empty());
        assert_eq!(result.suggestions[0].kind, IssueType::TemplateGuidance);
        assert_eq!(result.suggestions[0].alternative_ids, vec![3]);
    }

    #[test]
    fn contains_multiple_respects_threshold() {
        let g = test_graph(vec![template(
            3,
            TemplateSeverity::Warning,
            vec![on_tags(TemplateCheck::ContainsMultiple {
                ids: vec![1, 2, 3],
                threshold: 2,
            })],
        )]);

        let one = SelectionContext::new(FANDOM).with_tags([1]);
        assert!(evaluate_templates(&g, &one).warnings.is_empty());

        let two = SelectionContext::new(FANDOM).with_tags([1, 3]);
        assert_eq!(evaluate_templates(&g, &two).warnings.len(), 1);
    }

    #[test]
    fn unknown_ids_and_empty_templates_never_fire() {
        let mut context = SelectionContext::new(FANDOM);
        context.applied_tags.push(404);
        let g = test_graph(vec![
            template(
                4,
                TemplateSeverity::Warning,
                vec![on_tags(TemplateCheck::Contains { id: 404 })],
            ),
            template(5, TemplateSeverity::Warning, Vec::new()),
        ]);
        assert!(evaluate_templates(&g, &context).is_empty());
    }
}
