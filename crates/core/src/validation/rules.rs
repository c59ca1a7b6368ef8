//! Admin-authored validation rule types.
//!
//! Rules arrive from the rule-management service already permission-checked.
//! Conditions and actions are closed tagged unions keyed on `condition_type`
//! and `action_type`, so a record with an unknown kind or a missing field is
//! rejected at deserialization instead of silently passing at runtime.

use serde::{Deserialize, Serialize};

use super::result::Severity;
use crate::types::DbId;

/// A validation rule loaded from the rule-management service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: DbId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lower values run first.
    #[serde(default)]
    pub priority: i32,
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

fn default_active() -> bool {
    true
}

/// How a condition's result combines with the next condition in the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOperator {
    #[default]
    And,
    Or,
}

/// One step of a rule's condition chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    #[serde(flatten)]
    pub kind: ConditionKind,
    /// Joins this condition to the one after it. Ignored on the last one.
    #[serde(default)]
    pub logic_operator: LogicOperator,
}

impl RuleCondition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            logic_operator: LogicOperator::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.logic_operator = LogicOperator::Or;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition_type", rename_all = "snake_case")]
pub enum ConditionKind {
    HasTag {
        operator: PresenceOperator,
        target_ids: Vec<DbId>,
    },
    HasPlotBlock {
        operator: PresenceOperator,
        target_ids: Vec<DbId>,
    },
    /// Number of applied tags, optionally restricted to `target_ids`.
    TagCount {
        operator: CompareOperator,
        value: i64,
        #[serde(default)]
        target_ids: Vec<DbId>,
    },
    /// Deepest hierarchy level among the selected plot blocks.
    PlotBlockDepth {
        operator: CompareOperator,
        value: i64,
    },
    /// Reserved. Always evaluates to true; the expression is never run.
    CustomExpression { expression: String },
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasTag { .. } => "has_tag",
            Self::HasPlotBlock { .. } => "has_plot_block",
            Self::TagCount { .. } => "tag_count",
            Self::PlotBlockDepth { .. } => "plot_block_depth",
            Self::CustomExpression { .. } => "custom_expression",
        }
    }
}

/// Operators for membership conditions.
///
/// - `contains`: every target is selected
/// - `not_contains`: at least one target is missing
/// - `in`: at least one target is selected
/// - `not_in`: no target is selected
/// - `equals`: the selection is exactly the target set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceOperator {
    Equals,
    Contains,
    NotContains,
    In,
    NotIn,
}

/// Operators for numeric conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOperator {
    Equals,
    GreaterThan,
    LessThan,
}

impl CompareOperator {
    pub fn compare(&self, actual: i64, expected: i64) -> bool {
        match self {
            Self::Equals => actual == expected,
            Self::GreaterThan => actual > expected,
            Self::LessThan => actual < expected,
        }
    }
}

/// Effect run, in order, when a rule triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum RuleAction {
    RequireTag {
        target_ids: Vec<DbId>,
        #[serde(default)]
        message: Option<String>,
    },
    RequirePlotBlock {
        target_ids: Vec<DbId>,
        #[serde(default)]
        message: Option<String>,
    },
    ForbidTag {
        target_ids: Vec<DbId>,
        #[serde(default)]
        message: Option<String>,
    },
    SuggestTag {
        target_ids: Vec<DbId>,
        #[serde(default)]
        message: Option<String>,
    },
    /// Report a fixed message; severity defaults to the rule's own.
    ShowMessage {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        severity: Option<Severity>,
    },
    /// Accepted for compatibility; does not reorder anything.
    ModifyPriority {
        #[serde(default)]
        priority: Option<i32>,
    },
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequireTag { .. } => "require_tag",
            Self::RequirePlotBlock { .. } => "require_plot_block",
            Self::ForbidTag { .. } => "forbid_tag",
            Self::SuggestTag { .. } => "suggest_tag",
            Self::ShowMessage { .. } => "show_message",
            Self::ModifyPriority { .. } => "modify_priority",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_full_rule() {
        let rule: ValidationRule = serde_json::from_value(json!({
            "id": 7,
            "name": "Slow burn needs pining",
            "priority": 10,
            "severity": "warning",
            "conditions": [
                {
                    "condition_type": "has_tag",
                    "operator": "contains",
                    "target_ids": [1],
                    "logic_operator": "OR"
                },
                { "condition_type": "tag_count", "operator": "greater_than", "value": 3 }
            ],
            "actions": [
                { "action_type": "require_tag", "target_ids": [2], "message": "Add pining" },
                { "action_type": "modify_priority", "priority": 1 }
            ]
        }))
        .unwrap();

        assert!(rule.is_active);
        assert_eq!(rule.severity, Severity::Warning);
        assert_eq!(rule.conditions[0].logic_operator, LogicOperator::Or);
        assert_eq!(rule.conditions[1].logic_operator, LogicOperator::And);
        assert_eq!(
            rule.conditions[1].kind,
            ConditionKind::TagCount {
                operator: CompareOperator::GreaterThan,
                value: 3,
                target_ids: Vec::new()
            }
        );
        assert_eq!(rule.actions[0].as_str(), "require_tag");
    }

    #[test]
    fn rejects_unknown_condition_type() {
        let parsed = serde_json::from_value::<RuleCondition>(json!({
            "condition_type": "eval_js",
            "operator": "equals",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_operator_from_wrong_family() {
        let parsed = serde_json::from_value::<RuleCondition>(json!({
            "condition_type": "has_tag",
            "operator": "greater_than",
            "target_ids": [1]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn condition_serializes_flat() {
        let condition = RuleCondition::new(ConditionKind::PlotBlockDepth {
            operator: CompareOperator::LessThan,
            value: 2,
        })
        .or();
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["condition_type"], "plot_block_depth");
        assert_eq!(value["logic_operator"], "OR");
        assert_eq!(value["value"], 2);
    }

    #[test]
    fn compare_operators() {
        assert!(CompareOperator::Equals.compare(2, 2));
        assert!(CompareOperator::GreaterThan.compare(3, 2));
        assert!(!CompareOperator::LessThan.compare(2, 2));
    }
}
