//! Validation result types shared by every validator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::DbId;

/// How serious a reported problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Machine-checkable type of an error, warning or suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    HardRequirementViolation,
    SoftRequirementViolation,
    CircularDependency,
    MutualExclusionViolation,
    ClassConflict,
    TagConflict,
    PlotBlockConflict,
    ExternalConflict,
    InstanceLimitExceeded,
    InstanceLimitNotMet,
    InstanceLimitMismatch,
    MissingRequiredTag,
    MissingRequiredMetadata,
    MissingRequiredClass,
    MissingRequiredPlotBlock,
    MissingRequiredDependency,
    ExcludedCategory,
    InvalidCategory,
    CustomRuleViolation,
    CustomRuleWarning,
    CustomRuleSuggestion,
    RuleExecutionError,
    TemplateWarning,
    TemplateGuidance,
    TagEnhancement,
    FeatureUnlock,
    MissingRequirementFix,
    PlotEnhancement,
    PathwayOrder,
    PathwayItemNotSelected,
    DuplicatePathwayItem,
    FandomMismatch,
}

impl IssueType {
    /// Stable string representation matching serde's `rename_all = "snake_case"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HardRequirementViolation => "hard_requirement_violation",
            Self::SoftRequirementViolation => "soft_requirement_violation",
            Self::CircularDependency => "circular_dependency",
            Self::MutualExclusionViolation => "mutual_exclusion_violation",
            Self::ClassConflict => "class_conflict",
            Self::TagConflict => "tag_conflict",
            Self::PlotBlockConflict => "plot_block_conflict",
            Self::ExternalConflict => "external_conflict",
            Self::InstanceLimitExceeded => "instance_limit_exceeded",
            Self::InstanceLimitNotMet => "instance_limit_not_met",
            Self::InstanceLimitMismatch => "instance_limit_mismatch",
            Self::MissingRequiredTag => "missing_required_tag",
            Self::MissingRequiredMetadata => "missing_required_metadata",
            Self::MissingRequiredClass => "missing_required_class",
            Self::MissingRequiredPlotBlock => "missing_required_plot_block",
            Self::MissingRequiredDependency => "missing_required_dependency",
            Self::ExcludedCategory => "excluded_category",
            Self::InvalidCategory => "invalid_category",
            Self::CustomRuleViolation => "custom_rule_violation",
            Self::CustomRuleWarning => "custom_rule_warning",
            Self::CustomRuleSuggestion => "custom_rule_suggestion",
            Self::RuleExecutionError => "rule_execution_error",
            Self::TemplateWarning => "template_warning",
            Self::TemplateGuidance => "template_guidance",
            Self::TagEnhancement => "tag_enhancement",
            Self::FeatureUnlock => "feature_unlock",
            Self::MissingRequirementFix => "missing_requirement_fix",
            Self::PlotEnhancement => "plot_enhancement",
            Self::PathwayOrder => "pathway_order",
            Self::PathwayItemNotSelected => "pathway_item_not_selected",
            Self::DuplicatePathwayItem => "duplicate_pathway_item",
            Self::FandomMismatch => "fandom_mismatch",
        }
    }
}

/// Follow-up the UI can offer for a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionAction {
    Add,
    Remove,
    Replace,
    /// Nothing to change; the item confirms something already in place.
    Keep,
}

/// A problem that makes the selection invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: IssueType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_ids: Vec<DbId>,
}

impl ValidationError {
    pub fn new(kind: IssueType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            value: None,
            severity: Severity::Error,
            affected_ids: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = DbId>) -> Self {
        self.affected_ids.extend(ids);
        self
    }
}

/// A problem worth surfacing that does not invalidate the selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    #[serde(rename = "type")]
    pub kind: IssueType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_ids: Vec<DbId>,
}

impl ValidationWarning {
    pub fn new(kind: IssueType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            suggestion: None,
            affected_ids: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = DbId>) -> Self {
        self.affected_ids.extend(ids);
        self
    }
}

/// An actionable hint for improving the selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSuggestion {
    #[serde(rename = "type")]
    pub kind: IssueType,
    pub message: String,
    pub action: SuggestionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_ids: Vec<DbId>,
}

impl ValidationSuggestion {
    pub fn new(kind: IssueType, message: impl Into<String>, action: SuggestionAction) -> Self {
        Self {
            kind,
            message: message.into(),
            action,
            target_id: None,
            alternative_ids: Vec::new(),
        }
    }

    pub fn with_target(mut self, target_id: DbId) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn with_alternatives(mut self, ids: impl IntoIterator<Item = DbId>) -> Self {
        self.alternative_ids.extend(ids);
        self
    }
}

/// Aggregated outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub suggestions: Vec<ValidationSuggestion>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

impl ValidationResult {
    /// A result with nothing to report.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn push_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn push_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn push_suggestion(&mut self, suggestion: ValidationSuggestion) {
        self.suggestions.push(suggestion);
    }

    /// Append another result, keeping item order (self first).
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.suggestions.extend(other.suggestions);
    }

    /// True when no errors, warnings or suggestions were produced.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.suggestions.is_empty()
    }

    /// Count of errors of a given type.
    pub fn error_count(&self, kind: IssueType) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_error_invalidates() {
        let mut result = ValidationResult::valid();
        result.push_warning(ValidationWarning::new(IssueType::TemplateWarning, "careful"));
        assert!(result.is_valid);

        result.push_error(ValidationError::new(IssueType::TagConflict, "conflict"));
        assert!(!result.is_valid);
        assert_eq!(result.error_count(IssueType::TagConflict), 1);
    }

    #[test]
    fn merge_keeps_order_and_validity() {
        let mut first = ValidationResult::valid();
        first.push_suggestion(ValidationSuggestion::new(
            IssueType::FeatureUnlock,
            "first",
            SuggestionAction::Add,
        ));
        let mut second = ValidationResult::valid();
        second.push_error(ValidationError::new(IssueType::ClassConflict, "boom"));
        second.push_suggestion(ValidationSuggestion::new(
            IssueType::TagEnhancement,
            "second",
            SuggestionAction::Keep,
        ));

        first.merge(second);
        assert!(!first.is_valid);
        assert_eq!(first.suggestions[0].message, "first");
        assert_eq!(first.suggestions[1].message, "second");
    }

    #[test]
    fn error_serializes_with_type_key() {
        let error = ValidationError::new(IssueType::InstanceLimitExceeded, "too many")
            .with_field("tags")
            .with_value(json!({ "current_count": 2 }));
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["type"], "instance_limit_exceeded");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["value"]["current_count"], 2);
        assert!(value.get("affected_ids").is_none());
    }

    #[test]
    fn issue_type_as_str_matches_serde() {
        for kind in [
            IssueType::HardRequirementViolation,
            IssueType::RuleExecutionError,
            IssueType::PathwayItemNotSelected,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }
}
