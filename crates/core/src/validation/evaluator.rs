//! Rule compiler and executor: pure logic, no database access.
//!
//! [`compile_rules`] turns admin-authored [`ValidationRule`]s into
//! [`CompiledRule`]s whose conditions are boxed predicates over pre-built id
//! sets. [`execute_rules`] runs them in priority order against one selection.
//! A failing rule is reported as a single `rule_execution_error` and never
//! stops the remaining rules.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;

use super::result::{
    IssueType, Severity, SuggestionAction, ValidationError, ValidationResult,
    ValidationSuggestion, ValidationWarning,
};
use super::rules::{
    ConditionKind, LogicOperator, PresenceOperator, RuleAction, ValidationRule,
};
use super::selection::{SelectionContext, SelectionIndex};
use crate::graph::RuleGraph;
use crate::types::{DbId, EntityKind};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single rule could not be evaluated.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{action} action has no target ids")]
    MissingTargets { action: &'static str },

    #[error("show_message action has no message")]
    MissingMessage,

    #[error("plot block {plot_block_id} has a cyclic parent chain")]
    CyclicHierarchy { plot_block_id: DbId },
}

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// Read-only view a compiled rule evaluates against.
pub struct RuleContext<'a> {
    pub graph: &'a RuleGraph,
    pub context: &'a SelectionContext,
    index: SelectionIndex,
}

impl<'a> RuleContext<'a> {
    pub fn new(graph: &'a RuleGraph, context: &'a SelectionContext) -> Self {
        Self {
            graph,
            context,
            index: SelectionIndex::new(context),
        }
    }

    /// Selected and known to the graph. Unknown ids never count as present.
    fn is_present(&self, kind: EntityKind, id: DbId) -> bool {
        self.index.contains(kind, id) && self.graph.contains(kind, id)
    }

    fn present_set(&self, kind: EntityKind) -> HashSet<DbId> {
        self.index
            .set(kind)
            .iter()
            .copied()
            .filter(|&id| self.graph.contains(kind, id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Compiled rules
// ---------------------------------------------------------------------------

type Predicate = Box<dyn Fn(&RuleContext<'_>) -> Result<bool, RuleError> + Send + Sync>;

struct CompiledCondition {
    kind: &'static str,
    logic: LogicOperator,
    predicate: Predicate,
}

/// A rule ready for repeated execution.
pub struct CompiledRule {
    pub id: DbId,
    pub name: String,
    pub priority: i32,
    pub severity: Severity,
    conditions: Vec<CompiledCondition>,
    actions: Vec<RuleAction>,
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("severity", &self.severity)
            .field(
                "conditions",
                &self.conditions.iter().map(|c| c.kind).collect::<Vec<_>>(),
            )
            .field("actions", &self.actions)
            .finish()
    }
}

/// A single item produced by a triggered action.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleEffect {
    Error(ValidationError),
    Warning(ValidationWarning),
    Suggestion(ValidationSuggestion),
}

/// Per-rule execution telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleExecutionReport {
    pub rule_id: DbId,
    pub triggered: bool,
    pub failed: bool,
    pub conditions_evaluated: usize,
    pub duration_us: u64,
}

/// Compile active rules and order them by ascending priority.
///
/// The sort is stable, so rules sharing a priority keep their input order.
pub fn compile_rules(rules: &[ValidationRule]) -> Vec<CompiledRule> {
    let mut compiled: Vec<CompiledRule> = rules
        .iter()
        .filter(|rule| rule.is_active)
        .map(compile_rule)
        .collect();
    compiled.sort_by_key(|rule| rule.priority);
    compiled
}

pub fn compile_rule(rule: &ValidationRule) -> CompiledRule {
    CompiledRule {
        id: rule.id,
        name: rule.name.clone(),
        priority: rule.priority,
        severity: rule.severity,
        conditions: rule
            .conditions
            .iter()
            .map(|condition| CompiledCondition {
                kind: condition.kind.as_str(),
                logic: condition.logic_operator,
                predicate: compile_condition(&condition.kind),
            })
            .collect(),
        actions: rule.actions.clone(),
    }
}

fn compile_condition(kind: &ConditionKind) -> Predicate {
    match kind {
        ConditionKind::HasTag {
            operator,
            target_ids,
        } => presence_predicate(EntityKind::Tag, *operator, target_ids),
        ConditionKind::HasPlotBlock {
            operator,
            target_ids,
        } => presence_predicate(EntityKind::PlotBlock, *operator, target_ids),
        ConditionKind::TagCount {
            operator,
            value,
            target_ids,
        } => {
            let (operator, expected) = (*operator, *value);
            let filter: HashSet<DbId> = target_ids.iter().copied().collect();
            Box::new(move |ctx: &RuleContext<'_>| {
                let count = ctx
                    .present_set(EntityKind::Tag)
                    .into_iter()
                    .filter(|id| filter.is_empty() || filter.contains(id))
                    .count();
                Ok(operator.compare(count as i64, expected))
            })
        }
        ConditionKind::PlotBlockDepth { operator, value } => {
            let (operator, expected) = (*operator, *value);
            Box::new(move |ctx: &RuleContext<'_>| {
                let mut deepest = 0usize;
                for &id in &ctx.context.selected_plot_blocks {
                    let depth = ctx
                        .graph
                        .plot_block_depth(id)
                        .ok_or(RuleError::CyclicHierarchy { plot_block_id: id })?;
                    deepest = deepest.max(depth);
                }
                Ok(operator.compare(deepest as i64, expected))
            })
        }
        ConditionKind::CustomExpression { expression } => {
            let length = expression.len();
            Box::new(move |_: &RuleContext<'_>| {
                tracing::debug!(length, "custom_expression conditions are not evaluated");
                Ok(true)
            })
        }
    }
}

fn presence_predicate(kind: EntityKind, operator: PresenceOperator, targets: &[DbId]) -> Predicate {
    let targets: HashSet<DbId> = targets.iter().copied().collect();
    Box::new(move |ctx: &RuleContext<'_>| {
        let present = |id: &DbId| ctx.is_present(kind, *id);
        Ok(match operator {
            PresenceOperator::Contains => targets.iter().all(present),
            PresenceOperator::NotContains => !targets.iter().all(present),
            PresenceOperator::In => targets.iter().any(present),
            PresenceOperator::NotIn => !targets.iter().any(present),
            PresenceOperator::Equals => ctx.present_set(kind) == targets,
        })
    })
}

impl CompiledRule {
    /// Fold the condition chain left to right with short-circuiting.
    ///
    /// Each condition's `logic_operator` joins it to the next one. Evaluation
    /// stops as soon as an `AND` meets a false accumulator or an `OR` meets a
    /// true one. `evaluated` counts the predicates actually run. A rule
    /// without conditions always triggers.
    pub fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        evaluated: &mut usize,
    ) -> Result<bool, RuleError> {
        let mut conditions = self.conditions.iter();
        let Some(first) = conditions.next() else {
            return Ok(true);
        };

        *evaluated += 1;
        let mut accumulated = (first.predicate)(ctx)?;
        let mut joiner = first.logic;

        for condition in conditions {
            match (joiner, accumulated) {
                (LogicOperator::And, false) | (LogicOperator::Or, true) => break,
                _ => {}
            }
            *evaluated += 1;
            let value = (condition.predicate)(ctx)?;
            accumulated = match joiner {
                LogicOperator::And => accumulated && value,
                LogicOperator::Or => accumulated || value,
            };
            joiner = condition.logic;
        }

        Ok(accumulated)
    }

    /// Run every action in order. Any failure discards the rule's output.
    pub fn run_actions(&self, ctx: &RuleContext<'_>) -> Result<Vec<RuleEffect>, RuleError> {
        let mut effects = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            if let Some(effect) = self.run_action(action, ctx)? {
                effects.push(effect);
            }
        }
        Ok(effects)
    }

    fn run_action(
        &self,
        action: &RuleAction,
        ctx: &RuleContext<'_>,
    ) -> Result<Option<RuleEffect>, RuleError> {
        match action {
            RuleAction::RequireTag {
                target_ids,
                message,
            } => self.require(action, EntityKind::Tag, target_ids, message.as_deref(), ctx),
            RuleAction::RequirePlotBlock {
                target_ids,
                message,
            } => self.require(
                action,
                EntityKind::PlotBlock,
                target_ids,
                message.as_deref(),
                ctx,
            ),
            RuleAction::ForbidTag {
                target_ids,
                message,
            } => {
                let targets = non_empty(action, target_ids)?;
                let present: Vec<DbId> = targets
                    .iter()
                    .copied()
                    .filter(|&id| ctx.is_present(EntityKind::Tag, id))
                    .collect();
                if present.is_empty() {
                    return Ok(None);
                }
                let message = message.clone().unwrap_or_else(|| {
                    format!(
                        "Rule \"{}\" forbids: {}",
                        self.name,
                        names(ctx.graph, EntityKind::Tag, &present)
                    )
                });
                Ok(Some(self.effect(
                    self.severity,
                    message,
                    EntityKind::Tag,
                    &present,
                    SuggestionAction::Remove,
                )))
            }
            RuleAction::SuggestTag {
                target_ids,
                message,
            } => {
                let targets = non_empty(action, target_ids)?;
                let message = message.clone().unwrap_or_else(|| {
                    format!(
                        "Consider adding: {}",
                        names(ctx.graph, EntityKind::Tag, targets)
                    )
                });
                Ok(Some(RuleEffect::Suggestion(
                    ValidationSuggestion::new(
                        IssueType::CustomRuleSuggestion,
                        message,
                        SuggestionAction::Add,
                    )
                    .with_target(targets[0])
                    .with_alternatives(targets[1..].iter().copied()),
                )))
            }
            RuleAction::ShowMessage { message, severity } => {
                let message = message
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .ok_or(RuleError::MissingMessage)?;
                Ok(Some(self.effect(
                    severity.unwrap_or(self.severity),
                    message.to_string(),
                    EntityKind::Tag,
                    &[],
                    SuggestionAction::Keep,
                )))
            }
            RuleAction::ModifyPriority { priority } => {
                tracing::debug!(
                    rule_id = self.id,
                    requested = ?priority,
                    "modify_priority actions are not applied"
                );
                Ok(None)
            }
        }
    }

    fn require(
        &self,
        action: &RuleAction,
        kind: EntityKind,
        target_ids: &[DbId],
        message: Option<&str>,
        ctx: &RuleContext<'_>,
    ) -> Result<Option<RuleEffect>, RuleError> {
        let targets = non_empty(action, target_ids)?;
        let missing: Vec<DbId> = targets
            .iter()
            .copied()
            .filter(|&id| !ctx.is_present(kind, id))
            .collect();

        if missing.is_empty() {
            return Ok(Some(RuleEffect::Suggestion(
                ValidationSuggestion::new(
                    IssueType::CustomRuleSuggestion,
                    format!("Rule \"{}\" is satisfied", self.name),
                    SuggestionAction::Keep,
                )
                .with_alternatives(targets.iter().copied()),
            )));
        }

        let message = message.map(str::to_string).unwrap_or_else(|| {
            format!(
                "Rule \"{}\" requires: {}",
                self.name,
                names(ctx.graph, kind, &missing)
            )
        });
        Ok(Some(self.effect(
            self.severity,
            message,
            kind,
            &missing,
            SuggestionAction::Add,
        )))
    }

    /// Map an outcome onto the result bucket matching `severity`.
    fn effect(
        &self,
        severity: Severity,
        message: String,
        kind: EntityKind,
        ids: &[DbId],
        action: SuggestionAction,
    ) -> RuleEffect {
        match severity {
            Severity::Error => RuleEffect::Error(
                ValidationError::new(IssueType::CustomRuleViolation, message)
                    .with_field(kind.field())
                    .with_value(json!({ "rule_id": self.id }))
                    .with_ids(ids.iter().copied()),
            ),
            Severity::Warning => RuleEffect::Warning(
                ValidationWarning::new(IssueType::CustomRuleWarning, message)
                    .with_field(kind.field())
                    .with_ids(ids.iter().copied()),
            ),
            Severity::Info => {
                let mut suggestion =
                    ValidationSuggestion::new(IssueType::CustomRuleSuggestion, message, action);
                if let Some((&first, rest)) = ids.split_first() {
                    suggestion = suggestion
                        .with_target(first)
                        .with_alternatives(rest.iter().copied());
                }
                RuleEffect::Suggestion(suggestion)
            }
        }
    }
}

fn non_empty<'t>(action: &RuleAction, target_ids: &'t [DbId]) -> Result<&'t [DbId], RuleError> {
    if target_ids.is_empty() {
        Err(RuleError::MissingTargets {
            action: action.as_str(),
        })
    } else {
        Ok(target_ids)
    }
}

fn names(graph: &RuleGraph, kind: EntityKind, ids: &[DbId]) -> String {
    ids.iter()
        .map(|&id| graph.display_name(kind, id))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Execute compiled rules against a selection and aggregate their output.
pub fn execute_rules(
    rules: &[CompiledRule],
    graph: &RuleGraph,
    context: &SelectionContext,
    slow_rule_threshold: Duration,
) -> ValidationResult {
    execute_rules_with_report(rules, graph, context, slow_rule_threshold).0
}

/// Like [`execute_rules`], also returning one report per executed rule.
pub fn execute_rules_with_report(
    rules: &[CompiledRule],
    graph: &RuleGraph,
    context: &SelectionContext,
    slow_rule_threshold: Duration,
) -> (ValidationResult, Vec<RuleExecutionReport>) {
    let ctx = RuleContext::new(graph, context);
    let mut ordered: Vec<&CompiledRule> = rules.iter().collect();
    ordered.sort_by_key(|rule| rule.priority);

    let mut result = ValidationResult::valid();
    let mut reports = Vec::with_capacity(ordered.len());

    for rule in ordered {
        let started = Instant::now();
        let mut evaluated = 0;
        let outcome = rule.evaluate(&ctx, &mut evaluated).and_then(|triggered| {
            if triggered {
                rule.run_actions(&ctx).map(Some)
            } else {
                Ok(None)
            }
        });
        let elapsed = started.elapsed();

        if elapsed > slow_rule_threshold {
            tracing::warn!(
                rule_id = rule.id,
                rule_name = %rule.name,
                duration_ms = elapsed.as_millis() as u64,
                threshold_ms = slow_rule_threshold.as_millis() as u64,
                "Slow validation rule"
            );
        }

        let (triggered, failed) = match outcome {
            Ok(Some(effects)) => {
                for effect in effects {
                    match effect {
                        RuleEffect::Error(error) => result.push_error(error),
                        RuleEffect::Warning(warning) => result.push_warning(warning),
                        RuleEffect::Suggestion(suggestion) => result.push_suggestion(suggestion),
                    }
                }
                (true, false)
            }
            Ok(None) => (false, false),
            Err(err) => {
                tracing::warn!(rule_id = rule.id, error = %err, "Validation rule failed");
                result.push_error(
                    ValidationError::new(
                        IssueType::RuleExecutionError,
                        format!("Rule \"{}\" could not be evaluated: {err}", rule.name),
                    )
                    .with_value(json!({ "rule_id": rule.id })),
                );
                (false, true)
            }
        };

        reports.push(RuleExecutionReport {
            rule_id: rule.id,
            triggered,
            failed,
            conditions_evaluated: evaluated,
            duration_us: elapsed.as_micros() as u64,
        });
    }

    (result, reports)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::*;
    use crate::validation::rules::{CompareOperator, RuleCondition};

    const THRESHOLD: Duration = Duration::from_millis(50);

    fn test_graph() -> RuleGraph {
        let mut c = content();
        c.tags = vec![
            tag(1, "angst", "mood", None),
            tag(2, "hurt/comfort", "trope", None),
            tag(3, "crack", "genre", None),
        ];
        let root = block(10, "Root");
        let mut child = block(11, "Child");
        child.parent_id = Some(10);
        let mut grandchild = block(12, "Grandchild");
        grandchild.parent_id = Some(11);
        c.plot_blocks = vec![root, child, grandchild];
        graph(c)
    }

    fn rule(
        id: DbId,
        priority: i32,
        conditions: Vec<RuleCondition>,
        actions: Vec<RuleAction>,
    ) -> ValidationRule {
        ValidationRule {
            id,
            name: format!("rule {id}"),
            description: None,
            priority,
            severity: Severity::Error,
            is_active: true,
            conditions,
            actions,
        }
    }

    fn has_tag(operator: PresenceOperator, ids: &[DbId]) -> RuleCondition {
        RuleCondition::new(ConditionKind::HasTag {
            operator,
            target_ids: ids.to_vec(),
        })
    }

    fn require_tag(ids: &[DbId]) -> RuleAction {
        RuleAction::RequireTag {
            target_ids: ids.to_vec(),
            message: None,
        }
    }

    fn tags(ids: &[DbId]) -> SelectionContext {
        SelectionContext::new(FANDOM).with_tags(ids.iter().copied())
    }

    fn run(
        rules: &[ValidationRule],
        context: &SelectionContext,
    ) -> (ValidationResult, Vec<RuleExecutionReport>) {
        let g = test_graph();
        execute_rules_with_report(&compile_rules(rules), &g, context, THRESHOLD)
    }

    #[test]
    fn and_chain_short_circuits_on_first_false() {
        let r = rule(
            1,
            0,
            vec![
                has_tag(PresenceOperator::Contains, &[404]),
                has_tag(PresenceOperator::In, &[1]),
                has_tag(PresenceOperator::In, &[2]),
            ],
            vec![require_tag(&[3])],
        );
        let (result, reports) = run(&[r], &tags(&[]));

        assert!(result.errors.is_empty());
        assert!(result.is_valid);
        assert_eq!(reports[0].conditions_evaluated, 1);
        assert!(!reports[0].triggered);
    }

    #[test]
    fn or_chain_short_circuits_on_first_true() {
        let r = rule(
            1,
            0,
            vec![
                has_tag(PresenceOperator::In, &[1]).or(),
                has_tag(PresenceOperator::In, &[404]),
            ],
            vec![require_tag(&[2])],
        );
        let (result, reports) = run(&[r], &tags(&[1]));

        assert_eq!(reports[0].conditions_evaluated, 1);
        assert!(reports[0].triggered);
        assert_eq!(result.errors[0].kind, IssueType::CustomRuleViolation);
        assert_eq!(result.errors[0].affected_ids, vec![2]);
    }

    #[test]
    fn mixed_chain_folds_left_to_right() {
        // (true AND false) OR true
        let r = rule(
            1,
            0,
            vec![
                has_tag(PresenceOperator::In, &[1]),
                has_tag(PresenceOperator::In, &[2]).or(),
                has_tag(PresenceOperator::In, &[1]),
            ],
            vec![require_tag(&[3])],
        );
        let (_, reports) = run(&[r], &tags(&[1]));
        assert_eq!(reports[0].conditions_evaluated, 3);
        assert!(reports[0].triggered);
    }

    #[test]
    fn presence_operators() {
        let g = test_graph();
        let ctx = tags(&[1, 2]);
        let rc = RuleContext::new(&g, &ctx);
        let check = |op, ids: &[DbId]| {
            let predicate = presence_predicate(EntityKind::Tag, op, ids);
            predicate(&rc).unwrap()
        };

        assert!(check(PresenceOperator::Contains, &[1, 2]));
        assert!(!check(PresenceOperator::Contains, &[1, 3]));
        assert!(check(PresenceOperator::NotContains, &[1, 3]));
        assert!(check(PresenceOperator::In, &[3, 2]));
        assert!(check(PresenceOperator::NotIn, &[3]));
        assert!(check(PresenceOperator::Equals, &[2, 1]));
        assert!(!check(PresenceOperator::Equals, &[1]));
    }

    #[test]
    fn unknown_targets_are_not_present() {
        let mut context = tags(&[1]);
        context.applied_tags.push(404);
        let r = rule(
            1,
            0,
            vec![has_tag(PresenceOperator::In, &[404])],
            vec![require_tag(&[3])],
        );
        let (result, _) = run(&[r], &context);
        assert!(result.is_empty());
    }

    #[test]
    fn tag_count_and_depth_conditions() {
        let count = rule(
            1,
            0,
            vec![RuleCondition::new(ConditionKind::TagCount {
                operator: CompareOperator::GreaterThan,
                value: 1,
                target_ids: Vec::new(),
            })],
            vec![RuleAction::ShowMessage {
                message: Some("Lots of tags".to_string()),
                severity: Some(Severity::Warning),
            }],
        );
        let depth = rule(
            2,
            1,
            vec![RuleCondition::new(ConditionKind::PlotBlockDepth {
                operator: CompareOperator::Equals,
                value: 2,
            })],
            vec![RuleAction::ShowMessage {
                message: Some("Deeply nested".to_string()),
                severity: Some(Severity::Info),
            }],
        );
        let context = tags(&[1, 2]).with_plot_blocks([10, 12]);
        let (result, _) = run(&[count, depth], &context);

        assert!(result.is_valid);
        assert_eq!(result.warnings[0].message, "Lots of tags");
        assert_eq!(result.warnings[0].kind, IssueType::CustomRuleWarning);
        assert_eq!(result.suggestions[0].message, "Deeply nested");
    }

    #[test]
    fn require_satisfied_yields_keep_suggestion() {
        let r = rule(1, 0, Vec::new(), vec![require_tag(&[1])]);
        let (result, reports) = run(&[r], &tags(&[1]));

        assert!(reports[0].triggered);
        assert_eq!(reports[0].conditions_evaluated, 0);
        assert!(result.errors.is_empty());
        assert_eq!(result.suggestions[0].action, SuggestionAction::Keep);
    }

    #[test]
    fn forbid_and_suggest_actions() {
        let mut r = rule(
            1,
            0,
            Vec::new(),
            vec![
                RuleAction::ForbidTag {
                    target_ids: vec![3],
                    message: Some("No crack in this collection".to_string()),
                },
                RuleAction::SuggestTag {
                    target_ids: vec![2, 1],
                    message: None,
                },
                RuleAction::ModifyPriority { priority: Some(-5) },
            ],
        );
        r.severity = Severity::Error;
        let (result, _) = run(&[r.clone()], &tags(&[3]));

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "No crack in this collection");
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].target_id, Some(2));
        assert_eq!(result.suggestions[0].alternative_ids, vec![1]);

        let (clean, _) = run(&[r], &tags(&[1]));
        assert!(clean.errors.is_empty());
    }

    #[test]
    fn rule_severity_selects_bucket() {
        let mut r = rule(1, 0, Vec::new(), vec![require_tag(&[2])]);
        r.severity = Severity::Info;
        let (result, _) = run(&[r], &tags(&[]));

        assert!(result.is_valid);
        assert_eq!(result.suggestions[0].kind, IssueType::CustomRuleSuggestion);
        assert_eq!(result.suggestions[0].action, SuggestionAction::Add);
        assert_eq!(result.suggestions[0].target_id, Some(2));
    }

    #[test]
    fn failing_rule_is_isolated() {
        let broken = rule(1, 0, Vec::new(), vec![require_tag(&[])]);
        let mut cyclic = block(20, "Loop A");
        cyclic.parent_id = Some(21);
        let looping = rule(
            2,
            1,
            vec![RuleCondition::new(ConditionKind::PlotBlockDepth {
                operator: CompareOperator::GreaterThan,
                value: 0,
            })],
            vec![require_tag(&[1])],
        );
        let healthy = rule(3, 2, Vec::new(), vec![require_tag(&[2])]);

        let mut c = content();
        let mut loop_b = block(21, "Loop B");
        loop_b.parent_id = Some(20);
        c.plot_blocks = vec![cyclic, loop_b];
        c.tags = vec![tag(1, "angst", "mood", None), tag(2, "fluff", "mood", None)];
        let g = graph(c);
        let context = SelectionContext::new(FANDOM).with_plot_blocks([20]);

        let (result, reports) = execute_rules_with_report(
            &compile_rules(&[healthy, looping, broken]),
            &g,
            &context,
            THRESHOLD,
        );

        let kinds: Vec<IssueType> = result.errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueType::RuleExecutionError,
                IssueType::RuleExecutionError,
                IssueType::CustomRuleViolation,
            ]
        );
        assert!(result.errors[0].message.contains("no target ids"));
        assert!(result.errors[1].message.contains("cyclic parent chain"));
        assert_eq!(
            reports.iter().map(|r| (r.rule_id, r.failed)).collect::<Vec<_>>(),
            vec![(1, true), (2, true), (3, false)]
        );
    }

    #[test]
    fn show_message_without_text_fails() {
        let r = rule(
            1,
            0,
            Vec::new(),
            vec![RuleAction::ShowMessage {
                message: Some("  ".to_string()),
                severity: None,
            }],
        );
        let (result, _) = run(&[r], &tags(&[]));
        assert_eq!(result.errors[0].kind, IssueType::RuleExecutionError);
    }

    #[test]
    fn priority_orders_output_and_inactive_rules_are_dropped() {
        let mut late = rule(1, 20, Vec::new(), vec![require_tag(&[1])]);
        late.name = "late".to_string();
        let mut early = rule(2, 5, Vec::new(), vec![require_tag(&[2])]);
        early.name = "early".to_string();
        let mut off = rule(3, 0, Vec::new(), vec![require_tag(&[3])]);
        off.is_active = false;

        let compiled = compile_rules(&[late, early, off]);
        assert_eq!(
            compiled.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![2, 1]
        );

        let g = test_graph();
        let result = execute_rules(&compiled, &g, &tags(&[]), THRESHOLD);
        assert!(result.errors[0].message.starts_with("Rule \"early\""));
        assert!(result.errors[1].message.starts_with("Rule \"late\""));
    }

    #[test]
    fn custom_expression_always_passes() {
        let r = rule(
            1,
            0,
            vec![RuleCondition::new(ConditionKind::CustomExpression {
                expression: "process.exit(1)".to_string(),
            })],
            vec![require_tag(&[1])],
        );
        let (_, reports) = run(&[r], &tags(&[]));
        assert!(reports[0].triggered);
    }

    #[test]
    fn slow_rules_are_not_failures() {
        let g = test_graph();
        let compiled = compile_rules(&[rule(1, 0, Vec::new(), vec![require_tag(&[1])])]);
        let (result, reports) =
            execute_rules_with_report(&compiled, &g, &tags(&[1]), Duration::ZERO);
        assert!(result.is_valid);
        assert!(!reports[0].failed);
    }
}
