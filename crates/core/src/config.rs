//! Engine configuration loaded from environment variables.

use std::time::Duration;

/// Default soft threshold for a single custom rule's execution time.
pub const DEFAULT_SLOW_RULE_MS: u64 = 50;

/// Tunables for a [`ValidationEngine`](crate::validation::engine::ValidationEngine).
///
/// All fields have defaults matching production behaviour; the environment
/// only needs to override what differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Rules slower than this are logged. Never treated as a failure.
    pub slow_rule_threshold: Duration,
    /// Run the character/plot warning templates as part of `validate`.
    pub warning_templates: bool,
    /// Run the admin-authored custom rules as part of `validate`.
    pub custom_rules: bool,
    /// Append `suggest_enhancements` output to the merged suggestions.
    pub enhancement_suggestions: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            slow_rule_threshold: Duration::from_millis(DEFAULT_SLOW_RULE_MS),
            warning_templates: true,
            custom_rules: true,
            enhancement_suggestions: true,
        }
    }
}

impl ValidationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Unparseable values fall back to the default rather than failing.
    ///
    /// | Env Var                              | Default |
    /// |--------------------------------------|---------|
    /// | `VALIDATION_SLOW_RULE_MS`            | `50`    |
    /// | `VALIDATION_WARNING_TEMPLATES`       | `true`  |
    /// | `VALIDATION_CUSTOM_RULES`            | `true`  |
    /// | `VALIDATION_ENHANCEMENT_SUGGESTIONS` | `true`  |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Used by [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let slow_rule_threshold = lookup("VALIDATION_SLOW_RULE_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.slow_rule_threshold);

        Self {
            slow_rule_threshold,
            warning_templates: parse_flag(
                lookup("VALIDATION_WARNING_TEMPLATES"),
                defaults.warning_templates,
            ),
            custom_rules: parse_flag(lookup("VALIDATION_CUSTOM_RULES"), defaults.custom_rules),
            enhancement_suggestions: parse_flag(
                lookup("VALIDATION_ENHANCEMENT_SUGGESTIONS"),
                defaults.enhancement_suggestions,
            ),
        }
    }
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
