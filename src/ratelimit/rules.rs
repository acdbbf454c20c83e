//! Rule resolution and namespace key construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::info;

use crate::config::RuleConfig;
use crate::error::{FloodgateError, Result};

/// Rule name used when callers do not specify one.
pub const DEFAULT_RULE: &str = "default";

/// Built-in fallback when no `"default"` rule is configured.
const FALLBACK_DEFAULT: Rule = Rule {
    period: Duration::from_secs(60),
    limit: 100,
};

/// An immutable period/limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Window duration
    pub period: Duration,
    /// Maximum attempts admitted within the window
    pub limit: u64,
}

impl From<RuleConfig> for Rule {
    fn from(config: RuleConfig) -> Self {
        Self {
            period: Duration::from_secs(config.period_secs),
            limit: config.limit,
        }
    }
}

/// Maps rule names to limits and request identities to namespace keys.
///
/// The rule set is read on every lookup rather than cached per call site, so
/// an operator replacing the set at runtime takes effect immediately.
#[derive(Clone)]
pub struct RuleResolver {
    prefix: String,
    rules: Arc<RwLock<HashMap<String, Rule>>>,
}

impl RuleResolver {
    /// Creates a resolver scoping all keys under `prefix`.
    pub fn new(prefix: impl Into<String>, rules: HashMap<String, Rule>) -> Self {
        Self {
            prefix: prefix.into(),
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// Builds a resolver from configured rules.
    pub fn from_config(prefix: impl Into<String>, rules: &HashMap<String, RuleConfig>) -> Self {
        let rules = rules
            .iter()
            .map(|(name, config)| (name.clone(), Rule::from(*config)))
            .collect();
        Self::new(prefix, rules)
    }

    /// Resolves a named rule against the current rule set.
    ///
    /// [`DEFAULT_RULE`] always resolves, falling back to a built-in limit when
    /// not configured. Any other unknown name is a configuration error, never
    /// silently treated as the default.
    pub fn resolve(&self, name: &str) -> Result<Rule> {
        let rules = self.rules.read();
        match rules.get(name) {
            Some(rule) => Ok(*rule),
            None if name == DEFAULT_RULE => Ok(FALLBACK_DEFAULT),
            None => Err(FloodgateError::Config(format!(
                "rate limit rule '{}' is not defined",
                name
            ))),
        }
    }

    /// Replaces the entire rule set; subsequent lookups see the new rules.
    pub fn replace_rules(&self, rules: HashMap<String, Rule>) {
        info!(rules = rules.len(), "Replacing rate limit rule set");
        *self.rules.write() = rules;
    }

    /// Builds the namespace key for one identity under one rule.
    ///
    /// The identity sits last so `{prefix}:*:{identity}` enumerates exactly
    /// that identity's keys and `{prefix}:*` enumerates every key this
    /// component owns. No particular identity format is assumed.
    pub fn make_key(&self, rule_name: &str, identity: &str) -> String {
        format!("{}:{}:{}", self.prefix, rule_name, identity)
    }

    /// Pattern matching every key for one identity, across all rules.
    pub fn identity_pattern(&self, identity: &str) -> String {
        format!("{}:*:{}", self.prefix, identity)
    }

    /// Pattern matching every key under this resolver's prefix.
    pub fn namespace_pattern(&self) -> String {
        format!("{}:*", self.prefix)
    }

    /// The namespace prefix all keys are scoped under.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
