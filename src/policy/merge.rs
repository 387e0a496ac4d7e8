//! Layer merging: defaults, deployment overrides and a profile become one rule set.

use tracing::debug;

use crate::policy::rules::{PolicyLayer, PolicyRule, RuleSet};
use crate::types::Decision;

/// Priority added to every deployment-override rule.
pub const DEFAULT_OVERRIDE_OFFSET: i64 = 1000;

/// Decision used when no layer declares a default.
pub const FALLBACK_DEFAULT_DECISION: Decision = Decision::Deny;

/// Pure merge of configuration layers with a priority offset for overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMerger {
    override_offset: i64,
}

impl Default for LayerMerger {
    fn default() -> Self {
        Self::new(DEFAULT_OVERRIDE_OFFSET)
    }
}

impl LayerMerger {
    /// Merger that lifts override rules by `override_offset`.
    pub fn new(override_offset: i64) -> Self {
        Self { override_offset }
    }

    /// The offset applied to override rules.
    pub fn override_offset(&self) -> i64 {
        self.override_offset
    }

    /// Merge the layers into one rule set.
    ///
    /// - The default decision comes from the most specific layer that has one
    ///   (profile, then overrides, then defaults), else [`FALLBACK_DEFAULT_DECISION`].
    /// - Override rules are lifted by the offset (saturating).
    /// - Merged order is overrides, profile, defaults, each in declaration
    ///   order, so equal effective priorities resolve in that layer order.
    pub fn merge(
        &self,
        defaults: &PolicyLayer,
        overrides: &PolicyLayer,
        profile: Option<&PolicyLayer>,
    ) -> RuleSet {
        let default_decision = profile
            .and_then(|p| p.default_decision)
            .or(overrides.default_decision)
            .or(defaults.default_decision)
            .unwrap_or(FALLBACK_DEFAULT_DECISION);

        let profile_rules: &[PolicyRule] = profile.map(|p| p.rules.as_slice()).unwrap_or_default();

        let mut rules = Vec::with_capacity(
            overrides
                .rules
                .len()
                .saturating_add(profile_rules.len())
                .saturating_add(defaults.rules.len()),
        );

        rules.extend(overrides.rules.iter().cloned().map(|mut rule| {
            rule.priority = rule.priority.saturating_add(self.override_offset);
            rule
        }));
        rules.extend(profile_rules.iter().cloned());
        rules.extend(defaults.rules.iter().cloned());

        debug!(
            overrides = overrides.rules.len(),
            profile = profile_rules.len(),
            defaults = defaults.rules.len(),
            default_decision = %default_decision,
            offset = self.override_offset,
            "merged policy layers"
        );

        RuleSet::new(rules, default_decision)
    }
}
