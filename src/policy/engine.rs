//! Policy engine: (tool, context) → decision.
//!
//! Holds the frozen metadata registry and one merged rule set per profile.
//! Built once at startup, then shared behind an `Arc` by every turn. Nothing
//! here is mutated after construction.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::context::ProcessingContext;
use crate::policy::merge::LayerMerger;
use crate::policy::metadata::MetadataRegistry;
use crate::policy::rules::{Evaluation, PolicyLayer, RuleSet};
use crate::types::{TagSet, TaintLevel, ToolIdentity};

/// Immutable decision engine.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    metadata: MetadataRegistry,
    /// Defaults + overrides, used when no (known) profile is active.
    base: RuleSet,
    profiles: HashMap<String, RuleSet>,
}

impl PolicyEngine {
    /// Merge every layer up front and freeze the result.
    pub fn new(
        metadata: MetadataRegistry,
        merger: &LayerMerger,
        defaults: &PolicyLayer,
        overrides: &PolicyLayer,
        profiles: &BTreeMap<String, PolicyLayer>,
    ) -> Self {
        let base = merger.merge(defaults, overrides, None);
        let profiles = profiles
            .iter()
            .map(|(name, layer)| (name.clone(), merger.merge(defaults, overrides, Some(layer))))
            .collect::<HashMap<_, _>>();

        debug!(
            base_rules = base.rules.len(),
            profiles = profiles.len(),
            "policy engine ready"
        );

        Self {
            metadata,
            base,
            profiles,
        }
    }

    /// Engine over a single pre-merged rule set, with no profiles.
    pub fn from_rule_set(metadata: MetadataRegistry, rules: RuleSet) -> Self {
        Self {
            metadata,
            base: rules,
            profiles: HashMap::new(),
        }
    }

    /// The metadata registry.
    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    /// Resolved tags for a tool.
    pub fn tags_for(&self, identity: &ToolIdentity) -> TagSet {
        self.metadata.tags_for(identity)
    }

    /// Effective rule set for a profile.
    ///
    /// Unknown profiles fall back to the base rule set.
    pub fn rule_set(&self, profile: Option<&str>) -> &RuleSet {
        match profile {
            None => &self.base,
            Some(name) => match self.profiles.get(name) {
                Some(rules) => rules,
                None => {
                    warn!(profile = name, "unknown policy profile, using base rules");
                    &self.base
                }
            },
        }
    }

    /// Names of the configured profiles, sorted.
    pub fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate a tool for an explicit profile and taint level.
    pub fn evaluate(
        &self,
        identity: &ToolIdentity,
        profile: Option<&str>,
        taint: TaintLevel,
    ) -> Evaluation {
        let tags = self.tags_for(identity);
        self.evaluate_with_tags(identity, &tags, profile, taint)
    }

    /// Evaluate with tags the caller already resolved.
    pub fn evaluate_with_tags(
        &self,
        identity: &ToolIdentity,
        tags: &TagSet,
        profile: Option<&str>,
        taint: TaintLevel,
    ) -> Evaluation {
        let evaluation = self.rule_set(profile).explain(identity, tags, taint);
        debug!(
            tool = %identity,
            profile = profile.unwrap_or("-"),
            taint = %taint,
            decision = %evaluation.decision,
            rule = evaluation.rule.as_ref().map(|r| r.index),
            "policy evaluated"
        );
        evaluation
    }

    /// Evaluate a tool against a turn's current state.
    pub fn decide(&self, identity: &ToolIdentity, ctx: &ProcessingContext) -> Evaluation {
        self.evaluate(identity, ctx.profile(), ctx.taint())
    }
}
