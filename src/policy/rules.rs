//! Policy rules, rule sets and their evaluation.

use std::fmt;

use serde::Serialize;

use crate::policy::matcher::ToolMatcher;
use crate::types::{Decision, TagSet, TaintLevel, ToolIdentity};

/// One (matcher, decision) pair with its priority and optional taint gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    /// Which tools the rule applies to.
    pub matcher: ToolMatcher,
    /// What to do with a matching tool.
    pub decision: Decision,
    /// Higher wins. Equal priorities fall back to declaration order.
    pub priority: i64,
    /// The rule is only active once the turn's taint reaches this level.
    pub taint_threshold: Option<TaintLevel>,
    /// Free-text note shown in logs and CLI output.
    pub description: String,
}

impl PolicyRule {
    /// Rule with priority 0, no taint gate and an empty description.
    pub fn new(matcher: ToolMatcher, decision: Decision) -> Self {
        Self {
            matcher,
            decision,
            priority: 0,
            taint_threshold: None,
            description: String::new(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Only activate the rule at or above `level`.
    pub fn with_taint_threshold(mut self, level: TaintLevel) -> Self {
        self.taint_threshold = Some(level);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the rule participates at the given taint level.
    pub fn is_active_at(&self, taint: TaintLevel) -> bool {
        match self.taint_threshold {
            Some(threshold) => threshold <= taint,
            None => true,
        }
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>6}] {:<7} {}", self.priority, self.decision, self.matcher)?;
        if let Some(threshold) = self.taint_threshold {
            write!(f, " (taint >= {threshold})")?;
        }
        if !self.description.is_empty() {
            write!(f, " # {}", self.description)?;
        }
        Ok(())
    }
}

/// One configuration document's rules before merging.
///
/// Unlike [`RuleSet`], the default decision is optional: a layer that does not
/// declare one inherits it from a less specific layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyLayer {
    /// Rules in declaration order.
    pub rules: Vec<PolicyRule>,
    /// Fallback decision, if this layer defines one.
    pub default_decision: Option<Decision>,
}

impl PolicyLayer {
    /// Layer with the given rules and no default decision.
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules,
            default_decision: None,
        }
    }

    /// Set the layer's default decision.
    pub fn with_default(mut self, decision: Decision) -> Self {
        self.default_decision = Some(decision);
        self
    }
}

impl From<RuleSet> for PolicyLayer {
    fn from(set: RuleSet) -> Self {
        Self {
            rules: set.rules,
            default_decision: Some(set.default_decision),
        }
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRule {
    /// Position of the rule in the rule set's declaration order.
    pub index: usize,
    /// Effective priority of the rule.
    pub priority: i64,
    /// The rule's description.
    pub description: String,
}

/// A decision plus the rule responsible for it (`None` means the default).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// The decision.
    pub decision: Decision,
    /// The deciding rule, if any matched.
    pub rule: Option<MatchedRule>,
}

/// Ordered rules plus a fallback. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    /// Rules in declaration order. Order breaks priority ties.
    pub rules: Vec<PolicyRule>,
    /// Decision when no active rule matches.
    pub default_decision: Decision,
}

impl RuleSet {
    /// Build a rule set.
    pub fn new(rules: Vec<PolicyRule>, default_decision: Decision) -> Self {
        Self {
            rules,
            default_decision,
        }
    }

    /// Decide for a tool at a taint level.
    pub fn evaluate(&self, identity: &ToolIdentity, tags: &TagSet, taint: TaintLevel) -> Decision {
        self.explain(identity, tags, taint).decision
    }

    /// Decide for a tool and report which rule decided.
    ///
    /// Rules gated above `taint` are skipped. Among matching rules the
    /// highest priority wins; ties go to the earliest declared rule. This is
    /// the same result as a stable sort by descending priority followed by
    /// first match.
    pub fn explain(&self, identity: &ToolIdentity, tags: &TagSet, taint: TaintLevel) -> Evaluation {
        let mut best: Option<(usize, &PolicyRule)> = None;

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.is_active_at(taint) {
                continue;
            }
            // Equal priority never displaces an earlier rule.
            if best.is_some_and(|(_, current)| rule.priority <= current.priority) {
                continue;
            }
            if rule.matcher.matches(identity, tags) {
                best = Some((index, rule));
            }
        }

        match best {
            Some((index, rule)) => Evaluation {
                decision: rule.decision,
                rule: Some(MatchedRule {
                    index,
                    priority: rule.priority,
                    description: rule.description.clone(),
                }),
            },
            None => Evaluation {
                decision: self.default_decision,
                rule: None,
            },
        }
    }

    /// Rules active at `taint` in evaluation order (priority desc, stable).
    pub fn ordered(&self, taint: TaintLevel) -> Vec<(usize, &PolicyRule)> {
        let mut active: Vec<(usize, &PolicyRule)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.is_active_at(taint))
            .collect();
        active.sort_by(|(_, a), (_, b)| b.priority.cmp(&a.priority));
        active
    }
}
