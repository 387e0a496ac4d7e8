//! Per-turn taint tracking.
//!
//! A turn starts at some level (usually `Trusted`) and can only move up.
//! After each tool executes, its resolved tags decide whether the turn has
//! now seen untrusted output.

use crate::types::{Tag, TagSet, TaintLevel};

/// Level a turn escalates to after running a tool with these tags, if any.
///
/// Output tagged `output-untrusted` or `trust-unspecified` taints the turn
/// unless the tool is also explicitly `output-trusted`.
pub fn escalation_for(tags: &TagSet) -> Option<TaintLevel> {
    let untrusted_output =
        tags.contains(&Tag::OutputUntrusted) || tags.contains(&Tag::TrustUnspecified);
    if untrusted_output && !tags.contains(&Tag::OutputTrusted) {
        Some(TaintLevel::Untrusted)
    } else {
        None
    }
}

/// Monotonic taint state for one turn.
///
/// The level cannot be lowered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaintTracker {
    level: TaintLevel,
}

impl TaintTracker {
    /// Tracker starting at `level`.
    pub fn starting_at(level: TaintLevel) -> Self {
        Self { level }
    }

    /// Current level.
    pub fn level(&self) -> TaintLevel {
        self.level
    }

    /// Raise the level to at least `level`. Returns `true` if it changed.
    pub fn escalate(&mut self, level: TaintLevel) -> bool {
        if level > self.level {
            self.level = level;
            true
        } else {
            false
        }
    }

    /// Apply the post-execution rule for a tool's tags.
    ///
    /// Returns the new level if it changed.
    pub fn observe_output(&mut self, tags: &TagSet) -> Option<TaintLevel> {
        let target = escalation_for(tags)?;
        self.escalate(target).then_some(self.level)
    }
}
