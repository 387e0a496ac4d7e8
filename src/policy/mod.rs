//! Tool access policy: metadata, matching, layered rules, taint and the engine.
//!
//! Everything here except [`taint::TaintTracker`] is immutable after startup
//! and can be shared across concurrent turns without locking.

pub mod engine;
pub mod matcher;
pub mod merge;
pub mod metadata;
pub mod rules;
pub mod taint;

pub use engine::PolicyEngine;
pub use matcher::{NamePattern, ToolMatcher};
pub use merge::{LayerMerger, DEFAULT_OVERRIDE_OFFSET};
pub use metadata::{MetadataError, MetadataRegistry, MetadataRegistryBuilder};
pub use rules::{Evaluation, MatchedRule, PolicyLayer, PolicyRule, RuleSet};
pub use taint::TaintTracker;
