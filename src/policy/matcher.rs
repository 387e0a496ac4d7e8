//! Tool matcher: the predicate half of a policy rule.
//!
//! Up to four criteria, each optional:
//! - name globs (any may match),
//! - tags that must all be present,
//! - tags of which at least one must be present,
//! - origin ids (any may match).
//!
//! Every specified criterion must hold. A matcher with no criteria matches
//! nothing.

use std::collections::BTreeSet;
use std::fmt;

use glob::{MatchOptions, Pattern, PatternError};

use crate::types::{Tag, TagSet, ToolIdentity};

/// Case-sensitive matching; tool names carry no path separators.
const NAME_MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled shell-glob over tool names (`*`, `?`, `[...]`).
#[derive(Clone)]
pub struct NamePattern {
    raw: String,
    pattern: Pattern,
}

impl NamePattern {
    /// Compile a glob.
    ///
    /// # Errors
    ///
    /// Returns the glob crate's error for malformed patterns (e.g. `"[a"`).
    pub fn new(raw: &str) -> Result<Self, PatternError> {
        Ok(Self {
            raw: raw.to_owned(),
            pattern: Pattern::new(raw)?,
        })
    }

    /// Whether `name` matches this glob.
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.matches_with(name, NAME_MATCH_OPTIONS)
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamePattern").field(&self.raw).finish()
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for NamePattern {}

/// Predicate over (tool identity, resolved tags).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolMatcher {
    names: Option<Vec<NamePattern>>,
    tags_all: Option<TagSet>,
    tags_any: Option<TagSet>,
    origins: Option<BTreeSet<String>>,
}

impl ToolMatcher {
    /// A matcher with every criterion unset. It matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the tool name to match at least one glob.
    ///
    /// An empty list leaves the criterion unset.
    pub fn with_names(mut self, patterns: Vec<NamePattern>) -> Self {
        self.names = (!patterns.is_empty()).then_some(patterns);
        self
    }

    /// Compile and set name globs in one step.
    ///
    /// # Errors
    ///
    /// Returns the first malformed pattern's error.
    pub fn with_name_globs<I, S>(self, patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled = patterns
            .into_iter()
            .map(|p| NamePattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_names(compiled))
    }

    /// Require every one of these tags.
    pub fn with_tags_all<I: IntoIterator<Item = Tag>>(mut self, tags: I) -> Self {
        let tags: TagSet = tags.into_iter().collect();
        self.tags_all = (!tags.is_empty()).then_some(tags);
        self
    }

    /// Require at least one of these tags.
    pub fn with_tags_any<I: IntoIterator<Item = Tag>>(mut self, tags: I) -> Self {
        let tags: TagSet = tags.into_iter().collect();
        self.tags_any = (!tags.is_empty()).then_some(tags);
        self
    }

    /// Require the tool to come from one of these origins.
    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: BTreeSet<String> = origins.into_iter().map(Into::into).collect();
        self.origins = (!origins.is_empty()).then_some(origins);
        self
    }

    /// True when no criterion is set, i.e. the matcher can never match.
    pub fn is_empty(&self) -> bool {
        self.names.is_none()
            && self.tags_all.is_none()
            && self.tags_any.is_none()
            && self.origins.is_none()
    }

    /// Test a tool against every specified criterion.
    pub fn matches(&self, identity: &ToolIdentity, tags: &TagSet) -> bool {
        if self.is_empty() {
            return false;
        }

        if let Some(patterns) = &self.names {
            if !patterns.iter().any(|p| p.matches(&identity.name)) {
                return false;
            }
        }

        if let Some(required) = &self.tags_all {
            if !required.is_subset(tags) {
                return false;
            }
        }

        if let Some(wanted) = &self.tags_any {
            if wanted.is_disjoint(tags) {
                return false;
            }
        }

        if let Some(origins) = &self.origins {
            // In-house tools have no origin and never satisfy this criterion.
            match identity.origin() {
                Some(origin) if origins.contains(origin) => {}
                _ => return false,
            }
        }

        true
    }
}

impl fmt::Display for ToolMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<never>");
        }
        let mut parts = Vec::new();
        if let Some(names) = &self.names {
            let names: Vec<&str> = names.iter().map(NamePattern::as_str).collect();
            parts.push(format!("names=[{}]", names.join(", ")));
        }
        if let Some(tags) = &self.tags_all {
            parts.push(format!("tags_all=[{}]", join_tags(tags)));
        }
        if let Some(tags) = &self.tags_any {
            parts.push(format!("tags_any=[{}]", join_tags(tags)));
        }
        if let Some(origins) = &self.origins {
            let origins: Vec<&str> = origins.iter().map(String::as_str).collect();
            parts.push(format!("origins=[{}]", origins.join(", ")));
        }
        f.write_str(&parts.join(" "))
    }
}

fn join_tags(tags: &TagSet) -> String {
    tags.iter().map(Tag::as_str).collect::<Vec<_>>().join(", ")
}
