//! Core vocabulary shared by every policy component.
//!
//! Tags, decisions and taint levels are closed sets. Unknown spellings are
//! rejected when configuration is loaded rather than silently matching
//! nothing at evaluation time.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Set of tags resolved for a tool. Ordered so logs and CLI output are stable.
pub type TagSet = BTreeSet<Tag>;

/// A string did not belong to one of the closed vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    /// Which vocabulary was being parsed ("tag", "decision", "taint level").
    pub kind: &'static str,
    /// The offending spelling.
    pub value: String,
}

impl UnknownValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Family a [`Tag`] belongs to. Families are not mutually exclusive on a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagFamily {
    /// What the tool can do (read, mutate, destroy, run code, talk outside).
    Capability,
    /// Whether the tool's output may be trusted.
    OutputTrust,
    /// Convenience grouping declared in configuration.
    FunctionalGroup,
}

/// Security-relevant label attached to a tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    /// Only reads state.
    ReadOnly,
    /// Mutates state.
    StateChanging,
    /// Deletes or irreversibly overwrites state.
    Destructive,
    /// Executes arbitrary code.
    CodeExecution,
    /// Communicates with parties outside the deployment.
    ExternalComm,
    /// Output is produced from trusted sources only.
    OutputTrusted,
    /// Output may carry attacker-controlled content.
    OutputUntrusted,
    /// Nobody declared how trustworthy the output is.
    TrustUnspecified,
    /// Functional group declared in configuration (e.g. `notes`).
    Group(String),
}

impl Tag {
    /// Parse one of the built-in tags.
    ///
    /// Accepts the canonical kebab-case spelling and its snake_case alias.
    /// Group tags are not built in; see [`Tag::group`].
    pub fn builtin(name: &str) -> Option<Self> {
        let tag = match name {
            "read-only" | "read_only" => Self::ReadOnly,
            "state-changing" | "state_changing" => Self::StateChanging,
            "destructive" => Self::Destructive,
            "code-execution" | "code_execution" => Self::CodeExecution,
            "external-comm" | "external_comm" => Self::ExternalComm,
            "output-trusted" | "output_trusted" => Self::OutputTrusted,
            "output-untrusted" | "output_untrusted" => Self::OutputUntrusted,
            "trust-unspecified" | "trust_unspecified" => Self::TrustUnspecified,
            _ => return None,
        };
        Some(tag)
    }

    /// Build a functional-group tag.
    pub fn group(name: impl Into<String>) -> Self {
        Self::Group(name.into())
    }

    /// Canonical spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ReadOnly => "read-only",
            Self::StateChanging => "state-changing",
            Self::Destructive => "destructive",
            Self::CodeExecution => "code-execution",
            Self::ExternalComm => "external-comm",
            Self::OutputTrusted => "output-trusted",
            Self::OutputUntrusted => "output-untrusted",
            Self::TrustUnspecified => "trust-unspecified",
            Self::Group(name) => name,
        }
    }

    /// Family this tag belongs to.
    pub fn family(&self) -> TagFamily {
        match self {
            Self::ReadOnly
            | Self::StateChanging
            | Self::Destructive
            | Self::CodeExecution
            | Self::ExternalComm => TagFamily::Capability,
            Self::OutputTrusted | Self::OutputUntrusted | Self::TrustUnspecified => {
                TagFamily::OutputTrust
            }
            Self::Group(_) => TagFamily::FunctionalGroup,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Tags accepted while loading configuration: the built-ins plus declared groups.
#[derive(Debug, Clone, Default)]
pub struct TagVocabulary {
    groups: BTreeSet<String>,
}

impl TagVocabulary {
    /// Vocabulary with the given functional groups declared.
    ///
    /// A group spelled like a built-in tag is shadowed by the built-in.
    pub fn with_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve a spelling to a tag, rejecting anything outside the vocabulary.
    pub fn parse(&self, name: &str) -> Result<Tag, UnknownValue> {
        if let Some(tag) = Tag::builtin(name) {
            return Ok(tag);
        }
        if self.groups.contains(name) {
            return Ok(Tag::group(name));
        }
        Err(UnknownValue::new("tag", name))
    }

    /// Declared group names.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Outcome of evaluating the policy for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Execute without asking.
    Allow,
    /// Never execute; hide from the advertised tool list.
    Deny,
    /// Execute only after interactive confirmation.
    Confirm,
}

impl Decision {
    /// Lowercase spelling used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Confirm => "confirm",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            "confirm" => Ok(Self::Confirm),
            other => Err(UnknownValue::new("decision", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Taint
// ---------------------------------------------------------------------------

/// How contaminated the current turn is by untrusted content.
///
/// Ordered: `Trusted < PartiallyTainted < Untrusted`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaintLevel {
    /// No untrusted content has entered the turn.
    #[default]
    Trusted,
    /// Some content passed through a sanitising step but is not fully trusted.
    PartiallyTainted,
    /// Raw untrusted content has entered the turn.
    Untrusted,
}

impl TaintLevel {
    /// snake_case spelling used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::PartiallyTainted => "partially_tainted",
            Self::Untrusted => "untrusted",
        }
    }
}

impl fmt::Display for TaintLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaintLevel {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trusted" => Ok(Self::Trusted),
            "partially_tainted" | "partially-tainted" => Ok(Self::PartiallyTainted),
            "untrusted" => Ok(Self::Untrusted),
            other => Err(UnknownValue::new("taint level", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool identity
// ---------------------------------------------------------------------------

/// Name of a tool plus the pluggable origin it came from, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolIdentity {
    /// Tool name as advertised to the agent.
    pub name: String,
    /// Origin server id; `None` for in-house tools.
    pub origin: Option<String>,
}

impl ToolIdentity {
    /// Identity of a tool authored in-house.
    pub fn in_house(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: None,
        }
    }

    /// Identity of a tool supplied by a pluggable origin.
    pub fn from_origin(origin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: Some(origin.into()),
        }
    }

    /// Whether the tool was authored in-house.
    pub fn is_in_house(&self) -> bool {
        self.origin.is_none()
    }

    /// Origin id as a string slice.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

impl fmt::Display for ToolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "{origin}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}
