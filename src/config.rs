//! Configuration loading and validation.
//!
//! `toolgate.toml` points at the policy layer documents and declares tool
//! metadata:
//! - `[policy]`: paths to the defaults / overrides documents and a
//!   directory of per-profile documents, plus the override priority offset
//! - `[confirmation]`: confirmation timeout
//! - `[audit]`: optional audit log path
//! - `[metadata]`: functional groups and in-house tool tags
//! - `[[origins]]`: tags for tools from pluggable origins
//!
//! Precedence: env vars > config file > defaults. Relative paths resolve
//! against the directory holding the config file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::confirm::Confirmer;
use crate::policy::matcher::{NamePattern, ToolMatcher};
use crate::policy::merge::{LayerMerger, DEFAULT_OVERRIDE_OFFSET};
use crate::policy::metadata::{MetadataError, MetadataRegistryBuilder, ORIGIN_WILDCARD};
use crate::policy::rules::{PolicyLayer, PolicyRule};
use crate::policy::PolicyEngine;
use crate::tools::{PolicyGuard, ToolExecutor};
use crate::types::{Decision, Tag, TagFamily, TagVocabulary, TaintLevel, ToolIdentity};

/// File name looked up in [`config_dir`] when no path is given.
pub const CONFIG_FILE_NAME: &str = "toolgate.toml";

/// Errors raised while loading configuration. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A file is not valid TOML for its schema.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// The file.
        path: PathBuf,
        /// Underlying parse error.
        source: Box<toml::de::Error>,
    },
    /// Values outside the closed vocabularies, malformed globs and the like.
    #[error("invalid policy configuration:\n  {}", .problems.join("\n  "))]
    Invalid {
        /// Every problem found, in load order.
        problems: Vec<String>,
    },
    /// Metadata is incomplete or duplicated.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

// ---------------------------------------------------------------------------
// toolgate.toml
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the policy layers live.
    pub policy: PolicyConfig,
    /// Confirmation settings.
    pub confirmation: ConfirmationConfig,
    /// Audit log settings.
    pub audit: AuditConfig,
    /// In-house tool metadata.
    pub metadata: MetadataConfig,
    /// Metadata supplied by pluggable origins.
    pub origins: Vec<OriginConfig>,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// `[policy]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Application defaults document.
    pub defaults: Option<PathBuf>,
    /// Deployment overrides document.
    pub overrides: Option<PathBuf>,
    /// Directory of `<profile>.toml` documents.
    pub profiles_dir: Option<PathBuf>,
    /// Priority added to every override rule.
    pub override_offset: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            defaults: None,
            overrides: None,
            profiles_dir: None,
            override_offset: DEFAULT_OVERRIDE_OFFSET,
        }
    }
}

/// `[confirmation]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfirmationConfig {
    /// Seconds to wait for an answer before treating it as a rejection.
    pub timeout_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_confirm_timeout_secs(),
        }
    }
}

impl ConfirmationConfig {
    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[audit]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// JSON-lines audit file. Auditing is off when unset.
    pub path: Option<PathBuf>,
}

/// `[metadata]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    /// Declared functional-group tags.
    pub groups: Vec<String>,
    /// In-house tool name → tag spellings.
    pub tools: BTreeMap<String, Vec<String>>,
}

/// One `[[origins]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OriginConfig {
    /// Origin id, as reported on tool definitions.
    pub id: String,
    /// Tool name (or `*`) → tag spellings.
    #[serde(default)]
    pub tools: BTreeMap<String, Vec<String>>,
}

fn default_confirm_timeout_secs() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Layer documents
// ---------------------------------------------------------------------------

/// A policy layer as written in TOML, before validation.
///
/// Vocabulary values stay strings here so every bad value in every layer can
/// be reported at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerDocument {
    /// `allow`, `deny` or `confirm`.
    pub default_decision: Option<String>,
    /// Rules in declaration order.
    pub rules: Vec<RuleDocument>,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDocument {
    /// Name globs.
    #[serde(default)]
    pub names: Vec<String>,
    /// Tags that must all be present.
    #[serde(default)]
    pub tags_all: Vec<String>,
    /// Tags of which one must be present.
    #[serde(default)]
    pub tags_any: Vec<String>,
    /// Origin ids.
    #[serde(default)]
    pub origins: Vec<String>,
    /// `allow`, `deny` or `confirm`.
    pub decision: String,
    /// Higher wins.
    #[serde(default)]
    pub priority: i64,
    /// `trusted`, `partially_tainted` or `untrusted`.
    #[serde(default)]
    pub taint_threshold: Option<String>,
    /// Free text.
    #[serde(default)]
    pub description: String,
}

impl LayerDocument {
    /// Parse a layer document from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] with `origin` as the path on bad TOML.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: Box::new(e),
        })
    }

    /// Validate into a [`PolicyLayer`], appending every problem to `problems`.
    pub fn to_layer(
        &self,
        layer: &str,
        vocab: &TagVocabulary,
        problems: &mut Vec<String>,
    ) -> PolicyLayer {
        let default_decision = self.default_decision.as_deref().and_then(|raw| {
            raw.parse::<Decision>()
                .map_err(|e| problems.push(format!("{layer}: default_decision: {e}")))
                .ok()
        });

        let rules = self
            .rules
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| {
                rule.to_rule(&format!("{layer}: rule #{index}"), vocab, problems)
            })
            .collect();

        PolicyLayer {
            rules,
            default_decision,
        }
    }
}

impl RuleDocument {
    fn to_rule(
        &self,
        location: &str,
        vocab: &TagVocabulary,
        problems: &mut Vec<String>,
    ) -> Option<PolicyRule> {
        let before = problems.len();

        let decision = self
            .decision
            .parse::<Decision>()
            .map_err(|e| problems.push(format!("{location}: {e}")))
            .ok();

        let taint_threshold = match self.taint_threshold.as_deref() {
            None => None,
            Some(raw) => raw
                .parse::<TaintLevel>()
                .map_err(|e| problems.push(format!("{location}: {e}")))
                .ok(),
        };

        let tags_all = parse_tags(&self.tags_all, vocab, location, problems);
        let tags_any = parse_tags(&self.tags_any, vocab, location, problems);

        let names = self
            .names
            .iter()
            .filter_map(|raw| {
                NamePattern::new(raw)
                    .map_err(|e| {
                        problems.push(format!("{location}: invalid name pattern '{raw}': {e}"));
                    })
                    .ok()
            })
            .collect();

        let matcher = ToolMatcher::new()
            .with_names(names)
            .with_tags_all(tags_all)
            .with_tags_any(tags_any)
            .with_origins(self.origins.iter().cloned());

        if problems.len() > before {
            return None;
        }

        if matcher.is_empty() {
            warn!(
                rule = location,
                description = %self.description,
                "rule has no match criteria and will never match"
            );
        }

        let mut rule = PolicyRule::new(matcher, decision?)
            .with_priority(self.priority)
            .with_description(self.description.clone());
        rule.taint_threshold = taint_threshold;
        Some(rule)
    }
}

fn parse_tags(
    raw: &[String],
    vocab: &TagVocabulary,
    location: &str,
    problems: &mut Vec<String>,
) -> Vec<Tag> {
    raw.iter()
        .filter_map(|name| {
            vocab
                .parse(name)
                .map_err(|e| problems.push(format!("{location}: {e}")))
                .ok()
        })
        .collect()
}

/// All layers of a configuration, validated.
#[derive(Debug, Clone, Default)]
pub struct PolicyLayers {
    /// Application defaults.
    pub defaults: PolicyLayer,
    /// Deployment overrides.
    pub overrides: PolicyLayer,
    /// Per-profile layers keyed by profile name.
    pub profiles: BTreeMap<String, PolicyLayer>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load from `$TOOLGATE_CONFIG` or `~/.toolgate/toolgate.toml`, then apply
    /// env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be found, read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path_with(|key| std::env::var(key).ok())?;
        let mut config =
            Self::load_from(&path).with_context(|| format!("failed to load {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path, without env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = read(path)?;
        let mut config = Self::parse(&contents, path)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        info!(path = %path.display(), "loaded toolgate config");
        Ok(config)
    }

    /// Parse config text. `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on bad TOML or unknown keys.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: Box::new(e),
        })
    }

    /// Apply environment overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("TOOLGATE_CONFIRM_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.confirmation.timeout_secs = n,
                Err(_) => warn!(
                    var = "TOOLGATE_CONFIRM_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("TOOLGATE_OVERRIDE_OFFSET") {
            match v.parse() {
                Ok(n) => self.policy.override_offset = n,
                Err(_) => warn!(
                    var = "TOOLGATE_OVERRIDE_OFFSET",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("TOOLGATE_AUDIT_LOG") {
            self.audit.path = Some(PathBuf::from(v));
        }
    }

    /// Resolve a configured path against [`Config::base_dir`].
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Audit log path, resolved.
    pub fn audit_path(&self) -> Option<PathBuf> {
        self.audit.path.as_deref().map(|p| self.resolve(p))
    }

    /// The layer merger configured by `[policy]`.
    pub fn merger(&self) -> LayerMerger {
        LayerMerger::new(self.policy.override_offset)
    }

    /// Tags accepted by this configuration.
    pub fn vocabulary(&self) -> TagVocabulary {
        TagVocabulary::with_groups(self.metadata.groups.iter().cloned())
    }

    /// Read and validate every layer document.
    ///
    /// # Errors
    ///
    /// Read and parse errors are returned immediately. Vocabulary problems are
    /// collected across all layers into one [`ConfigError::Invalid`].
    pub fn load_layers(&self) -> Result<PolicyLayers, ConfigError> {
        let vocab = self.vocabulary();
        let mut problems = self.policy_problems();
        let layers = self.load_layers_into(&vocab, &mut problems)?;
        if problems.is_empty() {
            Ok(layers)
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Build the metadata registry, then the engine.
    ///
    /// `in_house_tools` is the live list of in-house tool names; every one
    /// must be declared under `[metadata.tools]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] with every vocabulary problem across
    /// metadata and layers, or [`ConfigError::Metadata`] for missing or
    /// duplicate entries.
    pub fn build_engine<I, S>(&self, in_house_tools: I) -> Result<PolicyEngine, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let vocab = self.vocabulary();
        let mut problems = self.policy_problems();

        let builder = self.metadata_builder(&vocab, &mut problems);
        let layers = self.load_layers_into(&vocab, &mut problems)?;

        if !problems.is_empty() {
            return Err(ConfigError::Invalid { problems });
        }

        let metadata = builder.build(in_house_tools)?;
        Ok(PolicyEngine::new(
            metadata,
            &self.merger(),
            &layers.defaults,
            &layers.overrides,
            &layers.profiles,
        ))
    }

    /// Build a guard around `inner` with this configuration's engine,
    /// confirmation timeout and audit log.
    ///
    /// Every tool declared under `[metadata.tools]` is treated as in-house,
    /// and the executor's live tool list is then checked against it.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be built, a live in-house tool
    /// has no metadata, or the audit log cannot be opened.
    pub async fn build_guard<E: ToolExecutor>(
        &self,
        inner: E,
        confirmer: Arc<dyn Confirmer>,
    ) -> anyhow::Result<PolicyGuard<E>> {
        let engine = self
            .build_engine(self.metadata.tools.keys())
            .context("invalid policy configuration")?;
        let guard = PolicyGuard::validated(inner, Arc::new(engine), confirmer)
            .await
            .context("live tools do not match the configured metadata")?
            .with_confirm_timeout(self.confirmation.timeout());

        match self.audit_path() {
            Some(path) => {
                let audit = AuditLogger::new(&path)?;
                info!(path = %path.display(), "audit log enabled");
                Ok(guard.with_audit(Arc::new(audit)))
            }
            None => Ok(guard),
        }
    }

    fn policy_problems(&self) -> Vec<String> {
        let offset = self.policy.override_offset;
        if offset < 0 {
            return vec![format!("policy: override_offset must not be negative (got {offset})")];
        }
        Vec::new()
    }

    fn metadata_builder(
        &self,
        vocab: &TagVocabulary,
        problems: &mut Vec<String>,
    ) -> MetadataRegistryBuilder {
        let mut builder = MetadataRegistryBuilder::new();

        for group in vocab.groups() {
            if Tag::builtin(group).is_some() {
                problems.push(format!("metadata: group '{group}' shadows a built-in tag"));
            }
        }

        for (name, tags) in &self.metadata.tools {
            let location = format!("metadata: tool '{name}'");
            let tags = parse_tags(tags, vocab, &location, problems);
            if !tags.iter().any(|t| t.family() == TagFamily::OutputTrust) {
                warn!(
                    tool = %name,
                    "in-house tool declares no output-trust tag, output counts as trusted"
                );
            }
            builder.register(ToolIdentity::in_house(name.clone()), tags);
        }

        let mut seen = BTreeSet::new();
        for origin in &self.origins {
            if origin.id.is_empty() {
                problems.push("origins: entry with empty id".to_owned());
                continue;
            }
            if !seen.insert(origin.id.as_str()) {
                problems.push(format!("origins: duplicate origin '{}'", origin.id));
                continue;
            }
            for (name, tags) in &origin.tools {
                let location = if name == ORIGIN_WILDCARD {
                    format!("origin '{}': wildcard", origin.id)
                } else {
                    format!("origin '{}': tool '{name}'", origin.id)
                };
                let tags = parse_tags(tags, vocab, &location, problems);
                builder.register(ToolIdentity::from_origin(origin.id.clone(), name.clone()), tags);
            }
        }

        builder
    }

    fn load_layers_into(
        &self,
        vocab: &TagVocabulary,
        problems: &mut Vec<String>,
    ) -> Result<PolicyLayers, ConfigError> {
        let defaults = match &self.policy.defaults {
            Some(path) => self.load_layer(path, "defaults", vocab, problems)?,
            None => {
                warn!("no defaults policy configured, falling back to deny-by-default");
                PolicyLayer::default()
            }
        };

        let overrides = match &self.policy.overrides {
            Some(path) => self.load_layer(path, "overrides", vocab, problems)?,
            None => PolicyLayer::default(),
        };

        let mut profiles = BTreeMap::new();
        if let Some(dir) = &self.policy.profiles_dir {
            for (name, path) in profile_files(&self.resolve(dir))? {
                let layer = self.load_layer(&path, &format!("profile '{name}'"), vocab, problems)?;
                profiles.insert(name, layer);
            }
        }

        Ok(PolicyLayers {
            defaults,
            overrides,
            profiles,
        })
    }

    fn load_layer(
        &self,
        path: &Path,
        layer: &str,
        vocab: &TagVocabulary,
        problems: &mut Vec<String>,
    ) -> Result<PolicyLayer, ConfigError> {
        let path = self.resolve(path);
        let document = LayerDocument::parse(&read(&path)?, &path)?;
        Ok(document.to_layer(layer, vocab, problems))
    }
}

/// `<stem>.toml` files in `dir`, sorted by profile name.
fn profile_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => files.push((stem.to_owned(), path.clone())),
            None => warn!(path = %path.display(), "skipping profile with non-utf8 filename"),
        }
    }
    files.sort();
    Ok(files)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve the default config directory (`~/.toolgate/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".toolgate"))
}

/// Resolve the config file path using a custom env resolver.
///
/// `$TOOLGATE_CONFIG` wins; otherwise `~/.toolgate/toolgate.toml`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = env("TOOLGATE_CONFIG") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}
