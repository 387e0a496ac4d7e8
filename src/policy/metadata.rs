//! Static tool metadata: which tags each tool carries.
//!
//! Entries are registered once through [`MetadataRegistryBuilder`] and then
//! frozen into a [`MetadataRegistry`]. In-house tools must all be declared;
//! tools from pluggable origins fall back to the origin's wildcard entry and
//! then to `trust-unspecified`.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Tag, TagSet, ToolIdentity};

/// Name used for an origin's catch-all entry.
pub const ORIGIN_WILDCARD: &str = "*";

/// Errors raised while building the registry. All are fatal at startup.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// In-house tools exist with no metadata entry.
    #[error("missing metadata for in-house tools: {}", .names.join(", "))]
    MissingEntries {
        /// Every offending tool name, sorted.
        names: Vec<String>,
    },
    /// The same identity was registered more than once.
    #[error("duplicate metadata entries: {}", .identities.join(", "))]
    DuplicateEntries {
        /// Every identity registered twice, as displayed strings.
        identities: Vec<String>,
    },
}

/// Entries declared by one pluggable origin.
#[derive(Debug, Clone, Default)]
struct OriginEntries {
    exact: HashMap<String, TagSet>,
    wildcard: Option<TagSet>,
}

/// Collects metadata entries during startup.
#[derive(Debug, Default)]
pub struct MetadataRegistryBuilder {
    in_house: HashMap<String, TagSet>,
    origins: HashMap<String, OriginEntries>,
    duplicates: BTreeSet<String>,
}

impl MetadataRegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tags for a tool.
    ///
    /// For an origin identity, the name [`ORIGIN_WILDCARD`] registers the
    /// origin's catch-all entry. Duplicates are reported by [`Self::build`].
    pub fn register<I>(&mut self, identity: ToolIdentity, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = Tag>,
    {
        let tags: TagSet = tags.into_iter().collect();
        let display = identity.to_string();

        let replaced = match identity.origin {
            None => self.in_house.insert(identity.name, tags).is_some(),
            Some(origin) => {
                let entries = self.origins.entry(origin).or_default();
                if identity.name == ORIGIN_WILDCARD {
                    entries.wildcard.replace(tags).is_some()
                } else {
                    entries.exact.insert(identity.name, tags).is_some()
                }
            }
        };

        if replaced {
            self.duplicates.insert(display);
        }
        self
    }

    /// Freeze the registry, checking it covers every live in-house tool.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::DuplicateEntries`] if any identity was
    /// registered twice, otherwise [`MetadataError::MissingEntries`] naming
    /// every in-house tool without an entry.
    pub fn build<I, S>(self, in_house_tools: I) -> Result<MetadataRegistry, MetadataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.duplicates.is_empty() {
            return Err(MetadataError::DuplicateEntries {
                identities: self.duplicates.into_iter().collect(),
            });
        }

        let missing: BTreeSet<String> = in_house_tools
            .into_iter()
            .filter(|name| !self.in_house.contains_key(name.as_ref()))
            .map(|name| name.as_ref().to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(MetadataError::MissingEntries {
                names: missing.into_iter().collect(),
            });
        }

        debug!(
            in_house = self.in_house.len(),
            origins = self.origins.len(),
            "tool metadata registry built"
        );

        Ok(MetadataRegistry {
            in_house: self.in_house,
            origins: self.origins,
        })
    }
}

/// Immutable tool → tags table. Shared read-only across turns.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    in_house: HashMap<String, TagSet>,
    origins: HashMap<String, OriginEntries>,
}

impl MetadataRegistry {
    /// Start building a registry.
    pub fn builder() -> MetadataRegistryBuilder {
        MetadataRegistryBuilder::new()
    }

    /// Resolve the tags for a tool.
    ///
    /// Origin tools: exact entry, then the origin wildcard, then
    /// `{trust-unspecified}`. Never resolves to `output-trusted` by default.
    pub fn tags_for(&self, identity: &ToolIdentity) -> TagSet {
        match identity.origin() {
            None => match self.in_house.get(&identity.name) {
                Some(tags) => tags.clone(),
                None => {
                    warn!(tool = %identity.name, "in-house tool has no metadata entry");
                    unspecified()
                }
            },
            Some(origin) => {
                let Some(entries) = self.origins.get(origin) else {
                    return unspecified();
                };
                entries
                    .exact
                    .get(&identity.name)
                    .or(entries.wildcard.as_ref())
                    .cloned()
                    .unwrap_or_else(unspecified)
            }
        }
    }

    /// Whether an in-house tool has an entry.
    pub fn has_in_house(&self, name: &str) -> bool {
        self.in_house.contains_key(name)
    }

    /// Check a live tool list against the registry.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::MissingEntries`] naming every in-house tool
    /// in `tools` without an entry. Origin tools are never missing.
    pub fn check_live<'a, I>(&self, tools: I) -> Result<(), MetadataError>
    where
        I: IntoIterator<Item = &'a ToolIdentity>,
    {
        let missing: BTreeSet<String> = tools
            .into_iter()
            .filter(|id| id.is_in_house() && !self.has_in_house(&id.name))
            .map(|id| id.name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(MetadataError::MissingEntries {
            names: missing.into_iter().collect(),
        })
    }

    /// Names of all declared in-house tools, sorted.
    pub fn in_house_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.in_house.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of pluggable origins with at least one entry.
    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }
}

fn unspecified() -> TagSet {
    TagSet::from([Tag::TrustUnspecified])
}
