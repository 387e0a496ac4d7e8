//! Abstract tool-execution interface and the policy-enforcing wrapper around it.
//!
//! The concrete tools (notes, calendar, browsing, MCP servers, ...) live
//! behind [`ToolExecutor`]. The wrapper in [`guard`] never assumes how they
//! are fetched or run.

pub mod guard;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ProcessingContext;
use crate::types::ToolIdentity;

pub use guard::{PolicyGuard, ToolOutcome};

/// Schema of a tool the agent may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique across the executor).
    pub name: String,
    /// Description shown to the LLM.
    pub description: String,
    /// JSON Schema object for the tool's parameters.
    pub input_schema: serde_json::Value,
    /// Pluggable origin the tool came from; `None` for in-house tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ToolDefinition {
    /// Identity used for metadata lookup and matching.
    pub fn identity(&self) -> ToolIdentity {
        ToolIdentity {
            name: self.name.clone(),
            origin: self.origin.clone(),
        }
    }
}

/// Result of a tool execution, fed back to the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the model.
    pub content: String,
    /// Whether the content describes a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result.
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Failures of the underlying executor.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The executor does not know this tool.
    #[error("tool not found: {0}")]
    NotFound(String),
    /// Arguments failed validation.
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// What was wrong.
        reason: String,
    },
    /// The tool ran and failed.
    #[error("tool {tool} failed: {reason}")]
    ExecutionFailed {
        /// Tool name.
        tool: String,
        /// Failure detail.
        reason: String,
    },
}

/// The interface the policy wrapper decorates.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Every tool the executor can run, regardless of policy.
    async fn list_definitions(&self) -> Vec<ToolDefinition>;

    /// Run a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the tool cannot be run or fails outright.
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        ctx: &ProcessingContext,
    ) -> Result<ToolResult, ToolError>;

    /// Identity of a tool by name, or `None` if the executor has no such tool.
    ///
    /// The default looks the name up in [`Self::list_definitions`].
    async fn identity_of(&self, name: &str) -> Option<ToolIdentity> {
        self.list_definitions()
            .await
            .into_iter()
            .find(|def| def.name == name)
            .map(|def| def.identity())
    }
}
