//! Policy guard: enforces engine decisions around a [`ToolExecutor`].
//!
//! - `list_definitions` hides denied tools at the turn's current taint. It is
//!   meant to be called at the start of every agent round.
//! - `execute` re-evaluates the decision (never trusting an earlier list),
//!   runs the confirmation flow when required, and escalates the turn's
//!   taint after the tool returns.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::confirm::{confirmation_prompt, request_confirmation, ConfirmOutcome, Confirmer};
use crate::confirm::DEFAULT_CONFIRM_TIMEOUT;
use crate::context::ProcessingContext;
use crate::policy::{MetadataError, PolicyEngine};
use crate::types::Decision;

use super::{ToolDefinition, ToolError, ToolExecutor, ToolResult};

/// What happened to a guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool ran.
    Executed(ToolResult),
    /// Policy refused the call.
    Denied {
        /// Tool name as requested.
        tool: String,
        /// Why.
        reason: String,
    },
    /// The call needed confirmation and did not get it.
    NotConfirmed {
        /// Tool name as requested.
        tool: String,
        /// How the confirmation ended.
        outcome: ConfirmOutcome,
    },
}

impl ToolOutcome {
    /// Whether the underlying tool actually ran.
    pub fn was_executed(&self) -> bool {
        matches!(self, Self::Executed(_))
    }

    /// Render the outcome as a result the agent loop can hand to the model.
    pub fn into_tool_result(self) -> ToolResult {
        match self {
            Self::Executed(result) => result,
            Self::Denied { tool, reason } => ToolResult::error(format!(
                "Access denied: tool {tool} is not permitted ({reason})."
            )),
            Self::NotConfirmed { tool, outcome } => ToolResult::error(format!(
                "Tool {tool} was not executed: confirmation {outcome}."
            )),
        }
    }
}

/// Decorates a [`ToolExecutor`] with policy enforcement.
pub struct PolicyGuard<E> {
    inner: E,
    engine: Arc<PolicyEngine>,
    confirmer: Arc<dyn Confirmer>,
    confirm_timeout: Duration,
    audit: Option<Arc<AuditLogger>>,
}

impl<E> std::fmt::Debug for PolicyGuard<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGuard")
            .field("confirm_timeout", &self.confirm_timeout)
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: ToolExecutor> PolicyGuard<E> {
    /// Wrap `inner` with the default confirmation timeout and no audit log.
    pub fn new(inner: E, engine: Arc<PolicyEngine>, confirmer: Arc<dyn Confirmer>) -> Self {
        Self {
            inner,
            engine,
            confirmer,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            audit: None,
        }
    }

    /// Like [`PolicyGuard::new`], but first checks every in-house tool the
    /// executor lists against the engine's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::MissingEntries`] naming each live in-house
    /// tool without metadata, sorted.
    pub async fn validated(
        inner: E,
        engine: Arc<PolicyEngine>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Result<Self, MetadataError> {
        let live: Vec<_> = inner
            .list_definitions()
            .await
            .iter()
            .map(ToolDefinition::identity)
            .collect();
        engine.metadata().check_live(&live)?;
        debug!(tools = live.len(), "live tools covered by metadata");
        Ok(Self::new(inner, engine, confirmer))
    }

    /// Bound every confirmation wait by `timeout`.
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Record denials, confirmations, executions and escalations.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Bound on every confirmation wait.
    pub fn confirm_timeout(&self) -> Duration {
        self.confirm_timeout
    }

    /// The wrapped executor.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// The engine decisions come from.
    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Tools the agent may see right now: everything not denied at the
    /// turn's current taint. Recomputed on every call.
    pub async fn list_definitions(&self, ctx: &ProcessingContext) -> Vec<ToolDefinition> {
        let all = self.inner.list_definitions().await;
        let total = all.len();

        let visible: Vec<ToolDefinition> = all
            .into_iter()
            .filter(|def| self.engine.decide(&def.identity(), ctx).decision != Decision::Deny)
            .collect();

        debug!(
            turn_id = %ctx.turn_id(),
            taint = %ctx.taint(),
            total,
            visible = visible.len(),
            "filtered tool definitions"
        );
        visible
    }

    /// Execute a tool if policy allows it.
    ///
    /// # Errors
    ///
    /// Only failures of the underlying executor are errors. Denials and
    /// unconfirmed calls are reported as [`ToolOutcome`] variants.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        ctx: &mut ProcessingContext,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(identity) = self.inner.identity_of(name).await else {
            warn!(tool = name, turn_id = %ctx.turn_id(), "execution requested for unknown tool");
            let reason = "unknown tool".to_owned();
            self.audit(|a| a.log_denied(ctx.turn_id(), name, &reason));
            return Ok(ToolOutcome::Denied {
                tool: name.to_owned(),
                reason,
            });
        };

        let tags = self.engine.tags_for(&identity);
        let evaluation =
            self.engine
                .evaluate_with_tags(&identity, &tags, ctx.profile(), ctx.taint());

        match evaluation.decision {
            Decision::Allow => {}
            Decision::Deny => {
                let reason = match &evaluation.rule {
                    Some(rule) if !rule.description.is_empty() => rule.description.clone(),
                    Some(rule) => format!("rule #{}", rule.index),
                    None => "default decision".to_owned(),
                };
                // Denied tools are never advertised; reaching here means the
                // caller used a stale list or the taint rose since listing.
                warn!(
                    tool = %identity,
                    turn_id = %ctx.turn_id(),
                    taint = %ctx.taint(),
                    reason = %reason,
                    "denied tool call blocked"
                );
                self.audit(|a| a.log_denied(ctx.turn_id(), name, &reason));
                return Ok(ToolOutcome::Denied {
                    tool: name.to_owned(),
                    reason,
                });
            }
            Decision::Confirm => {
                let prompt = confirmation_prompt(name, arguments);
                let outcome = request_confirmation(
                    self.confirmer.as_ref(),
                    &prompt,
                    name,
                    arguments,
                    self.confirm_timeout,
                    ctx,
                    self.audit.as_deref(),
                )
                .await;
                if !outcome.is_approved() {
                    return Ok(ToolOutcome::NotConfirmed {
                        tool: name.to_owned(),
                        outcome,
                    });
                }
            }
        }

        let result = self.inner.execute(name, arguments, ctx).await?;
        self.audit(|a| a.log_executed(ctx.turn_id(), name, result.is_error));

        if let Some(level) = ctx.observe_output(&tags) {
            info!(
                tool = %identity,
                turn_id = %ctx.turn_id(),
                taint = %level,
                "turn taint escalated by tool output"
            );
            self.audit(|a| a.log_taint_escalated(ctx.turn_id(), name, level));
        }

        Ok(ToolOutcome::Executed(result))
    }

    fn audit(&self, write: impl FnOnce(&AuditLogger) -> anyhow::Result<()>) {
        if let Some(audit) = &self.audit {
            if let Err(e) = write(audit) {
                warn!(error = %e, "failed to write audit entry");
            }
        }
    }
}
