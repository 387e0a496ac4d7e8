//! Interactive confirmation for tools whose decision is `confirm`.
//!
//! The UI side is injected as a [`Confirmer`]. [`request_confirmation`] wraps
//! one call in a deadline and the turn's cancellation signal, and guarantees
//! exactly one terminal [`ConfirmOutcome`] per request:
//!
//! ```text
//! PENDING ──► APPROVED | REJECTED | TIMED_OUT | CANCELLED
//! ```

pub mod queue;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::context::ProcessingContext;

pub use queue::{ConfirmationQueue, PendingConfirmation, QueueError};

/// Default bound on a confirmation wait.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// Asks a human whether a tool call may proceed.
///
/// Implementations must tolerate the returned future being dropped at any
/// await point: that is how timeouts and cancellation are delivered.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Return `true` to approve the call.
    async fn confirm(&self, prompt: &str, tool_name: &str, arguments: &serde_json::Value)
        -> bool;
}

/// Terminal state of one confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// The human approved.
    Approved,
    /// The human rejected.
    Rejected,
    /// No answer within the deadline.
    TimedOut,
    /// The owning turn was cancelled while waiting.
    Cancelled,
}

impl ConfirmOutcome {
    /// Only an explicit approval lets the call proceed.
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for ConfirmOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed out",
            Self::Cancelled => "cancelled",
        };
        f.pad(s)
    }
}

/// Pending request that records `Cancelled` if dropped before resolving.
///
/// Covers the case where the whole turn future is dropped (task aborted)
/// and neither the deadline nor the cancel branch gets to run.
struct ConfirmRequest<'a> {
    tool_name: &'a str,
    turn_id: uuid::Uuid,
    audit: Option<&'a AuditLogger>,
    resolved: bool,
}

impl<'a> ConfirmRequest<'a> {
    fn new(tool_name: &'a str, turn_id: uuid::Uuid, audit: Option<&'a AuditLogger>) -> Self {
        Self {
            tool_name,
            turn_id,
            audit,
            resolved: false,
        }
    }

    fn resolve(mut self, outcome: ConfirmOutcome) -> ConfirmOutcome {
        self.resolved = true;
        match outcome {
            ConfirmOutcome::Approved => info!(
                tool = self.tool_name,
                turn_id = %self.turn_id,
                "confirmation approved"
            ),
            ConfirmOutcome::Rejected => info!(
                tool = self.tool_name,
                turn_id = %self.turn_id,
                "confirmation rejected"
            ),
            ConfirmOutcome::TimedOut => warn!(
                tool = self.tool_name,
                turn_id = %self.turn_id,
                "confirmation timed out, treating as rejection"
            ),
            ConfirmOutcome::Cancelled => warn!(
                tool = self.tool_name,
                turn_id = %self.turn_id,
                "confirmation cancelled with turn, treating as rejection"
            ),
        }
        self.record(outcome);
        outcome
    }

    fn record(&self, outcome: ConfirmOutcome) {
        let Some(audit) = self.audit else {
            return;
        };
        if let Err(e) = audit.log_confirmation(self.turn_id, self.tool_name, outcome) {
            warn!(error = %e, tool = self.tool_name, "failed to write audit entry");
        }
    }
}

impl Drop for ConfirmRequest<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(
                tool = self.tool_name,
                turn_id = %self.turn_id,
                "confirmation dropped while pending, recorded as cancelled"
            );
            self.record(ConfirmOutcome::Cancelled);
        }
    }
}

/// Ask `confirmer` and wait at most `timeout`, aborting if the turn is cancelled.
///
/// The confirmer's future is dropped on timeout or cancellation, so no
/// callback outlives the request. When `audit` is set, the terminal outcome
/// is written to it exactly once, including when this future is dropped
/// before finishing.
pub async fn request_confirmation(
    confirmer: &dyn Confirmer,
    prompt: &str,
    tool_name: &str,
    arguments: &serde_json::Value,
    timeout: Duration,
    ctx: &ProcessingContext,
    audit: Option<&AuditLogger>,
) -> ConfirmOutcome {
    let request = ConfirmRequest::new(tool_name, ctx.turn_id(), audit);

    if ctx.is_cancelled() {
        return request.resolve(ConfirmOutcome::Cancelled);
    }

    let outcome = tokio::select! {
        biased;
        () = ctx.cancelled() => ConfirmOutcome::Cancelled,
        answer = tokio::time::timeout(timeout, confirmer.confirm(prompt, tool_name, arguments)) => {
            match answer {
                Ok(true) => ConfirmOutcome::Approved,
                Ok(false) => ConfirmOutcome::Rejected,
                Err(_elapsed) => ConfirmOutcome::TimedOut,
            }
        }
    };

    request.resolve(outcome)
}

/// Prompt text shown to the human for a tool call.
pub fn confirmation_prompt(tool_name: &str, arguments: &serde_json::Value) -> String {
    let args = serde_json::to_string(arguments).unwrap_or_else(|_| "<unprintable>".to_owned());
    format!("Allow the agent to run `{tool_name}` with arguments {args}?")
}
