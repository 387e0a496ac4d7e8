//! Per-turn processing context.
//!
//! Created when a conversation turn begins and dropped when it ends. Holds
//! the turn's taint tracker, the active policy profile and a cancellation
//! signal that aborts a pending confirmation.

use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::policy::taint::TaintTracker;
use crate::types::{TagSet, TaintLevel};

/// Whether a delegated turn starts from the parent's taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inheritance {
    /// Child starts at the parent's current taint.
    #[default]
    Inherit,
    /// Child starts `Trusted`.
    Fresh,
}

/// Handle that cancels a turn from outside (e.g. the user hit stop).
#[derive(Debug, Clone)]
pub struct TurnCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl TurnCanceller {
    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Mutable state owned by exactly one in-flight turn.
#[derive(Debug)]
pub struct ProcessingContext {
    turn_id: Uuid,
    profile: Option<String>,
    taint: TaintTracker,
    cancel: Arc<watch::Sender<bool>>,
}

impl ProcessingContext {
    /// New trusted context for `profile` (`None` uses the base policy).
    pub fn new(profile: Option<String>) -> Self {
        Self::starting_at(profile, TaintLevel::Trusted)
    }

    /// New context that starts already tainted, e.g. because the triggering
    /// input was raw external content.
    pub fn starting_at(profile: Option<String>, taint: TaintLevel) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            turn_id: Uuid::new_v4(),
            profile,
            taint: TaintTracker::starting_at(taint),
            cancel: Arc::new(tx),
        }
    }

    /// Context for a nested turn spawned by this one.
    ///
    /// The child keeps the profile and shares the cancellation signal, so
    /// cancelling either turn aborts both.
    pub fn delegate(&self, inheritance: Inheritance) -> Self {
        let taint = match inheritance {
            Inheritance::Inherit => self.taint.level(),
            Inheritance::Fresh => TaintLevel::Trusted,
        };
        Self {
            turn_id: Uuid::new_v4(),
            profile: self.profile.clone(),
            taint: TaintTracker::starting_at(taint),
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Unique id of this turn, used to correlate logs and audit entries.
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// Active policy profile.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Current taint level.
    pub fn taint(&self) -> TaintLevel {
        self.taint.level()
    }

    /// Raise the taint to at least `level`. Returns `true` if it changed.
    pub fn escalate(&mut self, level: TaintLevel) -> bool {
        self.taint.escalate(level)
    }

    /// Apply the post-execution taint rule for a tool's tags.
    pub fn observe_output(&mut self, tags: &TagSet) -> Option<TaintLevel> {
        self.taint.observe_output(tags)
    }

    /// Handle for cancelling this turn.
    pub fn canceller(&self) -> TurnCanceller {
        TurnCanceller {
            tx: Arc::clone(&self.cancel),
        }
    }

    /// Whether the turn has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the turn is cancelled. Pending forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives as long as `self`, so the wait only ends on cancel.
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
