//! Confirmation queue: a [`Confirmer`] resolved out-of-band by id.
//!
//! Each request is stored with a `tokio::sync::oneshot` sender and announced
//! to the UI over an mpsc channel. The UI answers by calling
//! [`ConfirmationQueue::resolve`] (e.g. from a button callback). When the
//! waiting side gives up (timeout or cancelled turn) its pending entry is
//! removed, so late answers get [`QueueError::NotFound`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Confirmer;

/// A confirmation waiting for a human answer.
#[derive(Debug, Clone, Serialize)]
pub struct PendingConfirmation {
    /// Id the UI uses to answer.
    pub id: Uuid,
    /// Tool awaiting confirmation.
    pub tool_name: String,
    /// Text to show the human.
    pub prompt: String,
    /// Arguments the agent supplied.
    pub arguments: serde_json::Value,
    /// When the request was queued.
    pub created_at: DateTime<Utc>,
}

/// Errors from resolving queued confirmations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// No pending request has this id. It was never queued, was already
    /// answered, or its waiter gave up.
    #[error("confirmation request not pending: {0}")]
    NotFound(Uuid),
}

struct PendingEntry {
    request: PendingConfirmation,
    sender: oneshot::Sender<bool>,
}

/// Removes the entry when the waiting future is dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<Uuid, PendingEntry>>,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if lock(self.pending).remove(&self.id).is_some() {
            debug!(confirmation_id = %self.id, "abandoned confirmation removed from queue");
        }
    }
}

/// Queue of pending confirmations.
pub struct ConfirmationQueue {
    pending: Mutex<HashMap<Uuid, PendingEntry>>,
    notify: Option<mpsc::UnboundedSender<PendingConfirmation>>,
}

impl std::fmt::Debug for ConfirmationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationQueue")
            .field("pending", &self.pending_count())
            .field("notify", &self.notify.is_some())
            .finish()
    }
}

impl Default for ConfirmationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationQueue {
    /// Queue without a UI channel; callers poll [`Self::list_pending`].
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            notify: None,
        }
    }

    /// Queue that announces every new request on the returned receiver.
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            pending: Mutex::new(HashMap::new()),
            notify: Some(tx),
        };
        (queue, rx)
    }

    /// Answer a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the id is not pending.
    pub fn resolve(&self, id: Uuid, approved: bool) -> Result<(), QueueError> {
        let entry = lock(&self.pending)
            .remove(&id)
            .ok_or(QueueError::NotFound(id))?;

        info!(
            confirmation_id = %id,
            tool = %entry.request.tool_name,
            approved,
            "confirmation answered"
        );

        // The waiter may have just timed out; a dropped receiver is fine.
        let _send_result = entry.sender.send(approved);
        Ok(())
    }

    /// Reject every pending request (e.g. on shutdown). Returns how many.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<PendingEntry> = lock(&self.pending).drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            let _send_result = entry.sender.send(false);
        }
        if count > 0 {
            warn!(count, "rejected all pending confirmations");
        }
        count
    }

    /// Number of requests awaiting an answer.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Snapshot of pending requests, oldest first.
    pub fn list_pending(&self) -> Vec<PendingConfirmation> {
        let mut list: Vec<PendingConfirmation> = lock(&self.pending)
            .values()
            .map(|e| e.request.clone())
            .collect();
        list.sort_by_key(|r| r.created_at);
        list
    }
}

#[async_trait]
impl Confirmer for ConfirmationQueue {
    async fn confirm(
        &self,
        prompt: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> bool {
        let (tx, rx) = oneshot::channel();
        let request = PendingConfirmation {
            id: Uuid::new_v4(),
            tool_name: tool_name.to_owned(),
            prompt: prompt.to_owned(),
            arguments: arguments.clone(),
            created_at: Utc::now(),
        };
        let id = request.id;

        lock(&self.pending).insert(
            id,
            PendingEntry {
                request: request.clone(),
                sender: tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        info!(confirmation_id = %id, tool = tool_name, "confirmation queued");

        if let Some(notify) = &self.notify {
            if notify.send(request).is_err() {
                warn!(confirmation_id = %id, "confirmation UI channel closed, rejecting");
                return false;
            }
        }

        // A dropped sender (queue drained without an answer) counts as rejection.
        rx.await.unwrap_or(false)
    }
}

fn lock(
    pending: &Mutex<HashMap<Uuid, PendingEntry>>,
) -> MutexGuard<'_, HashMap<Uuid, PendingEntry>> {
    pending.lock().unwrap_or_else(|poisoned| {
        warn!("confirmation queue lock poisoned, recovering");
        poisoned.into_inner()
    })
}
