//! Audit log for policy enforcement.
//!
//! Writes structured JSON entries, one per line, to an append-only sink.
//! Tool arguments are never written; entries carry the turn id, tool name
//! and the outcome.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::confirm::ConfirmOutcome;
use crate::types::TaintLevel;

/// Audit event type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A call was refused by policy.
    ToolDenied,
    /// A confirmation request reached a terminal state.
    ConfirmationResolved,
    /// A tool ran.
    ToolExecuted,
    /// A turn's taint rose after a tool ran.
    TaintEscalated,
}

/// A single structured audit log entry.
#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    timestamp: String,
    turn_id: Uuid,
    event_type: AuditEventType,
    tool: &'a str,
    details: serde_json::Value,
}

/// Audit logger writing JSON lines to an append-only sink.
pub struct AuditLogger {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Create an audit logger that appends to the given file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("failed to open audit log {}: {e}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// Create an audit logger from an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Log a refused call.
    pub fn log_denied(&self, turn_id: Uuid, tool: &str, reason: &str) -> anyhow::Result<()> {
        self.write_entry(
            AuditEventType::ToolDenied,
            turn_id,
            tool,
            serde_json::json!({ "reason": reason }),
        )
    }

    /// Log the terminal state of a confirmation. Anything but approval counts
    /// as a rejection.
    pub fn log_confirmation(
        &self,
        turn_id: Uuid,
        tool: &str,
        outcome: ConfirmOutcome,
    ) -> anyhow::Result<()> {
        self.write_entry(
            AuditEventType::ConfirmationResolved,
            turn_id,
            tool,
            serde_json::json!({
                "outcome": outcome,
                "approved": outcome.is_approved(),
            }),
        )
    }

    /// Log an executed tool.
    pub fn log_executed(&self, turn_id: Uuid, tool: &str, is_error: bool) -> anyhow::Result<()> {
        self.write_entry(
            AuditEventType::ToolExecuted,
            turn_id,
            tool,
            serde_json::json!({ "is_error": is_error }),
        )
    }

    /// Log a taint escalation.
    pub fn log_taint_escalated(
        &self,
        turn_id: Uuid,
        tool: &str,
        level: TaintLevel,
    ) -> anyhow::Result<()> {
        self.write_entry(
            AuditEventType::TaintEscalated,
            turn_id,
            tool,
            serde_json::json!({ "taint": level }),
        )
    }

    /// Write a single JSON line to the audit log.
    fn write_entry(
        &self,
        event_type: AuditEventType,
        turn_id: Uuid,
        tool: &str,
        details: serde_json::Value,
    ) -> anyhow::Result<()> {
        let entry = AuditEntry {
            timestamp: Utc::now().to_rfc3339(),
            turn_id,
            event_type,
            tool,
            details,
        };
        let line = serde_json::to_string(&entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("audit writer lock poisoned: {e}"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}
