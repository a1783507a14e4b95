//! Audit events for program lifecycle changes.
//!
//! Lifecycle operations hand an [`AuditEvent`] to an [`EventSink`] after
//! their commit succeeds. Recording is fire-and-forget: a sink never fails
//! the operation that produced the event.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::{EventId, ProgramId};

/// What happened to a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// A plan was staged.
    ProgramSimulated,
    /// A plan was applied to live flights.
    ProgramActivated,
    /// The program was withdrawn.
    ProgramPurged,
    /// A staged plan was discarded.
    SandboxPurged,
    /// The program window elapsed.
    ProgramCompleted,
}

impl AuditAction {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProgramSimulated => "PROGRAM_SIMULATED",
            Self::ProgramActivated => "PROGRAM_ACTIVATED",
            Self::ProgramPurged => "PROGRAM_PURGED",
            Self::SandboxPurged => "SANDBOX_PURGED",
            Self::ProgramCompleted => "PROGRAM_COMPLETED",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Event identity (ULID, time-ordered).
    pub id: EventId,
    /// What happened.
    pub action: AuditAction,
    /// Program concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<ProgramId>,
    /// Control element concerned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctl_element: Option<String>,
    /// Operator who triggered it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Operation-specific detail.
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl AuditEvent {
    /// Creates an event with an empty detail object.
    #[must_use]
    pub fn new(action: AuditAction, at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::generate(),
            action,
            program_id: None,
            ctl_element: None,
            actor: None,
            at,
            detail: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the program.
    #[must_use]
    pub fn for_program(mut self, program_id: &ProgramId, ctl_element: &str) -> Self {
        self.program_id = Some(program_id.clone());
        self.ctl_element = Some(ctl_element.to_string());
        self
    }

    /// Sets the actor.
    #[must_use]
    pub fn by(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    /// Sets the detail payload.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A sink for audit events.
pub trait EventSink: Send + Sync {
    /// Records an event.
    fn record(&self, event: AuditEvent);
}

/// In-memory outbox for collecting audit events.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryOutbox {
    /// Creates a new empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the actions recorded so far, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<AuditAction> {
        self.events().iter().map(|e| e.action).collect()
    }

    /// Drains the outbox, returning all events in insertion order.
    pub fn drain(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for InMemoryOutbox {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Writes audit events to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "tmi::audit",
            event_id = %event.id,
            action = event.action.as_str(),
            program_id = event.program_id.as_ref().map(ProgramId::as_str),
            actor = event.actor.as_deref(),
            detail = %event.detail,
            "audit event"
        );
    }
}
