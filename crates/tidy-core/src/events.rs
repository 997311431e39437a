//! Organize event types, envelope schema, and event bus for change notifications.
//!
//! The organization pipeline publishes typed [`OrganizeEvent`]s after each run
//! so UI collaborators (file tree, open editors) can refresh the documents and
//! hierarchy paths that changed. Consumers subscribe independently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::history::ChangeAction;
use crate::models::DocumentRef;

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned event envelope.
///
/// The `event_type` field uses dot-namespaced names (e.g. `"paths.changed"`).
/// Events emitted by one organization run share a `correlation_id`.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type.
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Type of entity this event relates to (e.g. `"document"`, `"change"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// ID of the entity this event relates to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Run identifier shared by events of one pipeline pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Payload schema version.
    pub payload_version: u32,
    /// Domain-specific event data.
    pub payload: OrganizeEvent,
}

impl EventEnvelope {
    /// Create an envelope without a correlation id.
    pub fn new(event: OrganizeEvent) -> Self {
        Self::correlated(event, None)
    }

    /// Create an envelope tied to a run.
    pub fn correlated(event: OrganizeEvent, correlation_id: Option<Uuid>) -> Self {
        let event_type = event.namespaced_event_type().to_string();
        let entity_type = event.entity_type().map(String::from);
        let entity_id = event.entity_id().map(|id| id.to_string());

        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type,
            occurred_at: Utc::now(),
            entity_type,
            entity_id,
            correlation_id,
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Organize Event (domain payloads)
// ============================================================================

/// Notifications published by the organization engine.
///
/// Serialized as JSON with a `type` tag field, e.g.
/// `{"type":"PathsChanged","document_id":"...","changed_paths":["/Errands"]}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OrganizeEvent {
    /// Hierarchy paths that received content.
    PathsChanged {
        document_id: Uuid,
        changed_paths: Vec<String>,
    },
    /// Destination documents created or updated by a run.
    DocumentsChanged {
        created: Vec<DocumentRef>,
        updated: Vec<DocumentRef>,
    },
    /// A run finished and wrote its results.
    RunCompleted {
        document_id: Uuid,
        chunk_count: usize,
        organized_blocks: usize,
        used_fallback: bool,
        duration_ms: u64,
    },
    /// A run failed before writing anything for some chunks.
    RunFailed { document_id: Uuid, error: String },
    /// A recorded change was reverted.
    ChangeReverted {
        change_id: Uuid,
        document_id: Uuid,
        action: ChangeAction,
    },
}

impl OrganizeEvent {
    /// Returns the short event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrganizeEvent::PathsChanged { .. } => "PathsChanged",
            OrganizeEvent::DocumentsChanged { .. } => "DocumentsChanged",
            OrganizeEvent::RunCompleted { .. } => "RunCompleted",
            OrganizeEvent::RunFailed { .. } => "RunFailed",
            OrganizeEvent::ChangeReverted { .. } => "ChangeReverted",
        }
    }

    /// Returns the namespaced event type for the envelope.
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            OrganizeEvent::PathsChanged { .. } => "paths.changed",
            OrganizeEvent::DocumentsChanged { .. } => "documents.changed",
            OrganizeEvent::RunCompleted { .. } => "run.completed",
            OrganizeEvent::RunFailed { .. } => "run.failed",
            OrganizeEvent::ChangeReverted { .. } => "change.reverted",
        }
    }

    /// Returns the entity type this event relates to.
    pub fn entity_type(&self) -> Option<&'static str> {
        match self {
            OrganizeEvent::DocumentsChanged { .. } => None,
            OrganizeEvent::PathsChanged { .. }
            | OrganizeEvent::RunCompleted { .. }
            | OrganizeEvent::RunFailed { .. } => Some("document"),
            OrganizeEvent::ChangeReverted { .. } => Some("change"),
        }
    }

    /// Returns the primary entity ID this event relates to.
    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            OrganizeEvent::DocumentsChanged { .. } => None,
            OrganizeEvent::PathsChanged { document_id, .. }
            | OrganizeEvent::RunCompleted { document_id, .. }
            | OrganizeEvent::RunFailed { document_id, .. } => Some(*document_id),
            OrganizeEvent::ChangeReverted { change_id, .. } => Some(*change_id),
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus distributing organize events to subscribers.
///
/// Uses `tokio::sync::broadcast`. Slow receivers that fall behind receive a
/// `Lagged` error and miss events; consumers refresh from the store anyway.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently without subscribers.
    pub fn emit(&self, event: OrganizeEvent) {
        self.send(EventEnvelope::new(event));
    }

    /// Emit an event tagged with the run that produced it.
    pub fn emit_correlated(&self, event: OrganizeEvent, correlation_id: Uuid) {
        self.send(EventEnvelope::correlated(event, Some(correlation_id)));
    }

    fn send(&self, envelope: EventEnvelope) {
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive enveloped events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
