//! Side-effect contracts emitted by lifecycle operations.
//!
//! A committed mutation yields a list of [`SideEffect`]s which the
//! [`EffectDispatcher`] hands to the audit recorder and the notification
//! dispatcher. Delivery is best-effort: failures are logged and never undo
//! the mutation that produced them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::identity::IdentityContext;
use crate::models::{ActivityKind, NotificationPreferences, Ticket};

/// Immutable audit record handed to the audit recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Organization of the ticket's project, used to scope activity feeds.
    pub organization_id: Option<String>,
    pub ticket_id: String,
    pub ticket_title: String,
    pub acting_user_id: String,
    pub acting_user_name: String,
    pub kind: ActivityKind,
    pub detail: String,
    pub target_user_id: Option<String>,
    pub target_user_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub timestamp: String,
}

impl AuditEvent {
    pub fn new(
        kind: ActivityKind,
        ticket: &Ticket,
        organization_id: Option<&str>,
        actor: &IdentityContext,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.map(str::to_string),
            ticket_id: ticket.id.clone(),
            ticket_title: ticket.title.clone(),
            acting_user_id: actor.user_id.clone(),
            acting_user_name: actor.name.clone(),
            kind,
            detail: detail.into(),
            target_user_id: None,
            target_user_name: None,
            old_value: None,
            new_value: None,
            timestamp: now(),
        }
    }

    pub fn with_target(mut self, user_id: &str, user_name: &str) -> Self {
        self.target_user_id = Some(user_id.to_string());
        self.target_user_name = Some(user_name.to_string());
        self
    }

    pub fn with_values(mut self, old_value: &str, new_value: &str) -> Self {
        self.old_value = Some(old_value.to_string());
        self.new_value = Some(new_value.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TicketAssigned,
    TicketUpdated,
    TicketClosed,
    CommentAdded,
}

impl NotificationKind {
    /// Whether the recipient's preferences allow this kind.
    pub fn enabled_in(&self, prefs: &NotificationPreferences) -> bool {
        match self {
            NotificationKind::TicketAssigned => prefs.ticket_assigned,
            NotificationKind::TicketUpdated => prefs.ticket_updated,
            NotificationKind::TicketClosed => prefs.ticket_closed,
            NotificationKind::CommentAdded => true,
        }
    }
}

/// Payload delivered to one user's live sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub user_id: String,
    pub ticket_id: Option<String>,
    pub project_id: Option<String>,
    pub created_at: String,
    pub read: bool,
}

impl Notification {
    pub fn for_ticket(
        kind: NotificationKind,
        user_id: &str,
        ticket: &Ticket,
        title: &str,
        message: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            message,
            user_id: user_id.to_string(),
            ticket_id: Some(ticket.id.clone()),
            project_id: Some(ticket.project_id.clone()),
            created_at: now(),
            read: false,
        }
    }
}

/// Key of a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BroadcastKey {
    Ticket(String),
    Project(String),
}

impl BroadcastKey {
    /// Event name seen by subscribers, e.g. `ticket:<id>:update`.
    pub fn event_name(&self) -> String {
        match self {
            BroadcastKey::Ticket(id) => format!("ticket:{}:update", id),
            BroadcastKey::Project(id) => format!("project:{}:update", id),
        }
    }
}

/// A non-authoritative action required by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Audit(AuditEvent),
    NotifyUser {
        user_id: String,
        notification: Notification,
    },
    Broadcast {
        key: BroadcastKey,
        payload: serde_json::Value,
    },
}

impl SideEffect {
    pub fn broadcast_ticket(ticket: &Ticket, change: &str) -> Self {
        SideEffect::Broadcast {
            key: BroadcastKey::Ticket(ticket.id.clone()),
            payload: serde_json::json!({ "change": change, "ticket": ticket }),
        }
    }

    pub fn broadcast_project(project_id: &str, payload: serde_json::Value) -> Self {
        SideEffect::Broadcast {
            key: BroadcastKey::Project(project_id.to_string()),
            payload,
        }
    }

    pub fn notify(notification: Notification) -> Self {
        SideEffect::NotifyUser {
            user_id: notification.user_id.clone(),
            notification,
        }
    }
}

/// Append-only sink for audit events.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AppError>;
}

/// Delivery to connected sessions.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver to every live session of one user. Returns the number of
    /// sessions reached; zero when the user is offline.
    async fn send_to_user(&self, user_id: &str, payload: serde_json::Value)
        -> Result<usize, AppError>;

    /// Deliver to every live session.
    async fn broadcast(
        &self,
        key: &BroadcastKey,
        payload: serde_json::Value,
    ) -> Result<usize, AppError>;
}

/// Counts from one [`EffectDispatcher::emit`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub audited: usize,
    pub notified: usize,
    pub broadcast: usize,
    pub failed: usize,
}

/// Routes side effects to their collaborators.
#[derive(Clone)]
pub struct EffectDispatcher {
    audit: Arc<dyn AuditRecorder>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl EffectDispatcher {
    pub fn new(audit: Arc<dyn AuditRecorder>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { audit, notifier }
    }

    /// Deliver effects in order. Never fails; every failure is logged.
    pub async fn emit(&self, effects: Vec<SideEffect>) -> EmitReport {
        let mut report = EmitReport::default();

        for effect in effects {
            match effect {
                SideEffect::Audit(event) => match self.audit.record(&event).await {
                    Ok(()) => report.audited += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            ticket_id = %event.ticket_id,
                            kind = event.kind.as_str(),
                            "Failed to record audit event: {}",
                            e
                        );
                    }
                },
                SideEffect::NotifyUser {
                    user_id,
                    notification,
                } => {
                    let payload = match serde_json::to_value(&notification) {
                        Ok(payload) => payload,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!("Failed to encode notification: {}", e);
                            continue;
                        }
                    };
                    match self.notifier.send_to_user(&user_id, payload).await {
                        Ok(delivered) => report.notified += delivered.min(1),
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(%user_id, "Failed to notify user: {}", e);
                        }
                    }
                }
                SideEffect::Broadcast { key, payload } => {
                    match self.notifier.broadcast(&key, payload).await {
                        Ok(_) => report.broadcast += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(
                                event = %key.event_name(),
                                "Failed to broadcast update: {}",
                                e
                            );
                        }
                    }
                }
            }
        }

        report
    }
}

/// Sortable RFC 3339 timestamp with microsecond precision.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
