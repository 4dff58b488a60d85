//! Append-only activity records produced by the audit recorder.

use serde::{Deserialize, Serialize};

/// What happened to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    TicketCreated,
    TicketAssigned,
    TicketUpdated,
    StatusChanged,
    CommentAdded,
    TicketClosed,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::TicketCreated => "ticket_created",
            ActivityKind::TicketAssigned => "ticket_assigned",
            ActivityKind::TicketUpdated => "ticket_updated",
            ActivityKind::StatusChanged => "status_changed",
            ActivityKind::CommentAdded => "comment_added",
            ActivityKind::TicketClosed => "ticket_closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket_created" => Some(ActivityKind::TicketCreated),
            "ticket_assigned" => Some(ActivityKind::TicketAssigned),
            "ticket_updated" => Some(ActivityKind::TicketUpdated),
            "status_changed" => Some(ActivityKind::StatusChanged),
            "comment_added" => Some(ActivityKind::CommentAdded),
            "ticket_closed" => Some(ActivityKind::TicketClosed),
            _ => None,
        }
    }

    /// Short verb shown in activity feeds.
    pub fn action(&self) -> &'static str {
        match self {
            ActivityKind::TicketCreated => "created",
            ActivityKind::TicketAssigned => "assigned",
            ActivityKind::TicketUpdated => "updated",
            ActivityKind::StatusChanged => "status_changed",
            ActivityKind::CommentAdded => "commented",
            ActivityKind::TicketClosed => "closed",
        }
    }
}

/// A persisted audit record. Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub kind: ActivityKind,
    pub ticket_id: String,
    pub ticket_title: String,
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub timestamp: String,
}

/// Offset-paginated slice of the activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFeed {
    pub activities: Vec<Activity>,
    pub total: i64,
    pub has_more: bool,
}

/// Query parameters for the activity feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    /// Restrict to activities performed by or targeting this user.
    #[serde(default)]
    pub user_id: Option<String>,
}
