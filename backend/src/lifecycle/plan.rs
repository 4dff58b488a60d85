//! Pure ticket state planning.
//!
//! Everything here is a function of already-loaded records: field diffs,
//! status transitions and the side effects each committed transition owes.
//! The engine in `tickets.rs` does the I/O around these.

use serde_json::json;

use super::required;
use crate::errors::AppError;
use crate::events::{AuditEvent, Notification, NotificationKind, SideEffect};
use crate::identity::IdentityContext;
use crate::models::{
    normalize_labels, ActivityKind, Comment, Priority, Ticket, TicketStatus, UpdateTicketRequest,
    User,
};

/// Requested change of assignee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeChange {
    Set(String),
    Clear,
}

/// Tracked fields that differ from the stored ticket. `None` means unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub labels: Option<Vec<String>>,
    pub deadline: Option<Option<String>>,
    pub assignee: Option<AssigneeChange>,
}

impl TicketChanges {
    pub fn is_empty(&self) -> bool {
        *self == TicketChanges::default()
    }

    /// One human-readable line per changed field.
    pub fn summary(&self, before: &Ticket, assignee: Option<&User>) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(title) = &self.title {
            lines.push(format!("Title changed from \"{}\" to \"{}\"", before.title, title));
        }
        if self.description.is_some() {
            lines.push("Description updated".to_string());
        }
        if let Some(priority) = self.priority {
            lines.push(format!(
                "Priority changed from {} to {}",
                before.priority.as_str(),
                priority.as_str()
            ));
        }
        if let Some(labels) = &self.labels {
            if labels.is_empty() {
                lines.push("Labels cleared".to_string());
            } else {
                lines.push(format!("Labels changed to [{}]", labels.join(", ")));
            }
        }
        match &self.deadline {
            Some(Some(deadline)) => lines.push(format!("Deadline set to {}", deadline)),
            Some(None) => lines.push("Deadline removed".to_string()),
            None => {}
        }
        match (&self.assignee, assignee) {
            (Some(AssigneeChange::Set(_)), Some(user)) => {
                lines.push(format!("Assignee changed to {}", user.name))
            }
            (Some(AssigneeChange::Set(id)), None) => {
                lines.push(format!("Assignee changed to {}", id))
            }
            (Some(AssigneeChange::Clear), _) => lines.push(format!(
                "Unassigned {}",
                before.assigned_to_name.as_deref().unwrap_or("assignee")
            )),
            (None, _) => {}
        }

        lines
    }
}

/// Diff an update request against the stored ticket.
pub fn diff(ticket: &Ticket, request: &UpdateTicketRequest) -> Result<TicketChanges, AppError> {
    let mut changes = TicketChanges::default();

    if let Some(title) = &request.title {
        let title = required(title, "Title")?;
        if title != ticket.title {
            changes.title = Some(title);
        }
    }
    if let Some(description) = &request.description {
        if *description != ticket.description {
            changes.description = Some(description.clone());
        }
    }
    if let Some(priority) = request.priority {
        if priority != ticket.priority {
            changes.priority = Some(priority);
        }
    }
    if let Some(labels) = &request.labels {
        let labels = normalize_labels(labels);
        if !same_set(&labels, &ticket.labels) {
            changes.labels = Some(labels);
        }
    }
    if let Some(deadline) = &request.deadline {
        let deadline = blank_to_none(deadline.as_deref());
        if deadline != ticket.deadline {
            changes.deadline = Some(deadline);
        }
    }
    if let Some(assignee) = &request.assigned_to_id {
        match blank_to_none(assignee.as_deref()) {
            Some(id) if ticket.assigned_to_id.as_deref() != Some(id.as_str()) => {
                changes.assignee = Some(AssigneeChange::Set(id));
            }
            None if ticket.assigned_to_id.is_some() => {
                changes.assignee = Some(AssigneeChange::Clear);
            }
            _ => {}
        }
    }

    Ok(changes)
}

/// Apply a diff. `assignee` is the validated user for `AssigneeChange::Set`.
///
/// Binding an assignee forces `assigned`; clearing one drops an `assigned`
/// ticket back to `pending`.
pub fn apply(before: &Ticket, changes: &TicketChanges, assignee: Option<&User>, now: &str) -> Ticket {
    let mut next = before.clone();

    if let Some(title) = &changes.title {
        next.title = title.clone();
    }
    if let Some(description) = &changes.description {
        next.description = description.clone();
    }
    if let Some(priority) = changes.priority {
        next.priority = priority;
    }
    if let Some(labels) = &changes.labels {
        next.labels = labels.clone();
    }
    if let Some(deadline) = &changes.deadline {
        next.deadline = deadline.clone();
    }
    match (&changes.assignee, assignee) {
        (Some(AssigneeChange::Set(_)), Some(user)) => bind_assignee(&mut next, user),
        (Some(AssigneeChange::Clear), _) => {
            next.assigned_to_id = None;
            next.assigned_to_name = None;
            if next.status == TicketStatus::Assigned {
                next.status = TicketStatus::Pending;
            }
        }
        _ => {}
    }

    next.updated_at = now.to_string();
    next
}

/// Bind a validated assignee and force `assigned`.
pub fn assign(before: &Ticket, assignee: &User, now: &str) -> Ticket {
    let mut next = before.clone();
    bind_assignee(&mut next, assignee);
    next.updated_at = now.to_string();
    next
}

/// Move to `status`.
///
/// `assigned` requires an assignee; any other status releases the assignee.
pub fn transition(before: &Ticket, status: TicketStatus, now: &str) -> Result<Ticket, AppError> {
    if status == TicketStatus::Assigned && before.assigned_to_id.is_none() {
        return Err(AppError::Validation(
            "A ticket without an assignee cannot be set to assigned".to_string(),
        ));
    }

    let mut next = before.clone();
    next.status = status;
    if status != TicketStatus::Assigned {
        next.assigned_to_id = None;
        next.assigned_to_name = None;
    }
    next.updated_at = now.to_string();
    Ok(next)
}

fn bind_assignee(ticket: &mut Ticket, user: &User) {
    ticket.assigned_to_id = Some(user.id.clone());
    ticket.assigned_to_name = Some(user.name.clone());
    ticket.status = TicketStatus::Assigned;
}

fn blank_to_none(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn same_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}

// ==================== SIDE EFFECTS ====================

/// Who acted, and which organization the ticket's project belongs to.
#[derive(Clone, Copy)]
pub struct EffectContext<'a> {
    pub actor: &'a IdentityContext,
    pub organization_id: Option<&'a str>,
}

impl<'a> EffectContext<'a> {
    fn audit(&self, kind: ActivityKind, ticket: &Ticket, detail: impl Into<String>) -> AuditEvent {
        AuditEvent::new(kind, ticket, self.organization_id, self.actor, detail)
    }

    fn assignment(&self, previous: Option<&str>, ticket: &Ticket, assignee: &User) -> [SideEffect; 2] {
        let audit = self
            .audit(
                ActivityKind::TicketAssigned,
                ticket,
                format!("Assigned ticket to {}", assignee.name),
            )
            .with_target(&assignee.id, &assignee.name)
            .with_values(previous.unwrap_or("unassigned"), &assignee.name);

        let notification = Notification::for_ticket(
            NotificationKind::TicketAssigned,
            &assignee.id,
            ticket,
            "New Ticket Assigned",
            format!(
                "You have been assigned to ticket: {} by {}",
                ticket.title, self.actor.name
            ),
        );

        [SideEffect::Audit(audit), SideEffect::notify(notification)]
    }
}

pub fn created_effects(ctx: EffectContext<'_>, ticket: &Ticket, assignee: Option<&User>) -> Vec<SideEffect> {
    let mut effects = vec![SideEffect::Audit(ctx.audit(
        ActivityKind::TicketCreated,
        ticket,
        format!("Created ticket \"{}\"", ticket.title),
    ))];

    if let Some(user) = assignee {
        effects.extend(ctx.assignment(None, ticket, user));
    }

    effects.push(SideEffect::broadcast_project(
        &ticket.project_id,
        json!({ "type": "ticket_created", "ticket": ticket }),
    ));
    effects
}

pub fn updated_effects(
    ctx: EffectContext<'_>,
    before: &Ticket,
    after: &Ticket,
    summary: &[String],
    newly_assigned: Option<&User>,
) -> Vec<SideEffect> {
    let mut effects = vec![SideEffect::Audit(ctx.audit(
        ActivityKind::TicketUpdated,
        after,
        summary.join("; "),
    ))];

    match (newly_assigned, after.assigned_to_id.as_deref()) {
        (Some(user), _) => {
            effects.extend(ctx.assignment(before.assigned_to_name.as_deref(), after, user))
        }
        (None, Some(holder)) => effects.push(SideEffect::notify(Notification::for_ticket(
            NotificationKind::TicketUpdated,
            holder,
            after,
            "Ticket Updated",
            format!("Ticket \"{}\" was updated by {}", after.title, ctx.actor.name),
        ))),
        (None, None) => {}
    }

    effects.push(SideEffect::broadcast_ticket(after, "updated"));
    effects
}

pub fn assigned_effects(
    ctx: EffectContext<'_>,
    before: &Ticket,
    after: &Ticket,
    assignee: &User,
) -> Vec<SideEffect> {
    let mut effects: Vec<SideEffect> = ctx
        .assignment(before.assigned_to_name.as_deref(), after, assignee)
        .into();
    effects.push(SideEffect::broadcast_ticket(after, "assigned"));
    effects
}

/// Effects of a status change. A no-op change still records `status_changed`.
pub fn status_effects(ctx: EffectContext<'_>, before: &Ticket, after: &Ticket) -> Vec<SideEffect> {
    let (old, new) = (before.status.as_str(), after.status.as_str());
    let mut effects = vec![SideEffect::Audit(
        ctx.audit(
            ActivityKind::StatusChanged,
            after,
            format!("Changed status from {} to {}", old, new),
        )
        .with_values(old, new),
    )];

    if after.status == TicketStatus::Closed && before.status != TicketStatus::Closed {
        effects.push(SideEffect::Audit(ctx.audit(
            ActivityKind::TicketClosed,
            after,
            "Closed the ticket",
        )));

        // The close releases the assignee, so notify whoever held it before.
        if let Some(holder) = before.assigned_to_id.as_deref() {
            effects.push(SideEffect::notify(Notification::for_ticket(
                NotificationKind::TicketClosed,
                holder,
                after,
                "Ticket Closed",
                format!("Ticket \"{}\" has been closed", after.title),
            )));
        }
    }

    effects.push(SideEffect::broadcast_ticket(after, "status"));
    effects
}

pub fn comment_effects(ctx: EffectContext<'_>, ticket: &Ticket, comment: &Comment) -> Vec<SideEffect> {
    let mut effects = vec![SideEffect::Audit(ctx.audit(
        ActivityKind::CommentAdded,
        ticket,
        format!("Commented: {}", excerpt(&comment.content, 120)),
    ))];

    if let Some(holder) = ticket.assigned_to_id.as_deref() {
        if holder != ctx.actor.user_id {
            effects.push(SideEffect::notify(Notification::for_ticket(
                NotificationKind::CommentAdded,
                holder,
                ticket,
                "New Comment",
                format!("{} commented on ticket: {}", ctx.actor.name, ticket.title),
            )));
        }
    }

    effects.push(SideEffect::Broadcast {
        key: crate::events::BroadcastKey::Ticket(ticket.id.clone()),
        payload: json!({ "change": "comment", "comment": comment }),
    });
    effects
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
