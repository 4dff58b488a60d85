//! User model and notification preferences.

use serde::{Deserialize, Serialize};

use super::{page_params, PageParams};
use crate::identity::{IdentityContext, Role};

/// Per-user switches consulted before a targeted notification is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    #[serde(default = "enabled")]
    pub email_notifications: bool,
    #[serde(default = "enabled")]
    pub ticket_assigned: bool,
    #[serde(default = "enabled")]
    pub ticket_updated: bool,
    #[serde(default = "enabled")]
    pub ticket_closed: bool,
    #[serde(default = "enabled")]
    pub weekly_digest: bool,
    #[serde(default = "enabled")]
    pub mention_notifications: bool,
}

fn enabled() -> bool {
    true
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            ticket_assigned: true,
            ticket_updated: true,
            ticket_closed: true,
            weekly_digest: true,
            mention_notifications: true,
        }
    }
}

/// Partial update of notification preferences.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesRequest {
    #[serde(default)]
    pub email_notifications: Option<bool>,
    #[serde(default)]
    pub ticket_assigned: Option<bool>,
    #[serde(default)]
    pub ticket_updated: Option<bool>,
    #[serde(default)]
    pub ticket_closed: Option<bool>,
    #[serde(default)]
    pub weekly_digest: Option<bool>,
    #[serde(default)]
    pub mention_notifications: Option<bool>,
}

impl NotificationPreferences {
    pub fn apply(mut self, update: &UpdatePreferencesRequest) -> Self {
        if let Some(v) = update.email_notifications {
            self.email_notifications = v;
        }
        if let Some(v) = update.ticket_assigned {
            self.ticket_assigned = v;
        }
        if let Some(v) = update.ticket_updated {
            self.ticket_updated = v;
        }
        if let Some(v) = update.ticket_closed {
            self.ticket_closed = v;
        }
        if let Some(v) = update.weekly_digest {
            self.weekly_digest = v;
        }
        if let Some(v) = update.mention_notifications {
            self.mention_notifications = v;
        }
        self
    }
}

/// A person acting in the system. Credentials are owned elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub notification_preferences: NotificationPreferences,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Snapshot this user as a request identity.
    pub fn identity(&self) -> IdentityContext {
        IdentityContext {
            user_id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            organization_id: self.organization_id.clone(),
            active: self.is_active,
        }
    }
}

/// Request body for creating a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// Request body for updating a user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// Query parameters for listing users.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl UserListQuery {
    pub fn page_params(&self) -> PageParams {
        page_params(self.page, self.limit)
    }
}

/// Normalize an email for storage and uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
