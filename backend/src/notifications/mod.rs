//! In-process notification dispatcher.
//!
//! Keeps the registry of live sessions. Each session owns an unbounded tokio
//! channel whose receiving half is driven by the transport (the WebSocket
//! handler in `api::notifications`).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::events::{BroadcastKey, NotificationDispatcher};

/// Event name used for targeted notifications.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Message pushed to a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMessage {
    pub event: String,
    pub data: serde_json::Value,
}

struct Session {
    user_id: String,
    sender: UnboundedSender<SessionMessage>,
}

/// Receiving side of a registered session.
pub struct SessionHandle {
    pub session_id: String,
    pub receiver: UnboundedReceiver<SessionMessage>,
}

/// Registry mapping session ids to live transport channels.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for `user_id`.
    pub async fn connect(&self, user_id: &str) -> SessionHandle {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();

        self.sessions.write().await.insert(
            session_id.clone(),
            Session {
                user_id: user_id.to_string(),
                sender,
            },
        );
        tracing::debug!(%session_id, %user_id, "Session connected");

        SessionHandle {
            session_id,
            receiver,
        }
    }

    pub async fn disconnect(&self, session_id: &str) {
        if let Some(session) = self.sessions.write().await.remove(session_id) {
            tracing::debug!(%session_id, user_id = %session.user_id, "Session disconnected");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Send to the sessions selected by `filter`, pruning closed channels.
    async fn deliver<F>(&self, message: SessionMessage, filter: F) -> usize
    where
        F: Fn(&Session) -> bool,
    {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter().filter(|(_, s)| filter(s)) {
                if session.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(id.clone());
                }
            }
        }

        if !closed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in closed {
                sessions.remove(&id);
            }
        }

        delivered
    }
}

#[async_trait]
impl NotificationDispatcher for SessionRegistry {
    async fn send_to_user(
        &self,
        user_id: &str,
        payload: serde_json::Value,
    ) -> Result<usize, AppError> {
        let message = SessionMessage {
            event: NOTIFICATION_EVENT.to_string(),
            data: payload,
        };
        let delivered = self.deliver(message, |s| s.user_id == user_id).await;
        if delivered == 0 {
            tracing::trace!(%user_id, "No live session; notification dropped");
        }
        Ok(delivered)
    }

    async fn broadcast(
        &self,
        key: &BroadcastKey,
        payload: serde_json::Value,
    ) -> Result<usize, AppError> {
        let message = SessionMessage {
            event: key.event_name(),
            data: payload,
        };
        Ok(self.deliver(message, |_| true).await)
    }
}
