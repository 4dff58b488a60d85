//! WebSocket transport for live notifications.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Extension,
};

use crate::identity::IdentityContext;
use crate::notifications::SessionRegistry;
use crate::AppState;

/// GET /api/notifications/ws - Upgrade to a session registered under the caller.
pub async fn notifications_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| run_session(socket, registry, identity.user_id))
}

async fn run_session(mut socket: WebSocket, registry: Arc<SessionRegistry>, user_id: String) {
    let mut handle = registry.connect(&user_id).await;

    loop {
        tokio::select! {
            outbound = handle.receiver.recv() => {
                let Some(message) = outbound else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(%user_id, "Failed to encode session message: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Clients only listen; anything else they send is ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    registry.disconnect(&handle.session_id).await;
    let remaining = registry.session_count().await;
    tracing::debug!(remaining, "Notification socket closed");
}
