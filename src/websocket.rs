//! WebSocket realtime stream
//!
//! Clients connect to `/ws?user_id=...` and receive every workflow event
//! (optionally filtered by entity kind) so they can refetch what changed.
//! A connection with a user id may also sign requests and protocols.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::EntityKind;
use crate::workflow::WorkflowEvent;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: Option<Uuid>,
}

/// WebSocket handler
pub async fn handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.engine.subscribe();
    // Empty means everything
    let mut kinds: HashSet<EntityKind> = HashSet::new();

    tracing::debug!(user_id = ?user_id, "websocket connected");
    if !send(&mut sender, &ServerMessage::Connected { user_id }).await {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Subscribe { kinds: wanted }) => {
                        kinds = wanted.into_iter().collect();
                        ServerMessage::Subscribed {
                            kinds: kinds.iter().copied().collect(),
                        }
                    }
                    Ok(ClientMessage::Sign { target, id }) => {
                        match handle_sign(&state, user_id, target, id).await {
                            Ok(reply) => reply,
                            Err(e) => ServerMessage::Error {
                                message: e.public_message(),
                            },
                        }
                    }
                    Err(e) => ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    },
                };
                if !send(&mut sender, &reply).await {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let entity_kind = event.entity_kind();
                        if !kinds.is_empty() && !kinds.contains(&entity_kind) {
                            continue;
                        }
                        if !send(&mut sender, &ServerMessage::Event { entity_kind, event }).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "websocket subscriber lagged");
                        if !send(&mut sender, &ServerMessage::Lagged { skipped }).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(user_id = ?user_id, "websocket disconnected");
}

async fn handle_sign(
    state: &AppState,
    user_id: Option<Uuid>,
    target: EntityKind,
    id: Uuid,
) -> Result<ServerMessage> {
    let user_id = user_id.ok_or_else(|| {
        AppError::Unauthorized("Подключитесь с параметром user_id, чтобы подписывать".to_string())
    })?;

    match target {
        EntityKind::Request => {
            let outcome = state.engine.sign_request(user_id, id).await?;
            Ok(ServerMessage::Signed {
                target,
                id,
                newly_signed: outcome.newly_signed,
                quorum_complete: outcome.quorum.is_complete(),
            })
        }
        EntityKind::Protocol => {
            let outcome = state.engine.sign_protocol(user_id, id).await?;
            Ok(ServerMessage::Signed {
                target,
                id,
                newly_signed: outcome.newly_signed,
                quorum_complete: outcome.quorum.is_complete(),
            })
        }
        other => Err(AppError::BadRequest(format!(
            "Подписать можно только заявку или протокол, не {}",
            other.as_str()
        ))),
    }
}

/// Serialize and send; false once the connection is gone
async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            return true;
        }
    };
    if let Err(e) = sender.send(Message::Text(text)).await {
        tracing::debug!("Failed to send message: {}", e);
        return false;
    }
    true
}

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Only receive events about these entity kinds
    Subscribe { kinds: Vec<EntityKind> },
    /// Sign a request or protocol as the connected user
    Sign { target: EntityKind, id: Uuid },
}

/// Messages from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        user_id: Option<Uuid>,
    },
    Subscribed {
        kinds: Vec<EntityKind>,
    },
    /// Something changed; refetch the entity
    Event {
        entity_kind: EntityKind,
        event: WorkflowEvent,
    },
    Signed {
        target: EntityKind,
        id: Uuid,
        newly_signed: bool,
        quorum_complete: bool,
    },
    /// Events were dropped because this client fell behind
    Lagged {
        skipped: u64,
    },
    Error {
        message: String,
    },
}
