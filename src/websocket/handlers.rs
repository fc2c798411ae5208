//! WebSocket session handling: upgrade, per-connection reader and writer
//! tasks, and dispatch of client envelopes to the chat service and hub.

use crate::models::MessageType;
use crate::state::AppState;
use crate::websocket::message_types::WsEnvelope;
use crate::websocket::ClientHandle;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: String,
}

/// Window served for a `get_recent` request, same as the RPC default.
const RECENT_HISTORY_LIMIT: usize = 50;

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    // No new connections once shutdown has started.
    if *state.shutdown.borrow() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let profile = match state.users.get_user(&params.user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid user").into_response(),
        Err(e) => {
            warn!(user_id = %params.user_id, error = %e, "user lookup failed on upgrade");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, profile.id, profile.username, socket))
}

async fn handle_socket(state: AppState, user_id: String, username: String, socket: WebSocket) {
    let client_id = Uuid::new_v4();
    let (handle, mut queue) = ClientHandle::new(client_id, user_id.clone(), username.clone());
    state.hub.register(handle).await;

    if let Err(e) = state.hot.presence_set_online(&user_id).await {
        warn!(%user_id, error = %e, "could not mark user online");
    }

    let (mut sink, mut stream) = socket.split();

    // Writer: drains the bounded queue until the hub drops the handle.
    let writer = tokio::spawn(async move {
        while let Some(payload) = queue.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader: socket frames in, envelopes dispatched.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_envelope(&state, client_id, &user_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%client_id, error = %e, "websocket read error");
                break;
            }
        }
    }

    state.hub.unregister(client_id).await;
    if let Err(e) = state.hot.presence_set_offline(&user_id).await {
        warn!(%user_id, error = %e, "could not mark user offline");
    }
    let _ = writer.await;
    debug!(%client_id, %user_id, "websocket session closed");
}

async fn handle_envelope(state: &AppState, client_id: Uuid, user_id: &str, raw: &str) {
    let envelope: WsEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(_) => {
            state
                .hub
                .send_to_client(client_id, &WsEnvelope::error("malformed envelope").to_json())
                .await;
            return;
        }
    };

    match envelope.kind.as_str() {
        "join_room" => {
            let Some(room_id) = envelope.chatroom_id.as_deref() else {
                reply_error(state, client_id, "chatroom_id is required").await;
                return;
            };
            match state.chat.is_member(room_id, user_id).await {
                Ok(true) => {
                    state.hub.join_room(client_id, room_id).await;
                    state
                        .hub
                        .send_to_client(client_id, &WsEnvelope::joined(room_id).to_json())
                        .await;
                }
                Ok(false) => reply_error(state, client_id, "not a member of this chatroom").await,
                Err(e) => reply_error(state, client_id, &e.to_string()).await,
            }
        }
        "leave_room" => {
            let Some(room_id) = envelope.chatroom_id.as_deref() else {
                reply_error(state, client_id, "chatroom_id is required").await;
                return;
            };
            state.hub.leave_room(client_id, room_id).await;
            state
                .hub
                .send_to_client(client_id, &WsEnvelope::left(room_id).to_json())
                .await;
        }
        "send_message" => {
            let Some(room_id) = envelope.chatroom_id.as_deref() else {
                reply_error(state, client_id, "chatroom_id is required").await;
                return;
            };
            let content = envelope.content.unwrap_or_default();
            match state
                .chat
                .send_message(room_id, user_id, &content, MessageType::Text)
                .await
            {
                Ok(message) => {
                    state
                        .hub
                        .broadcast_room(room_id, &WsEnvelope::message(&message).to_json())
                        .await;
                }
                Err(e) => reply_error(state, client_id, &e.to_string()).await,
            }
        }
        "get_recent" => {
            let Some(room_id) = envelope.chatroom_id.as_deref() else {
                reply_error(state, client_id, "chatroom_id is required").await;
                return;
            };
            match state
                .chat
                .get_messages(room_id, user_id, RECENT_HISTORY_LIMIT, None)
                .await
            {
                Ok((messages, _)) => {
                    state
                        .hub
                        .send_to_client(client_id, &WsEnvelope::recent(room_id, &messages).to_json())
                        .await;
                }
                Err(e) => reply_error(state, client_id, &e.to_string()).await,
            }
        }
        "ping" => {
            state
                .hub
                .send_to_client(client_id, &WsEnvelope::pong().to_json())
                .await;
        }
        other => {
            debug!(%client_id, kind = other, "unhandled envelope type");
            reply_error(state, client_id, &format!("unknown message type {other:?}")).await;
        }
    }
}

async fn reply_error(state: &AppState, client_id: Uuid, detail: &str) {
    state
        .hub
        .send_to_client(client_id, &WsEnvelope::error(detail).to_json())
        .await;
}
