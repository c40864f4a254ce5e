//! Websocket endpoint for the broadcast hub.
//!
//! The bearer token arrives as a query parameter or websocket
//! subprotocol and is verified before the upgrade completes; a bad token
//! never reaches the hub.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::hub::{ClientMessage, ConnectionSink};
use crate::services::{ServiceError, TokenKind};
use crate::AppState;
use drupe_core::error::{AppError, GateReason};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

fn token_from_subprotocol(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("sec-websocket-protocol")?.to_str().ok()?;
    let mut parts = raw.split(',').map(str::trim);
    match parts.next() {
        Some("bearer") => parts.next().map(str::to_string),
        _ => None,
    }
}

struct WsSink(SplitSink<WebSocket, Message>);

#[axum::async_trait]
impl ConnectionSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), anyhow::Error> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| anyhow::anyhow!("websocket send failed: {}", e))
    }

    async fn close(&mut self) {
        let _ = self.0.send(Message::Close(None)).await;
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = params
        .token
        .or_else(|| token_from_subprotocol(&headers))
        .ok_or_else(|| AppError::gate(GateReason::TokenMissing))?;

    let claims = state
        .tokens
        .parse(&token, TokenKind::Access)
        .map_err(ServiceError::Token)?;
    let session_id = claims
        .sid
        .ok_or_else(|| AppError::gate(GateReason::TokenMalformed))?;
    let session = state
        .sessions
        .touch(session_id)
        .map_err(|_| AppError::gate(GateReason::SessionRevoked))?;

    let user = state
        .repo
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::gate(GateReason::SessionRevoked))?;
    if user.is_locked {
        return Err(AppError::gate(GateReason::AccountLocked));
    }
    if !user.is_active {
        return Err(AppError::gate(GateReason::AccountInactive));
    }

    let principal_id = user.id;
    // Clients that offered `bearer, <token>` need the server to echo the
    // agreed subprotocol on the 101 or they abort the connection.
    Ok(ws
        .protocols(["bearer"])
        .on_upgrade(move |socket| handle_socket(state, socket, session.id, principal_id)))
}

async fn handle_socket(state: AppState, socket: WebSocket, session_id: Uuid, principal_id: Uuid) {
    let (sender, mut receiver) = socket.split();

    let connection_id = match state
        .hub
        .register(session_id, principal_id, Box::new(WsSink(sender)))
    {
        Ok(id) => id,
        Err(e) => {
            tracing::info!(error = %e, "Websocket refused");
            return;
        }
    };
    tracing::debug!(%connection_id, %session_id, "Websocket connected");

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "Websocket read failed");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                let msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(%connection_id, error = %e, "Unparseable client frame");
                        continue;
                    }
                };
                // A live socket counts as session activity; the selected
                // branch backs the default subscribe scope.
                let session_branch = state
                    .sessions
                    .touch(session_id)
                    .ok()
                    .and_then(|s| s.selected_branch_id);
                state
                    .hub
                    .handle_client_message(connection_id, msg, session_branch);
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    state.hub.remove(connection_id);
    tracing::debug!(%connection_id, "Websocket disconnected");
}
