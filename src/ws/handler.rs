//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::UserId;
use crate::http::middleware::{resolve_identity, Handshake};
use crate::matchmaking::presence::{ConnectionHandle, ConnectionId, Outbound};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(handshake): Query<Handshake>,
    State(state): State<AppState>,
) -> Response {
    // Resolve identity before upgrading
    match resolve_identity(&handshake, state.config.jwt_access_secret.as_deref()) {
        Ok(user_id) => {
            info!(user_id, "WebSocket upgrade for admitted user");
            ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket admission refused");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    // The identity must exist in the user store
    match state.store.find_by_id(user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(user_id, "Unknown user, closing connection");
            let _ = ws_sink.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            warn!(user_id, error = %e, "User lookup failed, admitting anyway");
        }
    }

    let (handle, outbound_rx) = ConnectionHandle::channel();
    let connection_id = handle.id;
    state.lobby.connect(user_id, handle);

    run_session(user_id, connection_id, &state, ws_sink, ws_stream, outbound_rx).await;

    // Cleanup on disconnect
    state.lobby.disconnect(connection_id).await;

    info!(user_id, connection_id = %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    user_id: UserId,
    connection_id: ConnectionId,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    let rate_limiter = PlayerRateLimiter::new(state.config.input_rate_limit);

    // Spawn writer task: lobby messages -> WebSocket
    let mut writer = tokio::spawn(async move {
        while let Some(out) = outbound_rx.recv().await {
            match out {
                Outbound::Msg(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> lobby
    loop {
        let result = tokio::select! {
            _ = &mut writer => {
                debug!(connection_id = %connection_id, "Writer finished, ending session");
                return;
            }
            incoming = ws_stream.next() => match incoming {
                Some(result) => result,
                None => break,
            },
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(user_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => state.lobby.handle(user_id, client_msg).await,
                    Err(e) => {
                        warn!(user_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(user_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(user_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
