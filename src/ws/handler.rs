//! WebSocket upgrade handler and connection session

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::server::ClientHandle;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Connections that stay silent this long are dropped
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session token from a previous connection, if resuming
    pub session: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.session, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session: Option<String>, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel();
    let client = state.game.connect(session, tx).await;
    info!(player_id = %client.player_id, "New WebSocket connection");

    // Writer task: outbound queue -> WebSocket
    let writer_player_id = client.player_id.clone();
    let writer_handle = tokio::spawn(write_loop(ws_sink, rx, writer_player_id));

    state.game.send_init(&client).await;

    read_loop(ws_stream, &client, &state).await;

    state.game.disconnect(&client).await;
    writer_handle.abort();
    info!(player_id = %client.player_id, "WebSocket connection closed");
}

async fn write_loop(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerMsg>,
    player_id: String,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Reader loop: WebSocket -> game server, until close, timeout, or eviction
/// by a newer connection for the same player.
async fn read_loop(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    client: &ClientHandle,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    loop {
        let result = tokio::select! {
            _ = client.shutdown.notified() => {
                info!(player_id = %client.player_id, "connection superseded");
                return;
            }
            next = tokio::time::timeout(READ_TIMEOUT, ws_stream.next()) => match next {
                Ok(Some(result)) => result,
                Ok(None) => return,
                Err(_) => {
                    info!(player_id = %client.player_id, "read timeout, dropping connection");
                    return;
                }
            },
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %client.player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => state.game.handle_message(client, msg).await,
                    Err(e) => {
                        warn!(player_id = %client.player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %client.player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %client.player_id, "Client initiated close");
                return;
            }
            Err(e) => {
                error!(player_id = %client.player_id, error = %e, "WebSocket error");
                return;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
