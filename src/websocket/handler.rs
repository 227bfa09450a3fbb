use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ws::{CloseReason, Delivery, Mailbox, Session};
use crate::AppState;

/// How long the writer gets to flush its close frame after the session ends
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Query parameters of the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub identity: Option<String>,
    pub slot: Option<String>,
}

/// WebSocket handler
pub async fn websocket_handler(
    Path(file_id): Path<String>,
    params: Option<Query<ConnectParams>>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    info!("New WebSocket connection attempt for file {}", file_id);
    let params = params.map(|Query(params)| params);
    ws.on_upgrade(move |socket| handle_socket(socket, file_id, params, state))
}

fn close_frame(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code(),
        reason: reason.reason().into(),
    }))
}

/// Resolve the requested file, or the reason the connection must be refused
async fn admit(state: &AppState, file_id: &str, params: &Option<ConnectParams>) -> Result<Uuid, CloseReason> {
    if params.is_none() {
        warn!("Rejecting connection with unparsable query for file {}", file_id);
        return Err(CloseReason::MalformedHandshake);
    }
    let file_id = Uuid::parse_str(file_id).map_err(|e| {
        warn!("Rejecting connection with invalid file UUID '{}': {}", file_id, e);
        CloseReason::MalformedHandshake
    })?;
    match state.storage.get_file(file_id).await {
        Ok(Some(_)) => Ok(file_id),
        Ok(None) => {
            warn!("Rejecting connection to unknown file {}", file_id);
            Err(CloseReason::UnknownFile)
        }
        Err(e) => {
            error!("Failed to look up file {}: {}", file_id, e);
            Err(CloseReason::Internal)
        }
    }
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, file_id: String, params: Option<ConnectParams>, state: AppState) {
    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    let file_id = match admit(&state, &file_id, &params).await {
        Ok(file_id) => file_id,
        Err(reason) => {
            let _ = sender.send(close_frame(reason)).await;
            return;
        }
    };

    let params = params.unwrap_or_default();
    let (mut session, mailbox) = Session::open(state.registry.clone(), file_id, params.identity, params.slot).await;
    info!("WebSocket connection established for file {} as session {}", file_id, session.id());

    let heartbeat = state.config.heartbeat_interval();
    let idle_timeout = state.config.idle_timeout();
    let mut send_task = tokio::spawn(write_frames(sender, mailbox, heartbeat));

    // Wait for the client to go away or for the hub to drop the session
    let read_end = tokio::select! {
        end = read_frames(&mut receiver, &mut session, idle_timeout) => Some(end),
        _ = &mut send_task => None,
    };

    match read_end {
        Some(ReadEnd::Idle) => {
            warn!("No traffic from session {} for {:?}, closing", session.id(), idle_timeout);
            session.close_with(CloseReason::IdleTimeout).await;
        }
        _ => session.close().await,
    }
    if read_end.is_some() && tokio::time::timeout(WRITER_GRACE, &mut send_task).await.is_err() {
        send_task.abort();
    }
    info!("WebSocket connection terminated for file {}", file_id);
}

/// Why the reader stopped
enum ReadEnd {
    Closed,
    Idle,
}

/// Feed inbound text frames to the session until the client closes or goes quiet.
/// Any frame, pongs included, counts as a sign of life.
async fn read_frames(receiver: &mut SplitStream<WebSocket>, session: &mut Session, idle_timeout: Duration) -> ReadEnd {
    loop {
        let frame = match tokio::time::timeout(idle_timeout, receiver.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return ReadEnd::Closed,
            Err(_) => return ReadEnd::Idle,
        };
        match frame {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Binary(_)) => {
                warn!(session = session.id(), "dropping binary frame");
            }
            Ok(Message::Close(_)) => return ReadEnd::Closed,
            Ok(_) => {}
            Err(e) => {
                debug!(session = session.id(), error = %e, "socket read failed");
                return ReadEnd::Closed;
            }
        }
    }
}

/// Drain the session's mailbox onto the socket, pinging on every heartbeat,
/// and end with a close frame
async fn write_frames(mut sender: SplitSink<WebSocket, Message>, mut mailbox: Mailbox, heartbeat: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let delivery = tokio::select! {
            delivery = mailbox.recv() => delivery,
            _ = ticker.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                continue;
            }
        };
        match delivery {
            Delivery::Message(msg) => {
                let text = match serde_json::to_string(msg.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Delivery::Closed(reason) => {
                debug!(code = reason.code(), "closing socket");
                let _ = sender.send(close_frame(reason)).await;
                break;
            }
        }
    }
}
