//! Connection gateway
//!
//! Accepts WebSocket connections, assigns each one a role and identity from
//! its handshake parameters, and shuttles messages between the transport
//! and the room state machine. All room mutations happen synchronously
//! under the room lock inside a message or timer callback, so events for a
//! room are processed strictly in arrival order.
//!
//! The gateway also owns the real-time side effects the state machine only
//! describes: the turn countdown runs here as a cancellable task whose
//! firing is re-validated by the state machine, and room destruction is
//! scheduled here when the last connection closes.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use garde::Validate;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    ServerMessage,
    game::{AlarmMessage, IncomingMessage, Phase, SyncMessage, UpdateMessage},
    registry::{Registry, RoomHandle},
    room_code::RoomCode,
    session::Tunnel,
    watcher::Id,
};

/// The role a connection requests in its handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectRole {
    /// The connection drives the room
    Host,
    /// The connection occupies a player seat
    Player,
}

/// Query parameters of the WebSocket handshake
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Requested role
    pub role: ConnectRole,
    /// Desired display name (players)
    #[serde(default)]
    pub name: Option<String>,
    /// Preferred language
    #[serde(default)]
    pub language: Option<String>,
    /// A previously assigned identity to reclaim after a disconnect
    #[serde(default)]
    pub reconnect_id: Option<Id>,
}

/// Frames queued for a connection's writer task
#[derive(Debug)]
pub enum Outbound {
    /// A JSON text frame
    Text(String),
    /// Close the socket
    Close,
}

/// The production [`Tunnel`]: a handle on one connection's outbound queue
///
/// Sends never block and never fail loudly; a dead connection just drops
/// its frames, so a broadcast to the rest of the room is unaffected.
#[derive(Debug, Clone)]
pub struct WsTunnel {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl WsTunnel {
    /// Wraps an outbound frame queue
    pub fn new(sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { sender }
    }

    fn send_raw(&self, text: String) {
        let _ = self.sender.send(Outbound::Text(text));
    }
}

impl Tunnel for WsTunnel {
    fn send_message(&self, message: &UpdateMessage) {
        self.send_raw(ServerMessage::from(message.clone()).to_message());
    }

    fn send_state(&self, state: &SyncMessage) {
        self.send_raw(ServerMessage::from(state.clone()).to_message());
    }

    fn close(self) {
        let _ = self.sender.send(Outbound::Close);
    }
}

/// Builds the gateway's router
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/room/{code}", get(ws_handler))
        .with_state(registry)
}

/// Upgrades a handshake into a room connection
///
/// Hosts may pass the literal code `new` to have a fresh room allocated;
/// any other code is created-or-joined idempotently. Players must name an
/// existing room: an unknown code is rejected before the upgrade with a
/// distinct status, and never creates a room.
async fn ws_handler(
    State(registry): State<Arc<Registry>>,
    Path(code): Path<String>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    match params.role {
        ConnectRole::Host => {
            let code = if code.eq_ignore_ascii_case("new") {
                registry.fresh_code()
            } else {
                match code.parse::<RoomCode>() {
                    Ok(code) => code,
                    Err(err) => {
                        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
                    }
                }
            };
            let handle = registry.create_or_get(code);
            ws.on_upgrade(move |socket| handle_host(socket, registry, handle))
        }
        ConnectRole::Player => {
            let Ok(code) = code.parse::<RoomCode>() else {
                return (StatusCode::BAD_REQUEST, "invalid room code").into_response();
            };
            let Some(handle) = registry.get(code) else {
                return (StatusCode::NOT_FOUND, "room not found").into_response();
            };
            ws.on_upgrade(move |socket| handle_player(socket, registry, handle, params))
        }
    }
}

/// Spawns the writer task for a socket and returns its tunnel
fn spawn_writer(mut sink: SplitSink<WebSocket, Message>) -> WsTunnel {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });
    WsTunnel::new(sender)
}

/// Builds the scheduler capability that arms real turn timers
///
/// Arming replaces (and aborts) any previously armed timer for the room.
/// When the task fires it hands the alarm back to the state machine, which
/// re-validates it against current state, so an abort that loses the race
/// with the sleep is still harmless.
fn make_scheduler(handle: Arc<RoomHandle>) -> impl FnMut(AlarmMessage, Duration) {
    move |message, duration| {
        let fire_handle = Arc::clone(&handle);
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let finder = fire_handle.tunnel_finder();
            let mut game = fire_handle.lock_game();
            game.receive_alarm(message, finder);
            if game.phase() != Phase::Playing {
                fire_handle.clear_turn_timer();
            }
        });
        handle.set_turn_timer(task.abort_handle());
    }
}

/// Feeds one inbound message into the room under its lock
fn dispatch(handle: &Arc<RoomHandle>, watcher_id: Id, message: IncomingMessage) {
    let finder = handle.tunnel_finder();
    let scheduler = make_scheduler(Arc::clone(handle));
    let mut game = handle.lock_game();
    game.receive_message(watcher_id, message, scheduler, finder);
    // The countdown only survives while a turn is actually running; the
    // check stays under the room lock so it cannot race a fresh arming.
    if game.phase() != Phase::Playing {
        handle.clear_turn_timer();
    }
}

/// Validates payload contents that parsing alone cannot reject
///
/// Packs and settings cross the trust boundary here, once; the state
/// machine never sees an out-of-bounds point value or round count.
fn validate_payload(message: &IncomingMessage) -> Result<(), garde::Report> {
    match message {
        IncomingMessage::CreateGame { pack, settings } => {
            pack.validate()?;
            settings.validate()
        }
        _ => Ok(()),
    }
}

/// Reads inbound frames until the connection closes
///
/// Well-formed messages are dispatched into the room; a malformed or
/// invalid frame earns the offending connection (and only it) an error
/// event.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    handle: &Arc<RoomHandle>,
    watcher_id: Id,
    tunnel: &WsTunnel,
) {
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<IncomingMessage>(text.as_str()) {
                Ok(incoming) => match validate_payload(&incoming) {
                    Ok(()) => dispatch(handle, watcher_id, incoming),
                    Err(report) => {
                        debug!(%watcher_id, %report, "invalid payload");
                        tunnel.send_message(&UpdateMessage::Error {
                            message: format!("invalid payload: {report}"),
                        });
                    }
                },
                Err(err) => {
                    debug!(%watcher_id, %err, "malformed message");
                    tunnel.send_message(&UpdateMessage::Error {
                        message: format!("malformed message: {err}"),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Runs a host connection to completion
async fn handle_host(socket: WebSocket, registry: Arc<Registry>, handle: Arc<RoomHandle>) {
    let (sink, stream) = socket.split();
    let tunnel = spawn_writer(sink);
    let host_id = Id::new();
    let code = handle.code();

    {
        let finder = handle.tunnel_finder();
        let mut game = handle.lock_game();
        let replaced = match game.attach_host(host_id) {
            Ok(replaced) => replaced,
            Err(err) => {
                tunnel.send_message(&UpdateMessage::Error {
                    message: err.to_string(),
                });
                tunnel.close();
                return;
            }
        };
        if let Some(previous_id) = replaced {
            info!(room = %code, "host connection replaced");
            if let Some(previous_tunnel) = handle.remove_tunnel(previous_id) {
                previous_tunnel.close();
            }
        }
        handle.insert_tunnel(host_id, tunnel.clone());
        tunnel.send_message(&UpdateMessage::GameCreated { code });
        game.sync_to(host_id, finder);
    }
    info!(room = %code, %host_id, "host connected");

    read_loop(stream, &handle, host_id, &tunnel).await;

    handle.remove_tunnel(host_id);
    info!(room = %code, %host_id, "host disconnected");
    if handle.connection_count() == 0 {
        registry.schedule_destroy(code);
    }
}

/// Runs a player connection to completion
async fn handle_player(
    socket: WebSocket,
    registry: Arc<Registry>,
    handle: Arc<RoomHandle>,
    params: ConnectParams,
) {
    let (sink, stream) = socket.split();
    let tunnel = spawn_writer(sink);
    let code = handle.code();
    let language = params.language.unwrap_or_else(|| "en".to_owned());

    let reclaimed = params
        .reconnect_id
        .filter(|id| registry.redeem_reconnect(*id, code));

    let player_id = {
        let finder = handle.tunnel_finder();
        let mut game = handle.lock_game();
        match reclaimed {
            Some(player_id) if game.has_player(player_id) => {
                handle.insert_tunnel(player_id, tunnel.clone());
                game.player_reconnected(player_id, finder);
                info!(room = %code, %player_id, "player reconnected");
                player_id
            }
            _ => {
                let player_id = Id::new();
                handle.insert_tunnel(player_id, tunnel.clone());
                if let Err(err) =
                    game.add_player(player_id, params.name.as_deref().unwrap_or(""), language, finder)
                {
                    warn!(room = %code, %err, "player rejected");
                    handle.remove_tunnel(player_id);
                    tunnel.send_message(&UpdateMessage::Error {
                        message: err.to_string(),
                    });
                    tunnel.close();
                    return;
                }
                info!(room = %code, %player_id, "player joined");
                player_id
            }
        }
    };

    read_loop(stream, &handle, player_id, &tunnel).await;

    handle.remove_tunnel(player_id);
    {
        let finder = handle.tunnel_finder();
        let mut game = handle.lock_game();
        // A kicked player's seat is already gone; only a surviving seat
        // earns a reconnection window and an auto-pass.
        if game.has_player(player_id) {
            game.player_disconnected(player_id, finder);
            registry.issue_reconnect(player_id, code);
            if game.phase() != Phase::Playing {
                handle.clear_turn_timer();
            }
        }
    }
    info!(room = %code, %player_id, "player disconnected");
    if handle.connection_count() == 0 {
        registry.schedule_destroy(code);
    }
}
