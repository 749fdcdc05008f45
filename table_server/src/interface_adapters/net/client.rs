use crate::domain::{EntityCommand, EntityId, NetworkClock, ParticipantId, SpawnRequest};
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::protocol::{
    ClientMessage, PoseBatchDto, ReliableEventDto, ServerMessage, TableStateDto,
};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::ids::{conn_id, next_participant_id};
use crate::use_cases::{PoseBatch, ReliableEvent, TableEvent, TableHandle, TableSnapshot};

use axum::{
    Error, Json,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    InputClosed,
    UpdatesClosed,
    JoinRequired,
    JoinTimeout,
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct TableQuery {
    // The table the client wants to join.
    #[serde(default)]
    table_id: Option<String>,
}

enum LoopControl {
    Continue,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DISPLAY_NAME_LEN: usize = 64;

fn encode(msg: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(msg) {
        Ok(txt) => Some(Utf8Bytes::from(txt)),
        Err(e) => {
            error!(error = ?e, "failed to serialize server message");
            None
        }
    }
}

pub async fn pose_batch_serializer(
    mut pose_rx: broadcast::Receiver<PoseBatch>,
    pose_bytes_tx: broadcast::Sender<Utf8Bytes>,
) {
    // Serialize each batch once and broadcast the shared bytes.
    loop {
        match pose_rx.recv().await {
            Ok(batch) => {
                if let Some(bytes) = encode(&ServerMessage::PoseBatch(PoseBatchDto::from(&batch))) {
                    let _ = pose_bytes_tx.send(bytes);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Poses are superseded every tick; dropping is fine.
                warn!(missed = n, "pose serializer lagged; skipping to latest batch");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("pose channel closed; serializer exiting");
                break;
            }
        }
    }
}

pub async fn reliable_event_serializer(
    mut reliable_rx: broadcast::Receiver<ReliableEvent>,
    reliable_bytes_tx: broadcast::Sender<Utf8Bytes>,
    table_state_rx: watch::Receiver<TableSnapshot>,
) {
    loop {
        match reliable_rx.recv().await {
            Ok(event) => {
                if let Some(bytes) = encode(&ServerMessage::Reliable(ReliableEventDto::from(&event))) {
                    let _ = reliable_bytes_tx.send(bytes);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Reliable events were lost for everyone; push full state instead.
                warn!(missed = n, "reliable serializer lagged; broadcasting table state");
                if let Some(bytes) = encode_table_state(&table_state_rx) {
                    let _ = reliable_bytes_tx.send(bytes);
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("reliable channel closed; serializer exiting");
                break;
            }
        }
    }
}

fn encode_table_state(table_state_rx: &watch::Receiver<TableSnapshot>) -> Option<Utf8Bytes> {
    // Clone out of the borrow before serializing to keep the lock short.
    let snapshot = table_state_rx.borrow().clone();
    encode(&ServerMessage::TableState(TableStateDto::from(&snapshot)))
}

pub fn spawn_table_serializers(table: &TableHandle) {
    tokio::spawn(pose_batch_serializer(
        table.pose_tx.subscribe(),
        table.pose_bytes_tx.clone(),
    ));
    tokio::spawn(reliable_event_serializer(
        table.reliable_tx.subscribe(),
        table.reliable_bytes_tx.clone(),
        table.table_state_tx.subscribe(),
    ));
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
) -> impl IntoResponse {
    let table_id = query
        .table_id
        .unwrap_or_else(|| state.default_table_id.to_string());

    let table = match state.table_registry.get_table(&table_id).await {
        Some(table) => table,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "table not found".to_string(),
                }),
            )
                .into_response();
        }
    };

    let clock = state.table_registry.clock().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, table, clock))
}

async fn handle_socket(socket: WebSocket, table: TableHandle, clock: Arc<dyn NetworkClock>) {
    // Separate connection id for correlating logs before a participant id exists.
    let span = info_span!(
        "conn",
        conn_id = conn_id(),
        table_id = %table.table_id,
        participant_id = tracing::field::Empty
    );
    serve_socket(socket, table, clock).instrument(span).await;
}

async fn serve_socket(mut socket: WebSocket, table: TableHandle, clock: Arc<dyn NetworkClock>) {
    let mut ctx = match bootstrap_connection(&mut socket, &table, clock.as_ref()).await {
        Ok(ctx) => ctx,
        Err(NetError::ClosedBeforeJoin) => {
            info!("client disconnected before join handshake");
            return;
        }
        Err(e) => {
            error!(error = ?e, "failed to bootstrap connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "bootstrap failed".into(),
                })))
                .await;
            let _ = socket.close().await;
            return;
        }
    };

    Span::current().record("participant_id", ctx.participant_id.0);
    info!(display_name = %ctx.display_name, "client connected");

    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

struct ConnCtx {
    participant_id: ParticipantId,
    display_name: String,
    input_tx: mpsc::Sender<TableEvent>,
    pose_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    reliable_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    table_state_rx: watch::Receiver<TableSnapshot>,
    // Count full-state resyncs sent to this client.
    lag_recovery_count: u64,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_input_full_log: Instant,
    last_lag_log: Instant,
    last_invalid_input_log: Instant,

    close_frame: Option<CloseFrame>,
}

#[derive(Debug)]
struct JoinHandshake {
    display_name: String,
    bytes_in: u64,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    table: &TableHandle,
    clock: &dyn NetworkClock,
) -> Result<ConnCtx, NetError> {
    // Subscribe before any await so nothing published during the handshake is missed.
    let pose_bytes_rx = table.pose_bytes_tx.subscribe();
    let reliable_bytes_rx = table.reliable_bytes_tx.subscribe();
    let table_state_rx = table.table_state_tx.subscribe();

    let join = match timeout(JOIN_HANDSHAKE_TIMEOUT, read_join_handshake(socket)).await {
        Ok(result) => result?,
        Err(_) => {
            let _ = send_close_with_reason(socket, close_code::POLICY, "join timeout").await;
            return Err(NetError::JoinTimeout);
        }
    };

    let participant_id = ParticipantId(next_participant_id());

    let identity_msg = ServerMessage::Identity {
        participant_id: participant_id.0,
        server_time: clock.now(),
    };
    let identity_bytes = send_message(socket, &identity_msg).await?;

    table
        .input_tx
        .send(TableEvent::Join { participant_id })
        .await
        .map_err(|_| NetError::InputClosed)?;

    // Initial full state. Reliable events queued since subscribing are
    // applied on top of it and are idempotent.
    let snapshot = table_state_rx.borrow().clone();
    let state_msg = ServerMessage::TableState(TableStateDto::from(&snapshot));
    let state_bytes = match send_message(socket, &state_msg).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Compensate so the authority releases anything this id could hold.
            let _ = table
                .input_tx
                .send(TableEvent::Leave { participant_id })
                .await;
            return Err(e);
        }
    };

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        participant_id,
        display_name: join.display_name,
        input_tx: table.input_tx.clone(),
        pose_bytes_rx,
        reliable_bytes_rx,
        table_state_rx,
        lag_recovery_count: 0,

        msgs_in: 1,
        msgs_out: 2,
        bytes_in: join.bytes_in,
        bytes_out: (identity_bytes + state_bytes) as u64,

        invalid_json: 0,

        last_input_full_log: now,
        last_lag_log: now,
        last_invalid_input_log: now,

        close_frame: None,
    })
}

async fn read_join_handshake(socket: &mut WebSocket) -> Result<JoinHandshake, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        match incoming.map_err(NetError::Ws)? {
            Message::Text(text) => {
                let bytes_in = text.len() as u64;
                let payload = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(payload)) => payload,
                    Ok(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "join required").await;
                        return Err(NetError::JoinRequired);
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "invalid join payload").await;
                        return Err(NetError::JoinRequired);
                    }
                };

                let mut display_name = payload.display_name.trim().to_string();
                if display_name.is_empty() {
                    display_name = "guest".to_string();
                }
                if display_name.len() > MAX_DISPLAY_NAME_LEN {
                    let cut = display_name
                        .char_indices()
                        .map(|(i, _)| i)
                        .take_while(|i| *i <= MAX_DISPLAY_NAME_LEN)
                        .last()
                        .unwrap_or(0);
                    display_name.truncate(cut);
                }

                return Ok(JoinHandshake {
                    display_name,
                    bytes_in,
                });
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(socket, close_code::UNSUPPORTED, "binary messages not supported").await;
                return Err(NetError::JoinRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            incoming = socket.recv() => {
                match handle_incoming_ws(incoming, ctx).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Frequent channel: lossy, the next batch supersedes a missed one.
            pose_msg = ctx.pose_bytes_rx.recv() => {
                match pose_msg {
                    Ok(bytes) => matches!(forward_bytes(bytes, socket, ctx).await, LoopControl::Disconnect),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(&mut ctx.last_lag_log) {
                            warn!(missed = n, "pose batches lagged; skipping");
                        }
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::UpdatesClosed);
                        true
                    }
                }
            }

            // Reliable channel: a gap means this client's view is stale.
            reliable_msg = ctx.reliable_bytes_rx.recv() => {
                match reliable_msg {
                    Ok(bytes) => matches!(forward_bytes(bytes, socket, ctx).await, LoopControl::Disconnect),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(&mut ctx.last_lag_log) {
                            warn!(missed = n, "reliable events lagged; sending table state");
                        }
                        match encode_table_state(&ctx.table_state_rx) {
                            Some(bytes) => {
                                ctx.lag_recovery_count += 1;
                                matches!(forward_bytes(bytes, socket, ctx).await, LoopControl::Disconnect)
                            }
                            None => false,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::UpdatesClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    if let Err(e) = disconnect_cleanup(ctx).await {
        warn!(error = ?e, "error during disconnect cleanup");
        if fatal.is_none() {
            fatal = Some(e);
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    let participant_id = ctx.participant_id;
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                ctx.bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(_)) => {
                        if should_log(&mut ctx.last_invalid_input_log) {
                            warn!("duplicate join ignored");
                        }
                        Ok(LoopControl::Continue)
                    }
                    Ok(ClientMessage::Command(payload)) => {
                        let entity_id = EntityId(payload.entity_id);
                        match EntityCommand::try_from(payload.command) {
                            Ok(command) => {
                                let event = TableEvent::Command {
                                    participant_id,
                                    entity_id,
                                    command,
                                };
                                forward_event(&ctx.input_tx, event, &mut ctx.last_input_full_log).await
                            }
                            Err(e) => {
                                if should_log(&mut ctx.last_invalid_input_log) {
                                    warn!(entity_id = entity_id.0, error = %e, "command dropped");
                                }
                                Ok(LoopControl::Continue)
                            }
                        }
                    }
                    Ok(ClientMessage::Spawn(payload)) => match SpawnRequest::try_from(payload) {
                        Ok(request) => {
                            let event = TableEvent::Spawn {
                                participant_id,
                                request,
                            };
                            forward_event(&ctx.input_tx, event, &mut ctx.last_input_full_log).await
                        }
                        Err(e) => {
                            if should_log(&mut ctx.last_invalid_input_log) {
                                warn!(error = %e, "spawn request dropped");
                            }
                            Ok(LoopControl::Continue)
                        }
                    },
                    Ok(ClientMessage::Despawn(payload)) => {
                        let event = TableEvent::Despawn {
                            participant_id,
                            entity_id: EntityId(payload.entity_id),
                        };
                        forward_event(&ctx.input_tx, event, &mut ctx.last_input_full_log).await
                    }
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_input_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if ctx.invalid_json > MAX_INVALID_JSON {
                            ctx.close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

// Pose streaming drops on a full queue rather than stalling the socket; every
// other event waits for room.
async fn forward_event(
    input_tx: &mpsc::Sender<TableEvent>,
    event: TableEvent,
    last_full_log: &mut Instant,
) -> Result<LoopControl, NetError> {
    if !event.is_droppable() {
        input_tx.send(event).await.map_err(|_| NetError::InputClosed)?;
        return Ok(LoopControl::Continue);
    }

    match input_tx.try_send(event) {
        Ok(()) => Ok(LoopControl::Continue),
        Err(mpsc::error::TrySendError::Full(_evt)) => {
            if should_log(last_full_log) {
                warn!("table input channel full; dropping pose update");
            }
            Ok(LoopControl::Continue)
        }
        Err(mpsc::error::TrySendError::Closed(_evt)) => Err(NetError::InputClosed),
    }
}

async fn forward_bytes(bytes: Utf8Bytes, socket: &mut WebSocket, ctx: &mut ConnCtx) -> LoopControl {
    let len = bytes.len();
    match socket.send(Message::Text(bytes)).await {
        Ok(()) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to forward update");
            LoopControl::Disconnect
        }
    }
}

async fn disconnect_cleanup(ctx: &ConnCtx) -> Result<(), NetError> {
    // The authority force-ends any drag this participant still holds.
    ctx.input_tx
        .send(TableEvent::Leave {
            participant_id: ctx.participant_id,
        })
        .await
        .map_err(|_| NetError::InputClosed)?;

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        lag_recovery_count = ctx.lag_recovery_count,
        "connection stats"
    );
    info!("client disconnected");
    Ok(())
}
