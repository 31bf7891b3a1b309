use serde_json::Value;
use tracing::debug;

use switchboard_core::{ClientFrame, ConnId, ServerFrame, MAX_FRAME_BYTES};

use crate::room::{RoomCommand, SignalKind};
use crate::signaling::Outbound;
use crate::AppState;

/// Router-side view of one connection: which room it currently claims.
/// Frames from one connection are dispatched in arrival order, so this
/// needs no synchronization.
pub struct Session {
    conn: ConnId,
    room: Option<String>,
}

impl Session {
    pub fn new(conn: ConnId) -> Self {
        Self { conn, room: None }
    }

    pub fn conn(&self) -> &ConnId {
        &self.conn
    }
}

enum Inbound {
    Frame(ClientFrame),
    UnknownType,
    Malformed,
}

/// Cheap classification pass before dispatch. Malformed input never gets
/// a reply; only a well-formed object with an unrecognized `type` does.
fn classify(text: &str) -> Inbound {
    if text.len() > MAX_FRAME_BYTES {
        return Inbound::Malformed;
    }
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Inbound::Malformed;
    };
    if !value.is_object() {
        return Inbound::Malformed;
    }
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Inbound::Malformed;
    };
    if !ClientFrame::KNOWN_TYPES.contains(&kind) {
        return Inbound::UnknownType;
    }
    match serde_json::from_value(value) {
        Ok(frame) => Inbound::Frame(frame),
        // Known type with missing or ill-typed fields.
        Err(_) => Inbound::Malformed,
    }
}

/// Handle one inbound text frame: exactly one state transition or relay,
/// or one of the error surfaces of the protocol.
pub async fn dispatch(session: &mut Session, state: &AppState, text: &str) {
    let frame = match classify(text) {
        Inbound::Frame(frame) => frame,
        Inbound::UnknownType => {
            let err = ServerFrame::Error {
                msg: "unknown message type".into(),
            };
            state.registry.send(&session.conn, err).await;
            return;
        }
        Inbound::Malformed => {
            debug!("dropping malformed frame from {:?}", session.conn);
            return;
        }
    };

    match frame {
        ClientFrame::Join { room, name } => join(session, state, room, name).await,
        ClientFrame::LeaveRoom => leave_room(session, state).await,
        other => {
            let Some(key) = session.room.as_deref() else {
                let err = ServerFrame::Error {
                    msg: "not in room".into(),
                };
                state.registry.send(&session.conn, err).await;
                return;
            };
            let Some(tx) = state.rooms.sender_of(key) else {
                debug!("room '{}' is gone, dropping frame from {:?}", key, session.conn);
                return;
            };
            if let Some(cmd) = room_command(&session.conn, other) {
                let _ = tx.send(cmd).await;
            }
        }
    }
}

/// Route the connection through its room's leave path after its channel
/// is gone. Called from socket teardown; safe when no room is claimed.
pub async fn disconnect(session: &mut Session, state: &AppState) {
    let Some(key) = session.room.take() else {
        return;
    };
    let Some(tx) = state.rooms.sender_of(&key) else {
        return;
    };
    let cmd = RoomCommand::Disconnect {
        conn: session.conn.clone(),
    };
    let _ = tx.send(cmd).await;
}

async fn join(session: &mut Session, state: &AppState, room: String, name: String) {
    // Room keys are non-empty strings; anything else is malformed.
    if room.is_empty() {
        debug!("dropping join with empty room key from {:?}", session.conn);
        return;
    }
    let name = if name.is_empty() {
        "peer".to_string()
    } else {
        name
    };

    // One room at a time: moving here is a leave there.
    disconnect(session, state).await;

    state.rooms.join(&room, session.conn.clone(), name).await;
    session.room = Some(room);
}

async fn leave_room(session: &mut Session, state: &AppState) {
    let Some(key) = session.room.take() else {
        // Idempotent: leaving while not in a room is still confirmed.
        state.registry.send(&session.conn, ServerFrame::Left).await;
        return;
    };
    match state.rooms.sender_of(&key) {
        Some(tx) => {
            let cmd = RoomCommand::Leave {
                conn: session.conn.clone(),
            };
            if tx.send(cmd).await.is_err() {
                state.registry.send(&session.conn, ServerFrame::Left).await;
            }
        }
        None => state.registry.send(&session.conn, ServerFrame::Left).await,
    }
}

fn room_command(conn: &ConnId, frame: ClientFrame) -> Option<RoomCommand> {
    let conn = conn.clone();
    Some(match frame {
        ClientFrame::Invite => RoomCommand::Invite { conn },
        ClientFrame::RingAck { call_id } => RoomCommand::RingAck { conn, call_id },
        ClientFrame::Accept { call_id } => RoomCommand::Accept { conn, call_id },
        ClientFrame::Decline { call_id } => RoomCommand::Decline { conn, call_id },
        ClientFrame::Hangup { call_id } => RoomCommand::Hangup { conn, call_id },
        ClientFrame::Offer { call_id, sdp } => RoomCommand::Signal {
            conn,
            call_id,
            kind: SignalKind::Offer,
            payload: sdp,
        },
        ClientFrame::Answer { call_id, sdp } => RoomCommand::Signal {
            conn,
            call_id,
            kind: SignalKind::Answer,
            payload: sdp,
        },
        ClientFrame::Ice { call_id, candidate } => RoomCommand::Signal {
            conn,
            call_id,
            kind: SignalKind::Ice,
            payload: candidate,
        },
        // Handled before this mapping is reached.
        ClientFrame::Join { .. } | ClientFrame::LeaveRoom => return None,
    })
}
