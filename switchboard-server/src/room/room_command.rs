use serde_json::Value;

use switchboard_core::{CallId, ConnId};

/// Commands entering a room's event loop. Inbound frames, timer fires,
/// and socket teardown all arrive through this one channel, which is what
/// serializes state transitions per room.
#[derive(Debug)]
pub enum RoomCommand {
    /// A connection joins (or re-joins) under the given display name.
    Join { conn: ConnId, name: String },

    /// Explicit `leave-room`; confirmed back to the client with `left`.
    Leave { conn: ConnId },

    /// The connection's channel is gone; same leave path, no reply.
    Disconnect { conn: ConnId },

    /// Ask for a call with any other member of the room.
    Invite { conn: ConnId },

    RingAck { conn: ConnId, call_id: CallId },

    Accept { conn: ConnId, call_id: CallId },

    Decline { conn: ConnId, call_id: CallId },

    Hangup { conn: ConnId, call_id: CallId },

    /// Opaque offer/answer/ice payload to relay or buffer.
    Signal {
        conn: ConnId,
        call_id: CallId,
        kind: SignalKind,
        payload: Value,
    },

    /// Ring resend timer fired; re-validated against the live call.
    RingTick { call_id: CallId },

    /// Ring resends exhausted without an acknowledgement.
    RingExpired { call_id: CallId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Ice,
}
