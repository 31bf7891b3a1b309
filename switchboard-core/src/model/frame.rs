use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::CallId;

/// Frames a client may send. The `type` field selects the variant; every
/// other field sits beside it in the same JSON object. `sdp` and
/// `candidate` are opaque to the server and carried as raw JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    Join {
        room: String,
        #[serde(default)]
        name: String,
    },
    Invite,
    RingAck {
        call_id: CallId,
    },
    Accept {
        call_id: CallId,
    },
    Decline {
        call_id: CallId,
    },
    Hangup {
        call_id: CallId,
    },
    Offer {
        call_id: CallId,
        sdp: Value,
    },
    Answer {
        call_id: CallId,
        sdp: Value,
    },
    Ice {
        call_id: CallId,
        candidate: Value,
    },
    LeaveRoom,
}

impl ClientFrame {
    /// Every `type` value the server understands, used to tell an unknown
    /// type (rejected with an error frame) from a known type with bad
    /// fields (dropped).
    pub const KNOWN_TYPES: [&'static str; 10] = [
        "join",
        "invite",
        "ring-ack",
        "accept",
        "decline",
        "hangup",
        "offer",
        "answer",
        "ice",
        "leave-room",
    ];
}

/// Frames the server emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    RoomState {
        room: String,
        peers: Vec<String>,
    },
    PeerJoined {
        name: String,
    },
    PeerLeft {
        name: String,
    },
    InviteOk {
        call_id: CallId,
    },
    Ring {
        call_id: CallId,
        from: String,
    },
    Ringing {
        call_id: CallId,
    },
    Start {
        call_id: CallId,
        role: CallRole,
    },
    End {
        call_id: CallId,
        reason: EndReason,
    },
    Busy {
        reason: BusyReason,
    },
    Error {
        msg: String,
    },
    Left,
    Offer {
        call_id: CallId,
        sdp: Value,
    },
    Answer {
        call_id: CallId,
        sdp: Value,
    },
    Ice {
        call_id: CallId,
        candidate: Value,
    },
}

/// Which side of the call a participant plays once it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    Initiator,
    Callee,
}

/// Why a call reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Declined,
    Hangup,
    Timeout,
    Left,
}

/// Why an invite was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusyReason {
    CallActive,
    NoPeer,
}
