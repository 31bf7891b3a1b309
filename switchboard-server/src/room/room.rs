use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use switchboard_core::{BusyReason, CallId, CallRole, ConnId, EndReason, ServerFrame};

use crate::room::call::Call;
use crate::room::room_manager::deliver_join;
use crate::room::{RoomCommand, SignalKind};
use crate::signaling::Outbound;

struct Member {
    conn: ConnId,
    name: String,
}

/// One named rendezvous scope. All state for the room lives on this task
/// and commands are the only way in, so transitions are serialized and
/// the single-call and unique-name invariants need no locks.
pub struct Room {
    key: String,
    members: Vec<Member>,
    active_call: Option<Call>,
    command_rx: mpsc::Receiver<RoomCommand>,
    command_tx: mpsc::Sender<RoomCommand>,
    outbound: Arc<dyn Outbound>,
    rooms: Arc<DashMap<String, mpsc::Sender<RoomCommand>>>,
}

impl Room {
    pub(crate) fn new(
        key: String,
        command_rx: mpsc::Receiver<RoomCommand>,
        command_tx: mpsc::Sender<RoomCommand>,
        outbound: Arc<dyn Outbound>,
        rooms: Arc<DashMap<String, mpsc::Sender<RoomCommand>>>,
    ) -> Self {
        Self {
            key,
            members: Vec::new(),
            active_call: None,
            command_rx,
            command_tx,
            outbound,
            rooms,
        }
    }

    pub async fn run(mut self) {
        debug!("room '{}' event loop started", self.key);

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;
            if self.members.is_empty() {
                break;
            }
        }

        // Unregister, then refuse and drain the intake. A join that raced
        // into this actor's channel is handed to the room's replacement;
        // anything else would be a no-op here anyway.
        self.rooms
            .remove_if(&self.key, |_, tx| tx.same_channel(&self.command_tx));
        self.command_rx.close();
        while let Some(cmd) = self.command_rx.recv().await {
            if let RoomCommand::Join { conn, name } = cmd {
                deliver_join(&self.rooms, &self.outbound, &self.key, conn, name).await;
            }
        }

        info!("room '{}' is empty, closing", self.key);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { conn, name } => self.join(conn, name).await,
            RoomCommand::Leave { conn } => {
                self.leave(&conn).await;
                self.outbound.send(&conn, ServerFrame::Left).await;
            }
            RoomCommand::Disconnect { conn } => self.leave(&conn).await,
            RoomCommand::Invite { conn } => self.invite(conn).await,
            RoomCommand::RingAck { conn, call_id } => self.ring_ack(&conn, &call_id).await,
            RoomCommand::Accept { conn, call_id } => self.accept(&conn, &call_id).await,
            RoomCommand::Decline { conn, call_id } => self.decline(&conn, &call_id).await,
            RoomCommand::Hangup { conn, call_id } => self.hangup(&conn, &call_id).await,
            RoomCommand::Signal {
                conn,
                call_id,
                kind,
                payload,
            } => self.signal(&conn, &call_id, kind, payload).await,
            RoomCommand::RingTick { call_id } => self.ring_tick(&call_id).await,
            RoomCommand::RingExpired { call_id } => self.ring_expired(&call_id).await,
        }
    }

    async fn join(&mut self, conn: ConnId, name: String) {
        self.sweep_dead_members().await;

        // A connection joining again is treated as having left first.
        if self.members.iter().any(|m| m.conn == conn) {
            self.leave(&conn).await;
        }

        // Display names are unique per room; the prior holder is evicted.
        let holder = self
            .members
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.conn.clone());
        if let Some(holder) = holder {
            info!("room '{}': replacing member '{}'", self.key, name);
            self.outbound.close(&holder, "replaced").await;
            self.leave(&holder).await;
        }

        let peers: Vec<String> = self.members.iter().map(|m| m.name.clone()).collect();
        self.members.push(Member {
            conn: conn.clone(),
            name: name.clone(),
        });

        let state = ServerFrame::RoomState {
            room: self.key.clone(),
            peers,
        };
        self.outbound.send(&conn, state).await;
        self.broadcast_except(&conn, ServerFrame::PeerJoined { name: name.clone() })
            .await;
        info!(
            "room '{}': '{}' joined ({} members)",
            self.key,
            name,
            self.members.len()
        );
    }

    /// Shared leave path for explicit leaves, disconnects, sweeps, and
    /// evictions. Ends the active call first if the leaver is in it, so
    /// the `end` broadcast still reaches the leaver.
    async fn leave(&mut self, conn: &ConnId) {
        let Some(pos) = self.members.iter().position(|m| m.conn == *conn) else {
            return;
        };

        let in_call = self
            .active_call
            .as_ref()
            .is_some_and(|call| call.is_participant(conn));
        if in_call {
            self.end_call(EndReason::Left).await;
        }

        let member = self.members.remove(pos);
        self.broadcast(ServerFrame::PeerLeft {
            name: member.name.clone(),
        })
        .await;
        info!(
            "room '{}': '{}' left ({} members)",
            self.key,
            member.name,
            self.members.len()
        );
    }

    async fn invite(&mut self, conn: ConnId) {
        if !self.members.iter().any(|m| m.conn == conn) {
            let err = ServerFrame::Error {
                msg: "not in room".into(),
            };
            self.outbound.send(&conn, err).await;
            return;
        }
        if self.active_call.is_some() {
            let busy = ServerFrame::Busy {
                reason: BusyReason::CallActive,
            };
            self.outbound.send(&conn, busy).await;
            return;
        }

        let callee = self
            .members
            .iter()
            .find(|m| m.conn != conn)
            .map(|m| m.conn.clone());
        let Some(callee) = callee else {
            let busy = ServerFrame::Busy {
                reason: BusyReason::NoPeer,
            };
            self.outbound.send(&conn, busy).await;
            return;
        };

        let from = self.member_name(&conn).unwrap_or_default();
        let mut call = Call::new(conn.clone(), callee.clone());
        let call_id = call.id.clone();

        // The caller learns the id before the callee can possibly answer.
        self.outbound
            .send(
                &conn,
                ServerFrame::InviteOk {
                    call_id: call_id.clone(),
                },
            )
            .await;
        self.outbound
            .send(
                &callee,
                ServerFrame::Ring {
                    call_id: call_id.clone(),
                    from,
                },
            )
            .await;

        call.arm_ring_timer(self.command_tx.clone());
        self.active_call = Some(call);
        info!("room '{}': call {} ringing", self.key, call_id);
    }

    async fn ring_ack(&mut self, conn: &ConnId, call_id: &CallId) {
        let Some(call) = self.active_call.as_mut() else {
            return;
        };
        if call.id != *call_id || call.started || call.callee != *conn {
            return;
        }
        if call.acked {
            // Repeated acks are no-ops.
            return;
        }
        call.acked = true;
        call.cancel_ring_timer();
        let caller = call.caller.clone();

        self.outbound
            .send(
                &caller,
                ServerFrame::Ringing {
                    call_id: call_id.clone(),
                },
            )
            .await;
    }

    async fn accept(&mut self, conn: &ConnId, call_id: &CallId) {
        let Some(call) = self.active_call.as_mut() else {
            return;
        };
        if call.id != *call_id || call.started || call.callee != *conn {
            return;
        }
        call.started = true;
        call.cancel_ring_timer();
        let caller = call.caller.clone();
        let callee = call.callee.clone();
        let pending = call.take_pending();

        // Both sides see `start` before any buffered signaling.
        self.outbound
            .send(
                &caller,
                ServerFrame::Start {
                    call_id: call_id.clone(),
                    role: CallRole::Initiator,
                },
            )
            .await;
        self.outbound
            .send(
                &callee,
                ServerFrame::Start {
                    call_id: call_id.clone(),
                    role: CallRole::Callee,
                },
            )
            .await;

        for (dest, frame) in pending {
            self.outbound.send(&dest, frame).await;
        }
        info!("room '{}': call {} started", self.key, call_id);
    }

    async fn decline(&mut self, conn: &ConnId, call_id: &CallId) {
        let matches = self
            .active_call
            .as_ref()
            .is_some_and(|call| call.id == *call_id && !call.started && call.callee == *conn);
        if matches {
            self.end_call(EndReason::Declined).await;
        }
    }

    async fn hangup(&mut self, conn: &ConnId, call_id: &CallId) {
        let matches = self
            .active_call
            .as_ref()
            .is_some_and(|call| call.id == *call_id && call.is_participant(conn));
        if matches {
            self.end_call(EndReason::Hangup).await;
        }
    }

    async fn signal(&mut self, conn: &ConnId, call_id: &CallId, kind: SignalKind, payload: Value) {
        let Some(call) = self.active_call.as_mut() else {
            debug!("room '{}': dropping signal for stale call {}", self.key, call_id);
            return;
        };
        if call.id != *call_id {
            debug!("room '{}': dropping signal for stale call {}", self.key, call_id);
            return;
        }
        let Some(dest) = call.peer_of(conn).cloned() else {
            return;
        };

        let frame = match kind {
            SignalKind::Offer => ServerFrame::Offer {
                call_id: call_id.clone(),
                sdp: payload,
            },
            SignalKind::Answer => ServerFrame::Answer {
                call_id: call_id.clone(),
                sdp: payload,
            },
            SignalKind::Ice => ServerFrame::Ice {
                call_id: call_id.clone(),
                candidate: payload,
            },
        };

        if call.started {
            self.outbound.send(&dest, frame).await;
        } else {
            call.push_pending(dest, frame);
        }
    }

    async fn ring_tick(&mut self, call_id: &CallId) {
        let Some(call) = self.active_call.as_ref() else {
            return;
        };
        if call.id != *call_id || call.started || call.acked {
            return;
        }
        let from = self.member_name(&call.caller).unwrap_or_default();
        let callee = call.callee.clone();

        debug!("room '{}': re-ringing call {}", self.key, call_id);
        self.outbound
            .send(
                &callee,
                ServerFrame::Ring {
                    call_id: call_id.clone(),
                    from,
                },
            )
            .await;
    }

    async fn ring_expired(&mut self, call_id: &CallId) {
        let matches = self
            .active_call
            .as_ref()
            .is_some_and(|call| call.id == *call_id && !call.started && !call.acked);
        if matches {
            info!("room '{}': call {} went unanswered", self.key, call_id);
            self.end_call(EndReason::Timeout).await;
        }
    }

    /// Terminal transition: the `end` broadcast precedes clearing the
    /// active-call slot, so every member sees the termination before a
    /// later invite can be admitted.
    async fn end_call(&mut self, reason: EndReason) {
        let Some(mut call) = self.active_call.take() else {
            return;
        };
        call.cancel_ring_timer();
        self.broadcast(ServerFrame::End {
            call_id: call.id.clone(),
            reason,
        })
        .await;
        info!("room '{}': call {} ended ({:?})", self.key, call.id, reason);
    }

    async fn sweep_dead_members(&mut self) {
        let dead: Vec<ConnId> = self
            .members
            .iter()
            .filter(|m| !self.outbound.is_open(&m.conn))
            .map(|m| m.conn.clone())
            .collect();
        for conn in dead {
            debug!("room '{}': sweeping dead member {:?}", self.key, conn);
            self.leave(&conn).await;
        }
    }

    async fn broadcast(&self, frame: ServerFrame) {
        for member in &self.members {
            self.outbound.send(&member.conn, frame.clone()).await;
        }
    }

    async fn broadcast_except(&self, skip: &ConnId, frame: ServerFrame) {
        for member in self.members.iter().filter(|m| m.conn != *skip) {
            self.outbound.send(&member.conn, frame.clone()).await;
        }
    }

    fn member_name(&self, conn: &ConnId) -> Option<String> {
        self.members
            .iter()
            .find(|m| m.conn == *conn)
            .map(|m| m.name.clone())
    }
}
