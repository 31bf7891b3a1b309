use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use switchboard_core::{CallId, ConnId, ServerFrame};

use crate::room::RoomCommand;

/// Delay between ring re-deliveries while the callee has not acknowledged.
pub const RING_RESEND_INTERVAL: Duration = Duration::from_millis(800);

/// Ring re-deliveries before the call is considered unanswered.
pub const RING_MAX_RESENDS: u32 = 6;

/// One rendezvous attempt between two members of a room.
///
/// A call is RINGING from creation until `accept` flips `started`
/// (CONNECTING); the ENDED state is represented by dropping the call from
/// its room, after which its id is stale and frames naming it are ignored.
pub struct Call {
    pub id: CallId,
    pub caller: ConnId,
    pub callee: ConnId,
    pub started: bool,
    /// Whether the callee acknowledged the ring. Gates both the ringing
    /// notification (sent once) and the unanswered timeout.
    pub acked: bool,
    /// Signaling captured before the start barrier, destination resolved
    /// at receipt time. Drained in FIFO order on start.
    pending: VecDeque<(ConnId, ServerFrame)>,
    ring_task: Option<JoinHandle<()>>,
}

impl Call {
    pub fn new(caller: ConnId, callee: ConnId) -> Self {
        Self {
            id: CallId::new(),
            caller,
            callee,
            started: false,
            acked: false,
            pending: VecDeque::new(),
            ring_task: None,
        }
    }

    pub fn is_participant(&self, conn: &ConnId) -> bool {
        self.caller == *conn || self.callee == *conn
    }

    /// The other end of the call, if `conn` is a participant.
    pub fn peer_of(&self, conn: &ConnId) -> Option<&ConnId> {
        if *conn == self.caller {
            Some(&self.callee)
        } else if *conn == self.callee {
            Some(&self.caller)
        } else {
            None
        }
    }

    /// Schedule ring re-delivery: one tick per interval up to the resend
    /// bound, then a final expiry. The room re-validates every tick
    /// against the live call state, so a stale task is harmless.
    pub fn arm_ring_timer(&mut self, room_tx: mpsc::Sender<RoomCommand>) {
        let call_id = self.id.clone();
        self.ring_task = Some(tokio::spawn(async move {
            for _ in 0..RING_MAX_RESENDS {
                sleep(RING_RESEND_INTERVAL).await;
                let tick = RoomCommand::RingTick {
                    call_id: call_id.clone(),
                };
                if room_tx.send(tick).await.is_err() {
                    return;
                }
            }
            sleep(RING_RESEND_INTERVAL).await;
            let _ = room_tx.send(RoomCommand::RingExpired { call_id }).await;
        }));
    }

    pub fn cancel_ring_timer(&mut self) {
        if let Some(task) = self.ring_task.take() {
            task.abort();
        }
    }

    /// Buffer a pre-start frame for delivery after the start barrier.
    pub fn push_pending(&mut self, dest: ConnId, frame: ServerFrame) {
        self.pending.push_back((dest, frame));
    }

    /// Drain the pre-start buffer in arrival order.
    pub fn take_pending(&mut self) -> VecDeque<(ConnId, ServerFrame)> {
        std::mem::take(&mut self.pending)
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        self.cancel_ring_timer();
    }
}
