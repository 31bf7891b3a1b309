use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use switchboard_core::{ConnId, ServerFrame};
use switchboard_server::Outbound;

/// Recording `Outbound` sink: frames end up in a per-test channel and an
/// inspection log instead of crossing a socket, so room actors can be
/// exercised with no registry or transport at all.
#[derive(Clone)]
pub struct RecordingOutbound {
    tx: mpsc::UnboundedSender<(ConnId, ServerFrame)>,
    frames: Arc<Mutex<Vec<(ConnId, ServerFrame)>>>,
    closed: Arc<Mutex<Vec<(ConnId, String)>>>,
}

impl RecordingOutbound {
    /// Create the sink and the receiver its frames are mirrored to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ConnId, ServerFrame)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            frames: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(Vec::new())),
        };
        (sink, rx)
    }

    /// Every frame sent to one connection, in order.
    pub fn frames_for(&self, conn: &ConnId) -> Vec<ServerFrame> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == conn)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// The reason the connection was closed with, if it was.
    pub fn close_reason_for(&self, conn: &ConnId) -> Option<String> {
        self.closed
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == conn)
            .map(|(_, reason)| reason.clone())
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send(&self, conn: &ConnId, frame: ServerFrame) {
        self.frames
            .lock()
            .unwrap()
            .push((conn.clone(), frame.clone()));
        let _ = self.tx.send((conn.clone(), frame));
    }

    async fn close(&self, conn: &ConnId, reason: &str) {
        self.closed
            .lock()
            .unwrap()
            .push((conn.clone(), reason.to_string()));
    }

    fn is_open(&self, conn: &ConnId) -> bool {
        !self.closed.lock().unwrap().iter().any(|(id, _)| id == conn)
    }
}
