use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message};
use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use tracing::{error, warn};

use switchboard_core::{ConnId, ServerFrame};

use crate::signaling::Outbound;

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<Message>,
    alive: AtomicBool,
    shutdown: Arc<Notify>,
}

/// Send paths and liveness state for every open connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<ConnId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            conns: DashMap::new(),
        }
    }

    /// Register a freshly accepted connection. Returns the shutdown handle
    /// the socket task must select on; firing it breaks the receive loop
    /// and routes the connection through its leave path.
    pub fn add(&self, conn: ConnId, tx: mpsc::UnboundedSender<Message>) -> Arc<Notify> {
        let shutdown = Arc::new(Notify::new());
        self.conns.insert(
            conn,
            ConnectionEntry {
                tx,
                alive: AtomicBool::new(true),
                shutdown: shutdown.clone(),
            },
        );
        shutdown
    }

    pub fn remove(&self, conn: &ConnId) {
        self.conns.remove(conn);
    }

    /// Called on Pong receipt; a connection answering pings survives sweeps.
    pub fn mark_alive(&self, conn: &ConnId) {
        if let Some(entry) = self.conns.get(conn) {
            entry.alive.store(true, Ordering::Relaxed);
        }
    }

    /// One liveness sweep: connections that never answered the previous
    /// ping are closed, the rest are pinged again. Returns the reaped ids.
    pub fn sweep(&self) -> Vec<ConnId> {
        let mut reaped = Vec::new();
        for entry in self.conns.iter() {
            if entry.alive.swap(false, Ordering::Relaxed) {
                let _ = entry.tx.send(Message::Ping(Vec::new()));
            } else {
                reaped.push(entry.key().clone());
            }
        }
        for conn in &reaped {
            self.close_entry(conn, "heartbeat timeout");
        }
        reaped
    }

    fn close_entry(&self, conn: &ConnId, reason: &str) {
        let Some(entry) = self.conns.get(conn) else {
            return;
        };
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Owned(reason.to_string()),
        };
        let _ = entry.tx.send(Message::Close(Some(frame)));
        entry.shutdown.notify_one();
    }
}

#[async_trait]
impl Outbound for ConnectionRegistry {
    async fn send(&self, conn: &ConnId, frame: ServerFrame) {
        let Some(entry) = self.conns.get(conn) else {
            warn!("attempted to send a frame to unregistered connection {:?}", conn);
            return;
        };
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if entry.tx.send(Message::Text(json)).is_err() {
                    warn!("send path closed for connection {:?}", conn);
                }
            }
            Err(e) => error!("failed to serialize outbound frame: {}", e),
        }
    }

    async fn close(&self, conn: &ConnId, reason: &str) {
        self.close_entry(conn, reason);
    }

    fn is_open(&self, conn: &ConnId) -> bool {
        self.conns
            .get(conn)
            .map(|entry| !entry.tx.is_closed())
            .unwrap_or(false)
    }
}
