use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::Level;

use switchboard_core::{CallId, ConnId, ServerFrame};
use switchboard_server::signaling::router::{self, Session};
use switchboard_server::{AppState, ConnectionRegistry, RoomManager};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn test_state() -> AppState {
    let registry = Arc::new(ConnectionRegistry::new());
    let rooms = RoomManager::new(registry.clone());
    AppState { registry, rooms }
}

/// A fake client: a registered connection whose outbound channel ends in
/// the test instead of a socket, with frames fed straight to the router.
pub struct TestPeer {
    pub session: Session,
    rx: mpsc::UnboundedReceiver<Message>,
}

pub fn connect(state: &AppState) -> TestPeer {
    let conn = ConnId::new();
    let (tx, rx) = mpsc::unbounded_channel();
    state.registry.add(conn.clone(), tx);
    TestPeer {
        session: Session::new(conn),
        rx,
    }
}

impl TestPeer {
    pub fn conn(&self) -> ConnId {
        self.session.conn().clone()
    }

    /// Feed one frame through the router as if it came off the socket.
    pub async fn send(&mut self, state: &AppState, frame: Value) {
        router::dispatch(&mut self.session, state, &frame.to_string()).await;
    }

    pub async fn send_raw(&mut self, state: &AppState, text: &str) {
        router::dispatch(&mut self.session, state, text).await;
    }

    /// Drop off the socket without saying goodbye, the way the socket
    /// task tears a connection down.
    pub async fn disconnect(&mut self, state: &AppState) {
        router::disconnect(&mut self.session, state).await;
        state.registry.remove(&self.conn());
    }

    /// Next outbound frame, decoded. Panics after a second of silence.
    pub async fn recv(&mut self) -> ServerFrame {
        match self.recv_message().await {
            Message::Text(text) => serde_json::from_str(&text).expect("undecodable frame"),
            other => panic!("unexpected non-text message: {:?}", other),
        }
    }

    /// Next raw message of any kind, for ping and close assertions.
    pub async fn recv_message(&mut self) -> Message {
        timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("connection channel closed")
    }

    /// Assert nothing arrives within a short grace window.
    pub async fn expect_silence(&mut self) {
        self.expect_silence_for(Duration::from_millis(200)).await;
    }

    pub async fn expect_silence_for(&mut self, window: Duration) {
        if let Ok(Some(msg)) = timeout(window, self.rx.recv()).await {
            panic!("expected silence, got {:?}", msg);
        }
    }

    /// Drain frames until the server closes this connection, asserting
    /// the close reason.
    pub async fn expect_closed(&mut self, reason: &str) {
        loop {
            match self.recv_message().await {
                Message::Close(Some(frame)) => {
                    assert_eq!(frame.reason, reason);
                    return;
                }
                Message::Close(None) => panic!("close frame without a reason"),
                _ => continue,
            }
        }
    }
}

/// Join and consume the `room-state` reply, returning the peer list.
pub async fn join(peer: &mut TestPeer, state: &AppState, room: &str, name: &str) -> Vec<String> {
    peer.send(
        state,
        serde_json::json!({"type": "join", "room": room, "name": name}),
    )
    .await;
    match peer.recv().await {
        ServerFrame::RoomState { room: got, peers } => {
            assert_eq!(got, room);
            peers
        }
        other => panic!("expected room-state, got {:?}", other),
    }
}

/// Send an invite and consume `invite-ok` and `ring`, returning the call
/// id both sides were told about.
pub async fn invite(state: &AppState, caller: &mut TestPeer, callee: &mut TestPeer) -> CallId {
    caller.send(state, serde_json::json!({"type": "invite"})).await;
    let call_id = match caller.recv().await {
        ServerFrame::InviteOk { call_id } => call_id,
        other => panic!("expected invite-ok, got {:?}", other),
    };
    match callee.recv().await {
        ServerFrame::Ring { call_id: id, .. } => assert_eq!(id, call_id),
        other => panic!("expected ring, got {:?}", other),
    }
    call_id
}
