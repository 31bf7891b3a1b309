use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use switchboard_core::ConnId;

use crate::signaling::router::{self, Session};
use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = ConnId::new();
    info!("new WebSocket connection: {:?}", conn);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let shutdown = state.registry.add(conn.clone(), tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut session = Session::new(conn.clone());

    // The receive loop runs inline so the leave path below is reached on
    // every exit: remote close, socket error, or a server-side shutdown
    // (heartbeat reap, name-collision eviction).
    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    router::dispatch(&mut session, &state, &text).await;
                }
                Some(Ok(Message::Pong(_))) => state.registry.mark_alive(&conn),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("socket error on {:?}: {}", conn, e);
                    break;
                }
            },
            _ = shutdown.notified() => break,
        }
    }

    router::disconnect(&mut session, &state).await;
    state.registry.remove(&conn);

    // Removing the registry entry drops the channel sender, so the
    // forwarder drains what is already queued (a server-initiated close
    // frame included) and ends on its own. Aborting it here would race
    // the close frame off the wire; only a wedged socket gets cut off.
    if timeout(Duration::from_secs(5), &mut send_task).await.is_err() {
        send_task.abort();
    }
    info!("WebSocket disconnected: {:?}", conn);
}
