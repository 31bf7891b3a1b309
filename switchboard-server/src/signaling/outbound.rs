use async_trait::async_trait;
use switchboard_core::{ConnId, ServerFrame};

/// Sink through which room logic reaches clients. The WebSocket layer
/// implements it for live connections; tests substitute a recording mock.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Serialize and deliver a frame to one connection. Delivery failures
    /// are swallowed; the heartbeat supervisor reaps dead channels.
    async fn send(&self, conn: &ConnId, frame: ServerFrame);

    /// Ask the connection's channel to shut down with a close reason.
    async fn close(&self, conn: &ConnId, reason: &str);

    /// Whether the connection still has an open send path.
    fn is_open(&self, conn: &ConnId) -> bool;
}
