pub mod heartbeat;
pub mod room;
pub mod signaling;

use std::sync::Arc;

pub use room::{RoomCommand, RoomManager, SignalKind};
pub use signaling::{ConnectionRegistry, Outbound};

/// Shared handles behind the axum router.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: RoomManager,
}
