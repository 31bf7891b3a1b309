mod call;
mod conn;
mod frame;

pub use call::CallId;
pub use conn::ConnId;
pub use frame::{BusyReason, CallRole, ClientFrame, EndReason, ServerFrame};

/// Inbound frames larger than this are dropped before parsing.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;
