use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use crate::signaling::ConnectionRegistry;

/// Period of the liveness sweep. A connection that answers no ping for
/// two consecutive sweeps is reaped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Run the liveness supervisor until the process exits. Reaping closes
/// the connection; its socket task then runs the normal leave path.
pub async fn run(registry: Arc<ConnectionRegistry>) {
    let mut ticker = interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // `interval` fires immediately; skip that so fresh connections get a
    // full period before their first ping.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let reaped = registry.sweep();
        if !reaped.is_empty() {
            warn!("heartbeat: reaped {} unresponsive connection(s)", reaped.len());
        }
    }
}
