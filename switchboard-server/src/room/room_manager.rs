use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use switchboard_core::ConnId;

use crate::room::{Room, RoomCommand};
use crate::signaling::Outbound;

/// Command channel depth per room.
const ROOM_CHANNEL_CAPACITY: usize = 100;

/// Lazily creates room actors on first join and hands out their command
/// channels. Empty rooms unregister themselves, so a cached sender can go
/// stale; `deliver_join` retries against a fresh actor when that happens.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<String, mpsc::Sender<RoomCommand>>>,
    outbound: Arc<dyn Outbound>,
}

impl RoomManager {
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            outbound,
        }
    }

    /// Route a join into the named room, creating it if needed.
    pub async fn join(&self, key: &str, conn: ConnId, name: String) {
        deliver_join(&self.rooms, &self.outbound, key, conn, name).await;
    }

    /// Command channel of a live room, if one is registered under `key`.
    pub fn sender_of(&self, key: &str) -> Option<mpsc::Sender<RoomCommand>> {
        self.rooms.get(key).map(|tx| tx.clone())
    }
}

/// Deliver a join to the named room, spawning the actor on first use. A
/// send into an actor that emptied out and closed its intake fails; the
/// stale registration is dropped and the join retried on a fresh actor.
pub(crate) async fn deliver_join(
    rooms: &Arc<DashMap<String, mpsc::Sender<RoomCommand>>>,
    outbound: &Arc<dyn Outbound>,
    key: &str,
    conn: ConnId,
    name: String,
) {
    loop {
        let tx = room_sender(rooms, outbound, key);
        let join = RoomCommand::Join {
            conn: conn.clone(),
            name: name.clone(),
        };
        match tx.send(join).await {
            Ok(()) => return,
            Err(_) => {
                rooms.remove_if(key, |_, cached| cached.same_channel(&tx));
            }
        }
    }
}

fn room_sender(
    rooms: &Arc<DashMap<String, mpsc::Sender<RoomCommand>>>,
    outbound: &Arc<dyn Outbound>,
    key: &str,
) -> mpsc::Sender<RoomCommand> {
    match rooms.entry(key.to_string()) {
        Entry::Occupied(mut occupied) => {
            if occupied.get().is_closed() {
                let tx = spawn_room(rooms, outbound, key);
                occupied.insert(tx.clone());
                tx
            } else {
                occupied.get().clone()
            }
        }
        Entry::Vacant(vacant) => {
            let tx = spawn_room(rooms, outbound, key);
            vacant.insert(tx.clone());
            tx
        }
    }
}

fn spawn_room(
    rooms: &Arc<DashMap<String, mpsc::Sender<RoomCommand>>>,
    outbound: &Arc<dyn Outbound>,
    key: &str,
) -> mpsc::Sender<RoomCommand> {
    info!("creating room '{}'", key);
    let (tx, rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
    let room = Room::new(
        key.to_string(),
        rx,
        tx.clone(),
        outbound.clone(),
        rooms.clone(),
    );
    tokio::spawn(room.run());
    tx
}
