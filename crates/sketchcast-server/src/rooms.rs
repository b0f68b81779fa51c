//! Room registry shared by all connections.

use dashmap::DashMap;
use sketchcast_core::ServerMessage;
use std::collections::HashSet;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// A broadcast message plus the connection that must not receive it
/// (`None` delivers to everyone, the publisher included).
pub type Envelope = (Option<Uuid>, ServerMessage);

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<Envelope>,
    /// Connected connection IDs
    peers: HashSet<Uuid>,
    /// Last published snapshot (for late joiners)
    last_snapshot: Option<String>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            last_snapshot: None,
        }
    }
}

/// What a connection gets back when it joins a room.
pub struct Membership {
    pub rx: broadcast::Receiver<Envelope>,
    pub snapshot: Option<String>,
    pub peer_count: usize,
}

/// Shared application state
#[derive(Default)]
pub struct AppState {
    rooms: DashMap<String, Room>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room on first join.
    pub fn join_room(&self, room_id: &str, conn: Uuid) -> Membership {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        room.peers.insert(conn);
        Membership {
            rx: room.tx.subscribe(),
            snapshot: room.last_snapshot.clone(),
            peer_count: room.peers.len(),
        }
    }

    /// Remove a connection from a room. Empty rooms are dropped along with
    /// their snapshot.
    pub fn leave_room(&self, room_id: &str, conn: Uuid) {
        let emptied = match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                room.peers.remove(&conn);
                room.peers.is_empty()
            }
            None => false,
        };
        if emptied {
            self.rooms.remove_if(room_id, |_, room| room.peers.is_empty());
        }
    }

    /// Record a snapshot as the room's latest and send it to every member.
    /// The empty string clears the stored snapshot.
    ///
    /// Returns false if the room does not exist.
    pub fn publish(&self, room_id: &str, from: &str, data_url: String) -> bool {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        room.last_snapshot = (!data_url.is_empty()).then(|| data_url.clone());
        let _ = room.tx.send((
            None,
            ServerMessage::Snapshot {
                data_url,
                from: Some(from.to_string()),
            },
        ));
        true
    }

    /// Send a message to every member except `skip`.
    pub fn announce(&self, room_id: &str, skip: Uuid, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((Some(skip), msg));
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.peers.len())
    }

    pub fn last_snapshot(&self, room_id: &str) -> Option<String> {
        self.rooms.get(room_id).and_then(|room| room.last_snapshot.clone())
    }
}
