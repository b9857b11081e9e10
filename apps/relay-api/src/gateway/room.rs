//! Rooms, the room catalog, and per-room replay buffers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_common::packets::{ChatMessage, RoomDescriptor};

use super::registry::ConcurrentRegistry;
use super::session::ClientSession;

/// Chat messages older than this are not replayed to new sessions.
pub const REPLAY_RETENTION: Duration = Duration::from_secs(5 * 60);

/// A chat message kept for replay.
#[derive(Debug, Clone)]
pub struct ReplayEntry {
    pub timestamp: DateTime<Utc>,
    pub sender_id: u64,
    pub sender_username: String,
    pub chat: ChatMessage,
}

/// Recent chat history of one room, bounded by age only.
///
/// Expired entries are removed lazily, when a session is admitted to the
/// room. An idle room keeps its last five minutes of history until the next
/// admission.
#[derive(Default)]
pub struct ReplayBuffer {
    entries: ConcurrentRegistry<ReplayEntry>,
}

impl ReplayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ReplayEntry) {
        self.entries.add(entry);
    }

    /// All retained entries, oldest first.
    ///
    /// Arrival order and timestamp order can differ under concurrent
    /// delivery, so this always sorts.
    pub fn replay_ordered(&self) -> Vec<ReplayEntry> {
        let mut entries: Vec<ReplayEntry> = self
            .entries
            .snapshot()
            .into_iter()
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);
        entries
    }

    /// Drop entries whose age is at least [`REPLAY_RETENTION`]. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Utc::now())
    }

    pub fn prune_expired_at(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::seconds(REPLAY_RETENTION.as_secs() as i64);
        let mut removed = 0;
        self.entries.for_each(|id, entry| {
            if now.signed_duration_since(entry.timestamp) >= retention {
                self.entries.remove(id);
                removed += 1;
            }
        });
        removed
    }

    /// Advisory entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A named broadcast domain.
pub struct Room {
    pub id: u64,
    pub owner_id: String,
    pub name: String,
    /// Sessions currently admitted, keyed by session id.
    pub clients: ConcurrentRegistry<Arc<dyn ClientSession>>,
    pub replay: ReplayBuffer,
}

impl Room {
    pub fn new(id: u64, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            name: name.into(),
            clients: ConcurrentRegistry::new(),
            replay: ReplayBuffer::new(),
        }
    }

    pub fn descriptor(&self) -> RoomDescriptor {
        RoomDescriptor {
            room_id: self.id,
            owner_id: self.owner_id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Every room of the process. Rooms are never deleted, so ids are never
/// reclaimed.
#[derive(Default)]
pub struct RoomCatalog {
    rooms: ConcurrentRegistry<Arc<Room>>,
}

impl RoomCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_room(&self, owner_id: &str, name: &str) -> Arc<Room> {
        let (_, room) = self
            .rooms
            .add_with(|id| Arc::new(Room::new(id, owner_id, name)));
        tracing::info!(room_id = room.id, owner_id = %room.owner_id, name = %room.name, "room created");
        room
    }

    pub fn get(&self, room_id: u64) -> Option<Arc<Room>> {
        self.rooms.get(room_id)
    }

    /// All rooms ordered by id.
    pub fn list(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self.rooms.snapshot().into_iter().map(|(_, r)| r).collect();
        rooms.sort_by_key(|room| room.id);
        rooms
    }

    /// Advisory room count.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: DateTime<Utc>, text: &str) -> ReplayEntry {
        ReplayEntry {
            timestamp,
            sender_id: 1,
            sender_username: "alice".to_string(),
            chat: ChatMessage {
                timestamp: Some(relay_common::packets::to_timestamp(timestamp)),
                sender_username: "alice".to_string(),
                msg: text.to_string(),
            },
        }
    }

    #[test]
    fn replay_is_sorted_by_timestamp_not_insertion() {
        let buffer = ReplayBuffer::new();
        let t1 = Utc::now() - chrono::Duration::seconds(30);
        let t2 = t1 + chrono::Duration::seconds(10);
        let t3 = t2 + chrono::Duration::seconds(10);

        buffer.record(entry(t3, "third"));
        buffer.record(entry(t1, "first"));
        buffer.record(entry(t2, "second"));

        let texts: Vec<String> = buffer.replay_ordered().into_iter().map(|e| e.chat.msg).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn prune_removes_entries_at_or_past_retention() {
        let buffer = ReplayBuffer::new();
        let now = Utc::now();
        let retention = chrono::Duration::seconds(REPLAY_RETENTION.as_secs() as i64);

        buffer.record(entry(now - retention - chrono::Duration::seconds(1), "stale"));
        buffer.record(entry(now - retention, "boundary"));
        buffer.record(entry(now - chrono::Duration::seconds(5), "fresh"));

        assert_eq!(buffer.prune_expired_at(now), 2);
        let texts: Vec<String> = buffer.replay_ordered().into_iter().map(|e| e.chat.msg).collect();
        assert_eq!(texts, vec!["fresh"]);
    }

    #[test]
    fn prune_on_empty_buffer_is_noop() {
        let buffer = ReplayBuffer::new();
        assert_eq!(buffer.prune_expired(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn catalog_ids_match_room_ids() {
        let catalog = RoomCatalog::new();
        let lobby = catalog.create_room("usr_1", "lobby");
        let games = catalog.create_room("usr_2", "games");

        assert_eq!(lobby.id, 1);
        assert_eq!(games.id, 2);
        assert_eq!(catalog.get(2).unwrap().name, "games");
        assert!(catalog.get(3).is_none());

        let names: Vec<String> = catalog.list().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["lobby", "games"]);
    }

    #[test]
    fn descriptor_carries_room_identity() {
        let room = Room::new(9, "usr_owner", "ops");
        let descriptor = room.descriptor();
        assert_eq!(descriptor.room_id, 9);
        assert_eq!(descriptor.owner_id, "usr_owner");
        assert_eq!(descriptor.name, "ops");
    }
}
