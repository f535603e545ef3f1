use dashmap::DashMap;
use gather_models::{Message, MessageId, PresenceRecord, RoomId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{watch, RwLock};

use crate::{Feed, RealtimeStore, StoreError};

struct FeedSlot<T> {
    room: RoomId,
    limit: usize,
    tx: watch::Sender<Vec<T>>,
}

#[derive(Default)]
struct MessageLog {
    /// Room -> messages, ascending by (created_at, id).
    rooms: HashMap<RoomId, Vec<Message>>,
    index: HashMap<MessageId, RoomId>,
}

impl MessageLog {
    fn find(&self, id: &str) -> Option<&Message> {
        let room = self.index.get(id)?;
        self.rooms.get(room)?.iter().find(|m| m.id == id)
    }

    fn snapshot(&self, room: &RoomId, limit: usize) -> Vec<Message> {
        self.rooms
            .get(room)
            .map(|msgs| msgs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

fn presence_snapshot(
    records: &HashMap<UserId, PresenceRecord>,
    room: &RoomId,
    limit: usize,
) -> Vec<PresenceRecord> {
    let mut list: Vec<PresenceRecord> = records
        .values()
        .filter(|r| &r.room_id == room)
        .cloned()
        .collect();
    list.sort_by(|a, b| {
        b.last_active_at
            .cmp(&a.last_active_at)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    list.truncate(limit);
    list
}

/// In-process realtime store.
///
/// Writes hold the collection lock while notifying feeds, so a feed never
/// observes an older snapshot after a newer one.
pub struct MemoryStore {
    messages: RwLock<MessageLog>,
    presence: RwLock<HashMap<UserId, PresenceRecord>>,
    message_feeds: DashMap<u64, FeedSlot<Message>>,
    presence_feeds: DashMap<u64, FeedSlot<PresenceRecord>>,
    next_feed_id: AtomicU64,
    configured: bool,
    offline: AtomicBool,
    presence_writes: AtomicU64,
    read_merges: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(MessageLog::default()),
            presence: RwLock::new(HashMap::new()),
            message_feeds: DashMap::new(),
            presence_feeds: DashMap::new(),
            next_feed_id: AtomicU64::new(1),
            configured: true,
            offline: AtomicBool::new(false),
            presence_writes: AtomicU64::new(0),
            read_merges: AtomicU64::new(0),
        }
    }

    /// A store with no backend behind it; every call fails with
    /// [`StoreError::Unconfigured`].
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Simulate connectivity loss. Existing feeds stay open but stop
    /// receiving updates because every write fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        tracing::info!(offline, "memory store connectivity changed");
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Successful presence writes so far.
    pub fn presence_write_count(&self) -> u64 {
        self.presence_writes.load(Ordering::SeqCst)
    }

    /// Successful read-receipt merges so far.
    pub fn read_merge_count(&self) -> u64 {
        self.read_merges.load(Ordering::SeqCst)
    }

    /// Number of feeds whose receiver is still alive.
    pub fn open_feed_count(&self) -> usize {
        let messages = self
            .message_feeds
            .iter()
            .filter(|slot| !slot.tx.is_closed())
            .count();
        let presence = self
            .presence_feeds
            .iter()
            .filter(|slot| !slot.tx.is_closed())
            .count();
        messages + presence
    }

    pub async fn message(&self, id: &str) -> Option<Message> {
        self.messages.read().await.find(id).cloned()
    }

    pub async fn presence_of(&self, user_id: &str) -> Option<PresenceRecord> {
        self.presence.read().await.get(user_id).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if !self.configured {
            return Err(StoreError::Unconfigured(
                "no realtime backend configured".into(),
            ));
        }
        if self.is_offline() {
            return Err(StoreError::Unavailable("connection lost".into()));
        }
        Ok(())
    }

    fn feed_id(&self) -> u64 {
        self.next_feed_id.fetch_add(1, Ordering::Relaxed)
    }

    fn notify_messages(&self, log: &MessageLog, room: &RoomId) {
        self.message_feeds.retain(|_, slot| !slot.tx.is_closed());
        for slot in self.message_feeds.iter().filter(|s| &s.room == room) {
            slot.tx.send_replace(log.snapshot(room, slot.limit));
        }
    }

    fn notify_presence(&self, records: &HashMap<UserId, PresenceRecord>, room: &RoomId) {
        self.presence_feeds.retain(|_, slot| !slot.tx.is_closed());
        for slot in self.presence_feeds.iter().filter(|s| &s.room == room) {
            slot.tx
                .send_replace(presence_snapshot(records, room, slot.limit));
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeStore for MemoryStore {
    async fn subscribe_messages(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> Result<Feed<Message>, StoreError> {
        self.check()?;
        let log = self.messages.read().await;
        let (tx, rx) = watch::channel(log.snapshot(room, limit));
        let feed_id = self.feed_id();
        self.message_feeds.insert(
            feed_id,
            FeedSlot {
                room: room.clone(),
                limit,
                tx,
            },
        );
        tracing::debug!(room_id = %room, feed_id, limit, "message feed opened");
        Ok(rx)
    }

    async fn subscribe_presence(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> Result<Feed<PresenceRecord>, StoreError> {
        self.check()?;
        let records = self.presence.read().await;
        let (tx, rx) = watch::channel(presence_snapshot(&records, room, limit));
        let feed_id = self.feed_id();
        self.presence_feeds.insert(
            feed_id,
            FeedSlot {
                room: room.clone(),
                limit,
                tx,
            },
        );
        tracing::debug!(room_id = %room, feed_id, limit, "presence feed opened");
        Ok(rx)
    }

    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        self.check()?;
        let mut log = self.messages.write().await;
        if let Some(existing) = log.find(&message.id) {
            if existing.is_replay_of(&message) {
                tracing::debug!(message_id = %message.id, "replayed message ignored");
                return Ok(());
            }
            tracing::warn!(message_id = %message.id, "message id already taken by another message");
            return Err(StoreError::Conflict(message.id));
        }
        let room = message.room_id.clone();
        log.index.insert(message.id.clone(), room.clone());
        let msgs = log.rooms.entry(room.clone()).or_default();
        let pos = msgs.partition_point(|m| {
            (m.created_at, m.id.as_str()) <= (message.created_at, message.id.as_str())
        });
        msgs.insert(pos, message);
        self.notify_messages(&log, &room);
        Ok(())
    }

    async fn merge_read_by(&self, message_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut log = self.messages.write().await;
        let room = log
            .index
            .get(message_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(message_id.to_string()))?;
        let changed = log
            .rooms
            .get_mut(&room)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
            .map(|m| m.mark_read_by(user_id))
            .unwrap_or(false);
        self.read_merges.fetch_add(1, Ordering::SeqCst);
        if changed {
            self.notify_messages(&log, &room);
        }
        Ok(())
    }

    async fn write_presence(&self, record: PresenceRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.presence.write().await;
        let room = record.room_id.clone();
        let previous = records.insert(record.user_id.clone(), record);
        self.presence_writes.fetch_add(1, Ordering::SeqCst);
        self.notify_presence(&records, &room);
        if let Some(prev) = previous.filter(|p| p.room_id != room) {
            self.notify_presence(&records, &prev.room_id);
        }
        Ok(())
    }
}
