//! Backing realtime store for chat rooms.
//!
//! The chat core only needs push-based queries over two collections
//! (messages and presence records) plus three writes. Any pub/sub-capable
//! store can satisfy [`RealtimeStore`]; [`MemoryStore`] is the in-process
//! implementation.

pub mod memory;

pub use memory::MemoryStore;

use gather_models::{Message, PresenceRecord, RoomId};
use std::future::Future;
use thiserror::Error;
use tokio::sync::watch;

/// A live query. The current value is always the complete result set;
/// a newer value supersedes any older one.
pub type Feed<T> = watch::Receiver<Vec<T>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store not configured: {0}")]
    Unconfigured(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflicting write for id {0}")]
    Conflict(String),
}

pub trait RealtimeStore: Send + Sync + 'static {
    /// Messages of `room`, newest first, at most `limit`.
    fn subscribe_messages(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> impl Future<Output = Result<Feed<Message>, StoreError>> + Send;

    /// Presence records claiming `room`, most recently active first, at most `limit`.
    fn subscribe_presence(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> impl Future<Output = Result<Feed<PresenceRecord>, StoreError>> + Send;

    /// Append a message. Replaying an identical message is a no-op; a
    /// different message under an existing id is a [`StoreError::Conflict`].
    fn insert_message(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Union `user_id` into the message's read set.
    fn merge_read_by(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Upsert the presence record of `record.user_id` (last write wins).
    fn write_presence(
        &self,
        record: PresenceRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
