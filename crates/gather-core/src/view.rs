use gather_models::{Message, PresenceRecord, RoomId};
use tokio::sync::watch;

use crate::error::ChatError;
use crate::stream::display_order;

/// Observable state handed to the UI layer.
///
/// Only the session's pump tasks and the facade write here. Every snapshot
/// is tagged with the room it came from and dropped if that room is no
/// longer the attached one.
pub struct ChatView {
    room: watch::Sender<Option<RoomId>>,
    messages: watch::Sender<Vec<Message>>,
    presence: watch::Sender<Vec<PresenceRecord>>,
    last_error: watch::Sender<Option<ChatError>>,
}

impl ChatView {
    pub fn new() -> Self {
        Self {
            room: watch::Sender::new(None),
            messages: watch::Sender::new(Vec::new()),
            presence: watch::Sender::new(Vec::new()),
            last_error: watch::Sender::new(None),
        }
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.room.borrow().clone()
    }

    fn is_attached_to(&self, room: &RoomId) -> bool {
        self.room.borrow().as_ref() == Some(room)
    }

    pub(crate) fn attach(&self, room: &RoomId) {
        self.room.send_replace(Some(room.clone()));
        self.messages.send_replace(Vec::new());
        self.presence.send_replace(Vec::new());
    }

    pub(crate) fn detach(&self) {
        self.room.send_replace(None);
        self.messages.send_replace(Vec::new());
        self.presence.send_replace(Vec::new());
    }

    /// Replace the message list with a newest-first snapshot of `room`.
    pub(crate) fn publish_messages(&self, room: &RoomId, snapshot: Vec<Message>) {
        if !self.is_attached_to(room) {
            tracing::debug!(room_id = %room, "dropping message snapshot for detached room");
            return;
        }
        self.messages.send_replace(display_order(snapshot));
    }

    pub(crate) fn publish_presence(&self, room: &RoomId, records: Vec<PresenceRecord>) {
        if !self.is_attached_to(room) {
            tracing::debug!(room_id = %room, "dropping presence snapshot for detached room");
            return;
        }
        self.presence.send_replace(records);
    }

    pub(crate) fn report_error(&self, err: ChatError) {
        tracing::warn!(error = %err, "chat error surfaced");
        self.last_error.send_replace(Some(err));
    }

    pub(crate) fn clear_error(&self) {
        self.last_error.send_if_modified(|current| current.take().is_some());
    }

    /// Messages of the attached room, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    pub fn watch_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages.subscribe()
    }

    /// Raw presence records of the attached room; staleness is not applied.
    pub fn presence(&self) -> Vec<PresenceRecord> {
        self.presence.borrow().clone()
    }

    pub fn watch_presence(&self) -> watch::Receiver<Vec<PresenceRecord>> {
        self.presence.subscribe()
    }

    pub fn last_error(&self) -> Option<ChatError> {
        self.last_error.borrow().clone()
    }

    pub fn watch_errors(&self) -> watch::Receiver<Option<ChatError>> {
        self.last_error.subscribe()
    }
}

impl Default for ChatView {
    fn default() -> Self {
        Self::new()
    }
}
