use gather_models::{Message, MessageId, RoomId};
use gather_store::{Feed, RealtimeStore};
use gather_util::snowflake;
use std::future::Future;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::subscription::Subscription;

/// Bounded, ordered message feed of a room, plus the send path.
pub struct MessageStream<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    window: usize,
    worker_id: u16,
}

impl<S> Clone for MessageStream<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            window: self.window,
            worker_id: self.worker_id,
        }
    }
}

impl<S: RealtimeStore> MessageStream<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &ChatConfig) -> Self {
        Self {
            store,
            clock,
            window: config.message_window,
            worker_id: config.worker_id,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Follow the newest `message_window` messages of `room`, newest first.
    /// Each call of `on_snapshot` receives the full window.
    pub async fn subscribe<F, Fut>(
        &self,
        room: &RoomId,
        on_snapshot: F,
    ) -> Result<Subscription, ChatError>
    where
        F: FnMut(Vec<Message>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let feed = self.open_feed(room).await?;
        Ok(Subscription::spawn("messages", room.clone(), feed, on_snapshot))
    }

    /// Open the raw store feed behind [`MessageStream::subscribe`]. Clones
    /// of the returned feed share one store query.
    pub async fn open_feed(&self, room: &RoomId) -> Result<Feed<Message>, ChatError> {
        self.store
            .subscribe_messages(room, self.window)
            .await
            .map_err(|e| {
                tracing::warn!(room_id = %room, error = %e, "message subscription failed");
                ChatError::from(e)
            })
    }

    /// Send a message. The id is generated here and scoped to the sender, so
    /// a transport-level replay of this write cannot create a second copy and
    /// two senders never share an id. Not retried on failure.
    pub async fn publish(
        &self,
        room: &RoomId,
        sender_id: &str,
        sender_name: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<MessageId, ChatError> {
        let id = snowflake::scoped_id(sender_id, self.worker_id);
        let message = Message::new(
            id.clone(),
            room.clone(),
            sender_id,
            sender_name,
            text,
            image,
            self.clock.now(),
        );
        if let Err(e) = self.store.insert_message(message).await {
            tracing::warn!(room_id = %room, message_id = %id, error = %e, "publish failed");
            return Err(e.into());
        }
        tracing::debug!(room_id = %room, message_id = %id, user_id = sender_id, "message published");
        Ok(id)
    }
}

/// Reorder a newest-first snapshot for display (oldest at the top).
pub fn display_order(mut snapshot: Vec<Message>) -> Vec<Message> {
    snapshot.reverse();
    snapshot
}
