use gather_models::{Message, PresenceRecord, RoomId, UserId};
use gather_store::RealtimeStore;
use std::sync::Arc;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::presence::{Heartbeat, PresenceTracker};
use crate::receipts::ReadReceiptAggregator;
use crate::stream::MessageStream;
use crate::subscription::Subscription;
use crate::view::ChatView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Attaching,
    Active,
    Detaching,
}

/// Everything a session holds while attached to one room.
struct Attachment<S> {
    room: RoomId,
    user_id: UserId,
    user_name: watch::Receiver<String>,
    messages: Subscription,
    receipts: Subscription,
    presence: Subscription,
    heartbeat: Heartbeat<S>,
}

/// Owns the subscriptions and heartbeat of one (user, room) pair.
///
/// The session is the only writer of its timer and subscription handles;
/// callers go through `&mut self`, so lifecycle calls cannot interleave.
pub struct RoomSession<S: RealtimeStore> {
    stream: MessageStream<S>,
    tracker: PresenceTracker<S>,
    receipt_batch: usize,
    view: Arc<ChatView>,
    state: SessionState,
    attachment: Option<Attachment<S>>,
}

impl<S: RealtimeStore> RoomSession<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: &ChatConfig,
        view: Arc<ChatView>,
    ) -> Self {
        Self {
            stream: MessageStream::new(store.clone(), clock.clone(), config),
            tracker: PresenceTracker::new(store, clock, config),
            receipt_batch: config.read_receipt_batch,
            view,
            state: SessionState::Idle,
            attachment: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_room(&self) -> Option<&RoomId> {
        self.attachment.as_ref().map(|a| &a.room)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.user_id.as_str())
    }

    /// Attach to `room`. When already active this behaves as a room switch.
    pub async fn open(
        &mut self,
        user_id: &str,
        user_name: watch::Receiver<String>,
        room: RoomId,
    ) -> Result<(), ChatError> {
        if let Some(current) = &self.attachment {
            if current.room == room && current.user_id == user_id {
                return Ok(());
            }
            self.detach().await;
        }
        self.attach(user_id.to_string(), user_name, room).await
    }

    /// Move to `room`. The old room is fully torn down before anything is
    /// opened for the new one.
    pub async fn switch_room(&mut self, room: RoomId) -> Result<(), ChatError> {
        let Some(current) = &self.attachment else {
            return Err(ChatError::NoActiveRoom);
        };
        if current.room == room {
            return Ok(());
        }
        let user_id = current.user_id.clone();
        let user_name = current.user_name.clone();
        tracing::info!(user_id = %user_id, from = %current.room, to = %room, "switching room");
        self.detach().await;
        self.attach(user_id, user_name, room).await
    }

    pub async fn close(&mut self) {
        self.detach().await;
    }

    async fn attach(
        &mut self,
        user_id: UserId,
        user_name: watch::Receiver<String>,
        room: RoomId,
    ) -> Result<(), ChatError> {
        self.state = SessionState::Attaching;
        self.view.attach(&room);
        tracing::info!(user_id = %user_id, room_id = %room, "attaching to room");

        let (mut messages, mut receipts) =
            match self.subscribe_messages(&user_id, &room).await {
                Ok(subs) => subs,
                Err(e) => return Err(self.abort_attach(e)),
            };
        let presence = match self.subscribe_presence(&room).await {
            Ok(sub) => sub,
            Err(e) => {
                messages.cancel().await;
                receipts.cancel().await;
                return Err(self.abort_attach(e));
            }
        };
        let heartbeat = self
            .tracker
            .begin_heartbeat(&user_id, &room, user_name.clone())
            .await;

        self.attachment = Some(Attachment {
            room,
            user_id,
            user_name,
            messages,
            receipts,
            presence,
            heartbeat,
        });
        self.state = SessionState::Active;
        Ok(())
    }

    fn abort_attach(&mut self, err: ChatError) -> ChatError {
        self.view.detach();
        self.state = SessionState::Idle;
        err
    }

    /// One store feed, two pumps: the view pump publishes every snapshot
    /// as it arrives, the receipt pump writes read receipts at its own pace.
    async fn subscribe_messages(
        &self,
        user_id: &str,
        room: &RoomId,
    ) -> Result<(Subscription, Subscription), ChatError> {
        let feed = self.stream.open_feed(room).await?;

        let view = self.view.clone();
        let tagged = room.clone();
        let messages = Subscription::spawn(
            "messages",
            room.clone(),
            feed.clone(),
            move |snapshot: Vec<Message>| {
                view.publish_messages(&tagged, snapshot);
                std::future::ready(())
            },
        );

        let store = self.stream.store().clone();
        let aggregator = ReadReceiptAggregator::new(user_id, self.receipt_batch);
        let receipts = Subscription::spawn(
            "receipts",
            room.clone(),
            feed,
            move |snapshot: Vec<Message>| {
                let store = store.clone();
                let aggregator = aggregator.clone();
                async move {
                    aggregator.acknowledge(store.as_ref(), &snapshot).await;
                }
            },
        );
        Ok((messages, receipts))
    }

    async fn subscribe_presence(&self, room: &RoomId) -> Result<Subscription, ChatError> {
        let view = self.view.clone();
        let tagged = room.clone();
        self.tracker
            .subscribe_online(room, move |records: Vec<PresenceRecord>| {
                view.publish_presence(&tagged, records);
                std::future::ready(())
            })
            .await
    }

    /// Tear down in order: heartbeat, messages and receipts, presence. Never
    /// fails.
    async fn detach(&mut self) {
        let Some(mut attachment) = self.attachment.take() else {
            self.state = SessionState::Idle;
            return;
        };
        self.state = SessionState::Detaching;
        attachment.heartbeat.cancel().await;
        attachment.messages.cancel().await;
        attachment.receipts.cancel().await;
        attachment.presence.cancel().await;
        self.view.detach();
        self.state = SessionState::Idle;
        tracing::info!(
            user_id = %attachment.user_id,
            room_id = %attachment.room,
            "detached from room"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use gather_store::MemoryStore;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        view: Arc<ChatView>,
        session: RoomSession<MemoryStore>,
        _name: watch::Sender<String>,
        name: watch::Receiver<String>,
    }

    fn fixture(store: MemoryStore) -> Fixture {
        let store = Arc::new(store);
        let view = Arc::new(ChatView::new());
        let session = RoomSession::new(
            store.clone(),
            Arc::new(TokioClock::new()),
            &ChatConfig::default(),
            view.clone(),
        );
        let (name_tx, name) = watch::channel("Alice".to_string());
        Fixture {
            store,
            view,
            session,
            _name: name_tx,
            name,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_reaches_active_with_two_feeds() {
        let mut f = fixture(MemoryStore::new());
        assert_eq!(f.session.state(), SessionState::Idle);

        f.session
            .open("A", f.name.clone(), RoomId::global())
            .await
            .unwrap();
        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.session.current_room(), Some(&RoomId::global()));
        assert_eq!(f.store.open_feed_count(), 2);
        assert_eq!(f.store.presence_write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_moves_presence_and_keeps_one_feed_pair() {
        let mut f = fixture(MemoryStore::new());
        f.session
            .open("A", f.name.clone(), RoomId::global())
            .await
            .unwrap();
        f.session.switch_room(RoomId::from("event42")).await.unwrap();

        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.store.open_feed_count(), 2);
        let record = f.store.presence_of("A").await.unwrap();
        assert_eq!(record.room_id, RoomId::from("event42"));
        // initial, final for global, initial for event42
        assert_eq!(f.store.presence_write_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_while_active_is_a_switch() {
        let mut f = fixture(MemoryStore::new());
        f.session
            .open("A", f.name.clone(), RoomId::global())
            .await
            .unwrap();
        f.session
            .open("A", f.name.clone(), RoomId::from("event42"))
            .await
            .unwrap();
        assert_eq!(f.session.current_room(), Some(&RoomId::from("event42")));
        assert_eq!(f.store.open_feed_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_to_same_room_is_a_no_op() {
        let mut f = fixture(MemoryStore::new());
        f.session
            .open("A", f.name.clone(), RoomId::global())
            .await
            .unwrap();
        f.session.switch_room(RoomId::global()).await.unwrap();
        assert_eq!(f.store.presence_write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_tears_everything_down() {
        let mut f = fixture(MemoryStore::new());
        f.session
            .open("A", f.name.clone(), RoomId::global())
            .await
            .unwrap();
        f.session.close().await;

        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.store.open_feed_count(), 0);
        assert_eq!(f.store.presence_write_count(), 2);
        assert!(f.view.current_room().is_none());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.store.presence_write_count(), 2);

        f.session.close().await;
        assert_eq!(f.store.presence_write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_store_fails_open_and_stays_idle() {
        let mut f = fixture(MemoryStore::unconfigured());
        let err = f
            .session
            .open("A", f.name.clone(), RoomId::global())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert_eq!(f.session.state(), SessionState::Idle);
        assert!(f.session.current_room().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn switch_without_room_is_rejected() {
        let mut f = fixture(MemoryStore::new());
        let err = f.session.switch_room(RoomId::global()).await.unwrap_err();
        assert_eq!(err, ChatError::NoActiveRoom);
    }
}
