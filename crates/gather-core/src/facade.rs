use gather_models::{EventSummary, Message, MessageId, PresenceRecord, RoomId, UserId};
use gather_store::RealtimeStore;
use gather_util::{data_url, validation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::clock::Clock;
use crate::config::ChatConfig;
use crate::directory::{EventCatalog, UserDirectory};
use crate::error::ChatError;
use crate::presence::{online_label, online_peers};
use crate::session::{RoomSession, SessionState};
use crate::stream::MessageStream;
use crate::view::ChatView;

const FALLBACK_DISPLAY_NAME: &str = "You";

/// The surface a UI layer drives: open, send, switch, close, and observe.
///
/// Lifecycle calls (`open_room`, `switch_room`, `close`) are serialized on
/// the session lock, so a call starts only after the previous teardown has
/// finished. The facade performs no I/O of its own beyond what the session,
/// the message stream and the collaborators do.
pub struct ChatFacade<S: RealtimeStore, D, E> {
    user_id: UserId,
    config: ChatConfig,
    clock: Arc<dyn Clock>,
    directory: D,
    catalog: E,
    stream: MessageStream<S>,
    session: Mutex<RoomSession<S>>,
    view: Arc<ChatView>,
    display_name: watch::Sender<String>,
    /// Set once the caller picks a name; the directory no longer overrides it.
    name_pinned: AtomicBool,
    events: watch::Sender<Vec<EventSummary>>,
}

impl<S, D, E> ChatFacade<S, D, E>
where
    S: RealtimeStore,
    D: UserDirectory,
    E: EventCatalog,
{
    pub fn new(
        user_id: &str,
        store: Arc<S>,
        directory: D,
        catalog: E,
        clock: Arc<dyn Clock>,
        config: ChatConfig,
    ) -> Result<Self, ChatError> {
        config.validate()?;
        let view = Arc::new(ChatView::new());
        let session = RoomSession::new(store.clone(), clock.clone(), &config, view.clone());
        Ok(Self {
            user_id: user_id.to_string(),
            stream: MessageStream::new(store, clock.clone(), &config),
            config,
            clock,
            directory,
            catalog,
            session: Mutex::new(session),
            view,
            display_name: watch::Sender::new(FALLBACK_DISPLAY_NAME.to_string()),
            name_pinned: AtomicBool::new(false),
            events: watch::Sender::new(Vec::new()),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Open the room of `event_ref` (the global room when absent). Opening
    /// while another room is attached switches to it.
    ///
    /// Each open reloads the event catalog and, unless a name was set with
    /// [`ChatFacade::set_display_name`], the directory display name.
    pub async fn open_room(&self, event_ref: Option<&str>) -> Result<(), ChatError> {
        let room = RoomId::resolve(event_ref);
        let mut session = self.session.lock().await;
        let result = self.open_locked(&mut session, room).await;
        self.record(result)
    }

    /// Move to another room. From idle this opens the room like
    /// [`ChatFacade::open_room`].
    pub async fn switch_room(&self, event_ref: Option<&str>) -> Result<(), ChatError> {
        let room = RoomId::resolve(event_ref);
        let mut session = self.session.lock().await;
        let result = if session.state() == SessionState::Idle {
            self.open_locked(&mut session, room).await
        } else {
            session.switch_room(room).await
        };
        self.record(result)
    }

    async fn open_locked(
        &self,
        session: &mut RoomSession<S>,
        room: RoomId,
    ) -> Result<(), ChatError> {
        self.refresh_display_name().await;
        self.refresh_events().await;
        session
            .open(&self.user_id, self.display_name.subscribe(), room)
            .await
    }

    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        session.close().await;
    }

    pub async fn send_text(&self, text: &str) -> Result<MessageId, ChatError> {
        if let Err(e) = validation::validate_message_text(text, self.config.max_text_len) {
            return Err(ChatError::from(e));
        }
        self.send(text, None).await
    }

    pub async fn send_image(&self, image_ref: &str) -> Result<MessageId, ChatError> {
        if let Err(e) = validation::validate_image_ref(image_ref) {
            return Err(ChatError::from(e));
        }
        self.send("", Some(image_ref)).await
    }

    /// Send a JPEG inline as a `data:` URL.
    pub async fn send_image_bytes(&self, jpeg: &[u8]) -> Result<MessageId, ChatError> {
        if jpeg.is_empty() {
            return Err(ChatError::InvalidInput("image is empty".into()));
        }
        self.send_image(&data_url::jpeg_data_url(jpeg)).await
    }

    /// A failed send is surfaced and never retried; sending again creates a
    /// new message.
    async fn send(&self, text: &str, image: Option<&str>) -> Result<MessageId, ChatError> {
        let room = self.session.lock().await.current_room().cloned();
        let Some(room) = room else {
            return self.record(Err(ChatError::NoActiveRoom));
        };
        let name = self.display_name();
        let result = self
            .stream
            .publish(&room, &self.user_id, &name, text, image)
            .await;
        self.record(result)
    }

    /// Use `name` for later sends and heartbeats. Blank names are ignored.
    /// A name set here survives later opens.
    pub fn set_display_name(&self, name: &str) {
        if self.apply_display_name(name) {
            self.name_pinned.store(true, Ordering::SeqCst);
        }
    }

    fn apply_display_name(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.display_name.send_replace(name.to_string());
        true
    }

    pub fn display_name(&self) -> String {
        self.display_name.borrow().clone()
    }

    async fn refresh_display_name(&self) {
        if self.name_pinned.load(Ordering::SeqCst) {
            return;
        }
        match self.directory.display_name(&self.user_id).await {
            Ok(Some(name)) => {
                self.apply_display_name(&name);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "display name lookup failed")
            }
        }
    }

    async fn refresh_events(&self) {
        match self.catalog.list_events().await {
            Ok(events) => {
                self.events.send_replace(events);
            }
            Err(e) => {
                tracing::warn!(error = %e, "event catalog lookup failed");
                self.events.send_replace(Vec::new());
            }
        }
    }

    fn record<T>(&self, result: Result<T, ChatError>) -> Result<T, ChatError> {
        match &result {
            Ok(_) => self.view.clear_error(),
            Err(e) => self.view.report_error(e.clone()),
        }
        result
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.view.current_room()
    }

    pub fn room_label(&self) -> Option<String> {
        let room = self.view.current_room()?;
        Some(room.label(&self.events.borrow()))
    }

    /// Messages of the current room, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.view.messages()
    }

    pub fn watch_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.view.watch_messages()
    }

    /// Peers inside the staleness window as of now, the local user included.
    pub fn online_peers(&self) -> Vec<PresenceRecord> {
        online_peers(
            &self.view.presence(),
            self.clock.now(),
            self.config.stale_after(),
        )
    }

    pub fn online_label(&self) -> String {
        online_label(&self.online_peers(), &self.user_id)
    }

    pub fn watch_presence(&self) -> watch::Receiver<Vec<PresenceRecord>> {
        self.view.watch_presence()
    }

    pub fn last_error(&self) -> Option<ChatError> {
        self.view.last_error()
    }

    pub fn watch_errors(&self) -> watch::Receiver<Option<ChatError>> {
        self.view.watch_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::directory::{DirectoryError, StaticDirectory};
    use gather_store::MemoryStore;
    use std::time::Duration;

    type Facade = ChatFacade<MemoryStore, StaticDirectory, StaticDirectory>;

    fn facade(store: &Arc<MemoryStore>, user: &str) -> Facade {
        let directory = StaticDirectory::new()
            .with_user("A", "Alice")
            .with_event("event42", "Beach cleanup");
        ChatFacade::new(
            user,
            store.clone(),
            directory.clone(),
            directory,
            Arc::new(TokioClock::new()),
            ChatConfig::default(),
        )
        .unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    struct BrokenDirectory;

    impl UserDirectory for BrokenDirectory {
        async fn display_name(&self, _: &str) -> Result<Option<String>, DirectoryError> {
            Err(DirectoryError::Lookup("directory offline".into()))
        }
    }

    impl EventCatalog for BrokenDirectory {
        async fn list_events(&self) -> Result<Vec<EventSummary>, DirectoryError> {
            Err(DirectoryError::Lookup("catalog offline".into()))
        }
    }

    #[test]
    fn invalid_config_is_a_configuration_error() {
        let config = ChatConfig {
            stale_after_secs: 10,
            ..ChatConfig::default()
        };
        let err = ChatFacade::new(
            "A",
            Arc::new(MemoryStore::new()),
            StaticDirectory::new(),
            StaticDirectory::new(),
            Arc::new(TokioClock::new()),
            config,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ChatError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn open_resolves_name_and_label() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        chat.open_room(Some("event42")).await.unwrap();

        assert_eq!(chat.display_name(), "Alice");
        assert_eq!(chat.room_label().as_deref(), Some("Beach cleanup"));
        assert_eq!(chat.state().await, SessionState::Active);

        chat.switch_room(None).await.unwrap();
        assert_eq!(chat.room_label().as_deref(), Some("Global"));
        chat.close().await;
        assert!(chat.room_label().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_user_falls_back_to_you() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "Z");
        chat.open_room(None).await.unwrap();
        assert_eq!(chat.display_name(), "You");
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn collaborator_failures_do_not_block_open() {
        let store = Arc::new(MemoryStore::new());
        let chat = ChatFacade::new(
            "A",
            store.clone(),
            BrokenDirectory,
            BrokenDirectory,
            Arc::new(TokioClock::new()),
            ChatConfig::default(),
        )
        .unwrap();
        chat.open_room(Some("event42")).await.unwrap();
        assert_eq!(chat.display_name(), "You");
        assert_eq!(chat.room_label().as_deref(), Some("Event Chat"));
        assert!(chat.last_error().is_none());
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn sending_requires_an_open_room() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        assert_eq!(chat.send_text("hi").await.unwrap_err(), ChatError::NoActiveRoom);
        assert_eq!(chat.last_error(), Some(ChatError::NoActiveRoom));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_input_is_rejected_before_sending() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        chat.open_room(None).await.unwrap();

        assert!(matches!(
            chat.send_text("   ").await,
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            chat.send_text(&"x".repeat(4001)).await,
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            chat.send_image("").await,
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            chat.send_image_bytes(&[]).await,
            Err(ChatError::InvalidInput(_))
        ));
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_surfaced_then_cleared() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        chat.open_room(None).await.unwrap();

        store.set_offline(true);
        let err = chat.send_text("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
        assert_eq!(chat.last_error(), Some(err));

        store.set_offline(false);
        chat.send_text("hi again").await.unwrap();
        assert!(chat.last_error().is_none());
        settle().await;
        assert_eq!(chat.messages().len(), 1);
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn images_are_sent_as_references() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        chat.open_room(None).await.unwrap();

        let id = chat.send_image_bytes(b"\xff\xd8\xff").await.unwrap();
        let stored = store.message(&id).await.unwrap();
        assert_eq!(stored.image.as_deref(), Some("data:image/jpeg;base64,/9j/"));
        assert!(stored.text.is_empty());
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn renamed_user_sends_under_new_name() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        chat.open_room(None).await.unwrap();
        chat.set_display_name("Ally");

        let id = chat.send_text("hi").await.unwrap();
        assert_eq!(store.message(&id).await.unwrap().sender_name, "Ally");
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn chosen_name_survives_reopen() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        chat.open_room(None).await.unwrap();
        assert_eq!(chat.display_name(), "Alice");

        chat.set_display_name("Ally");
        chat.close().await;
        chat.open_room(Some("event42")).await.unwrap();
        assert_eq!(chat.display_name(), "Ally");

        chat.set_display_name("   ");
        assert_eq!(chat.display_name(), "Ally");
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn switch_from_idle_resolves_name_and_label() {
        let store = Arc::new(MemoryStore::new());
        let chat = facade(&store, "A");
        chat.switch_room(Some("event42")).await.unwrap();

        assert_eq!(chat.display_name(), "Alice");
        assert_eq!(chat.room_label().as_deref(), Some("Beach cleanup"));
        let id = chat.send_text("hi").await.unwrap();
        assert_eq!(store.message(&id).await.unwrap().sender_name, "Alice");
        chat.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_backend_surfaces_once_per_open() {
        let store = Arc::new(MemoryStore::unconfigured());
        let chat = facade(&store, "A");
        let err = chat.open_room(None).await.unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert_eq!(chat.last_error(), Some(err));
        assert_eq!(chat.state().await, SessionState::Idle);
        assert_eq!(chat.online_label(), "No one online");
    }
}
