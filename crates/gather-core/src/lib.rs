pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod facade;
pub mod presence;
pub mod receipts;
pub mod session;
pub mod stream;
pub mod subscription;
pub mod view;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::ChatConfig;
pub use directory::{EventCatalog, StaticDirectory, UserDirectory};
pub use error::ChatError;
pub use facade::ChatFacade;
pub use session::{RoomSession, SessionState};

pub use gather_models::{EventSummary, Message, PresenceRecord, ReadStatus, RoomId};
pub use gather_store::{Feed, MemoryStore, RealtimeStore, StoreError};
