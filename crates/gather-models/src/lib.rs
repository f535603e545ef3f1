pub mod event;
pub mod message;
pub mod presence;
pub mod room;

pub use event::EventSummary;
pub use message::{Message, ReadStatus};
pub use presence::PresenceRecord;
pub use room::RoomId;

/// Opaque user identifier as issued by the user directory.
pub type UserId = String;
/// Opaque message identifier, generated by the sending client.
pub type MessageId = String;
