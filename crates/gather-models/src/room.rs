use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::EventSummary;

/// Room id of the app-wide chat.
pub const GLOBAL_ROOM: &str = "global";

const GLOBAL_LABEL: &str = "Global";
const UNKNOWN_EVENT_LABEL: &str = "Event Chat";

/// Canonical room identifier: the global sentinel or an event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn global() -> Self {
        Self(GLOBAL_ROOM.to_string())
    }

    /// Map an optional event reference to its room.
    /// Absent and empty references both resolve to the global room.
    pub fn resolve<S: AsRef<str>>(event_ref: Option<S>) -> Self {
        match event_ref.as_ref().map(|r| r.as_ref()) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::global(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_ROOM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The event this room is bound to, if any.
    pub fn event_id(&self) -> Option<&str> {
        (!self.is_global()).then_some(self.0.as_str())
    }

    /// Human readable name for the room header.
    pub fn label(&self, events: &[EventSummary]) -> String {
        match self.event_id() {
            None => GLOBAL_LABEL.to_string(),
            Some(id) => events
                .iter()
                .find(|e| e.id == id)
                .map(|e| e.title.clone())
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| UNKNOWN_EVENT_LABEL.to_string()),
        }
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(event_ref: &str) -> Self {
        Self::resolve(Some(event_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_empty_reference_is_global() {
        assert_eq!(RoomId::resolve(None::<&str>), RoomId::global());
        assert_eq!(RoomId::resolve(Some("")), RoomId::global());
        assert!(RoomId::resolve(Some("")).is_global());
    }

    #[test]
    fn event_reference_becomes_room() {
        let room = RoomId::resolve(Some("event42"));
        assert_eq!(room.as_str(), "event42");
        assert_eq!(room.event_id(), Some("event42"));
        assert!(!room.is_global());

        let numeric = RoomId::resolve(Some(42.to_string()));
        assert_eq!(numeric.as_str(), "42");
    }

    #[test]
    fn labels() {
        let events = vec![EventSummary::new("7", "Beach cleanup")];
        assert_eq!(RoomId::global().label(&events), "Global");
        assert_eq!(RoomId::from("7").label(&events), "Beach cleanup");
        assert_eq!(RoomId::from("8").label(&events), "Event Chat");
        assert_eq!(RoomId::from("8").label(&[]), "Event Chat");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomId::from("event42")).unwrap();
        assert_eq!(json, "\"event42\"");
    }
}
