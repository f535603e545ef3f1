use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::room::RoomId;
use crate::{MessageId, UserId};

/// Delivery state shown next to a message: one tick once sent, two once
/// anyone besides the sender has read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Sent,
    Read,
}

/// A chat message as stored in a room feed.
///
/// Everything except `read_by` is fixed at send time. `read_by` only ever
/// grows: see [`Message::mark_read_by`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub room_id: RoomId,
    #[serde(default)]
    pub text: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub image: Option<String>,
    #[serde(default = "unknown_sender")]
    pub sender_id: UserId,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_by: BTreeSet<UserId>,
}

fn unknown_sender() -> UserId {
    "unknown".to_string()
}

fn default_sender_name() -> String {
    "User".to_string()
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}

impl Message {
    /// Build a freshly sent message. The sender has implicitly read it.
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: &str,
        sender_name: &str,
        text: &str,
        image: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            room_id,
            text: text.to_string(),
            image: image.filter(|i| !i.is_empty()).map(str::to_string),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            created_at,
            read_by: BTreeSet::from([sender_id.to_string()]),
        }
    }

    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.contains(user_id)
    }

    /// Add `user_id` to the read set. Returns false if it was already there.
    pub fn mark_read_by(&mut self, user_id: &str) -> bool {
        if self.is_read_by(user_id) {
            return false;
        }
        self.read_by.insert(user_id.to_string())
    }

    pub fn is_read_by_others(&self) -> bool {
        self.read_by.iter().any(|u| *u != self.sender_id)
    }

    pub fn read_status(&self) -> ReadStatus {
        if self.is_read_by_others() {
            ReadStatus::Read
        } else {
            ReadStatus::Sent
        }
    }

    /// Same message written twice. `read_by` is ignored since it grows after
    /// the first write.
    pub fn is_replay_of(&self, other: &Message) -> bool {
        self.id == other.id
            && self.room_id == other.room_id
            && self.sender_id == other.sender_id
            && self.text == other.text
            && self.image == other.image
            && self.created_at == other.created_at
    }

    /// True when `user_id` still owes this message a read receipt.
    pub fn awaits_receipt_from(&self, user_id: &str) -> bool {
        self.sender_id != user_id && !self.is_read_by(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Message {
        Message::new(
            "1".into(),
            RoomId::global(),
            "A",
            "Alice",
            "hi",
            None,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        )
    }

    #[test]
    fn sender_has_read_own_message() {
        let msg = sample();
        assert!(msg.is_read_by("A"));
        assert!(!msg.awaits_receipt_from("A"));
        assert!(msg.awaits_receipt_from("B"));
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut msg = sample();
        assert!(msg.mark_read_by("B"));
        assert!(!msg.mark_read_by("B"));
        assert_eq!(msg.read_by.iter().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn read_status_follows_other_readers() {
        let mut msg = sample();
        assert!(!msg.is_read_by_others());
        assert_eq!(msg.read_status(), ReadStatus::Sent);

        msg.mark_read_by("B");
        assert!(msg.is_read_by_others());
        assert_eq!(msg.read_status(), ReadStatus::Read);
    }

    #[test]
    fn decoded_record_without_sender_receipt_counts_any_reader() {
        let msg: Message = serde_json::from_value(json!({
            "id": "7",
            "senderId": "A",
            "createdAt": 1_700_000_000_000_i64,
            "readBy": ["B"],
        }))
        .unwrap();
        assert_eq!(msg.read_status(), ReadStatus::Read);

        let unread: Message = serde_json::from_value(json!({
            "id": "8",
            "senderId": "A",
            "createdAt": 1_700_000_000_000_i64,
        }))
        .unwrap();
        assert_eq!(unread.read_status(), ReadStatus::Sent);
    }

    #[test]
    fn replay_ignores_read_set() {
        let first = sample();
        let mut later = sample();
        later.mark_read_by("B");
        assert!(first.is_replay_of(&later));

        let mut other = sample();
        other.sender_id = "B".into();
        assert!(!first.is_replay_of(&other));
    }

    #[test]
    fn empty_image_is_dropped() {
        let msg = Message::new(
            "2".into(),
            RoomId::global(),
            "A",
            "Alice",
            "",
            Some(""),
            Utc::now(),
        );
        assert!(msg.image.is_none());
    }

    #[test]
    fn wire_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "1",
                "roomId": "global",
                "text": "hi",
                "senderId": "A",
                "senderName": "Alice",
                "createdAt": 1_700_000_000_000_i64,
                "readBy": ["A"],
            })
        );
    }

    #[test]
    fn sparse_record_decodes_with_defaults() {
        let msg: Message = serde_json::from_value(json!({
            "id": "9",
            "createdAt": 1_700_000_000_000_i64,
            "image": "",
        }))
        .unwrap();
        assert_eq!(msg.sender_id, "unknown");
        assert_eq!(msg.sender_name, "User");
        assert!(msg.room_id.is_global());
        assert!(msg.text.is_empty());
        assert!(msg.image.is_none());
        assert!(msg.read_by.is_empty());
    }
}
