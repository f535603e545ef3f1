use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::room::RoomId;
use crate::UserId;

/// A time-stamped liveness claim by one user for one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub room_id: RoomId,
    #[serde(default)]
    pub user_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_active_at: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn new(
        user_id: &str,
        room_id: RoomId,
        user_name: &str,
        last_active_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            room_id,
            user_name: user_name.to_string(),
            last_active_at,
        }
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_active_at
    }

    /// Stale once the record is at least `stale_after` old.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.idle_for(now) >= stale_after
    }
}
