use chrono::{DateTime, Duration, Utc};
use gather_models::{PresenceRecord, RoomId, UserId};
use gather_store::RealtimeStore;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::subscription::Subscription;

const NOBODY_ONLINE: &str = "No one online";
const ANONYMOUS_PEER: &str = "Someone";

/// Keeps the local user visibly online in a room and follows the raw
/// presence records of that room.
pub struct PresenceTracker<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    interval: std::time::Duration,
    limit: usize,
}

impl<S: RealtimeStore> PresenceTracker<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &ChatConfig) -> Self {
        Self {
            store,
            clock,
            interval: config.heartbeat_interval(),
            limit: config.presence_limit,
        }
    }

    /// Write a presence record now and then once per heartbeat interval.
    /// `user_name` is re-read on every beat so renames propagate.
    pub async fn begin_heartbeat(
        &self,
        user_id: &str,
        room: &RoomId,
        user_name: watch::Receiver<String>,
    ) -> Heartbeat<S> {
        let beat = Beat {
            store: self.store.clone(),
            clock: self.clock.clone(),
            user_id: user_id.to_string(),
            room: room.clone(),
            user_name,
        };
        beat.write("initial").await;

        let period = self.interval;
        let task_beat = beat.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task_beat.write("refresh").await;
            }
        });
        tracing::info!(user_id, room_id = %room, "heartbeat started");

        Heartbeat {
            beat,
            task: Some(task),
        }
    }

    /// Follow up to `presence_limit` records of `room`, most recently active
    /// first. Records are delivered unfiltered; see [`online_peers`].
    pub async fn subscribe_online<F, Fut>(
        &self,
        room: &RoomId,
        on_snapshot: F,
    ) -> Result<Subscription, ChatError>
    where
        F: FnMut(Vec<PresenceRecord>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let feed = self
            .store
            .subscribe_presence(room, self.limit)
            .await
            .map_err(|e| {
                tracing::warn!(room_id = %room, error = %e, "presence subscription failed");
                ChatError::from(e)
            })?;
        Ok(Subscription::spawn("presence", room.clone(), feed, on_snapshot))
    }
}

struct Beat<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    user_id: UserId,
    room: RoomId,
    user_name: watch::Receiver<String>,
}

impl<S> Clone for Beat<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            user_id: self.user_id.clone(),
            room: self.room.clone(),
            user_name: self.user_name.clone(),
        }
    }
}

impl<S: RealtimeStore> Beat<S> {
    fn record(&self) -> PresenceRecord {
        let name = self.user_name.borrow().clone();
        PresenceRecord::new(&self.user_id, self.room.clone(), &name, self.clock.now())
    }

    /// Failures are logged only; the next beat retries.
    async fn write(&self, phase: &'static str) {
        let record = self.record();
        match self.store.write_presence(record).await {
            Ok(()) => tracing::debug!(
                user_id = %self.user_id,
                room_id = %self.room,
                phase,
                "presence written"
            ),
            Err(e) => tracing::warn!(
                user_id = %self.user_id,
                room_id = %self.room,
                phase,
                error = %e,
                "presence write failed"
            ),
        }
    }
}

/// A running heartbeat. [`Heartbeat::cancel`] stops the schedule and writes
/// one last record; calling it again does nothing.
pub struct Heartbeat<S> {
    beat: Beat<S>,
    task: Option<JoinHandle<()>>,
}

impl<S: RealtimeStore> Heartbeat<S> {
    pub fn room(&self) -> &RoomId {
        &self.beat.room
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn cancel(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        let _ = task.await;
        self.beat.write("final").await;
        tracing::info!(user_id = %self.beat.user_id, room_id = %self.beat.room, "heartbeat stopped");
    }
}

impl<S> Drop for Heartbeat<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Records still inside the staleness window, in feed order.
pub fn online_peers(
    records: &[PresenceRecord],
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<PresenceRecord> {
    records
        .iter()
        .filter(|r| !r.user_id.is_empty() && !r.is_stale(now, stale_after))
        .cloned()
        .collect()
}

/// Header label for the online pill, excluding the local user.
pub fn online_label(online: &[PresenceRecord], local_user: &str) -> String {
    let others: Vec<&PresenceRecord> = online.iter().filter(|r| r.user_id != local_user).collect();
    match others.as_slice() {
        [] => NOBODY_ONLINE.to_string(),
        [only] if only.user_name.is_empty() => format!("{ANONYMOUS_PEER} online"),
        [only] => format!("{} online", only.user_name),
        many => format!("{} online", many.len()),
    }
}
