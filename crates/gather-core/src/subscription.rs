use gather_models::RoomId;
use gather_store::Feed;
use std::future::Future;
use tokio::task::JoinHandle;

/// Handle to a live feed being pumped into a snapshot handler.
///
/// `cancel` is idempotent. Once it returns, the handler will not run again:
/// the pump task has been aborted and joined. Dropping the handle without
/// cancelling aborts the pump but cannot wait for it.
pub struct Subscription {
    kind: &'static str,
    room: RoomId,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Deliver the feed's current snapshot, then every later one, to
    /// `on_snapshot`. Snapshots that arrive while the handler is busy
    /// collapse into the newest.
    pub(crate) fn spawn<T, F, Fut>(
        kind: &'static str,
        room: RoomId,
        mut feed: Feed<T>,
        mut on_snapshot: F,
    ) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut(Vec<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_room = room.clone();
        let task = tokio::spawn(async move {
            loop {
                let snapshot = feed.borrow_and_update().clone();
                tracing::debug!(kind, room_id = %task_room, len = snapshot.len(), "snapshot");
                on_snapshot(snapshot).await;
                if feed.changed().await.is_err() {
                    tracing::debug!(kind, room_id = %task_room, "feed closed by store");
                    break;
                }
            }
        });
        Self {
            kind,
            room,
            task: Some(task),
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn cancel(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        // Join so no handler invocation can outlive this call.
        let _ = task.await;
        tracing::debug!(kind = self.kind, room_id = %self.room, "subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
