use futures_util::future::join_all;
use gather_models::{Message, UserId};
use gather_store::RealtimeStore;

/// Merges the local user into `read_by` of messages they have seen.
///
/// At most `batch` merge writes are issued per snapshot so that opening a
/// room with a long unread backlog converges over a few snapshots instead of
/// one burst. The batch size is a tunable, not a protocol constant.
#[derive(Debug, Clone)]
pub struct ReadReceiptAggregator {
    user_id: UserId,
    batch: usize,
}

impl ReadReceiptAggregator {
    pub fn new(user_id: &str, batch: usize) -> Self {
        Self {
            user_id: user_id.to_string(),
            batch,
        }
    }

    /// Messages of `snapshot` still missing the local receipt, in stream order.
    pub fn pending<'a>(&self, snapshot: &'a [Message]) -> Vec<&'a Message> {
        snapshot
            .iter()
            .filter(|m| m.awaits_receipt_from(&self.user_id))
            .take(self.batch)
            .collect()
    }

    /// Issue the merge writes for one snapshot. Returns how many succeeded;
    /// failures are left for the next snapshot to pick up.
    pub async fn acknowledge<S: RealtimeStore>(&self, store: &S, snapshot: &[Message]) -> usize {
        let pending = self.pending(snapshot);
        if pending.is_empty() {
            return 0;
        }
        let writes = pending.iter().map(|m| async move {
            let result = store.merge_read_by(&m.id, &self.user_id).await;
            (m.id.as_str(), result)
        });

        let mut merged = 0;
        for (message_id, result) in join_all(writes).await {
            match result {
                Ok(()) => merged += 1,
                Err(e) => tracing::warn!(
                    user_id = %self.user_id,
                    message_id,
                    error = %e,
                    "read receipt merge failed"
                ),
            }
        }
        tracing::debug!(user_id = %self.user_id, merged, pending = pending.len(), "read receipts merged");
        merged
    }
}
