use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z
const GATHER_EPOCH: u64 = 1_735_689_600_000;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(GATHER_EPOCH)
}

/// Generate a Snowflake ID.
/// Format: 42 bits timestamp | 10 bits worker | 12 bits sequence
pub fn generate(worker_id: u16) -> i64 {
    let timestamp = now_millis().saturating_sub(GATHER_EPOCH);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0xFFF;
    let id = (timestamp << 22) | ((worker_id as u64 & 0x3FF) << 12) | seq;
    id as i64
}

/// Id unique per sender: `<scope>-<snowflake>`. Two clients sharing a
/// worker id can mint the same snowflake in the same millisecond; the
/// scope keeps their ids apart.
pub fn scoped_id(scope: &str, worker_id: u16) -> String {
    format!("{scope}-{}", generate(worker_id))
}

/// Extract the Unix timestamp (ms) from a snowflake.
pub fn timestamp_millis(id: i64) -> u64 {
    ((id as u64) >> 22) + GATHER_EPOCH
}
