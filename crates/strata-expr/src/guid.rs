//! Process-wide unique id generation for synthetic column names.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// `prefix` followed by a number never handed out before in this process.
pub fn generate_guid(prefix: &str) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", prefix, id)
}
