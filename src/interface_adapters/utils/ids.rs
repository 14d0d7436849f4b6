use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

/// Returns a process-unique connection id.
///
/// Ids double as presence ownership tokens, so they must never repeat within
/// a running server. The counter starts at a random offset to keep ids from
/// different runs apart in aggregated logs.
pub fn next_conn_id() -> u64 {
    static NEXT: OnceLock<AtomicU64> = OnceLock::new();
    let next = NEXT.get_or_init(|| AtomicU64::new(u64::from(rand::random::<u32>())));
    next.fetch_add(1, Ordering::Relaxed)
}
