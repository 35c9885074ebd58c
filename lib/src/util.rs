mod offset_vec;

pub use offset_vec::*;

use std::sync::atomic::{AtomicU64, Ordering};

/// Fresh identifier, unique for the lifetime of the process
///
/// Used to tell apart constant pools and label owners without holding references to them.
pub fn fresh_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}
