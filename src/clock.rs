//! Wall-clock time (component A). A clock read failure is fatal (§7); since
//! it can only happen if the system time predates the Unix epoch, it is
//! handled in place rather than threaded through every caller as a `Result`.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_secs() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs(),
        Err(_) => {
            tracing::error!("system clock reads before the unix epoch");
            std::process::exit(70);
        }
    }
}
