//! Client registry (§4.4): the closed `ClientKind` enumeration and the
//! FD_SETSIZE-equivalent cap on concurrently accepted descriptors.
//!
//! Tokio's reactor owns the real file descriptors, so there is no literal
//! `fd_set` to track; `Registry` enforces the same cap (§5 "Descriptor
//! cap") with an atomic counter instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Typical `FD_SETSIZE`.
pub const MAX_CLIENTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    StdinInput,
    StdoutStream,
    JsonListener,
    Nmea0183Listener,
    JsonOneshot,
    JsonStream,
    Nmea0183Stream,
}

impl ClientKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientKind::StdinInput => "stdin_input",
            ClientKind::StdoutStream => "stdout_stream",
            ClientKind::JsonListener => "json_listener",
            ClientKind::Nmea0183Listener => "nmea0183_listener",
            ClientKind::JsonOneshot => "json_oneshot",
            ClientKind::JsonStream => "json_stream",
            ClientKind::Nmea0183Stream => "nmea0183_stream",
        }
    }
}

/// Bounds the number of concurrently accepted client descriptors.
#[derive(Debug, Default)]
pub struct Registry {
    count: AtomicUsize,
}

/// Releases one registry slot on drop; held for the lifetime of one
/// accepted connection's serving task.
pub struct ClientGuard {
    registry: Arc<Registry>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Registry::default())
    }

    /// Reserve one slot, or return `None` if the table is full.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ClientGuard> {
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current >= MAX_CLIENTS {
                return None;
            }
            if self
                .count
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ClientGuard {
                    registry: Arc::clone(self),
                });
            }
        }
    }

    #[cfg(test)]
    pub fn in_use(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_frees_the_slot() {
        let registry = Registry::new();
        {
            let _guard = registry.try_acquire().unwrap();
            assert_eq!(registry.in_use(), 1);
        }
        assert_eq!(registry.in_use(), 0);
    }

    #[test]
    fn exceeding_the_cap_is_refused() {
        let registry = Registry::new();
        let mut guards = Vec::new();
        for _ in 0..MAX_CLIENTS {
            guards.push(registry.try_acquire().unwrap());
        }
        assert!(registry.try_acquire().is_none());
    }
}
