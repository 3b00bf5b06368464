//! Duplicate-datagram suppression.
//!
//! Tracks `(peer, packet id)` pairs for a fixed window before forgetting
//! them, so a retransmitted datagram is never delivered to the application
//! twice.

use hashbrown::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Window during which a repeated `(peer, packet id)` pair is dropped as a
/// duplicate.
pub const DUPLICATE_WINDOW: Duration = Duration::from_secs(10);

#[derive(Default)]
pub struct DedupTable {
    seen: HashMap<(SocketAddr, u32), Instant>,
}

impl DedupTable {
    pub fn new() -> DedupTable {
        DedupTable {
            seen: HashMap::new(),
        }
    }

    /// Returns `true` and records the id if this is the first time this
    /// peer/id pair has been seen within the duplicate window; returns
    /// `false` (without touching the table) if it's a repeat.
    pub fn observe(&mut self, peer: SocketAddr, packet_id: u32, now: Instant) -> bool {
        if let Some(&expiry) = self.seen.get(&(peer, packet_id)) {
            if now < expiry {
                return false;
            }
        }
        self.seen.insert((peer, packet_id), now + DUPLICATE_WINDOW);
        true
    }

    /// Drops every entry whose window has elapsed. Called opportunistically
    /// from the receive path rather than on a timer.
    pub fn expire(&mut self, now: Instant) {
        self.seen.retain(|_, &mut expiry| expiry > now);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
