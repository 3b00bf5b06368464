//! Peer-to-channel assignment.
//!
//! A channel is a small integer standing in for a peer's full address, so
//! application code (and the sync engine's per-channel bookkeeping) never
//! has to carry a `SocketAddr` around. Assigned in first-seen order starting
//! at 1. `ANY`/`BROADCAST` never occupy a channel - there is no peer behind
//! either sentinel.

use hashbrown::HashMap;
use std::net::SocketAddr;

pub type ChannelId = u32;

#[derive(Default)]
pub struct ChannelTable {
    channels: HashMap<SocketAddr, ChannelId>,
    peers: HashMap<ChannelId, SocketAddr>,
    next: ChannelId,
}

impl ChannelTable {
    pub fn new() -> ChannelTable {
        ChannelTable {
            channels: HashMap::new(),
            peers: HashMap::new(),
            next: 1,
        }
    }

    /// Returns the existing channel for `peer`, assigning a fresh one if
    /// this is the first time it's been seen.
    pub fn get_or_assign(&mut self, peer: SocketAddr) -> ChannelId {
        if let Some(&channel) = self.channels.get(&peer) {
            return channel;
        }
        let channel = self.next;
        self.next += 1;
        self.channels.insert(peer, channel);
        self.peers.insert(channel, peer);
        channel
    }

    pub fn channel_of(&self, peer: &SocketAddr) -> Option<ChannelId> {
        self.channels.get(peer).copied()
    }

    pub fn peer_of(&self, channel: ChannelId) -> Option<SocketAddr> {
        self.peers.get(&channel).copied()
    }

    pub fn unbind(&mut self, peer: &SocketAddr) {
        if let Some(channel) = self.channels.remove(peer) {
            self.peers.remove(&channel);
        }
    }

    pub fn unbind_all(&mut self) {
        self.channels.clear();
        self.peers.clear();
    }

    pub fn peers(&self) -> impl Iterator<Item = &SocketAddr> {
        self.channels.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_assignment_starts_at_one_and_is_stable() {
        let mut table = ChannelTable::new();
        assert_eq!(table.get_or_assign(peer(9000)), 1);
        assert_eq!(table.get_or_assign(peer(9001)), 2);
        assert_eq!(table.get_or_assign(peer(9000)), 1);
    }

    #[test]
    fn test_unbind_removes_both_directions() {
        let mut table = ChannelTable::new();
        let channel = table.get_or_assign(peer(9000));
        table.unbind(&peer(9000));

        assert_eq!(table.channel_of(&peer(9000)), None);
        assert_eq!(table.peer_of(channel), None);
    }

    #[test]
    fn test_unbind_all_clears_table() {
        let mut table = ChannelTable::new();
        table.get_or_assign(peer(9000));
        table.get_or_assign(peer(9001));
        table.unbind_all();

        assert_eq!(table.channel_of(&peer(9000)), None);
        assert_eq!(table.peers().count(), 0);
    }
}
