//! Multi-datagram message reassembly.
//!
//! Every part of a multipart message carries a 3-byte header segment
//! `{'M', total_parts, part_index}` followed by a payload segment, and the
//! parts of one message are sent with contiguous packet ids, so the
//! receiver can recover which message a part belongs to from
//! `first_id = id - index` alone - no separate message id is needed on the
//! wire.

use crate::packet::Packet;
use hashbrown::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

const MULTIPART_MARKER: u8 = b'M';

/// A decoded multipart header plus its payload segment, or `None` if the
/// packet isn't shaped like a multipart part at all.
struct MultipartHeader {
    total: u8,
    index: u8,
}

fn decode_header(packet: &Packet) -> Option<(MultipartHeader, &[u8])> {
    if packet.segments.len() != 2 {
        return None;
    }
    let header = &packet.segments[0];
    if header.len() != 3 || header[0] != MULTIPART_MARKER {
        return None;
    }
    Some((
        MultipartHeader {
            total: header[1],
            index: header[2],
        },
        &packet.segments[1],
    ))
}

struct PendingEntry {
    slots: Vec<Option<Vec<u8>>>,
    remaining: usize,
    last_touched: Instant,
}

#[derive(Default)]
pub struct MultipartTable {
    pending: HashMap<(SocketAddr, u32), PendingEntry>,
}

impl MultipartTable {
    pub fn new() -> MultipartTable {
        MultipartTable {
            pending: HashMap::new(),
        }
    }

    /// Feeds one received packet into the table. Returns:
    /// - `Ok(None)` if the packet isn't a multipart part (caller should
    ///   handle it as a plain single-part message).
    /// - `Ok(Some(message))` once the last missing part arrives, completing
    ///   and removing the entry.
    /// - `Err(())` if the packet is shaped like a multipart part but fails
    ///   the sanity check (`index >= total`) and must be dropped.
    pub fn accept(
        &mut self,
        peer: SocketAddr,
        packet: &Packet,
        now: Instant,
    ) -> Result<Option<Vec<u8>>, ()> {
        let (header, payload) = match decode_header(packet) {
            Some(parts) => parts,
            None => return Ok(None),
        };

        if header.index >= header.total {
            return Err(());
        }

        let first_id = packet.id.wrapping_sub(header.index as u32);
        let key = (peer, first_id);

        let entry = self.pending.entry(key).or_insert_with(|| PendingEntry {
            slots: vec![None; header.total as usize],
            remaining: header.total as usize,
            last_touched: now,
        });

        entry.last_touched = now;

        let slot = &mut entry.slots[header.index as usize];
        if slot.is_none() {
            *slot = Some(payload.to_vec());
            entry.remaining -= 1;
        }

        if entry.remaining == 0 {
            let entry = self.pending.remove(&key).expect("entry just matched");
            let message: Vec<u8> = entry
                .slots
                .into_iter()
                .flat_map(|slot| slot.expect("remaining reached zero"))
                .collect();
            Ok(Some(message))
        } else {
            Ok(None)
        }
    }

    /// Drops entries that haven't received a part within `max_age` of `now`,
    /// bounding memory under sustained packet loss.
    pub fn expire(&mut self, now: Instant, max_age: std::time::Duration) {
        self.pending
            .retain(|_, entry| now.saturating_duration_since(entry.last_touched) < max_age);
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000)
    }

    fn part(id: u32, total: u8, index: u8, payload: &[u8]) -> Packet {
        Packet::new(id, vec![vec![b'M', total, index], payload.to_vec()])
    }

    #[test]
    fn test_reassembles_in_arrival_order_independent_of_sequence() {
        let mut table = MultipartTable::new();
        let now = Instant::now();

        let parts = [
            part(100, 3, 0, b"foo"),
            part(102, 3, 2, b"baz"),
            part(101, 3, 1, b"bar"),
        ];

        let mut message = None;
        for p in &parts {
            let result = table.accept(peer(), p, now).unwrap();
            if result.is_some() {
                message = result;
            }
        }

        assert_eq!(message.unwrap(), b"foobarbaz".to_vec());
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_non_multipart_packet_passes_through_as_none() {
        let mut table = MultipartTable::new();
        let packet = Packet::new(1, vec![b"hello".to_vec()]);
        assert_eq!(table.accept(peer(), &packet, Instant::now()), Ok(None));
    }

    #[test]
    fn test_index_equal_to_total_is_rejected() {
        let mut table = MultipartTable::new();
        let bad = part(100, 2, 2, b"x");
        assert_eq!(table.accept(peer(), &bad, Instant::now()), Err(()));
    }

    #[test]
    fn test_duplicate_index_does_not_double_count_remaining() {
        let mut table = MultipartTable::new();
        let now = Instant::now();

        table.accept(peer(), &part(100, 2, 0, b"a"), now).unwrap();
        table.accept(peer(), &part(100, 2, 0, b"a"), now).unwrap();
        let result = table.accept(peer(), &part(101, 2, 1, b"b"), now).unwrap();

        assert_eq!(result.unwrap(), b"ab".to_vec());
    }

    #[test]
    fn test_expire_drops_stale_incomplete_entries() {
        let mut table = MultipartTable::new();
        let now = Instant::now();

        table.accept(peer(), &part(100, 2, 0, b"a"), now).unwrap();
        assert_eq!(table.pending_count(), 1);

        let later = now + std::time::Duration::from_secs(20);
        table.expire(later, std::time::Duration::from_secs(10));
        assert_eq!(table.pending_count(), 0);
    }
}
