//! Datagram framing.
//!
//! A `Packet` is the thing that goes on the wire as a single UDP datagram:
//! an id and a list of segments sharing that id.

use crate::codec;
use crate::error::{ErrorType, NetworkError, NetworkResult};

/// Maximum UDP payload this crate will send or accept.
pub const MAX_DATAGRAM_SIZE: usize = 508;
/// Maximum size of a single segment within a packet.
pub const MAX_SEGMENT_SIZE: usize = 496;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u32,
    pub segments: Vec<Vec<u8>>,
}

impl Packet {
    pub fn new(id: u32, segments: Vec<Vec<u8>>) -> Packet {
        Packet { id, segments }
    }

    /// Wire layout: `{id: u32, segment_count: u8, (len: u16, bytes)*}`.
    pub fn serialize(&self) -> NetworkResult<Vec<u8>> {
        if self.segments.len() > u8::MAX as usize {
            return Err(NetworkError::Fatal(ErrorType::OutOfRange));
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut pos = codec::write_u32(&mut buf, 0, self.id);
        pos += codec::write_u8(&mut buf, pos, self.segments.len() as u8);

        for segment in &self.segments {
            if segment.len() > u16::MAX as usize {
                return Err(NetworkError::Fatal(ErrorType::OutOfRange));
            }
            if pos + 2 + segment.len() > buf.len() {
                return Err(NetworkError::Fatal(ErrorType::OutOfRange));
            }
            pos += codec::write_u16(&mut buf, pos, segment.len() as u16);
            pos += codec::write_array(&mut buf, pos, segment);
        }

        buf.truncate(pos);
        Ok(buf)
    }

    /// Stops reading once `segment_count` segments have been recovered, or
    /// once the input is exhausted - whichever comes first. This tolerates a
    /// datagram truncated by the network layer without panicking.
    pub fn deserialize(data: &[u8]) -> NetworkResult<Packet> {
        if data.len() < 5 {
            return Err(NetworkError::Fatal(ErrorType::Malformed));
        }

        let (id, mut pos) = codec::read_u32(data, 0);
        let (segment_count, len) = codec::read_u8(data, pos);
        pos += len;

        let mut segments = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            if pos + 2 > data.len() {
                break;
            }
            let (seg_len, len) = codec::read_u16(data, pos);
            pos += len;
            let seg_len = seg_len as usize;

            if pos + seg_len > data.len() {
                break;
            }
            segments.push(data[pos..pos + seg_len].to_vec());
            pos += seg_len;
        }

        Ok(Packet { id, segments })
    }
}
