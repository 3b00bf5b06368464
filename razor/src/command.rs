//! Outgoing command batching and the COMMAND payload codec.

use crate::codec;
use crate::error::{ErrorType, NetworkError, NetworkResult};

/// Maximum commands packed into one COMMAND datagram.
pub const MAX_BATCH_SIZE: usize = 5;
/// Maximum size of a single command's payload.
pub const MAX_COMMAND_SIZE: usize = 200;
/// A command more than this many ticks ahead of the daemon's current tick
/// is rejected as implausible.
pub const MAX_TICKS_AHEAD: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingCommand {
    pub tick_number: u64,
    pub command_bytes: Vec<u8>,
}

impl OutgoingCommand {
    pub fn new(tick_number: u64, command_bytes: Vec<u8>) -> NetworkResult<OutgoingCommand> {
        if command_bytes.len() > MAX_COMMAND_SIZE {
            return Err(NetworkError::Fatal(ErrorType::OutOfRange));
        }
        Ok(OutgoingCommand {
            tick_number,
            command_bytes,
        })
    }
}

/// `uint16 count; {uint64 tick; uint32 len; bytes[len]} x count`.
pub fn serialize_batch(commands: &[OutgoingCommand]) -> NetworkResult<Vec<u8>> {
    if commands.len() > MAX_BATCH_SIZE {
        return Err(NetworkError::Fatal(ErrorType::OutOfRange));
    }

    let size: usize = 2 + commands
        .iter()
        .map(|c| 12 + c.command_bytes.len())
        .sum::<usize>();
    let mut buf = vec![0u8; size];

    let mut pos = codec::write_u16(&mut buf, 0, commands.len() as u16);
    for command in commands {
        pos += codec::write_u64(&mut buf, pos, command.tick_number);
        pos += codec::write_bytes(&mut buf, pos, &command.command_bytes);
    }

    Ok(buf)
}

pub fn deserialize_batch(data: &[u8]) -> NetworkResult<Vec<OutgoingCommand>> {
    if data.len() < 2 {
        return Err(NetworkError::Fatal(ErrorType::Malformed));
    }

    let (count, mut pos) = codec::read_u16(data, 0);
    if count as usize > MAX_BATCH_SIZE {
        return Err(NetworkError::Fatal(ErrorType::Malformed));
    }
    let mut commands = Vec::with_capacity(count as usize);

    for _ in 0..count {
        if pos + 12 > data.len() {
            break;
        }
        let (tick_number, len) = codec::read_u64(data, pos);
        pos += len;
        let (command_bytes, len) = codec::read_bytes(data, pos);
        pos += len;

        commands.push(OutgoingCommand {
            tick_number,
            command_bytes,
        });
    }

    Ok(commands)
}

/// Splits a backlog of commands into datagram-sized batches of at most
/// `MAX_BATCH_SIZE`, preserving submission order.
pub fn batch(commands: Vec<OutgoingCommand>) -> Vec<Vec<OutgoingCommand>> {
    commands
        .chunks(MAX_BATCH_SIZE)
        .map(|chunk| chunk.to_vec())
        .collect()
}
