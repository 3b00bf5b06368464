//! Application message envelope, carried inside the part payload a
//! `Connection` reassembles.

use crate::codec;
use crate::error::{ErrorType, NetworkError, NetworkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Command = 1,
    Sync = 2,
    Pong = 3,
    RequestFull = 4,
    Disconnect = 5,
    Ping = 6,
}

impl MessageType {
    fn from_u8(value: u8) -> NetworkResult<MessageType> {
        match value {
            1 => Ok(MessageType::Command),
            2 => Ok(MessageType::Sync),
            3 => Ok(MessageType::Pong),
            4 => Ok(MessageType::RequestFull),
            5 => Ok(MessageType::Disconnect),
            6 => Ok(MessageType::Ping),
            _ => Err(NetworkError::Fatal(ErrorType::Malformed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMessage {
    pub message_type: MessageType,
    pub timestamp_ns: u64,
    pub tick_number: u64,
    pub payload: Vec<u8>,
}

impl NetworkMessage {
    pub fn new(
        message_type: MessageType,
        timestamp_ns: u64,
        tick_number: u64,
        payload: Vec<u8>,
    ) -> NetworkMessage {
        NetworkMessage {
            message_type,
            timestamp_ns,
            tick_number,
            payload,
        }
    }

    /// `{type: u8, timestamp_ns: u64, tick_number: u64, payload_len: u32, payload bytes}`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 21 + self.payload.len()];
        let mut pos = codec::write_u8(&mut buf, 0, self.message_type as u8);
        pos += codec::write_u64(&mut buf, pos, self.timestamp_ns);
        pos += codec::write_u64(&mut buf, pos, self.tick_number);
        codec::write_bytes(&mut buf, pos, &self.payload);
        buf
    }

    pub fn deserialize(data: &[u8]) -> NetworkResult<NetworkMessage> {
        if data.len() < 21 {
            return Err(NetworkError::Fatal(ErrorType::Malformed));
        }

        let (type_byte, mut pos) = codec::read_u8(data, 0);
        let message_type = MessageType::from_u8(type_byte)?;

        let (timestamp_ns, len) = codec::read_u64(data, pos);
        pos += len;
        let (tick_number, len) = codec::read_u64(data, pos);
        pos += len;

        let (payload, _) = codec::read_bytes(data, pos);

        Ok(NetworkMessage {
            message_type,
            timestamp_ns,
            tick_number,
            payload,
        })
    }
}
