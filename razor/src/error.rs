//! Error types shared by every layer of the crate.
//!
//! Mirrors the `NetworkError` / `ErrorUtils` split used elsewhere in this
//! lineage: `Wait` is not a failure (it is how a non-blocking socket reports
//! "nothing to do right now"), everything else is `Fatal`.

use std::io;
use std::net::AddrParseError;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Eq, PartialEq)]
pub enum NetworkError {
    /// The operation would block. Not a failure - callers should simply try later.
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorType {
    /// `host:port` missing a colon, non-numeric port, or unresolvable host.
    AddressParse,
    /// Binding the UDP socket failed.
    SocketOpen,
    /// A transient per-datagram send failure.
    SocketSend,
    /// A transient per-datagram receive failure.
    SocketReceive,
    /// Structurally invalid datagram: truncated, bad segment layout, out-of-range counts.
    Malformed,
    /// Daemon rejected a command: in the past, too far ahead, or oversized.
    PolicyReject,
    /// Caller passed a bit-vector over 64 bools, or a command over 200 bytes.
    OutOfRange,
    /// A daemon attempted to send a SYNC without a registered state producer.
    StateHookMissing,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<AddrParseError> for NetworkError {
    #[inline]
    fn from(_: AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddressParse)
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(NetworkError::Wait) => false,
            _ => true,
        }
    }
}
