//! Peer addressing: `"host:port"` resolution plus the `ANY`/`BROADCAST`
//! sentinel endpoints used throughout the wire protocol.

use crate::error::{ErrorType, NetworkError, NetworkResult};
use std::net::{SocketAddr, ToSocketAddrs};

/// Sentinel meaning "accept a datagram from any peer" when filtering
/// incoming traffic.
pub const ANY: &str = "*";
/// Sentinel destination meaning "send to every registered channel".
pub const BROADCAST: &str = "!";

/// Resolves a `"host:port"` string to a concrete socket address. Does not
/// apply to the `ANY`/`BROADCAST` sentinels, which are never resolved -
/// callers compare them as strings before reaching for this.
pub fn resolve(address: &str) -> NetworkResult<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|_| NetworkError::Fatal(ErrorType::AddressParse))?
        .next()
        .ok_or(NetworkError::Fatal(ErrorType::AddressParse))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_loopback() {
        let addr = resolve("127.0.0.1:9000").unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_resolve_missing_port_is_address_parse_error() {
        assert_eq!(
            resolve("127.0.0.1"),
            Err(NetworkError::Fatal(ErrorType::AddressParse))
        );
    }
}
