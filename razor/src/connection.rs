//! UDP endpoint with segmentation, duplication, dedup and reassembly.

use crate::channel::{ChannelId, ChannelTable};
use crate::dedup::DedupTable;
use crate::endpoint;
use crate::error::{ErrorType, NetworkError, NetworkResult};
use crate::logging::{self, Logger};
use crate::multipart::MultipartTable;
use crate::packet::{Packet, MAX_SEGMENT_SIZE};

use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// How many times each multipart part is sent back-to-back, trading
/// bandwidth for resilience against single-datagram loss on lossy links.
const DUPLICATE_SEND_COUNT: usize = 2;

/// Age after which an incomplete multipart entry is evicted, bounding
/// memory growth under sustained packet loss.
const MULTIPART_MAX_AGE: Duration = Duration::from_secs(10);

static NEXT_PACKET_ID: AtomicU32 = AtomicU32::new(1);

fn next_packet_id() -> u32 {
    NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct Connection {
    socket: UdpSocket,
    remote_filter: Option<SocketAddr>,
    channels: ChannelTable,
    dedup: DedupTable,
    multipart: MultipartTable,
    log_networking: bool,
    log: Logger,
    closed: bool,
}

impl Connection {
    /// Binds a UDP socket on `port`. If `remote_filter` is set, datagrams
    /// from any other source are silently dropped in `receive`.
    pub fn open(
        port: u16,
        remote_filter: Option<SocketAddr>,
        log_networking: bool,
        log: Logger,
    ) -> NetworkResult<Connection> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .map_err(|_| NetworkError::Fatal(ErrorType::SocketOpen))?;
        socket.set_nonblocking(true)?;

        logging::info!(log, "opened connection"; "port" => port);

        Ok(Connection {
            socket,
            remote_filter,
            channels: ChannelTable::new(),
            dedup: DedupTable::new(),
            multipart: MultipartTable::new(),
            log_networking,
            log,
            closed: false,
        })
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.channels.unbind_all();
        logging::info!(self.log, "closed connection");
    }

    pub fn channel_of(&self, peer: &str) -> Option<ChannelId> {
        endpoint::resolve(peer)
            .ok()
            .and_then(|addr| self.channels.channel_of(&addr))
    }

    pub fn unbind(&mut self, peer: &str) {
        if let Ok(addr) = endpoint::resolve(peer) {
            self.channels.unbind(&addr);
        }
    }

    /// Splits `message` into parts of at most `MAX_SEGMENT_SIZE` bytes and
    /// sends each twice, back-to-back, as a contiguous id run so the
    /// receiver can recover `first_id = id - index`.
    pub fn send(&mut self, peer: &str, message: &[u8]) -> NetworkResult<()> {
        let addr = endpoint::resolve(peer)?;
        self.channels.get_or_assign(addr);
        self.send_to_addr(addr, message)
    }

    pub fn send_all(&mut self, message: &[u8]) -> NetworkResult<()> {
        let peers: Vec<SocketAddr> = self.channels.peers().copied().collect();
        for peer in peers {
            self.send_to_addr(peer, message)?;
        }
        Ok(())
    }

    fn send_to_addr(&mut self, addr: SocketAddr, message: &[u8]) -> NetworkResult<()> {
        let parts: Vec<&[u8]> = if message.is_empty() {
            vec![&[][..]]
        } else {
            message.chunks(MAX_SEGMENT_SIZE).collect()
        };
        let total = parts.len();
        if total > u8::MAX as usize {
            return Err(NetworkError::Fatal(ErrorType::OutOfRange));
        }

        let id0 = allocate_id_run(total);

        for (index, part) in parts.iter().enumerate() {
            let packet = Packet::new(
                id0 + index as u32,
                vec![vec![b'M', total as u8, index as u8], part.to_vec()],
            );
            let wire = packet.serialize()?;

            for _ in 0..DUPLICATE_SEND_COUNT {
                self.log_raw_send(&wire);
                match self.socket.send_to(&wire, addr) {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(_) => {
                        logging::warn!(self.log, "transient send failure"; "peer" => %addr);
                    }
                }
            }

            logging::trace!(
                self.log, "sent datagram";
                "channel" => self.channels.channel_of(&addr).unwrap_or(0),
                "peer" => %addr, "bytes" => part.len(), "index" => index, "total" => total
            );
        }

        Ok(())
    }

    /// Drains one fully-assembled application message, or returns `Ok(None)`
    /// if nothing is ready right now.
    pub fn receive(&mut self) -> NetworkResult<Option<(SocketAddr, Vec<u8>)>> {
        let now = Instant::now();
        self.dedup.expire(now);
        self.multipart.expire(now, MULTIPART_MAX_AGE);

        let mut buf = [0u8; 2048];

        loop {
            let (len, source) = match self.socket.recv_from(&mut buf) {
                Ok(result) => result,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(_) => {
                    logging::warn!(self.log, "transient receive failure");
                    continue;
                }
            };

            if let Some(filter) = self.remote_filter {
                if source != filter {
                    continue;
                }
            }

            self.log_raw_receive(&buf[..len]);

            let packet = match Packet::deserialize(&buf[..len]) {
                Ok(packet) => packet,
                Err(_) => continue,
            };

            if !self.dedup.observe(source, packet.id, now) {
                continue;
            }

            let channel = self.channels.get_or_assign(source);

            match self.multipart.accept(source, &packet, now) {
                Ok(Some(message)) => {
                    logging::trace!(
                        self.log, "received message";
                        "channel" => channel, "peer" => %source, "bytes" => message.len()
                    );
                    return Ok(Some((source, message)));
                }
                Ok(None) => continue,
                Err(()) => continue,
            }
        }
    }

    fn log_raw_send(&self, bytes: &[u8]) {
        if self.log_networking {
            self.append_networking_log(b'>', bytes);
        }
    }

    fn log_raw_receive(&self, bytes: &[u8]) {
        if self.log_networking {
            self.append_networking_log(b'<', bytes);
        }
    }

    fn append_networking_log(&self, direction: u8, bytes: &[u8]) {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open("networking.log")
        {
            let _ = file.write_all(&[direction]);
            let _ = file.write_all(bytes);
            let _ = file.write_all(b"\n");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reserves `count` contiguous packet ids and returns the first. Multiple
/// sends racing for ids would interleave runs under concurrent access; the
/// single-threaded simulation loop this crate targets never does that.
fn allocate_id_run(count: usize) -> u32 {
    let mut id0 = 0;
    for i in 0..count {
        let id = next_packet_id();
        if i == 0 {
            id0 = id;
        }
    }
    id0
}
