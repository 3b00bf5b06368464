//! Role-aware tick loop driving the daemon/slave synchronization protocol.

use crate::adapter::RazorAdapter;
use crate::command::{self, OutgoingCommand, MAX_BATCH_SIZE, MAX_COMMAND_SIZE, MAX_TICKS_AHEAD};
use crate::connection::Connection;
use crate::endpoint;
use crate::error::NetworkResult;
use crate::logging::{self, Logger};
use crate::message::{MessageType, NetworkMessage};

use std::collections::VecDeque;
use std::time::Instant;

/// Timeout/keepalive constants reserved for future connection-liveness
/// tracking; not currently wired to any disconnect behavior.
pub mod tuning {
    use std::time::Duration;

    pub const SYNC_TIMEOUT_TICKS: u64 = 20_000;
    pub const KEEPALIVE: Duration = Duration::from_millis(5_000);
    pub const MAX_HIGH_PING_LENGTH: Duration = Duration::from_millis(10_000);
    /// A PID-style tracking target reserved for future future-time smoothing;
    /// not currently read by any computation.
    pub const FUTURE_TIME_TRACK_TARGET: f64 = 0.1;

    pub const PING_LOG_SIZE: usize = 10;
    pub const PING_INTERVAL: Duration = Duration::from_millis(1_000);
    pub const SYNC_INTERVAL_TICKS: u64 = 250;
    pub const COMMAND_BATCH_INTERVAL_TICKS: u64 = 10;
    pub const CREATE_PLAYER_DELAY: Duration = Duration::from_millis(500);
    pub const SET_TEAM_DELAY: Duration = Duration::from_millis(5);
    pub const FUTURE_TIME_PING_MULTIPLIER: f64 = 1.4;
    pub const FUTURE_TIME_PING_FIXED: Duration = Duration::from_millis(30);
    pub const MAX_FUTURE_TIME_HIGH_PING: Duration = Duration::from_millis(1_000);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BootstrapStage {
    Requested,
    FirstPingReceived,
    FirstSyncReceived,
    CreatePlayerArmed { at: Instant },
    SetTeamArmed { at: Instant },
}

#[derive(Debug, Clone)]
pub enum SlaveState {
    Unconnected,
    Bootstrapping { stage: BootstrapStage },
    Steady,
}

#[derive(Debug, Clone)]
pub enum Role {
    Daemon,
    Slave {
        daemon_endpoint: String,
        state: SlaveState,
    },
}

struct OutboundMessage {
    dest: String,
    message: NetworkMessage,
}

/// The tick-driven sync engine layered on top of a `Connection`.
pub struct Razor<A: RazorAdapter> {
    connection: Connection,
    role: Role,
    adapter: A,
    log: Logger,

    tick_number: u64,
    zero_time: Instant,

    ping_log: VecDeque<i64>,
    time_delta_log: VecDeque<i64>,
    future_time_ms: f64,
    local_time_difference_ms: f64,

    outgoing_commands: Vec<OutgoingCommand>,
    outbound: Vec<OutboundMessage>,

    next_sync_tick: u64,
    next_ping_time: Instant,
    next_command_tick: u64,
}

impl<A: RazorAdapter> Razor<A> {
    pub fn new_daemon(connection: Connection, adapter: A, log: Logger) -> Razor<A> {
        Razor {
            connection,
            role: Role::Daemon,
            adapter,
            log: log.new(logging::o!("role" => "daemon")),
            tick_number: 0,
            zero_time: Instant::now(),
            ping_log: VecDeque::new(),
            time_delta_log: VecDeque::new(),
            future_time_ms: 0.0,
            local_time_difference_ms: 0.0,
            outgoing_commands: Vec::new(),
            outbound: Vec::new(),
            next_sync_tick: 0,
            next_ping_time: Instant::now(),
            next_command_tick: 0,
        }
    }

    pub fn new_slave(connection: Connection, daemon_endpoint: String, adapter: A, log: Logger) -> Razor<A> {
        Razor {
            connection,
            role: Role::Slave {
                daemon_endpoint,
                state: SlaveState::Unconnected,
            },
            adapter,
            log: log.new(logging::o!("role" => "slave")),
            tick_number: 0,
            zero_time: Instant::now(),
            ping_log: VecDeque::new(),
            time_delta_log: VecDeque::new(),
            future_time_ms: 0.0,
            local_time_difference_ms: 0.0,
            outgoing_commands: Vec::new(),
            outbound: Vec::new(),
            next_sync_tick: 0,
            next_ping_time: Instant::now(),
            next_command_tick: 0,
        }
    }

    /// Queues an application command for the next batching flush. Never
    /// sent immediately.
    pub fn command(&mut self, bytes: Vec<u8>) -> NetworkResult<()> {
        let command = OutgoingCommand::new(self.tick_number, bytes)?;

        match &self.role {
            Role::Daemon => self.outgoing_commands.push(command),
            Role::Slave { state, .. } => {
                if matches!(state, SlaveState::Unconnected) {
                    // Matches `clearOutgoingCommands()` when not yet slaved.
                } else {
                    self.outgoing_commands.push(command);
                }
            }
        }
        Ok(())
    }

    pub fn future_time_ms(&self) -> f64 {
        self.future_time_ms
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Runs one simulation step. `zero_time` is the process-local epoch the
    /// embedding chose; `tick_number` is this step's tick.
    pub fn tick(&mut self, tick_number: u64, zero_time: Instant) -> NetworkResult<()> {
        self.tick_number = tick_number;
        self.zero_time = zero_time;

        self.drain_inbound()?;

        match self.role {
            Role::Daemon => self.daemon_periodic()?,
            Role::Slave { .. } => self.slave_periodic()?,
        }

        self.flush_command_batches()?;
        self.flush_outbound()?;

        Ok(())
    }

    fn now_ns(&self) -> u64 {
        Instant::now().saturating_duration_since(self.zero_time).as_nanos() as u64
    }

    fn drain_inbound(&mut self) -> NetworkResult<()> {
        while let Some((source, bytes)) = self.connection.receive()? {
            let message = match NetworkMessage::deserialize(&bytes) {
                Ok(message) => message,
                Err(_) => {
                    logging::warn!(self.log, "dropped malformed message"; "peer" => %source);
                    continue;
                }
            };

            let peer = source.to_string();
            self.dispatch(peer, message)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, peer: String, message: NetworkMessage) -> NetworkResult<()> {
        match message.message_type {
            MessageType::Command => self.receive_commands(&peer, &message),
            MessageType::Sync => self.receive_sync(&message),
            MessageType::Pong => self.receive_pong(&message),
            MessageType::RequestFull => self.receive_request_full(&peer, &message),
            MessageType::Ping => self.receive_ping(&peer, &message),
            MessageType::Disconnect => {
                self.connection.unbind(&peer);
                Ok(())
            }
        }
    }

    /// Daemon validates and rebroadcasts; slaves apply directly. The
    /// validation compares against the daemon's own current tick, never a
    /// tick decoded from the incoming message.
    fn receive_commands(&mut self, peer: &str, message: &NetworkMessage) -> NetworkResult<()> {
        let commands = match command::deserialize_batch(&message.payload) {
            Ok(commands) => commands,
            Err(_) => return Ok(()),
        };

        let is_daemon = matches!(self.role, Role::Daemon);
        let daemon_local_tick = self.tick_number;

        for received in commands {
            if received.command_bytes.len() > MAX_COMMAND_SIZE {
                continue;
            }

            if is_daemon {
                if received.tick_number < daemon_local_tick {
                    logging::warn!(self.log, "rejected stale command"; "peer" => peer, "tick" => received.tick_number);
                    continue;
                }
                if received.tick_number - daemon_local_tick > MAX_TICKS_AHEAD {
                    logging::warn!(self.log, "rejected future command"; "peer" => peer, "tick" => received.tick_number);
                    continue;
                }
                self.outgoing_commands.push(received);
            } else {
                self.adapter
                    .apply_command(&received.command_bytes, received.tick_number);
            }
        }

        Ok(())
    }

    fn receive_sync(&mut self, message: &NetworkMessage) -> NetworkResult<()> {
        if let Role::Slave { state, .. } = &mut self.role {
            let (daemon_tick, pos) = crate::codec::read_u64(&message.payload, 0);
            let (state_bytes, _) = crate::codec::read_bytes(&message.payload, pos);

            self.adapter
                .apply_state(&state_bytes, daemon_tick, self.future_time_ms);

            if let SlaveState::Bootstrapping { stage } = state {
                if *stage == BootstrapStage::FirstPingReceived {
                    *stage = BootstrapStage::FirstSyncReceived;
                }
                if *stage == BootstrapStage::FirstSyncReceived {
                    *stage = BootstrapStage::CreatePlayerArmed {
                        at: Instant::now() + tuning::CREATE_PLAYER_DELAY,
                    };
                }
            }
        }
        Ok(())
    }

    fn receive_pong(&mut self, message: &NetworkMessage) -> NetworkResult<()> {
        if !matches!(self.role, Role::Slave { .. }) {
            return Ok(());
        }

        let (echoed_start_ts, len) = crate::codec::read_u64(&message.payload, 0);
        let (daemon_zero_time, _) = crate::codec::read_u64(&message.payload, len);

        let now = self.now_ns() as i64;
        let round_trip_ns = now - echoed_start_ts as i64;
        let round_trip_ms = round_trip_ns / 1_000_000;

        push_capped(&mut self.ping_log, round_trip_ms, tuning::PING_LOG_SIZE);

        let time_delta_ns = (echoed_start_ts as i64 + round_trip_ns / 2 - self.zero_time_ns())
            - (message.timestamp_ns as i64 - daemon_zero_time as i64);
        push_capped(&mut self.time_delta_log, time_delta_ns / 1_000_000, tuning::PING_LOG_SIZE);

        self.recalculate_future_time();

        if let Role::Slave { state, .. } = &mut self.role {
            if let SlaveState::Bootstrapping { stage } = state {
                if *stage == BootstrapStage::Requested {
                    *stage = BootstrapStage::FirstPingReceived;
                }
            }
        }

        Ok(())
    }

    /// `now_ns`/`echoed_start_ts` are already expressed relative to our own
    /// `zero_time`, so there is no separate absolute epoch to subtract here.
    fn zero_time_ns(&self) -> i64 {
        0
    }

    /// Mean of `time_delta_log`, max of `ping_log`,
    /// `future_time = (max_ping/2) * 1.4 + 30ms`,
    /// `local_time_difference = mean_delta - future_time`.
    fn recalculate_future_time(&mut self) {
        if self.ping_log.is_empty() {
            return;
        }
        let max_ping = *self.ping_log.iter().max().unwrap();
        self.future_time_ms = (max_ping as f64 / 2.0) * tuning::FUTURE_TIME_PING_MULTIPLIER
            + tuning::FUTURE_TIME_PING_FIXED.as_millis() as f64;

        let mean_delta = self.time_delta_log.iter().sum::<i64>() as f64 / self.time_delta_log.len() as f64;
        self.local_time_difference_ms = mean_delta - self.future_time_ms;
    }

    /// `mean(time_delta_log) - future_time`, the slave's estimate of its
    /// clock offset from the daemon net of the future-time buffer.
    pub fn local_time_difference_ms(&self) -> f64 {
        self.local_time_difference_ms
    }

    fn receive_request_full(&mut self, peer: &str, message: &NetworkMessage) -> NetworkResult<()> {
        if !matches!(self.role, Role::Daemon) {
            return Ok(());
        }

        let mut pong_payload = vec![0u8; 16];
        crate::codec::write_u64(&mut pong_payload, 0, message.timestamp_ns);
        crate::codec::write_u64(&mut pong_payload, 8, 0);

        self.queue(peer.to_string(), MessageType::Pong, pong_payload);
        self.queue_sync(peer.to_string())?;

        Ok(())
    }

    fn receive_ping(&mut self, peer: &str, message: &NetworkMessage) -> NetworkResult<()> {
        if !matches!(self.role, Role::Daemon) {
            return Ok(());
        }

        let mut pong_payload = vec![0u8; 16];
        crate::codec::write_u64(&mut pong_payload, 0, message.timestamp_ns);
        crate::codec::write_u64(&mut pong_payload, 8, 0);

        self.queue(peer.to_string(), MessageType::Pong, pong_payload);
        Ok(())
    }

    fn daemon_periodic(&mut self) -> NetworkResult<()> {
        if self.next_sync_tick <= self.tick_number {
            self.queue_sync(endpoint::BROADCAST.to_string())?;
            self.next_sync_tick = self.tick_number + tuning::SYNC_INTERVAL_TICKS;
        }
        Ok(())
    }

    fn queue_sync(&mut self, dest: String) -> NetworkResult<()> {
        let mut state = Vec::new();
        self.adapter.produce_state(&mut state);

        let mut payload = vec![0u8; 8 + 4 + state.len()];
        crate::codec::write_u64(&mut payload, 0, self.tick_number);
        crate::codec::write_bytes(&mut payload, 8, &state);

        self.queue(dest, MessageType::Sync, payload);
        Ok(())
    }

    fn slave_periodic(&mut self) -> NetworkResult<()> {
        let should_request = matches!(
            &self.role,
            Role::Slave { state: SlaveState::Unconnected, .. }
        );

        if should_request {
            if let Role::Slave { daemon_endpoint, state } = &mut self.role {
                let dest = daemon_endpoint.clone();
                *state = SlaveState::Bootstrapping {
                    stage: BootstrapStage::Requested,
                };
                self.queue(dest, MessageType::RequestFull, vec![]);
            }
        }

        self.advance_bootstrap();

        if self.future_time_ms > tuning::MAX_FUTURE_TIME_HIGH_PING.as_millis() as f64 {
            self.disconnect_on_high_ping()?;
        }

        if self.next_ping_time <= Instant::now() {
            if let Role::Slave { daemon_endpoint, .. } = &self.role {
                let dest = daemon_endpoint.clone();
                self.queue(dest, MessageType::Ping, vec![]);
            }
            self.next_ping_time = Instant::now() + tuning::PING_INTERVAL;
        }

        Ok(())
    }

    /// Each arming step waits absolute time, not ticks, and is advanced on
    /// every slave tick.
    fn advance_bootstrap(&mut self) {
        let now = Instant::now();
        if let Role::Slave { state, .. } = &mut self.role {
            if let SlaveState::Bootstrapping { stage } = state {
                match *stage {
                    BootstrapStage::CreatePlayerArmed { at } if now >= at => {
                        *stage = BootstrapStage::SetTeamArmed {
                            at: now + tuning::SET_TEAM_DELAY,
                        };
                    }
                    BootstrapStage::SetTeamArmed { at } if now >= at => {
                        *state = SlaveState::Steady;
                    }
                    _ => {}
                }
            }
        }
    }

    /// Exceeding the future-time ceiling queues a DISCONNECT to the daemon
    /// and resets to `Unconnected` so bootstrap restarts from scratch.
    fn disconnect_on_high_ping(&mut self) -> NetworkResult<()> {
        if let Role::Slave { daemon_endpoint, state } = &mut self.role {
            let dest = daemon_endpoint.clone();
            logging::warn!(self.log, "high ping disconnect"; "future_time_ms" => self.future_time_ms);
            self.outbound.push(OutboundMessage {
                dest,
                message: NetworkMessage::new(MessageType::Disconnect, self.now_ns(), self.tick_number, vec![]),
            });
            *state = SlaveState::Unconnected;
            self.ping_log.clear();
            self.time_delta_log.clear();
            self.future_time_ms = 0.0;
            self.local_time_difference_ms = 0.0;
        }
        Ok(())
    }

    fn flush_command_batches(&mut self) -> NetworkResult<()> {
        if self.next_command_tick >= self.tick_number {
            return Ok(());
        }
        self.next_command_tick = self.tick_number + tuning::COMMAND_BATCH_INTERVAL_TICKS;

        if self.outgoing_commands.is_empty() {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.outgoing_commands);
        let dest = match &self.role {
            Role::Daemon => endpoint::BROADCAST.to_string(),
            Role::Slave { daemon_endpoint, .. } => daemon_endpoint.clone(),
        };

        for chunk in command::batch(pending) {
            if chunk.len() > MAX_BATCH_SIZE {
                continue;
            }
            let payload = command::serialize_batch(&chunk)?;
            self.queue(dest.clone(), MessageType::Command, payload);
        }

        Ok(())
    }

    fn queue(&mut self, dest: String, message_type: MessageType, payload: Vec<u8>) {
        let message = NetworkMessage::new(message_type, self.now_ns(), self.tick_number, payload);
        self.outbound.push(OutboundMessage { dest, message });
    }

    fn flush_outbound(&mut self) -> NetworkResult<()> {
        let pending = std::mem::take(&mut self.outbound);
        for item in pending {
            let wire = item.message.serialize();
            if item.dest == endpoint::BROADCAST {
                self.connection.send_all(&wire)?;
            } else {
                self.connection.send(&item.dest, &wire)?;
            }
        }
        Ok(())
    }
}

fn push_capped(log: &mut VecDeque<i64>, value: i64, cap: usize) {
    while log.len() >= cap {
        log.pop_front();
    }
    log.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::RecordingAdapter;
    use crate::command::OutgoingCommand;
    use crate::logging;

    fn connection(port: u16) -> Connection {
        Connection::open(port, None, false, logging::discard()).unwrap()
    }

    #[test]
    fn test_daemon_rejects_stale_command() {
        let mut daemon = Razor::new_daemon(connection(31000), RecordingAdapter::default(), logging::discard());
        daemon.tick_number = 1000;

        let stale = OutgoingCommand::new(999, b"cmd".to_vec()).unwrap();
        let payload = command::serialize_batch(&[stale]).unwrap();
        let message = NetworkMessage::new(MessageType::Command, 0, 999, payload);

        daemon.receive_commands("127.0.0.1:1", &message).unwrap();
        assert!(daemon.outgoing_commands.is_empty());
    }

    #[test]
    fn test_daemon_accepts_command_within_window() {
        let mut daemon = Razor::new_daemon(connection(31001), RecordingAdapter::default(), logging::discard());
        daemon.tick_number = 1000;

        let ok = OutgoingCommand::new(1500, b"cmd".to_vec()).unwrap();
        let payload = command::serialize_batch(&[ok]).unwrap();
        let message = NetworkMessage::new(MessageType::Command, 0, 1500, payload);

        daemon.receive_commands("127.0.0.1:1", &message).unwrap();
        assert_eq!(daemon.outgoing_commands.len(), 1);
    }

    #[test]
    fn test_daemon_rejects_command_too_far_ahead() {
        let mut daemon = Razor::new_daemon(connection(31002), RecordingAdapter::default(), logging::discard());
        daemon.tick_number = 1000;

        let too_far = OutgoingCommand::new(1000 + MAX_TICKS_AHEAD + 1, b"cmd".to_vec()).unwrap();
        let payload = command::serialize_batch(&[too_far]).unwrap();
        let message = NetworkMessage::new(MessageType::Command, 0, 0, payload);

        daemon.receive_commands("127.0.0.1:1", &message).unwrap();
        assert!(daemon.outgoing_commands.is_empty());
    }

    #[test]
    fn test_future_time_seeded_from_first_pong() {
        let mut slave = Razor::new_slave(
            connection(31003),
            "127.0.0.1:31099".to_string(),
            RecordingAdapter::default(),
            logging::discard(),
        );
        slave.role = Role::Slave {
            daemon_endpoint: "127.0.0.1:31099".to_string(),
            state: SlaveState::Bootstrapping {
                stage: BootstrapStage::Requested,
            },
        };

        push_capped(&mut slave.ping_log, 60, tuning::PING_LOG_SIZE);
        slave.recalculate_future_time();

        assert!((slave.future_time_ms - 72.0).abs() < 1e-6);
    }
}
