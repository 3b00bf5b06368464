use razor::adapter::RazorAdapter;
use razor::config::{RazorConfig, RoleConfig};
use razor::{logging, Connection, Razor};

use std::time::Instant;

struct NullAdapter;

impl RazorAdapter for NullAdapter {
    fn produce_state(&mut self, _out: &mut Vec<u8>) {}
    fn apply_state(&mut self, _state: &[u8], _daemon_tick_number: u64, _future_time_ms: f64) {}
    fn apply_command(&mut self, _command_bytes: &[u8], _at_tick: u64) {}
}

fn main() {
    let config = RazorConfig::default();
    let log = logging::root(&config.logging);

    let connection = Connection::open(config.port, None, config.logging.log_networking, log.clone())
        .expect("failed to open connection");

    let mut razor = match config.role {
        RoleConfig::Daemon => Razor::new_daemon(connection, NullAdapter, log),
        RoleConfig::Slave { daemon_endpoint } => {
            Razor::new_slave(connection, daemon_endpoint, NullAdapter, log)
        }
    };

    let zero_time = Instant::now();
    let mut tick_number = 0u64;

    loop {
        razor.tick(tick_number, zero_time).expect("tick failed");
        tick_number += 1;
        std::thread::sleep(std::time::Duration::from_millis(16));
    }
}
