//! Deterministic tick-driven simulation sync over UDP: one authoritative
//! daemon, many slaves, duplicate-tolerant framing underneath.

pub mod adapter;
pub mod channel;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod dedup;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod message;
pub mod multipart;
pub mod packet;
pub mod sync;

pub use adapter::RazorAdapter;
pub use connection::Connection;
pub use error::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
pub use sync::{BootstrapStage, Razor, Role, SlaveState};
