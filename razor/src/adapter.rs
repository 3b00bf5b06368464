//! Embedding capability interface.
//!
//! The sync engine never interprets state or command bytes - it only moves
//! them between the wire and whatever implements this trait. Expressed as a
//! trait rather than raw function pointers so a test double can carry state.

/// Hooks an embedding simulation registers with a `Razor` instance.
pub trait RazorAdapter {
    /// Called by a daemon building a SYNC message. Implementors append the
    /// serialized world state to `out`.
    fn produce_state(&mut self, out: &mut Vec<u8>);

    /// Called on a slave receiving a SYNC. `future_time_ms` is the slave's
    /// current future-time estimate; the embedding is responsible for
    /// scheduling a re-simulation forward from `daemon_tick_number`.
    fn apply_state(&mut self, state: &[u8], daemon_tick_number: u64, future_time_ms: f64);

    /// Called on a slave receiving a COMMAND that passed validation.
    fn apply_command(&mut self, command_bytes: &[u8], at_tick: u64);
}

#[cfg(test)]
pub mod test_support {
    use super::RazorAdapter;

    /// A recording adapter used by sync engine tests: stashes every call so
    /// assertions can inspect what the engine invoked.
    #[derive(Default)]
    pub struct RecordingAdapter {
        pub produced_state: Vec<u8>,
        pub applied_states: Vec<(Vec<u8>, u64, f64)>,
        pub applied_commands: Vec<(Vec<u8>, u64)>,
    }

    impl RazorAdapter for RecordingAdapter {
        fn produce_state(&mut self, out: &mut Vec<u8>) {
            out.extend_from_slice(&self.produced_state);
        }

        fn apply_state(&mut self, state: &[u8], daemon_tick_number: u64, future_time_ms: f64) {
            self.applied_states
                .push((state.to_vec(), daemon_tick_number, future_time_ms));
        }

        fn apply_command(&mut self, command_bytes: &[u8], at_tick: u64) {
            self.applied_commands
                .push((command_bytes.to_vec(), at_tick));
        }
    }
}
