//! Command intake - topic filtering and payload acceptance.
//!
//! The intake never blocks the controller for longer than the bus receive
//! timeout; everything that is not a recognized command on the command topic
//! is dropped here with a debug line at most.

use serde_json::Value;
use tracing::debug;

use gazeproto::Command;

/// Accept a received bus message as a command.
///
/// Pure over `(topic, payload)` so the acceptance rules are testable without
/// sockets; the daemon loop feeds it straight from `recv_timeout`.
pub fn accept(topic: &str, payload: &Value, command_topic: &str) -> Option<Command> {
    if topic != command_topic {
        debug!("ignoring message on '{}': not the command topic", topic);
        return None;
    }

    match Command::parse(payload) {
        Some(command) => {
            debug!("received '{}' command", command.kind);
            Some(command)
        }
        None => {
            debug!("dropping unrecognized payload on '{}'", topic);
            None
        }
    }
}
