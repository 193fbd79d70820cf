//! Session lifecycle state shared across the wire and the agent.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the device session.
///
/// Exactly one value at any time. The agent starts in `Starting`, becomes
/// `Idle` after the broker settings handshake, and thereafter transitions
/// only through the session controller's dispatch table (plus the health
/// monitor's forced fallback to `Idle` on connection loss).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Process started, bus handshake not yet complete.
    Starting,
    /// Ready for commands, no instrument session.
    Idle,
    /// Instrument handle open, not recording.
    Connected,
    /// Recording in progress.
    Recording,
    /// Terminal: shutdown signal observed.
    ShuttingDown,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Idle => "idle",
            SessionState::Connected => "connected",
            SessionState::Recording => "recording",
            SessionState::ShuttingDown => "shutting_down",
        }
    }

    /// An instrument session is active (Connected or Recording).
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Recording)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
