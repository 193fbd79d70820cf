//! Outbound status and telemetry payloads.

use crate::state::SessionState;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Session status, published as a heartbeat and on every transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub state: SessionState,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 wall-clock time of the publish.
    pub timestamp: String,
}

impl StatusReport {
    /// Build a report stamped with the current wall-clock time.
    pub fn now(state: SessionState, connected: bool, error: Option<String>) -> Self {
        Self {
            state,
            connected,
            error,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Clock-synchronization telemetry, published after each successful
/// estimation cycle. All durations are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingReport {
    pub state: SessionState,
    pub time_offset_ms_mean: f64,
    pub time_offset_ms_std: f64,
    pub time_offset_ms_median: f64,
    pub roundtrip_duration_ms_mean: f64,
    pub roundtrip_duration_ms_std: f64,
    pub roundtrip_duration_ms_median: f64,
    /// RFC 3339 wall-clock time of the publish.
    pub timestamp: String,
}
