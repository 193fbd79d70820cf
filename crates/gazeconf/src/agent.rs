//! Agent behavior configuration - timing defaults that seed the runtime.
//!
//! The broker's settings reply may override `heartbeat_period_ms` after the
//! startup handshake; everything else is fixed for the process lifetime.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and behavior defaults for the session coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Bus receive timeout for the command intake poll, in milliseconds.
    /// Default: 200
    #[serde(default = "AgentConfig::default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Unconditional status heartbeat period, in milliseconds.
    /// Overridable by the broker's `health_status_period` setting.
    /// Default: 500
    #[serde(default = "AgentConfig::default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,

    /// Deadline for the broker settings handshake at startup, in milliseconds.
    /// Default: 2000
    #[serde(default = "AgentConfig::default_settings_timeout_ms")]
    pub settings_timeout_ms: u64,

    /// Health monitor cycle interval, in seconds.
    /// Default: 5
    #[serde(default = "AgentConfig::default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Rediscovery cadence while no instrument handle is bound, in seconds.
    /// Default: 1
    #[serde(default = "AgentConfig::default_rediscovery_interval_secs")]
    pub rediscovery_interval_secs: u64,

    /// Back-off after a failed rediscovery attempt, in seconds.
    /// Default: 5
    #[serde(default = "AgentConfig::default_rediscovery_backoff_secs")]
    pub rediscovery_backoff_secs: u64,

    /// Instrument discovery timeout for the `connect` command, in seconds.
    /// Default: 5
    #[serde(default = "AgentConfig::default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Hard deadline for one time-offset estimation call, in seconds.
    /// Default: 10
    #[serde(default = "AgentConfig::default_estimate_deadline_secs")]
    pub estimate_deadline_secs: u64,

    /// Settle delay between a condition `.end` and the next `.begin`, in
    /// milliseconds. Default: 50
    #[serde(default = "AgentConfig::default_condition_settle_ms")]
    pub condition_settle_ms: u64,

    /// Settle delay between the closing `.end` and the stop-and-save RPC, in
    /// milliseconds. Default: 100
    #[serde(default = "AgentConfig::default_stop_settle_ms")]
    pub stop_settle_ms: u64,
}

impl AgentConfig {
    fn default_receive_timeout_ms() -> u64 {
        200
    }

    fn default_heartbeat_period_ms() -> u64 {
        500
    }

    fn default_settings_timeout_ms() -> u64 {
        2000
    }

    fn default_health_interval_secs() -> u64 {
        5
    }

    fn default_rediscovery_interval_secs() -> u64 {
        1
    }

    fn default_rediscovery_backoff_secs() -> u64 {
        5
    }

    fn default_discovery_timeout_secs() -> u64 {
        5
    }

    fn default_estimate_deadline_secs() -> u64 {
        10
    }

    fn default_condition_settle_ms() -> u64 {
        50
    }

    fn default_stop_settle_ms() -> u64 {
        100
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn settings_timeout(&self) -> Duration {
        Duration::from_millis(self.settings_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn rediscovery_interval(&self) -> Duration {
        Duration::from_secs(self.rediscovery_interval_secs)
    }

    pub fn rediscovery_backoff(&self) -> Duration {
        Duration::from_secs(self.rediscovery_backoff_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn estimate_deadline(&self) -> Duration {
        Duration::from_secs(self.estimate_deadline_secs)
    }

    pub fn condition_settle(&self) -> Duration {
        Duration::from_millis(self.condition_settle_ms)
    }

    pub fn stop_settle(&self) -> Duration {
        Duration::from_millis(self.stop_settle_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: Self::default_receive_timeout_ms(),
            heartbeat_period_ms: Self::default_heartbeat_period_ms(),
            settings_timeout_ms: Self::default_settings_timeout_ms(),
            health_interval_secs: Self::default_health_interval_secs(),
            rediscovery_interval_secs: Self::default_rediscovery_interval_secs(),
            rediscovery_backoff_secs: Self::default_rediscovery_backoff_secs(),
            discovery_timeout_secs: Self::default_discovery_timeout_secs(),
            estimate_deadline_secs: Self::default_estimate_deadline_secs(),
            condition_settle_ms: Self::default_condition_settle_ms(),
            stop_settle_ms: Self::default_stop_settle_ms(),
        }
    }
}

/// Instrument driver selection.
///
/// Driver implementation is out of scope for this repository; the `mock`
/// driver is the in-tree simulator, and a vendor SDK driver plugs in through
/// the same `Instrument`/`Discovery` traits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Driver name. Default: mock
    #[serde(default = "InstrumentConfig::default_driver")]
    pub driver: String,
}

impl InstrumentConfig {
    fn default_driver() -> String {
        "mock".to_string()
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            driver: Self::default_driver(),
        }
    }
}
