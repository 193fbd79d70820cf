//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};

/// Broker endpoints and topic names for this agent.
///
/// The agent connects all three sockets to an already-running broker:
/// PUB to the frontend, SUB to the backend, REQ to the settings endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker frontend (XSUB side) the agent publishes to.
    /// Default: tcp://127.0.0.1:9092
    #[serde(default = "BusConfig::default_frontend")]
    pub frontend: String,

    /// Broker backend (XPUB side) the agent subscribes to.
    /// Default: tcp://127.0.0.1:9093
    #[serde(default = "BusConfig::default_backend")]
    pub backend: String,

    /// Broker settings endpoint (REP side) for the startup handshake.
    /// Default: tcp://127.0.0.1:9094
    #[serde(default = "BusConfig::default_settings")]
    pub settings: String,

    /// Agent identifier sent with the settings request.
    /// Default: gazekeeper
    #[serde(default = "BusConfig::default_agent_id")]
    pub agent_id: String,

    /// Topic the agent receives lifecycle commands on.
    /// Default: command
    #[serde(default = "BusConfig::default_command_topic")]
    pub command_topic: String,

    /// Topic the agent publishes status and telemetry on.
    /// Default: gazekeeper
    #[serde(default = "BusConfig::default_status_topic")]
    pub status_topic: String,
}

impl BusConfig {
    fn default_frontend() -> String {
        "tcp://127.0.0.1:9092".to_string()
    }

    fn default_backend() -> String {
        "tcp://127.0.0.1:9093".to_string()
    }

    fn default_settings() -> String {
        "tcp://127.0.0.1:9094".to_string()
    }

    fn default_agent_id() -> String {
        "gazekeeper".to_string()
    }

    fn default_command_topic() -> String {
        "command".to_string()
    }

    fn default_status_topic() -> String {
        "gazekeeper".to_string()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frontend: Self::default_frontend(),
            backend: Self::default_backend(),
            settings: Self::default_settings(),
            agent_id: Self::default_agent_id(),
            command_topic: Self::default_command_topic(),
            status_topic: Self::default_status_topic(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_defaults() {
        let bus = BusConfig::default();
        assert!(bus.frontend.ends_with(":9092"));
        assert!(bus.backend.ends_with(":9093"));
        assert!(bus.settings.ends_with(":9094"));
        assert_eq!(bus.command_topic, "command");
        assert_eq!(bus.status_topic, "gazekeeper");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let bus: BusConfig = toml::from_str(r#"frontend = "tcp://broker:7000""#).unwrap();
        assert_eq!(bus.frontend, "tcp://broker:7000");
        assert_eq!(bus.backend, "tcp://127.0.0.1:9093");
    }
}
