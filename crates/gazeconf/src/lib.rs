//! Minimal configuration loading for Gazekeeper.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by the other Gazekeeper crates without causing
//! circular dependency issues.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`[bus]`, `[telemetry]`): Things that physically
//!   cannot change at runtime - broker endpoints, topics, log level.
//!
//! - **Agent behavior** (`[agent]`, `[instrument]`): Initial values that seed
//!   the runtime. The broker's settings reply may override some of them after
//!   the startup handshake (e.g. the heartbeat period).
//!
//! # Usage
//!
//! ```rust,no_run
//! use gazeconf::GazeConfig;
//!
//! let config = GazeConfig::load().expect("Failed to load config");
//! println!("broker frontend: {}", config.bus.frontend);
//! println!("heartbeat every {} ms", config.agent.heartbeat_period_ms);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/gazekeeper/config.toml` (system)
//! 2. `~/.config/gazekeeper/config.toml` (user)
//! 3. `./gazekeeper.toml` (local override)
//! 4. Environment variables (`GAZEKEEPER_*`)
//!
//! # Example Config
//!
//! ```toml
//! [bus]
//! frontend = "tcp://127.0.0.1:9092"
//! backend = "tcp://127.0.0.1:9093"
//! settings = "tcp://127.0.0.1:9094"
//! status_topic = "gazekeeper"
//!
//! [telemetry]
//! log_level = "info"
//!
//! [agent]
//! heartbeat_period_ms = 500
//! health_interval_secs = 5
//!
//! [instrument]
//! driver = "mock"
//! ```

pub mod agent;
pub mod infra;
pub mod loader;

pub use agent::{AgentConfig, InstrumentConfig};
pub use infra::{BusConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete Gazekeeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GazeConfig {
    /// Broker endpoints and topics - cannot change at runtime.
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Timing and behavior defaults - seeds runtime state.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Instrument driver selection.
    #[serde(default)]
    pub instrument: InstrumentConfig,
}

impl GazeConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/gazekeeper/config.toml`
    /// 3. `~/.config/gazekeeper/config.toml`
    /// 4. `./gazekeeper.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./gazekeeper.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = GazeConfig::default();

        // Load config files in order
        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        // Apply environment variable overrides
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# Gazekeeper Configuration\n\n");

        output.push_str("[bus]\n");
        output.push_str(&format!("frontend = \"{}\"\n", self.bus.frontend));
        output.push_str(&format!("backend = \"{}\"\n", self.bus.backend));
        output.push_str(&format!("settings = \"{}\"\n", self.bus.settings));
        output.push_str(&format!("agent_id = \"{}\"\n", self.bus.agent_id));
        output.push_str(&format!("command_topic = \"{}\"\n", self.bus.command_topic));
        output.push_str(&format!("status_topic = \"{}\"\n", self.bus.status_topic));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output.push_str("\n[agent]\n");
        output.push_str(&format!(
            "receive_timeout_ms = {}\n",
            self.agent.receive_timeout_ms
        ));
        output.push_str(&format!(
            "heartbeat_period_ms = {}\n",
            self.agent.heartbeat_period_ms
        ));
        output.push_str(&format!(
            "settings_timeout_ms = {}\n",
            self.agent.settings_timeout_ms
        ));
        output.push_str(&format!(
            "health_interval_secs = {}\n",
            self.agent.health_interval_secs
        ));
        output.push_str(&format!(
            "rediscovery_interval_secs = {}\n",
            self.agent.rediscovery_interval_secs
        ));
        output.push_str(&format!(
            "rediscovery_backoff_secs = {}\n",
            self.agent.rediscovery_backoff_secs
        ));
        output.push_str(&format!(
            "discovery_timeout_secs = {}\n",
            self.agent.discovery_timeout_secs
        ));
        output.push_str(&format!(
            "estimate_deadline_secs = {}\n",
            self.agent.estimate_deadline_secs
        ));
        output.push_str(&format!(
            "condition_settle_ms = {}\n",
            self.agent.condition_settle_ms
        ));
        output.push_str(&format!("stop_settle_ms = {}\n", self.agent.stop_settle_ms));

        output.push_str("\n[instrument]\n");
        output.push_str(&format!("driver = \"{}\"\n", self.instrument.driver));

        output
    }
}
