//! Config file discovery, loading, and environment variable overlay.

use crate::{AgentConfig, BusConfig, ConfigError, GazeConfig, InstrumentConfig, TelemetryConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/gazekeeper/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("gazekeeper/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("gazekeeper.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<GazeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Keep the overlay value when it differs from the compiled default.
fn pick<T: PartialEq>(overlay: T, base: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configs, with `overlay` taking precedence for every field it
/// sets to a non-default value.
pub fn merge_configs(base: GazeConfig, overlay: GazeConfig) -> GazeConfig {
    let db = BusConfig::default();
    let dt = TelemetryConfig::default();
    let da = AgentConfig::default();
    let di = InstrumentConfig::default();

    GazeConfig {
        bus: BusConfig {
            frontend: pick(overlay.bus.frontend, base.bus.frontend, db.frontend),
            backend: pick(overlay.bus.backend, base.bus.backend, db.backend),
            settings: pick(overlay.bus.settings, base.bus.settings, db.settings),
            agent_id: pick(overlay.bus.agent_id, base.bus.agent_id, db.agent_id),
            command_topic: pick(
                overlay.bus.command_topic,
                base.bus.command_topic,
                db.command_topic,
            ),
            status_topic: pick(
                overlay.bus.status_topic,
                base.bus.status_topic,
                db.status_topic,
            ),
        },
        telemetry: TelemetryConfig {
            log_level: pick(
                overlay.telemetry.log_level,
                base.telemetry.log_level,
                dt.log_level,
            ),
        },
        agent: AgentConfig {
            receive_timeout_ms: pick(
                overlay.agent.receive_timeout_ms,
                base.agent.receive_timeout_ms,
                da.receive_timeout_ms,
            ),
            heartbeat_period_ms: pick(
                overlay.agent.heartbeat_period_ms,
                base.agent.heartbeat_period_ms,
                da.heartbeat_period_ms,
            ),
            settings_timeout_ms: pick(
                overlay.agent.settings_timeout_ms,
                base.agent.settings_timeout_ms,
                da.settings_timeout_ms,
            ),
            health_interval_secs: pick(
                overlay.agent.health_interval_secs,
                base.agent.health_interval_secs,
                da.health_interval_secs,
            ),
            rediscovery_interval_secs: pick(
                overlay.agent.rediscovery_interval_secs,
                base.agent.rediscovery_interval_secs,
                da.rediscovery_interval_secs,
            ),
            rediscovery_backoff_secs: pick(
                overlay.agent.rediscovery_backoff_secs,
                base.agent.rediscovery_backoff_secs,
                da.rediscovery_backoff_secs,
            ),
            discovery_timeout_secs: pick(
                overlay.agent.discovery_timeout_secs,
                base.agent.discovery_timeout_secs,
                da.discovery_timeout_secs,
            ),
            estimate_deadline_secs: pick(
                overlay.agent.estimate_deadline_secs,
                base.agent.estimate_deadline_secs,
                da.estimate_deadline_secs,
            ),
            condition_settle_ms: pick(
                overlay.agent.condition_settle_ms,
                base.agent.condition_settle_ms,
                da.condition_settle_ms,
            ),
            stop_settle_ms: pick(
                overlay.agent.stop_settle_ms,
                base.agent.stop_settle_ms,
                da.stop_settle_ms,
            ),
        },
        instrument: InstrumentConfig {
            driver: pick(overlay.instrument.driver, base.instrument.driver, di.driver),
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut GazeConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("GAZEKEEPER_FRONTEND") {
        config.bus.frontend = v;
        sources.env_overrides.push("GAZEKEEPER_FRONTEND".to_string());
    }
    if let Ok(v) = env::var("GAZEKEEPER_BACKEND") {
        config.bus.backend = v;
        sources.env_overrides.push("GAZEKEEPER_BACKEND".to_string());
    }
    if let Ok(v) = env::var("GAZEKEEPER_SETTINGS") {
        config.bus.settings = v;
        sources.env_overrides.push("GAZEKEEPER_SETTINGS".to_string());
    }
    if let Ok(v) = env::var("GAZEKEEPER_AGENT_ID") {
        config.bus.agent_id = v;
        sources.env_overrides.push("GAZEKEEPER_AGENT_ID".to_string());
    }
    if let Ok(v) = env::var("GAZEKEEPER_COMMAND_TOPIC") {
        config.bus.command_topic = v;
        sources
            .env_overrides
            .push("GAZEKEEPER_COMMAND_TOPIC".to_string());
    }
    if let Ok(v) = env::var("GAZEKEEPER_STATUS_TOPIC") {
        config.bus.status_topic = v;
        sources
            .env_overrides
            .push("GAZEKEEPER_STATUS_TOPIC".to_string());
    }

    if let Ok(v) = env::var("GAZEKEEPER_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("GAZEKEEPER_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("GAZEKEEPER_DRIVER") {
        config.instrument.driver = v;
        sources.env_overrides.push("GAZEKEEPER_DRIVER".to_string());
    }

    if let Ok(v) = env::var("GAZEKEEPER_HEARTBEAT_PERIOD_MS") {
        if let Ok(ms) = v.parse() {
            config.agent.heartbeat_period_ms = ms;
            sources
                .env_overrides
                .push("GAZEKEEPER_HEARTBEAT_PERIOD_MS".to_string());
        }
    }
}
