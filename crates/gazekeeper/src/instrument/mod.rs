//! Instrument seam - the vendor SDK contract as traits.
//!
//! The physical recorder is reachable through a vendor SDK that exposes
//! discover/probe/record/event/estimate/close primitives. This module models
//! that surface as the `Discovery` and `Instrument` traits so the session
//! controller and health monitor never touch a concrete SDK type. Driver
//! implementation is out of scope for this repository: the in-tree `mock`
//! driver is a scriptable simulator, and a real SDK binding plugs in through
//! the same pair of traits.
//!
//! All trait methods are synchronous, matching the SDK. The one call that can
//! hang at the transport layer (`estimate_time_offset`) is raced against a
//! deadline on a blocking task by the health monitor; implementations do not
//! need their own timeout handling.

pub mod mock;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Instrument operation failures, classified so callers can distinguish
/// "ignored, non-fatal" from "must trigger state fallback".
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("no device found within {0:?}")]
    NotFound(Duration),

    #[error("connectivity probe failed: {0}")]
    Probe(String),

    #[error("instrument call failed: {0}")]
    Rpc(String),

    #[error("time-offset estimation timed out after {0:?}")]
    EstimateTimeout(Duration),

    #[error("metadata template unavailable: {0}")]
    Template(String),
}

/// One batch of offset statistics, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetStats {
    pub mean: f64,
    pub std: f64,
    pub median: f64,
}

/// Result of one clock-offset estimation run against the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOffsetEstimate {
    pub time_offset_ms: OffsetStats,
    pub roundtrip_ms: OffsetStats,
}

/// One fillable field of the device's metadata template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateItem {
    pub id: String,
    pub title: String,
}

/// The device's metadata template, fetched before a recording starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub items: Vec<TemplateItem>,
}

/// An open handle to the instrument.
///
/// Shared as `Arc<dyn Instrument>` between the controller and the health
/// monitor; implementations must tolerate concurrent calls (the runtime
/// discipline ensures at most one of the two loops is mid-RPC at a time).
pub trait Instrument: Send + Sync {
    /// Lightweight connectivity probe. An `Err` and `Ok(false)` are treated
    /// identically by callers: the connection is considered lost.
    fn is_connected(&self) -> Result<bool, InstrumentError>;

    /// Start a recording; returns the device-assigned recording id.
    fn recording_start(&self) -> Result<String, InstrumentError>;

    /// Stop the active recording and persist it on the device.
    fn recording_stop_and_save(&self) -> Result<(), InstrumentError>;

    /// Annotate the active recording with a labeled event.
    fn send_event(&self, label: &str) -> Result<(), InstrumentError>;

    /// Estimate host/device clock offset. May hang at the transport layer.
    fn estimate_time_offset(&self) -> Result<TimeOffsetEstimate, InstrumentError>;

    /// Fetch the metadata template currently configured on the device.
    fn template(&self) -> Result<Template, InstrumentError>;

    /// Ask the device whether it would accept `answer` for `item`.
    /// Returns the rejection reason on failure.
    fn validate_answer(&self, item: &TemplateItem, answer: &str) -> Result<(), String>;

    /// Submit filled template answers, keyed by item id.
    fn post_template_answers(&self, answers: HashMap<String, String>)
        -> Result<(), InstrumentError>;

    /// Release the handle. Idempotent.
    fn close(&self);
}

/// Device discovery, the entry point to an `Instrument` handle.
pub trait Discovery: Send + Sync {
    fn discover(&self, timeout: Duration) -> Result<Arc<dyn Instrument>, InstrumentError>;
}

/// Build the configured discovery driver.
pub fn driver_from_config(
    config: &gazeconf::InstrumentConfig,
) -> anyhow::Result<Arc<dyn Discovery>> {
    match config.driver.as_str() {
        "mock" => Ok(Arc::new(mock::MockDiscovery::simulated())),
        other => anyhow::bail!(
            "unknown instrument driver '{}' (available: mock)",
            other
        ),
    }
}
