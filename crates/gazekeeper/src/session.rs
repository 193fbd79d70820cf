//! Session state and the command-driven controller.
//!
//! `SessionShared` is the single session-owned struct holding everything the
//! two loops share: the lifecycle state, the recording flag, the instrument
//! handle slot, connection health, and the latest timing estimate. There are
//! no process-wide globals; the controller and the health monitor each hold
//! an `Arc` to the same instance.
//!
//! `SessionController` dispatches commands against the current state. Every
//! `(state, command)` pair outside the lifecycle table is rejected with a log
//! line and no state change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use gazeconf::AgentConfig;
use gazeproto::{Command, CommandKind, SessionState, StatusReport, TimingReport};

use crate::instrument::{Discovery, Instrument, OffsetStats, TimeOffsetEstimate};
use crate::sequencer::ConditionSequencer;
use crate::status::StatusSender;
use crate::template;

/// Instrument reachability as last observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Immutable clock-offset snapshot, replaced wholesale each successful
/// estimation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSnapshot {
    pub offset: OffsetStats,
    pub roundtrip: OffsetStats,
    pub measured_at: DateTime<Utc>,
}

impl TimingSnapshot {
    pub fn from_estimate(estimate: TimeOffsetEstimate) -> Self {
        Self {
            offset: estimate.time_offset_ms,
            roundtrip: estimate.roundtrip_ms,
            measured_at: Utc::now(),
        }
    }

    /// Render the snapshot as a wire telemetry report.
    pub fn report(&self, state: SessionState) -> TimingReport {
        TimingReport {
            state,
            time_offset_ms_mean: self.offset.mean,
            time_offset_ms_std: self.offset.std,
            time_offset_ms_median: self.offset.median,
            roundtrip_duration_ms_mean: self.roundtrip.mean,
            roundtrip_duration_ms_std: self.roundtrip.std,
            roundtrip_duration_ms_median: self.roundtrip.median,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Everything the controller and health monitor share.
pub struct SessionShared {
    state: RwLock<SessionState>,
    /// Mirrors `state == Recording` for lock-free checks by the monitor.
    recording: AtomicBool,
    device: Mutex<Option<Arc<dyn Instrument>>>,
    health: RwLock<ConnectionHealth>,
    timing: RwLock<Option<TimingSnapshot>>,
    recording_started_at: RwLock<Option<DateTime<Utc>>>,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Starting),
            recording: AtomicBool::new(false),
            device: Mutex::new(None),
            health: RwLock::new(ConnectionHealth::default()),
            timing: RwLock::new(None),
            recording_started_at: RwLock::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap()
    }

    /// Set the session state, returning the previous value.
    pub fn set_state(&self, next: SessionState) -> SessionState {
        let mut state = self.state.write().unwrap();
        let prev = *state;
        *state = next;
        self.recording
            .store(matches!(next, SessionState::Recording), Ordering::SeqCst);
        drop(state);
        if prev != next {
            info!("session state {} -> {}", prev, next);
        }
        prev
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn device(&self) -> Option<Arc<dyn Instrument>> {
        self.device.lock().unwrap().clone()
    }

    pub fn install_device(&self, device: Arc<dyn Instrument>) {
        *self.device.lock().unwrap() = Some(device);
    }

    /// Release the instrument handle, if any.
    ///
    /// Data-loss guard: if a recording is still in flight the stop-and-save
    /// attempt always precedes the close. Secondary failures from that
    /// attempt are logged and swallowed, but the attempt is never skipped
    /// and the handle is released afterward regardless.
    pub fn release_device(&self) -> bool {
        let mut slot = self.device.lock().unwrap();
        let Some(device) = slot.take() else {
            return false;
        };
        if self.recording.load(Ordering::SeqCst) {
            if let Err(e) = device.recording_stop_and_save() {
                warn!("stop-and-save during handle release failed: {}", e);
            }
        }
        device.close();
        true
    }

    /// Record a healthy connection. Returns true if the flag or error
    /// changed, so callers can publish only on transitions.
    pub fn mark_connected(&self) -> bool {
        let mut health = self.health.write().unwrap();
        let changed = !health.connected || health.last_error.is_some();
        health.connected = true;
        health.last_error = None;
        health.last_checked_at = Some(Utc::now());
        changed
    }

    /// Record a clean close (operator disconnect, shutdown).
    pub fn mark_closed(&self) {
        let mut health = self.health.write().unwrap();
        health.connected = false;
        health.last_error = None;
        health.last_checked_at = Some(Utc::now());
    }

    /// Record a non-fatal error without touching the connected flag.
    pub fn mark_error(&self, reason: &str) {
        self.health.write().unwrap().last_error = Some(reason.to_string());
    }

    /// Record a lost connection and force an active session back to Idle.
    /// Returns true if health or session state changed.
    pub fn connection_lost(&self, reason: &str) -> bool {
        let health_changed = {
            let mut health = self.health.write().unwrap();
            let changed = health.connected || health.last_error.as_deref() != Some(reason);
            health.connected = false;
            health.last_error = Some(reason.to_string());
            health.last_checked_at = Some(Utc::now());
            changed
        };
        let state_changed = if self.state().is_active() {
            self.set_state(SessionState::Idle);
            true
        } else {
            false
        };
        health_changed || state_changed
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.read().unwrap().clone()
    }

    pub fn set_timing(&self, snapshot: TimingSnapshot) {
        *self.timing.write().unwrap() = Some(snapshot);
    }

    pub fn timing(&self) -> Option<TimingSnapshot> {
        *self.timing.read().unwrap()
    }

    pub fn set_recording_started(&self, at: DateTime<Utc>) {
        *self.recording_started_at.write().unwrap() = Some(at);
    }

    pub fn recording_started_at(&self) -> Option<DateTime<Utc>> {
        *self.recording_started_at.read().unwrap()
    }

    /// Current status as a wire report.
    pub fn status_report(&self) -> StatusReport {
        let health = self.health.read().unwrap();
        StatusReport::now(self.state(), health.connected, health.last_error.clone())
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the lifecycle state machine and drives instrument operations.
pub struct SessionController {
    shared: Arc<SessionShared>,
    discovery: Arc<dyn Discovery>,
    sequencer: ConditionSequencer,
    status: StatusSender,
    config: AgentConfig,
}

impl SessionController {
    pub fn new(
        shared: Arc<SessionShared>,
        discovery: Arc<dyn Discovery>,
        status: StatusSender,
        config: AgentConfig,
    ) -> Self {
        let sequencer = ConditionSequencer::new(config.condition_settle(), config.stop_settle());
        Self {
            shared,
            discovery,
            sequencer,
            status,
            config,
        }
    }

    /// Dispatch one command against the current state. Pairs outside the
    /// lifecycle table are rejected here, not handled by fallthrough.
    pub async fn handle_command(&mut self, command: Command) {
        let state = self.shared.state();
        match (state, command.kind) {
            (SessionState::Idle, CommandKind::Connect) => self.connect().await,
            (SessionState::Connected, CommandKind::Disconnect) => self.disconnect().await,
            (SessionState::Connected, CommandKind::Start) => self.start(&command).await,
            (SessionState::Recording, CommandKind::Condition) => self.condition(&command).await,
            (SessionState::Recording, CommandKind::Stop) => self.stop().await,
            (SessionState::Recording, CommandKind::Disconnect) => {
                self.disconnect_recording().await
            }
            (state, kind) => {
                debug!("ignoring '{}' command in state {}", kind, state);
            }
        }
    }

    async fn connect(&mut self) {
        // The monitor may have restored a handle since the last session.
        let existing = self.shared.device();
        let result = match existing {
            Some(device) => Ok(device),
            None => self
                .discovery
                .discover(self.config.discovery_timeout())
                .map(|device| {
                    self.shared.install_device(device.clone());
                    device
                }),
        };

        match result {
            Ok(_) => {
                self.shared.mark_connected();
                self.shared.set_state(SessionState::Connected);
                info!("instrument connected");
            }
            Err(e) => {
                warn!("connect failed: {}", e);
                self.shared.connection_lost(&e.to_string());
            }
        }
        self.status.publish_now();
    }

    async fn disconnect(&mut self) {
        self.shared.release_device();
        self.shared.mark_closed();
        self.shared.set_state(SessionState::Idle);
        info!("instrument disconnected");
        self.status.publish_now();
    }

    async fn start(&mut self, command: &Command) {
        let Some(device) = self.shared.device() else {
            warn!("start requested but the instrument handle is gone");
            self.shared.connection_lost("instrument handle missing");
            self.status.publish_now();
            return;
        };

        // Best-effort: rejected fields are omitted, never fatal to start.
        template::submit_best_effort(device.as_ref(), command);

        match device.recording_start() {
            Ok(recording_id) => {
                self.sequencer.reset();
                self.shared.set_recording_started(Utc::now());
                self.shared.set_state(SessionState::Recording);
                match self.shared.timing() {
                    Some(timing) => info!(
                        "recording {} started (clock offset {:+.2} ms at start)",
                        recording_id, timing.offset.mean
                    ),
                    None => info!("recording {} started (no clock offset estimate yet)", recording_id),
                }
            }
            Err(e) => {
                warn!("recording start failed: {}", e);
                self.shared.mark_error(&e.to_string());
            }
        }
        self.status.publish_now();
    }

    async fn condition(&mut self, command: &Command) {
        let label = command.label.as_deref().unwrap_or("NA");
        let Some(device) = self.shared.device() else {
            warn!("condition '{}' requested but the instrument handle is gone", label);
            self.shared.connection_lost("instrument handle missing");
            self.status.publish_now();
            return;
        };

        if let Err(e) = self.sequencer.send_condition(device.as_ref(), label).await {
            warn!("condition event '{}' failed: {}", label, e);
            self.shared.mark_error(&e.to_string());
            self.status.publish_now();
        }
    }

    async fn stop(&mut self) {
        let Some(device) = self.shared.device() else {
            warn!("stop requested but the instrument handle is gone");
            self.shared.connection_lost("instrument handle missing");
            self.status.publish_now();
            return;
        };

        if let Err(e) = self.sequencer.close_on_stop(device.as_ref()).await {
            warn!("closing open condition failed: {}", e);
        }
        if let Err(e) = device.recording_stop_and_save() {
            // The device may still have saved; the health monitor settles it.
            warn!("stop-and-save failed: {}", e);
            self.shared.mark_error(&e.to_string());
        }
        self.sequencer.reset();
        self.shared.set_state(SessionState::Connected);
        self.status.publish_now();
    }

    async fn disconnect_recording(&mut self) {
        if let Some(device) = self.shared.device() {
            if let Err(e) = self.sequencer.close_on_stop(device.as_ref()).await {
                warn!("closing open condition failed: {}", e);
            }
        }
        // The recording flag is still set here, so the release performs the
        // stop-and-save guard before closing the handle.
        self.shared.release_device();
        self.sequencer.reset();
        self.shared.mark_closed();
        self.shared.set_state(SessionState::Idle);
        info!("instrument disconnected (recording saved)");
        self.status.publish_now();
    }

    /// Ordered shutdown: stop-and-save guard first, then the final status.
    pub async fn shutdown(&mut self) {
        info!("shutting down session");
        if self.shared.is_recording() {
            if let Some(device) = self.shared.device() {
                if let Err(e) = self.sequencer.close_on_stop(device.as_ref()).await {
                    warn!("closing open condition failed: {}", e);
                }
            }
        }
        self.shared.release_device();
        self.sequencer.reset();
        self.shared.mark_closed();
        self.shared.mark_error("agent shutting down");
        self.shared.set_state(SessionState::ShuttingDown);
        self.status.publish_now();
    }
}
