//! Health monitor - connectivity probing and clock-offset estimation.
//!
//! Runs as an independent task on its own schedule, decoupled from command
//! intake. Each cycle it either: skips entirely while a recording holds the
//! instrument's RPC channel; rediscovers a lost handle at reduced cadence;
//! or probes the bound handle and, when the probe passes, races one
//! `estimate_time_offset` call against a hard deadline on a blocking task.
//!
//! A timed-out estimation is abandoned, not awaited: the blocking thread
//! keeps the last `Arc` to the handle (which closes on drop whenever the
//! call eventually returns) while the stored handle is treated as poisoned
//! and discarded so the next cycle rediscovers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use gazeconf::AgentConfig;

use crate::instrument::Discovery;
use crate::session::{SessionShared, TimingSnapshot};
use crate::status::StatusSender;

/// Monitor cadence, pulled out of `AgentConfig` so tests can run the loop
/// with millisecond timings.
#[derive(Debug, Clone)]
pub struct MonitorTiming {
    /// Sleep between full probe+estimate cycles.
    pub cycle: Duration,
    /// Discovery attempt timeout (and suspension nap) while unbound.
    pub rediscovery: Duration,
    /// Back-off after a failed probe or discovery attempt.
    pub backoff: Duration,
    /// Hard deadline for one estimation call.
    pub estimate_deadline: Duration,
}

impl MonitorTiming {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            cycle: config.health_interval(),
            rediscovery: config.rediscovery_interval(),
            backoff: config.rediscovery_backoff(),
            estimate_deadline: config.estimate_deadline(),
        }
    }
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Run the monitor until the shutdown signal fires.
pub async fn run_health_monitor(
    shared: Arc<SessionShared>,
    discovery: Arc<dyn Discovery>,
    status: StatusSender,
    timing: MonitorTiming,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        // Suspended while recording: never contend with the active
        // recording's RPC channel on the same handle.
        if shared.is_recording() {
            if sleep_or_shutdown(timing.rediscovery, &mut shutdown).await {
                break;
            }
            continue;
        }

        let Some(device) = shared.device() else {
            // Unbound: rediscover at reduced cadence.
            match discovery.discover(timing.rediscovery) {
                Ok(device) => {
                    shared.install_device(device);
                    info!("instrument rediscovered");
                    if shared.mark_connected() {
                        status.publish_now();
                    }
                    // Next cycle probes the fresh handle.
                    continue;
                }
                Err(e) => {
                    // Publish only when this actually changes the picture.
                    if shared.connection_lost(&e.to_string()) {
                        status.publish_now();
                    }
                    if sleep_or_shutdown(timing.backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            }
        };

        // Lightweight probe; a raised error and a clean "not connected"
        // read identically.
        let reason = match device.is_connected() {
            Ok(true) => None,
            Ok(false) => Some("connection lost: instrument reports not connected".to_string()),
            Err(e) => Some(format!("connection lost: {}", e)),
        };
        if let Some(reason) = reason {
            warn!("{}", reason);
            if shared.connection_lost(&reason) {
                status.publish_now();
            }
            if sleep_or_shutdown(timing.backoff, &mut shutdown).await {
                break;
            }
            continue;
        }
        if shared.mark_connected() {
            status.publish_now();
        }

        // A recording may have started since the cycle began; the estimate
        // must never run against a recording handle.
        if shared.is_recording() {
            continue;
        }

        debug!("estimating time offset");
        let worker = device.clone();
        let call = tokio::task::spawn_blocking(move || worker.estimate_time_offset());
        match tokio::time::timeout(timing.estimate_deadline, call).await {
            Ok(Ok(Ok(estimate))) => {
                let snapshot = TimingSnapshot::from_estimate(estimate);
                shared.set_timing(snapshot);
                status.publish_timing(snapshot.report(shared.state()));
            }
            Ok(Ok(Err(e))) => {
                discard_device(&shared, &status, &format!("disconnected due to {}", e));
            }
            Ok(Err(join_error)) => {
                discard_device(
                    &shared,
                    &status,
                    &format!("disconnected due to estimation task failure: {}", join_error),
                );
            }
            Err(_elapsed) => {
                // The stuck call is abandoned with its Arc clone; only the
                // stored handle is discarded here.
                discard_device(
                    &shared,
                    &status,
                    &format!(
                        "disconnected due to estimate_time_offset exceeding {:?}",
                        timing.estimate_deadline
                    ),
                );
            }
        }

        if sleep_or_shutdown(timing.cycle, &mut shutdown).await {
            break;
        }
    }
    debug!("health monitor stopped");
}

/// Drop the bound handle after an estimation failure. The release runs the
/// stop-and-save guard in case a recording started during the estimate.
fn discard_device(shared: &SessionShared, status: &StatusSender, reason: &str) {
    warn!("{}", reason);
    shared.release_device();
    shared.connection_lost(reason);
    status.publish_now();
}

/// Sleep, returning true if the shutdown signal fired first.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.recv() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::{EstimateBehavior, MockDiscovery, MockInstrument};
    use crate::status::{status_channel, StatusEvent};
    use gazeproto::SessionState;
    use tokio::sync::mpsc;

    fn fast_timing() -> MonitorTiming {
        MonitorTiming {
            cycle: Duration::from_millis(10),
            rediscovery: Duration::from_millis(10),
            backoff: Duration::from_millis(10),
            estimate_deadline: Duration::from_millis(40),
        }
    }

    async fn run_for(
        shared: Arc<SessionShared>,
        discovery: Arc<MockDiscovery>,
        duration: Duration,
    ) -> mpsc::Receiver<StatusEvent> {
        let (status, rx) = status_channel(64);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_health_monitor(
            shared,
            discovery,
            status,
            fast_timing(),
            shutdown_rx,
        ));
        tokio::time::sleep(duration).await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<StatusEvent>) -> (usize, usize) {
        let mut changed = 0;
        let mut timing = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                StatusEvent::Changed => changed += 1,
                StatusEvent::Timing(_) => timing += 1,
            }
        }
        (changed, timing)
    }

    #[tokio::test]
    async fn suspended_while_recording() {
        let device = Arc::new(MockInstrument::new());
        let shared = Arc::new(SessionShared::new());
        shared.install_device(device.clone());
        shared.set_state(SessionState::Recording);
        let discovery = Arc::new(MockDiscovery::with_device(device.clone()));

        run_for(shared, discovery, Duration::from_millis(100)).await;

        // Zero estimate calls (and zero probes) while recording.
        assert_eq!(device.estimate_calls(), 0);
        assert!(device.call_log().is_empty());
    }

    #[tokio::test]
    async fn estimates_and_stores_timing_when_healthy() {
        let device = Arc::new(MockInstrument::new());
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Connected);
        shared.install_device(device.clone());
        let discovery = Arc::new(MockDiscovery::with_device(device.clone()));

        let mut rx = run_for(shared.clone(), discovery, Duration::from_millis(100)).await;

        assert!(device.estimate_calls() >= 1);
        let snapshot = shared.timing().expect("timing stored");
        assert_eq!(snapshot.offset.mean, -1.4);
        let (_, timing_events) = drain(&mut rx);
        assert!(timing_events >= 1);
        // Still connected, still Connected.
        assert_eq!(shared.state(), SessionState::Connected);
        assert!(shared.health().connected);
    }

    #[tokio::test]
    async fn probe_failure_forces_active_session_to_idle() {
        let device = Arc::new(MockInstrument::new());
        device.set_connected(false);
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Connected);
        shared.mark_connected();
        shared.install_device(device.clone());
        let discovery = Arc::new(MockDiscovery::with_device(device.clone()));

        let mut rx = run_for(shared.clone(), discovery, Duration::from_millis(60)).await;

        assert_eq!(shared.state(), SessionState::Idle);
        let health = shared.health();
        assert!(!health.connected);
        assert!(health.last_error.unwrap().contains("connection lost"));
        assert_eq!(device.estimate_calls(), 0, "no estimate on a failed probe");
        let (changed, _) = drain(&mut rx);
        assert!(changed >= 1);
    }

    #[tokio::test]
    async fn probe_error_reads_like_not_connected() {
        let device = Arc::new(MockInstrument::new());
        device.set_probe_error("sensor dropped");
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Connected);
        shared.install_device(device.clone());
        let discovery = Arc::new(MockDiscovery::with_device(device.clone()));

        run_for(shared.clone(), discovery, Duration::from_millis(60)).await;

        assert_eq!(shared.state(), SessionState::Idle);
        assert!(shared
            .health()
            .last_error
            .unwrap()
            .contains("sensor dropped"));
    }

    #[tokio::test]
    async fn estimate_timeout_discards_handle_and_rediscovers() {
        // The bound handle hangs past the deadline; discovery offers a
        // healthy replacement for the next cycle.
        let stuck = Arc::new(MockInstrument::new());
        stuck.set_estimate(EstimateBehavior::Hang(Duration::from_millis(150)));
        let replacement = Arc::new(MockInstrument::new());
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Connected);
        shared.install_device(stuck.clone());
        let discovery = Arc::new(MockDiscovery::with_device(replacement.clone()));

        let mut rx = run_for(
            shared.clone(),
            discovery.clone(),
            Duration::from_millis(120),
        )
        .await;

        // The stuck handle was discarded within one cycle...
        assert!(stuck.call_log().contains(&"close".to_string()));
        assert_eq!(stuck.estimate_calls(), 1);
        // ...and the next cycle rediscovered and resumed estimating.
        assert!(discovery.attempts() >= 1);
        assert!(shared.device().is_some(), "rediscovery restored a handle");
        assert!(replacement.estimate_calls() >= 1);
        assert!(shared.timing().is_some());
        let (changed, _) = drain(&mut rx);
        assert!(changed >= 1);
        // The forced fallback applies to the session state.
        assert_eq!(shared.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn estimate_failure_is_treated_as_connection_loss() {
        let device = Arc::new(MockInstrument::new());
        device.set_estimate(EstimateBehavior::Fail("clock sync refused".to_string()));
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Connected);
        shared.install_device(device.clone());
        let discovery = Arc::new(MockDiscovery::with_device(device.clone()));

        // A long cycle sleep keeps the loop parked after the first discard.
        let (status, _status_rx) = status_channel(64);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let timing = MonitorTiming {
            cycle: Duration::from_secs(60),
            rediscovery: Duration::from_millis(10),
            backoff: Duration::from_millis(10),
            estimate_deadline: Duration::from_millis(40),
        };
        let task = tokio::spawn(run_health_monitor(
            shared.clone(),
            discovery,
            status,
            timing,
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(shared.state(), SessionState::Idle);
        let health = shared.health();
        assert!(!health.connected);
        assert!(health.last_error.unwrap().contains("clock sync refused"));
        assert!(device.call_log().contains(&"close".to_string()));
        assert!(shared.device().is_none());
    }

    #[tokio::test]
    async fn rediscovery_restores_handle_without_promoting_state() {
        let device = Arc::new(MockInstrument::new());
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Idle);
        let discovery = Arc::new(MockDiscovery::with_device(device.clone()));

        run_for(shared.clone(), discovery, Duration::from_millis(80)).await;

        assert!(shared.device().is_some());
        assert!(shared.health().connected);
        // Lifecycle transitions stay controller-owned.
        assert_eq!(shared.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn repeated_discovery_failures_publish_once() {
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Idle);
        let discovery = Arc::new(MockDiscovery::empty());

        let mut rx = run_for(
            shared.clone(),
            discovery.clone(),
            Duration::from_millis(100),
        )
        .await;

        assert!(discovery.attempts() >= 2, "kept retrying with back-off");
        let (changed, _) = drain(&mut rx);
        assert_eq!(changed, 1, "redundant disconnected churn suppressed");
    }

    #[tokio::test]
    async fn shutdown_interrupts_sleep_promptly() {
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Idle);
        let discovery = Arc::new(MockDiscovery::empty());
        let (status, _rx) = status_channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let timing = MonitorTiming {
            cycle: Duration::from_secs(60),
            rediscovery: Duration::from_millis(10),
            backoff: Duration::from_secs(60),
            estimate_deadline: Duration::from_secs(60),
        };
        let task = tokio::spawn(run_health_monitor(
            shared,
            discovery,
            status,
            timing,
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = std::time::Instant::now();
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "shutdown observed promptly, not after a full back-off"
        );
    }
}
