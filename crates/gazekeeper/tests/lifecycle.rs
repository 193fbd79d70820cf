//! Lifecycle tests with the controller and health monitor running
//! concurrently against a simulated instrument.

use std::sync::Arc;
use std::time::Duration;

use gazeconf::AgentConfig;
use gazekeeper::health::{run_health_monitor, MonitorTiming};
use gazekeeper::instrument::mock::{MockDiscovery, MockInstrument};
use gazekeeper::session::{SessionController, SessionShared};
use gazekeeper::status::status_channel;
use gazeproto::{Command, CommandKind, SessionState};
use tokio::sync::broadcast;

fn command(kind: CommandKind) -> Command {
    Command {
        kind,
        label: None,
        subject_id: None,
        session_id: None,
        acquisition_id: None,
    }
}

fn condition(label: &str) -> Command {
    Command {
        label: Some(label.to_string()),
        ..command(CommandKind::Condition)
    }
}

struct Harness {
    controller: SessionController,
    shared: Arc<SessionShared>,
    device: Arc<MockInstrument>,
    discovery: Arc<MockDiscovery>,
    shutdown: broadcast::Sender<()>,
    monitor: tokio::task::JoinHandle<()>,
}

/// Controller plus a live monitor on 10ms cycles.
fn start_harness() -> Harness {
    let device = Arc::new(MockInstrument::new());
    let discovery = Arc::new(MockDiscovery::with_device(device.clone()));
    let shared = Arc::new(SessionShared::new());
    shared.set_state(SessionState::Idle);

    let (status, _status_rx) = status_channel(256);
    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let timing = MonitorTiming {
        cycle: Duration::from_millis(10),
        rediscovery: Duration::from_millis(10),
        backoff: Duration::from_millis(10),
        estimate_deadline: Duration::from_millis(100),
    };
    let monitor = tokio::spawn(run_health_monitor(
        shared.clone(),
        discovery.clone(),
        status.clone(),
        timing,
        shutdown_rx,
    ));

    let config = AgentConfig {
        condition_settle_ms: 1,
        stop_settle_ms: 1,
        ..Default::default()
    };
    let controller = SessionController::new(shared.clone(), discovery.clone(), status, config);

    Harness {
        controller,
        shared,
        device,
        discovery,
        shutdown,
        monitor,
    }
}

impl Harness {
    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.monitor.await.unwrap();
    }
}

#[tokio::test]
async fn full_acquisition_with_live_monitor() {
    let mut h = start_harness();

    h.controller.handle_command(command(CommandKind::Connect)).await;
    assert_eq!(h.shared.state(), SessionState::Connected);

    // Let the monitor run a few healthy cycles while connected.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.shared.timing().is_some(), "monitor stored a timing estimate");

    h.controller.handle_command(command(CommandKind::Start)).await;
    assert_eq!(h.shared.state(), SessionState::Recording);

    // The monitor suspends for the whole recording: no estimation calls.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let estimates_at_start = h.device.estimate_calls();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        h.device.estimate_calls(),
        estimates_at_start,
        "no estimation while recording"
    );

    h.controller.handle_command(condition("A")).await;
    h.controller.handle_command(condition("A")).await;
    h.controller.handle_command(condition("B")).await;
    h.controller.handle_command(command(CommandKind::Stop)).await;
    assert_eq!(h.shared.state(), SessionState::Connected);

    assert_eq!(h.device.events(), vec!["A.begin", "A.end", "B.begin", "B.end"]);
    let log = h.device.call_log();
    let b_end = log.iter().position(|c| c == "event:B.end").unwrap();
    let stop = log.iter().position(|c| c == "stop_and_save").unwrap();
    assert!(b_end < stop, "stop-and-save only after the final .end");

    h.controller.handle_command(command(CommandKind::Disconnect)).await;
    assert_eq!(h.shared.state(), SessionState::Idle);
    assert!(h.shared.device().is_none());

    h.stop().await;
}

#[tokio::test]
async fn disconnect_mid_recording_with_live_monitor() {
    let mut h = start_harness();

    h.controller.handle_command(command(CommandKind::Connect)).await;
    h.controller.handle_command(command(CommandKind::Start)).await;
    h.controller.handle_command(condition("A")).await;
    h.controller.handle_command(command(CommandKind::Disconnect)).await;

    assert_eq!(h.shared.state(), SessionState::Idle);
    let log = h.device.call_log();
    let a_end = log.iter().position(|c| c == "event:A.end").unwrap();
    let stop = log.iter().position(|c| c == "stop_and_save").unwrap();
    let close = log.iter().position(|c| c == "close").unwrap();
    assert!(a_end < stop, "open condition closed before stop-and-save");
    assert!(stop < close, "stop-and-save preceded handle release");

    h.stop().await;
}

#[tokio::test]
async fn connection_loss_falls_back_then_recovers() {
    let mut h = start_harness();

    h.controller.handle_command(command(CommandKind::Connect)).await;
    assert_eq!(h.shared.state(), SessionState::Connected);
    let attempts_after_connect = h.discovery.attempts();

    // Instrument drops off the network: the monitor forces Idle.
    h.device.set_connected(false);
    let mut forced_idle = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if h.shared.state() == SessionState::Idle {
            forced_idle = true;
            break;
        }
    }
    assert!(forced_idle, "monitor forced the session back to Idle");
    assert!(!h.shared.health().connected);

    // Instrument returns: health recovers but the state stays Idle until
    // the pipeline commands a reconnect.
    h.device.set_connected(true);
    let mut recovered = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if h.shared.health().connected {
            recovered = true;
            break;
        }
    }
    assert!(recovered, "health recovered after the instrument returned");
    assert_eq!(h.shared.state(), SessionState::Idle);

    h.controller.handle_command(command(CommandKind::Connect)).await;
    assert_eq!(h.shared.state(), SessionState::Connected);
    // The handle was never discarded, so no rediscovery was needed.
    assert_eq!(h.discovery.attempts(), attempts_after_connect);

    h.stop().await;
}
