//! Daemon wiring - bus handshake, task spawning, and ordered shutdown.
//!
//! Startup order matters: the settings handshake is performed before
//! anything else so an unreachable broker aborts the process instead of
//! leaving an agent running with a disconnected control plane. Shutdown
//! order matters more: the stop-and-save guard runs first, the final
//! "shutting down" status is queued after it, and the publisher task drains
//! before the bus connection is dropped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use gazeconf::GazeConfig;
use gazeproto::{peer, SessionState};

use crate::health::{run_health_monitor, MonitorTiming};
use crate::instrument::Discovery;
use crate::intake;
use crate::session::{SessionController, SessionShared};
use crate::status::{run_status_publisher, status_channel, BusStatusSink};

/// Run the agent until SIGINT.
pub async fn run(config: GazeConfig, discovery: Arc<dyn Discovery>) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let ctrl_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = ctrl_tx.send(());
        }
    });

    run_until(config, discovery, shutdown_tx).await
}

/// Run the agent until the given shutdown channel fires.
pub async fn run_until(
    config: GazeConfig,
    discovery: Arc<dyn Discovery>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<()> {
    let (publisher, mut subscriber) = peer::connect_bus(&config.bus)
        .await
        .context("cannot reach broker")?;

    // Settings handshake - fatal if the broker does not answer.
    let mut agent_config = config.agent.clone();
    let settings = peer::request_settings(&config.bus, agent_config.settings_timeout())
        .await
        .context("broker settings handshake failed")?;
    info!("broker settings received: {}", settings);
    if let Some(period_ms) = peer::health_status_period(&settings) {
        info!("heartbeat period set to {} ms by broker settings", period_ms);
        agent_config.heartbeat_period_ms = period_ms;
    }

    let shared = Arc::new(SessionShared::new());
    let (status, status_rx) = status_channel(32);
    let sink = BusStatusSink::new(publisher, config.bus.status_topic.clone());
    let publisher_task = tokio::spawn(run_status_publisher(
        sink,
        shared.clone(),
        status_rx,
        agent_config.heartbeat_period(),
    ));

    // Give the broker a moment to propagate our subscription before the
    // first publish leaves.
    tokio::time::sleep(Duration::from_millis(500)).await;
    status.publish_now();

    shared.set_state(SessionState::Idle);
    status.publish_now();
    info!("gazekeeper agent ready on topic '{}'", config.bus.status_topic);

    let health_task = tokio::spawn(run_health_monitor(
        shared.clone(),
        discovery.clone(),
        status.clone(),
        MonitorTiming::from_config(&agent_config),
        shutdown_tx.subscribe(),
    ));

    let mut controller = SessionController::new(
        shared.clone(),
        discovery,
        status.clone(),
        agent_config.clone(),
    );

    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            received = subscriber.recv_timeout(agent_config.receive_timeout()) => {
                match received {
                    Ok(Some((topic, payload))) => {
                        if let Some(command) =
                            intake::accept(&topic, &payload, &config.bus.command_topic)
                        {
                            controller.handle_command(command).await;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("bus receive error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    // Ordered teardown: guard first, final status after, then drain.
    controller.shutdown().await;
    let _ = shutdown_tx.send(());
    if let Err(e) = health_task.await {
        warn!("health monitor task failed: {}", e);
    }
    drop(controller);
    drop(status);
    publisher_task
        .await
        .context("status publisher task failed")?;

    info!("gazekeeper shutdown complete");
    Ok(())
}
