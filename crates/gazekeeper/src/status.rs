//! Status publishing - heartbeat plus on-change emission.
//!
//! A single task owns the outbound sink and drains an mpsc channel of
//! publish requests. Two triggers feed the status topic: the unconditional
//! heartbeat at the configured period (protection against dropped messages)
//! and an immediate publish whenever a session transition or health change
//! is flagged by the controller or the health monitor. Publish failures are
//! logged and discarded; they never propagate into either loop.
//!
//! The task exits only once every `StatusSender` clone is dropped and the
//! queue is drained, which is what flushes the final shutdown status before
//! the bus is torn down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use gazeproto::{BusPublisher, StatusReport, TimingReport};

use crate::session::SessionShared;

/// One queued publish request.
#[derive(Debug)]
pub enum StatusEvent {
    /// Session state or health changed; publish a fresh snapshot now.
    Changed,
    /// A new timing estimate is available.
    Timing(TimingReport),
}

/// Cloneable handle for flagging publishes from the two loops.
///
/// Sends never block: a full queue drops the request with a debug log - the
/// heartbeat republishes the current snapshot shortly anyway.
#[derive(Clone)]
pub struct StatusSender {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusSender {
    /// Flag an immediate status publish.
    pub fn publish_now(&self) {
        if let Err(e) = self.tx.try_send(StatusEvent::Changed) {
            debug!("status publish dropped ({}); heartbeat will cover it", e);
        }
    }

    /// Queue a timing telemetry publish.
    pub fn publish_timing(&self, report: TimingReport) {
        if let Err(e) = self.tx.try_send(StatusEvent::Timing(report)) {
            debug!("timing publish dropped ({})", e);
        }
    }
}

/// Create the sender/receiver pair feeding the publisher task.
pub fn status_channel(capacity: usize) -> (StatusSender, mpsc::Receiver<StatusEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (StatusSender { tx }, rx)
}

/// Outbound sink seam so the publisher loop is testable without sockets.
#[async_trait]
pub trait StatusSink: Send {
    async fn publish_status(&mut self, report: &StatusReport) -> anyhow::Result<()>;
    async fn publish_timing(&mut self, report: &TimingReport) -> anyhow::Result<()>;
}

/// The real sink: the PUB half of the bus connection, bound to a topic.
pub struct BusStatusSink {
    publisher: BusPublisher,
    topic: String,
}

impl BusStatusSink {
    pub fn new(publisher: BusPublisher, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl StatusSink for BusStatusSink {
    async fn publish_status(&mut self, report: &StatusReport) -> anyhow::Result<()> {
        self.publisher.publish(&self.topic, report).await?;
        Ok(())
    }

    async fn publish_timing(&mut self, report: &TimingReport) -> anyhow::Result<()> {
        self.publisher.publish(&self.topic, report).await?;
        Ok(())
    }
}

/// Run the publisher until every sender is dropped and the queue is drained.
pub async fn run_status_publisher<S: StatusSink>(
    mut sink: S,
    shared: Arc<SessionShared>,
    mut rx: mpsc::Receiver<StatusEvent>,
    heartbeat_period: Duration,
) {
    let mut interval = tokio::time::interval(heartbeat_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                emit_status(&mut sink, &shared).await;
            }
            event = rx.recv() => match event {
                Some(StatusEvent::Changed) => {
                    emit_status(&mut sink, &shared).await;
                    // An on-change publish restarts the heartbeat clock.
                    interval.reset();
                }
                Some(StatusEvent::Timing(report)) => {
                    if let Err(e) = sink.publish_timing(&report).await {
                        warn!("timing publish failed: {}", e);
                    }
                }
                None => break,
            }
        }
    }
    debug!("status publisher drained; exiting");
}

async fn emit_status<S: StatusSink>(sink: &mut S, shared: &SessionShared) {
    let report = shared.status_report();
    if let Err(e) = sink.publish_status(&report).await {
        warn!("status publish failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazeproto::SessionState;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CaptureSink {
        statuses: Arc<Mutex<Vec<StatusReport>>>,
        timings: Arc<Mutex<Vec<TimingReport>>>,
        fail: bool,
    }

    #[async_trait]
    impl StatusSink for CaptureSink {
        async fn publish_status(&mut self, report: &StatusReport) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sink unavailable");
            }
            self.statuses.lock().unwrap().push(report.clone());
            Ok(())
        }

        async fn publish_timing(&mut self, report: &TimingReport) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sink unavailable");
            }
            self.timings.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    fn sample_timing(state: SessionState) -> TimingReport {
        TimingReport {
            state,
            time_offset_ms_mean: 0.0,
            time_offset_ms_std: 0.0,
            time_offset_ms_median: 0.0,
            roundtrip_duration_ms_mean: 0.0,
            roundtrip_duration_ms_std: 0.0,
            roundtrip_duration_ms_median: 0.0,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn heartbeat_publishes_without_changes() {
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Idle);
        let sink = CaptureSink::default();
        let statuses = sink.statuses.clone();
        let (sender, rx) = status_channel(8);

        let task = tokio::spawn(run_status_publisher(
            sink,
            shared,
            rx,
            Duration::from_millis(20),
        ));
        tokio::time::sleep(Duration::from_millis(110)).await;
        drop(sender);
        task.await.unwrap();

        // At least one publish per period with zero state changes.
        let published = statuses.lock().unwrap();
        assert!(published.len() >= 4, "got {} heartbeats", published.len());
        assert!(published.iter().all(|r| r.state == SessionState::Idle));
    }

    #[tokio::test]
    async fn transition_publishes_immediately() {
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Idle);
        let sink = CaptureSink::default();
        let statuses = sink.statuses.clone();
        let (sender, rx) = status_channel(8);

        // Heartbeat far too slow to explain a second publish.
        let task = tokio::spawn(run_status_publisher(
            sink,
            shared.clone(),
            rx,
            Duration::from_secs(60),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;

        shared.set_state(SessionState::Connected);
        shared.mark_connected();
        sender.publish_now();
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(sender);
        task.await.unwrap();

        let published = statuses.lock().unwrap();
        let last = published.last().expect("at least one publish");
        assert_eq!(last.state, SessionState::Connected);
        assert!(last.connected);
    }

    #[tokio::test]
    async fn timing_reports_flow_through() {
        let shared = Arc::new(SessionShared::new());
        let sink = CaptureSink::default();
        let timings = sink.timings.clone();
        let (sender, rx) = status_channel(8);

        let task = tokio::spawn(run_status_publisher(
            sink,
            shared,
            rx,
            Duration::from_secs(60),
        ));
        sender.publish_timing(sample_timing(SessionState::Connected));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(sender);
        task.await.unwrap();

        assert_eq!(timings.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let shared = Arc::new(SessionShared::new());
        let sink = CaptureSink {
            fail: true,
            ..Default::default()
        };
        let (sender, rx) = status_channel(8);

        let task = tokio::spawn(run_status_publisher(
            sink,
            shared,
            rx,
            Duration::from_millis(10),
        ));
        sender.publish_now();
        sender.publish_timing(sample_timing(SessionState::Idle));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(sender);

        // The task keeps running through failures and exits cleanly.
        task.await.unwrap();
    }

    #[tokio::test]
    async fn queued_publishes_drain_before_exit() {
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::ShuttingDown);
        let sink = CaptureSink::default();
        let statuses = sink.statuses.clone();
        let (sender, rx) = status_channel(8);

        // Queue the final publish and drop the sender before the task runs.
        sender.publish_now();
        drop(sender);

        run_status_publisher(sink, shared, rx, Duration::from_secs(60)).await;

        let published = statuses.lock().unwrap();
        assert!(published
            .iter()
            .any(|r| r.state == SessionState::ShuttingDown));
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (sender, _rx) = status_channel(1);
        sender.publish_now();
        // Queue is full now; these must not block or panic.
        sender.publish_now();
        sender.publish_timing(sample_timing(SessionState::Idle));
    }
}
