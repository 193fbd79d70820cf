//! Gazekeeper - device-session coordinator for a remote eye-tracking
//! recorder.
//!
//! One agent in a multi-process acquisition pipeline: it takes lifecycle
//! commands from the message bus, drives the instrument's
//! connect/record/event/disconnect operations, and continuously reports
//! connectivity and clock-synchronization health - without blocking command
//! processing and without ever dropping a recording on the floor.
//!
//! Two loops share one session:
//! - the **intake/controller loop** polls the bus and dispatches commands
//!   through the [`session::SessionController`] state machine;
//! - the **health monitor** ([`health`]) probes connectivity and races
//!   clock-offset estimation against a hard deadline, suspending itself
//!   while a recording is in flight.
//!
//! Status and telemetry leave through a single publisher task ([`status`]),
//! fed by both loops and by an unconditional heartbeat.

pub mod daemon;
pub mod health;
pub mod instrument;
pub mod intake;
pub mod sequencer;
pub mod session;
pub mod status;
pub mod template;

pub use session::{SessionController, SessionShared};
