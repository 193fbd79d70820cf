//! gazeproto - Protocol types for the Gazekeeper message bus
//!
//! This crate defines the wire contract between the Gazekeeper agent and the
//! rest of the acquisition pipeline. Messages are topic-framed JSON on a
//! pub/sub broker:
//!
//! - **Commands** arrive on the command topic as
//!   `{command, label?, subject_id?, session_id?, id?}` objects. Anything
//!   else on the topic is dropped silently.
//! - **Status** is published on the agent's own topic as
//!   `{state, connected, error?, timestamp}` - both as a periodic heartbeat
//!   and immediately on every session transition.
//! - **Telemetry** (clock-offset statistics) shares the status topic with a
//!   `{state, time_offset_ms_*, roundtrip_duration_ms_*, timestamp}` schema.
//!
//! The `peer` feature adds the ZMQ transport: a PUB/SUB pair connected to the
//! broker plus the REQ settings handshake performed once at startup. The
//! types compile without it so consumers that only need the schema (e.g. the
//! export API) avoid the transport dependencies entirely.

pub mod command;
pub mod state;
pub mod status;

#[cfg(feature = "peer")]
pub mod peer;

pub use command::{Command, CommandKind};
pub use state::SessionState;
pub use status::{StatusReport, TimingReport};

#[cfg(feature = "peer")]
pub use peer::{connect_bus, request_settings, BusError, BusPublisher, BusSubscriber};
