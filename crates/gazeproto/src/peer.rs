//! Bus peer - the agent side of the pub/sub broker connection.
//!
//! Three sockets, all connecting to an already-running broker:
//! - PUB to the broker frontend (status and telemetry out)
//! - SUB to the broker backend (commands in)
//! - REQ to the settings endpoint (one-shot startup handshake)
//!
//! Messages are two frames on the wire: topic, then a JSON payload. The PUB
//! and SUB halves are split so the status publisher task and the command
//! intake loop can own their socket independently.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use zeromq::{PubSocket, ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use gazeconf::BusConfig;

/// Bus transport errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect {name} socket to {endpoint}: {source}")]
    Connect {
        name: &'static str,
        endpoint: String,
        source: zeromq::ZmqError,
    },

    #[error("failed to subscribe to '{topic}': {source}")]
    Subscribe {
        topic: String,
        source: zeromq::ZmqError,
    },

    #[error("failed to serialize payload for '{topic}': {source}")]
    Serialize {
        topic: String,
        source: serde_json::Error,
    },

    #[error("failed to send on '{topic}': {source}")]
    Send {
        topic: String,
        source: zeromq::ZmqError,
    },

    #[error("receive failed: {0}")]
    Recv(zeromq::ZmqError),

    #[error("broker settings request to {endpoint} timed out after {timeout:?}")]
    SettingsTimeout { endpoint: String, timeout: Duration },

    #[error("broker settings reply was not valid JSON: {0}")]
    SettingsMalformed(serde_json::Error),
}

/// PUB half of the bus connection.
pub struct BusPublisher {
    socket: PubSocket,
}

impl BusPublisher {
    /// Publish a JSON payload on a topic.
    pub async fn publish<T: Serialize>(&mut self, topic: &str, payload: &T) -> Result<(), BusError> {
        let json = serde_json::to_vec(payload).map_err(|e| BusError::Serialize {
            topic: topic.to_string(),
            source: e,
        })?;

        let mut message = ZmqMessage::from(topic.to_string());
        message.push_back(json.into());

        self.socket.send(message).await.map_err(|e| BusError::Send {
            topic: topic.to_string(),
            source: e,
        })
    }
}

/// SUB half of the bus connection.
pub struct BusSubscriber {
    socket: SubSocket,
}

impl BusSubscriber {
    /// Receive one topic-framed JSON message, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapses or when a frame arrives
    /// that is not a well-formed two-frame JSON message (malformed traffic
    /// is logged and dropped, never fatal).
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<(String, Value)>, BusError> {
        let message = match tokio::time::timeout(timeout, self.socket.recv()).await {
            Err(_elapsed) => return Ok(None),
            Ok(Err(e)) => return Err(BusError::Recv(e)),
            Ok(Ok(message)) => message,
        };

        let frames = message.into_vec();
        if frames.len() != 2 {
            debug!("dropping {}-frame message (expected topic + payload)", frames.len());
            return Ok(None);
        }

        let topic = String::from_utf8_lossy(&frames[0]).to_string();
        match serde_json::from_slice(&frames[1]) {
            Ok(payload) => Ok(Some((topic, payload))),
            Err(e) => {
                warn!("dropping malformed payload on '{}': {}", topic, e);
                Ok(None)
            }
        }
    }
}

/// Connect the PUB/SUB pair to the broker and subscribe to the command topic.
pub async fn connect_bus(bus: &BusConfig) -> Result<(BusPublisher, BusSubscriber), BusError> {
    let mut publisher = PubSocket::new();
    publisher
        .connect(&bus.frontend)
        .await
        .map_err(|e| BusError::Connect {
            name: "pub",
            endpoint: bus.frontend.clone(),
            source: e,
        })?;
    info!("pub socket connected to {}", bus.frontend);

    let mut subscriber = SubSocket::new();
    subscriber
        .connect(&bus.backend)
        .await
        .map_err(|e| BusError::Connect {
            name: "sub",
            endpoint: bus.backend.clone(),
            source: e,
        })?;
    subscriber
        .subscribe(&bus.command_topic)
        .await
        .map_err(|e| BusError::Subscribe {
            topic: bus.command_topic.clone(),
            source: e,
        })?;
    info!(
        "sub socket connected to {} (topic '{}')",
        bus.backend, bus.command_topic
    );

    Ok((
        BusPublisher { socket: publisher },
        BusSubscriber { socket: subscriber },
    ))
}

/// Perform the one-shot settings handshake with the broker.
///
/// Sends `{"agent": <id>}` and waits for a JSON reply within `timeout`.
/// A timeout here means the broker is unreachable - callers treat that as
/// fatal at startup rather than running with a disconnected control plane.
pub async fn request_settings(bus: &BusConfig, timeout: Duration) -> Result<Value, BusError> {
    let mut socket = ReqSocket::new();
    socket
        .connect(&bus.settings)
        .await
        .map_err(|e| BusError::Connect {
            name: "settings",
            endpoint: bus.settings.clone(),
            source: e,
        })?;

    let request = serde_json::json!({ "agent": bus.agent_id });
    let message = ZmqMessage::from(request.to_string());

    let exchange = async {
        socket.send(message).await.map_err(|e| BusError::Send {
            topic: "settings".to_string(),
            source: e,
        })?;
        socket.recv().await.map_err(BusError::Recv)
    };

    let reply = match tokio::time::timeout(timeout, exchange).await {
        Err(_elapsed) => {
            return Err(BusError::SettingsTimeout {
                endpoint: bus.settings.clone(),
                timeout,
            })
        }
        Ok(result) => result?,
    };

    let frames = reply.into_vec();
    let body = frames.first().map(AsRef::as_ref).unwrap_or_default();
    serde_json::from_slice(body).map_err(BusError::SettingsMalformed)
}

/// Extract the broker-supplied heartbeat period override, if present.
pub fn health_status_period(settings: &Value) -> Option<u64> {
    settings.get("health_status_period").and_then(Value::as_u64)
}
