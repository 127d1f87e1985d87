//! The cast protocol client seam.
//!
//! The controller never speaks the wire protocol itself. It drives these
//! traits, which a protocol implementation (or a test double) provides.
//! Each trait object is shared as an `Arc` so operations can run on spawned
//! tasks while the controller keeps its own reference.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ClientError;
use crate::status::{CastingApplication, MediaStatus, ReceiverStatus};

/// Events pushed by an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Unsolicited receiver status
    ReceiverStatus(ReceiverStatus),
    /// The connection closed, with the reason the device or socket gave
    Disconnected { reason: Option<String> },
    /// A heartbeat went unanswered
    HeartbeatTimeout,
    /// Transport level error
    Error(ClientError),
}

/// Opens connections to cast devices.
#[async_trait]
pub trait CastConnector: Send + Sync {
    async fn connect(&self, address: SocketAddr) -> Result<Arc<dyn CastConnection>, ClientError>;
}

/// An open connection to a cast device.
#[async_trait]
pub trait CastConnection: Send + Sync {
    /// Subscribe to connection events. Closing the stream means the
    /// connection is gone.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Request the current receiver status.
    async fn receiver_status(&self) -> Result<ReceiverStatus, ClientError>;

    /// Join a running application session and open its media channel.
    async fn join(
        &self,
        application: &CastingApplication,
    ) -> Result<Arc<dyn MediaChannel>, ClientError>;

    /// Set the device volume, `level` in `[0, 1]`.
    async fn set_volume(&self, level: f32) -> Result<(), ClientError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), ClientError>;
}

/// The media namespace of a joined application session.
#[async_trait]
pub trait MediaChannel: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<MediaStatus>;

    /// Current media status, `None` if no media is loaded.
    async fn media_status(&self) -> Result<Option<MediaStatus>, ClientError>;

    async fn play(&self) -> Result<(), ClientError>;

    async fn pause(&self) -> Result<(), ClientError>;

    async fn stop(&self) -> Result<(), ClientError>;
}
