//! One open connection to a cast device.
//!
//! [`SessionClient`] wraps a [`CastConnection`] and normalizes everything it
//! pushes into [`SessionMessage`]s on a single channel. Every message carries
//! the generation of the connection that produced it, so the consumer can
//! discard messages from a connection it already tore down.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{CastConnection, ConnectionEvent, MediaChannel};
use crate::error::ClientError;
use crate::status::{MediaStatus, ReceiverStatus};
use crate::supervisor::Generation;

/// Normalized event from a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ReceiverStatus(ReceiverStatus),
    MediaStatus {
        session_id: String,
        status: MediaStatus,
    },
    Disconnected {
        reason: Option<String>,
    },
    HeartbeatTimeout,
    ClientError(ClientError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub generation: Generation,
    pub event: SessionEvent,
}

type MessageSender = mpsc::UnboundedSender<SessionMessage>;

pub struct SessionClient {
    generation: Generation,
    connection: Arc<dyn CastConnection>,
    events: MessageSender,
    forwarder: JoinHandle<()>,
    media: Option<MediaSession>,
}

impl SessionClient {
    /// Take over an open connection and start forwarding its events.
    ///
    /// A receiver status request is issued right after subscribing, so the
    /// consumer learns the current state without waiting for the device.
    pub fn attach(
        generation: Generation,
        connection: Arc<dyn CastConnection>,
        events: MessageSender,
    ) -> Self {
        let receiver = connection.subscribe();
        let forwarder = tokio::spawn(forward_connection_events(
            generation,
            receiver,
            events.clone(),
        ));

        let client = Self {
            generation,
            connection,
            events,
            forwarder,
            media: None,
        };
        client.refresh_status();
        client
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn connection(&self) -> Arc<dyn CastConnection> {
        Arc::clone(&self.connection)
    }

    /// Request a receiver status; the reply arrives as a message.
    pub fn refresh_status(&self) {
        let connection = Arc::clone(&self.connection);
        let events = self.events.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            match connection.receiver_status().await {
                Ok(status) => {
                    let _ = events.send(SessionMessage {
                        generation,
                        event: SessionEvent::ReceiverStatus(status),
                    });
                }
                Err(e) => warn!(%generation, error = %e, "Receiver status request failed"),
            }
        });
    }

    /// Start forwarding media status for a joined application session.
    pub fn attach_media(&mut self, session_id: String, channel: Arc<dyn MediaChannel>) {
        self.media = Some(MediaSession::attach(
            self.generation,
            session_id,
            channel,
            self.events.clone(),
        ));
    }

    pub fn detach_media(&mut self) {
        if let Some(media) = self.media.take() {
            debug!(session_id = %media.session_id, "Media session detached");
        }
    }

    pub fn media(&self) -> Option<&MediaSession> {
        self.media.as_ref()
    }

    /// Stop forwarding and close the connection.
    ///
    /// Close errors are logged and otherwise ignored.
    pub fn disconnect(self) {
        self.forwarder.abort();
        let connection = Arc::clone(&self.connection);
        let generation = self.generation;

        tokio::spawn(async move {
            if let Err(e) = connection.close().await {
                debug!(%generation, error = %e, "Ignoring error while closing connection");
            }
        });
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// The media channel of the joined application session.
pub struct MediaSession {
    session_id: String,
    channel: Arc<dyn MediaChannel>,
    forwarder: JoinHandle<()>,
}

impl MediaSession {
    fn attach(
        generation: Generation,
        session_id: String,
        channel: Arc<dyn MediaChannel>,
        events: MessageSender,
    ) -> Self {
        let receiver = channel.subscribe();
        let forwarder = tokio::spawn(forward_media_status(
            generation,
            session_id.clone(),
            Arc::clone(&channel),
            receiver,
            events,
        ));

        Self {
            session_id,
            channel,
            forwarder,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn channel(&self) -> Arc<dyn MediaChannel> {
        Arc::clone(&self.channel)
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

async fn forward_connection_events(
    generation: Generation,
    mut receiver: broadcast::Receiver<ConnectionEvent>,
    events: MessageSender,
) {
    loop {
        let event = match receiver.recv().await {
            Ok(ConnectionEvent::ReceiverStatus(status)) => SessionEvent::ReceiverStatus(status),
            Ok(ConnectionEvent::Disconnected { reason }) => SessionEvent::Disconnected { reason },
            Ok(ConnectionEvent::HeartbeatTimeout) => SessionEvent::HeartbeatTimeout,
            Ok(ConnectionEvent::Error(e)) => SessionEvent::ClientError(e),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%generation, skipped, "Connection events lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                let _ = events.send(SessionMessage {
                    generation,
                    event: SessionEvent::Disconnected {
                        reason: Some("event stream closed".to_string()),
                    },
                });
                break;
            }
        };

        if events.send(SessionMessage { generation, event }).is_err() {
            break;
        }
    }
}

/// Forwards the initial media status followed by every pushed update.
///
/// Both run in this one task. A push that is ready before the initial
/// request completes supersedes it, and the request's reply is dropped.
async fn forward_media_status(
    generation: Generation,
    session_id: String,
    channel: Arc<dyn MediaChannel>,
    mut receiver: broadcast::Receiver<MediaStatus>,
    events: MessageSender,
) {
    let snapshot = channel.media_status();
    tokio::pin!(snapshot);
    let mut awaiting_snapshot = true;

    loop {
        let status = tokio::select! {
            biased;

            pushed = receiver.recv() => match pushed {
                Ok(status) => {
                    if awaiting_snapshot {
                        debug!(%session_id, "Media status pushed before the initial request returned");
                        awaiting_snapshot = false;
                    }
                    status
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%session_id, skipped, "Media status lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(%session_id, "Media channel closed");
                    break;
                }
            },

            fetched = &mut snapshot, if awaiting_snapshot => {
                awaiting_snapshot = false;
                match fetched {
                    Ok(Some(status)) => status,
                    Ok(None) => {
                        debug!(%session_id, "No media loaded");
                        continue;
                    }
                    Err(e) => {
                        warn!(%session_id, error = %e, "Media status request failed");
                        continue;
                    }
                }
            }
        };

        let message = SessionMessage {
            generation,
            event: SessionEvent::MediaStatus {
                session_id: session_id.clone(),
                status,
            },
        };
        if events.send(message).is_err() {
            break;
        }
    }
}
