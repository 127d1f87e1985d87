//! Cast v2 protocol client backed by `rust_cast`.
//!
//! `rust_cast` drives a blocking TLS socket and its device handle borrows for
//! its whole life, so every connection owns one worker thread. The worker
//! ticks at a fixed interval: it runs queued requests, sends a heartbeat ping,
//! then reads until the pong arrives. Anything the device pushed in the
//! meantime is read in socket order on the way. Receiver status goes to the
//! connection's event channel and media status to the joined session's
//! channel.
//!
//! A watchdog task on the runtime raises [`ConnectionEvent::HeartbeatTimeout`]
//! when no pong has been seen for `heartbeat_timeout`.

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use rust_cast::channels::connection::ConnectionResponse;
use rust_cast::channels::heartbeat::HeartbeatResponse;
use rust_cast::channels::media::{self, MediaResponse};
use rust_cast::channels::receiver::{self, ReceiverResponse};
use rust_cast::{CastDevice, ChannelMessage};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::client::{CastConnection, CastConnector, ConnectionEvent, MediaChannel};
use crate::error::ClientError;
use crate::status::{
    Application, CastingApplication, MediaStatus, PlayerState, ReceiverStatus, VolumeStatus,
};

/// Platform receiver every sender talks to first.
const RECEIVER_DESTINATION: &str = "receiver-0";

const EVENT_BUFFER: usize = 32;

/// Default tick of the connection worker.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default silence after which a heartbeat timeout is reported.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

fn install_crypto_provider() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Err when the host already installed a provider.
        let _ = rustls::crypto::CryptoProvider::install_default(
            rustls::crypto::aws_lc_rs::default_provider(),
        );
    });
}

/// [`CastConnector`] speaking the cast v2 protocol over TLS.
#[derive(Debug, Clone)]
pub struct CastV2Connector {
    poll_interval: Duration,
    heartbeat_timeout: Duration,
}

impl Default for CastV2Connector {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

impl CastV2Connector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often the worker services requests and pings the device. Also
    /// bounds the latency of pushed status.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }
}

#[async_trait]
impl CastConnector for CastV2Connector {
    async fn connect(&self, address: SocketAddr) -> Result<Arc<dyn CastConnection>, ClientError> {
        install_crypto_provider();

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (alive_tx, alive_rx) = watch::channel(());

        let worker_events = events.clone();
        let poll_interval = self.poll_interval;
        thread::Builder::new()
            .name(format!("cast-session-{}", address))
            .spawn(move || {
                let device = match open_device(address) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // The caller gave up (connect timeout); the device drops here.
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                Worker {
                    device,
                    events: worker_events,
                    alive: alive_tx,
                    joined: None,
                    poll_interval,
                }
                .run(request_rx);
            })
            .map_err(|e| ClientError::ConnectFailed(format!("failed to spawn session thread: {}", e)))?;

        ready_rx.await.map_err(|_| ClientError::ConnectionClosed)??;
        info!(%address, "Cast channel open");

        Ok(Arc::new(CastV2Connection::new(
            events,
            requests,
            alive_rx,
            self.heartbeat_timeout,
        )))
    }
}

fn open_device<'a>(address: SocketAddr) -> Result<CastDevice<'a>, ClientError> {
    // Cast devices present self-signed certificates.
    let device = CastDevice::connect_without_host_verification(address.ip().to_string(), address.port())
        .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
    device
        .connection
        .connect(RECEIVER_DESTINATION.to_string())
        .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;
    device.heartbeat.ping().map_err(transport_error)?;
    Ok(device)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaCommand {
    Play,
    Pause,
    Stop,
}

enum Request {
    ReceiverStatus {
        reply: Reply<ReceiverStatus>,
    },
    Join {
        transport_id: String,
        statuses: broadcast::Sender<MediaStatus>,
        reply: Reply<()>,
    },
    MediaStatus {
        transport_id: String,
        reply: Reply<Option<MediaStatus>>,
    },
    Media {
        transport_id: String,
        command: MediaCommand,
        reply: Reply<()>,
    },
    SetVolume {
        level: f32,
        reply: Reply<()>,
    },
    Close,
}

type RequestSender = mpsc::UnboundedSender<Request>;

async fn send_request<T>(
    requests: &RequestSender,
    build: impl FnOnce(Reply<T>) -> Request,
) -> Result<T, ClientError> {
    let (reply, response) = oneshot::channel();
    requests
        .send(build(reply))
        .map_err(|_| ClientError::ConnectionClosed)?;
    response.await.map_err(|_| ClientError::ConnectionClosed)?
}

/// An open cast v2 connection.
pub struct CastV2Connection {
    events: broadcast::Sender<ConnectionEvent>,
    requests: RequestSender,
    watchdog: JoinHandle<()>,
}

impl CastV2Connection {
    fn new(
        events: broadcast::Sender<ConnectionEvent>,
        requests: RequestSender,
        alive: watch::Receiver<()>,
        heartbeat_timeout: Duration,
    ) -> Self {
        let watchdog = tokio::spawn(watch_heartbeat(alive, events.clone(), heartbeat_timeout));
        Self {
            events,
            requests,
            watchdog,
        }
    }
}

impl Drop for CastV2Connection {
    fn drop(&mut self) {
        self.watchdog.abort();
    }
}

#[async_trait]
impl CastConnection for CastV2Connection {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn receiver_status(&self) -> Result<ReceiverStatus, ClientError> {
        send_request(&self.requests, |reply| Request::ReceiverStatus { reply }).await
    }

    async fn join(
        &self,
        application: &CastingApplication,
    ) -> Result<Arc<dyn MediaChannel>, ClientError> {
        let (statuses, _) = broadcast::channel(EVENT_BUFFER);
        let transport_id = application.transport_id.clone();

        send_request(&self.requests, |reply| Request::Join {
            transport_id: transport_id.clone(),
            statuses: statuses.clone(),
            reply,
        })
        .await?;

        Ok(Arc::new(CastV2Media {
            transport_id,
            statuses,
            requests: self.requests.clone(),
        }))
    }

    async fn set_volume(&self, level: f32) -> Result<(), ClientError> {
        let level = level.clamp(0.0, 1.0);
        send_request(&self.requests, |reply| Request::SetVolume { level, reply }).await
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.watchdog.abort();
        self.requests
            .send(Request::Close)
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

/// Media namespace of a joined application session.
pub struct CastV2Media {
    transport_id: String,
    statuses: broadcast::Sender<MediaStatus>,
    requests: RequestSender,
}

impl CastV2Media {
    async fn command(&self, command: MediaCommand) -> Result<(), ClientError> {
        send_request(&self.requests, |reply| Request::Media {
            transport_id: self.transport_id.clone(),
            command,
            reply,
        })
        .await
    }
}

#[async_trait]
impl MediaChannel for CastV2Media {
    fn subscribe(&self) -> broadcast::Receiver<MediaStatus> {
        self.statuses.subscribe()
    }

    async fn media_status(&self) -> Result<Option<MediaStatus>, ClientError> {
        send_request(&self.requests, |reply| Request::MediaStatus {
            transport_id: self.transport_id.clone(),
            reply,
        })
        .await
    }

    async fn play(&self) -> Result<(), ClientError> {
        self.command(MediaCommand::Play).await
    }

    async fn pause(&self) -> Result<(), ClientError> {
        self.command(MediaCommand::Pause).await
    }

    async fn stop(&self) -> Result<(), ClientError> {
        self.command(MediaCommand::Stop).await
    }
}

async fn watch_heartbeat(
    mut alive: watch::Receiver<()>,
    events: broadcast::Sender<ConnectionEvent>,
    timeout: Duration,
) {
    loop {
        match tokio::time::timeout(timeout, alive.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => break,
            Err(_) => {
                debug!(?timeout, "No heartbeat from cast device");
                let _ = events.send(ConnectionEvent::HeartbeatTimeout);
            }
        }
    }
}

struct Joined {
    transport_id: String,
    media_session_id: Option<i32>,
    statuses: broadcast::Sender<MediaStatus>,
}

struct Worker<'a> {
    device: CastDevice<'a>,
    events: broadcast::Sender<ConnectionEvent>,
    alive: watch::Sender<()>,
    joined: Option<Joined>,
    poll_interval: Duration,
}

impl Worker<'_> {
    fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        let reason = 'session: loop {
            loop {
                match requests.try_recv() {
                    Ok(Request::Close) => {
                        debug!("Cast connection closed by client");
                        return;
                    }
                    Ok(request) => self.handle(request),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("Cast connection dropped by client");
                        return;
                    }
                }
            }

            if let Err(e) = self.heartbeat() {
                break 'session e.to_string();
            }
            let _ = self.alive.send(());
            thread::sleep(self.poll_interval);
        };

        warn!(%reason, "Cast connection lost");
        let _ = self.events.send(ConnectionEvent::Disconnected {
            reason: Some(reason),
        });
    }

    /// Answer one request. Failures go to the requester; a dead socket
    /// surfaces on the next heartbeat.
    fn handle(&mut self, request: Request) {
        match request {
            Request::ReceiverStatus { reply } => {
                let status = self
                    .device
                    .receiver
                    .get_status()
                    .map(|status| receiver_status_from(&status))
                    .map_err(operation_error);
                let _ = reply.send(status);
            }
            Request::Join {
                transport_id,
                statuses,
                reply,
            } => {
                let _ = reply.send(self.join(transport_id, statuses));
            }
            Request::MediaStatus {
                transport_id,
                reply,
            } => {
                let _ = reply.send(self.media_status(&transport_id));
            }
            Request::Media {
                transport_id,
                command,
                reply,
            } => {
                let _ = reply.send(self.media_command(&transport_id, command));
            }
            Request::SetVolume { level, reply } => {
                let result = self
                    .device
                    .receiver
                    .set_volume(level)
                    .map(|_| ())
                    .map_err(operation_error);
                let _ = reply.send(result);
            }
            Request::Close => {}
        }
    }

    fn heartbeat(&mut self) -> Result<(), ClientError> {
        self.device.heartbeat.ping().map_err(transport_error)?;
        loop {
            match self.device.receive().map_err(transport_error)? {
                ChannelMessage::Heartbeat(HeartbeatResponse::Pong) => return Ok(()),
                message => self.dispatch(message)?,
            }
        }
    }

    fn dispatch(&mut self, message: ChannelMessage) -> Result<(), ClientError> {
        match message {
            ChannelMessage::Heartbeat(HeartbeatResponse::Ping) => {
                self.device.heartbeat.pong().map_err(transport_error)?;
            }
            ChannelMessage::Receiver(ReceiverResponse::Status(status)) => {
                let _ = self
                    .events
                    .send(ConnectionEvent::ReceiverStatus(receiver_status_from(&status)));
            }
            ChannelMessage::Media(MediaResponse::Status(status)) => self.forward_media(&status),
            ChannelMessage::Connection(ConnectionResponse::Close) => {
                return Err(ClientError::ConnectionClosed);
            }
            _ => trace!("Ignoring cast message"),
        }
        Ok(())
    }

    fn join(
        &mut self,
        transport_id: String,
        statuses: broadcast::Sender<MediaStatus>,
    ) -> Result<(), ClientError> {
        self.device
            .connection
            .connect(transport_id.clone())
            .map_err(|e| ClientError::JoinFailed(e.to_string()))?;
        debug!(%transport_id, "Connected to application transport");
        self.joined = Some(Joined {
            transport_id,
            media_session_id: None,
            statuses,
        });
        Ok(())
    }

    fn media_status(&mut self, transport_id: &str) -> Result<Option<MediaStatus>, ClientError> {
        let status = self
            .device
            .media
            .get_status(transport_id.to_string(), None)
            .map_err(operation_error)?;
        self.remember_media_session(transport_id, &status);
        Ok(media_status_from(&status))
    }

    fn media_command(&mut self, transport_id: &str, command: MediaCommand) -> Result<(), ClientError> {
        let known = self
            .joined
            .as_ref()
            .filter(|joined| joined.transport_id == transport_id)
            .and_then(|joined| joined.media_session_id);
        let media_session_id = match known {
            Some(id) => id,
            None => self
                .device
                .media
                .get_status(transport_id.to_string(), None)
                .map_err(operation_error)?
                .entries
                .first()
                .map(|entry| entry.media_session_id)
                .ok_or_else(|| ClientError::Operation("no media loaded".to_string()))?,
        };

        let destination = transport_id.to_string();
        let result = match command {
            MediaCommand::Play => self.device.media.play(destination, media_session_id).map(|_| ()),
            MediaCommand::Pause => self.device.media.pause(destination, media_session_id).map(|_| ()),
            MediaCommand::Stop => self.device.media.stop(destination, media_session_id).map(|_| ()),
        };
        result.map_err(operation_error)?;

        // The command's own status reply is consumed by the request;
        // subscribers get a fresh one.
        let status = self
            .device
            .media
            .get_status(transport_id.to_string(), Some(media_session_id))
            .map_err(operation_error)?;
        if self
            .joined
            .as_ref()
            .is_some_and(|joined| joined.transport_id == transport_id)
        {
            self.forward_media(&status);
        }
        Ok(())
    }

    fn remember_media_session(&mut self, transport_id: &str, status: &media::Status) {
        if let Some(joined) = self
            .joined
            .as_mut()
            .filter(|joined| joined.transport_id == transport_id)
        {
            if let Some(entry) = status.entries.first() {
                joined.media_session_id = Some(entry.media_session_id);
            }
        }
    }

    fn forward_media(&mut self, status: &media::Status) {
        let Some(joined) = self.joined.as_mut() else {
            return;
        };
        if let Some(entry) = status.entries.first() {
            joined.media_session_id = Some(entry.media_session_id);
        }
        if let Some(status) = media_status_from(status) {
            let _ = joined.statuses.send(status);
        }
    }
}

fn transport_error(error: impl std::fmt::Display) -> ClientError {
    ClientError::Transport(error.to_string())
}

fn operation_error(error: impl std::fmt::Display) -> ClientError {
    ClientError::Operation(error.to_string())
}

/// `rust_cast` reports a missing `applications` key as an empty list; both
/// mean nothing is running, which is reported as absent.
fn receiver_status_from(status: &receiver::Status) -> ReceiverStatus {
    let applications = (!status.applications.is_empty()).then(|| {
        status
            .applications
            .iter()
            .map(|application| Application {
                app_id: Some(application.app_id.clone()),
                display_name: Some(application.display_name.clone()),
                session_id: application.session_id.clone(),
                transport_id: Some(application.transport_id.clone()),
                status_text: None,
            })
            .collect()
    });

    ReceiverStatus {
        applications,
        volume: Some(VolumeStatus {
            level: status.volume.level,
            muted: status.volume.muted,
        }),
    }
}

fn media_status_from(status: &media::Status) -> Option<MediaStatus> {
    status.entries.first().map(|entry| MediaStatus {
        media_session_id: Some(i64::from(entry.media_session_id)),
        player_state: Some(player_state_from(&entry.player_state)),
        idle_reason: entry.idle_reason.as_ref().map(|reason| format!("{:?}", reason)),
    })
}

fn player_state_from(state: &media::PlayerState) -> PlayerState {
    match state {
        media::PlayerState::Playing => PlayerState::Playing,
        media::PlayerState::Buffering => PlayerState::Buffering,
        media::PlayerState::Paused => PlayerState::Paused,
        media::PlayerState::Idle => PlayerState::Idle,
    }
}
