//! The device controller.
//!
//! One [`DeviceController`] owns everything about one device: the discovery
//! handle, the open session, the reconnect supervisor, status fusion and the
//! published surfaces. It runs as a single task. Anything slow (connecting,
//! joining, playback commands) runs on spawned tasks that report back over
//! channels, tagged with the connection generation they belong to.

use std::fmt;
use std::future::pending;
use std::sync::Arc;

use cast_discovery::{DeviceEvent, DeviceLocation, DiscoveryHandle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::accessory::{
    level_to_percent, percent_to_level, surfaces, AccessoryHandle, Command, DeviceIdentity,
    LinkStatus, PublishedState,
};
use crate::client::{CastConnection, CastConnector, MediaChannel};
use crate::config::{ControllerConfig, StopBehavior};
use crate::error::{ClientError, FailureKind, Result};
use crate::fusion::StatusFusion;
use crate::publisher::{CastingObserver, CastingStatePublisher};
use crate::session::{SessionClient, SessionEvent, SessionMessage};
use crate::status::{CastingApplication, ReceiverStatus};
use crate::supervisor::{ConnectionState, Generation, NextStep, ReconnectPolicy, ReconnectSupervisor};

enum Completion {
    Connected {
        generation: Generation,
        result: std::result::Result<Arc<dyn CastConnection>, ClientError>,
    },
    Joined {
        generation: Generation,
        application: CastingApplication,
        result: std::result::Result<Arc<dyn MediaChannel>, ClientError>,
    },
}

#[derive(Debug, Clone, Copy)]
enum MediaOperation {
    Play,
    Pause,
    Stop,
}

impl fmt::Display for MediaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaOperation::Play => "play",
            MediaOperation::Pause => "pause",
            MediaOperation::Stop => "stop",
        };
        f.write_str(name)
    }
}

pub struct DeviceController {
    config: ControllerConfig,
    connector: Arc<dyn CastConnector>,
    discovery: DiscoveryHandle,
    supervisor: ReconnectSupervisor,
    fusion: StatusFusion,
    publisher: CastingStatePublisher,
    published: PublishedState,
    location: Option<DeviceLocation>,
    session: Option<SessionClient>,
    connect_task: Option<JoinHandle<()>>,
    retry_at: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    session_tx: mpsc::UnboundedSender<SessionMessage>,
    session_rx: mpsc::UnboundedReceiver<SessionMessage>,
}

impl DeviceController {
    /// Create a controller fed by `discovery`, connecting through `connector`.
    ///
    /// Returns the controller and the host handle for its surfaces. Nothing
    /// happens until the controller is run.
    pub fn new(
        config: ControllerConfig,
        connector: Arc<dyn CastConnector>,
        discovery: DiscoveryHandle,
    ) -> Result<(Self, AccessoryHandle)> {
        config.validate()?;

        let (published, observers, handle, commands) = surfaces();
        let mut publisher = CastingStatePublisher::new(config.switch_off_delay);
        for observer in observers {
            publisher.add_observer(observer);
        }

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();

        let controller = Self {
            supervisor: ReconnectSupervisor::new(ReconnectPolicy::from(&config)),
            config,
            connector,
            discovery,
            fusion: StatusFusion::new(),
            publisher,
            published,
            location: None,
            session: None,
            connect_task: None,
            retry_at: None,
            commands,
            completion_tx,
            completion_rx,
            session_tx,
            session_rx,
        };

        Ok((controller, handle))
    }

    /// Register an extra observer of the published casting value.
    pub fn add_observer(&mut self, observer: Arc<dyn CastingObserver>) {
        self.publisher.add_observer(observer);
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shut down through the handle, or until every handle is dropped.
    pub async fn run(mut self) {
        info!("Device controller started");
        let mut discovery_open = true;

        loop {
            tokio::select! {
                event = self.discovery.next(), if discovery_open => match event {
                    Some(DeviceEvent::Found(location)) => self.on_device_found(location),
                    None => {
                        warn!("Discovery watcher stopped");
                        discovery_open = false;
                    }
                },
                Some(message) = self.session_rx.recv() => self.on_session_message(message),
                Some(completion) = self.completion_rx.recv() => self.on_completion(completion),
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.on_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = sleep_until_deadline(self.retry_at) => {
                    self.retry_at = None;
                    self.connect();
                }
                _ = sleep_until_deadline(self.publisher.pending_deadline()) => {
                    self.publisher.fire_pending();
                }
            }
        }

        self.shutdown();
    }

    fn on_device_found(&mut self, location: DeviceLocation) {
        self.published.publish_identity(DeviceIdentity::from(&location));

        let same_endpoint = self
            .location
            .as_ref()
            .is_some_and(|current| current.same_endpoint(&location));
        let active = matches!(
            self.supervisor.state(),
            ConnectionState::Connecting | ConnectionState::Connected
        );
        if same_endpoint && active {
            debug!(address = %location.display_address(), "Device re-announced at current address");
            self.location = Some(location);
            return;
        }

        info!(
            name = %location.name,
            address = %location.display_address(),
            "Found device"
        );
        self.teardown_session();
        self.supervisor.device_found();
        self.location = Some(location);
        self.connect();
    }

    fn connect(&mut self) {
        let Some(location) = self.location.as_ref() else {
            debug!("No known device location, waiting for discovery");
            return;
        };
        let address = location.socket_addr();
        let generation = self.supervisor.begin_connect();
        self.sync_link();
        info!(%address, %generation, "Connecting to device");

        let connector = Arc::clone(&self.connector);
        let completions = self.completion_tx.clone();
        let timeout = self.config.connect_timeout;

        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.connect_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, connector.connect(address)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            };
            let _ = completions.send(Completion::Connected { generation, result });
        }));
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connected { generation, result } => {
                self.on_connect_finished(generation, result)
            }
            Completion::Joined {
                generation,
                application,
                result,
            } => self.on_join_finished(generation, application, result),
        }
    }

    fn on_connect_finished(
        &mut self,
        generation: Generation,
        result: std::result::Result<Arc<dyn CastConnection>, ClientError>,
    ) {
        if !self.supervisor.is_current(generation) {
            debug!(%generation, "Discarding stale connect result");
            if let Ok(connection) = result {
                close_quietly(connection);
            }
            return;
        }
        self.connect_task = None;

        match result {
            Ok(connection) => {
                if !self.supervisor.connected(generation) {
                    close_quietly(connection);
                    return;
                }
                info!(%generation, "Connected to device");
                self.session = Some(SessionClient::attach(
                    generation,
                    connection,
                    self.session_tx.clone(),
                ));
                self.sync_link();
            }
            Err(error) => self.handle_failure(FailureKind::classify(&error), &error.to_string()),
        }
    }

    fn on_join_finished(
        &mut self,
        generation: Generation,
        application: CastingApplication,
        result: std::result::Result<Arc<dyn MediaChannel>, ClientError>,
    ) {
        if !self.supervisor.is_current(generation) {
            debug!(%generation, "Discarding stale join result");
            return;
        }
        if self.fusion.current_session_id() != Some(application.session_id.as_str()) {
            debug!(session_id = %application.session_id, "Joined application was superseded");
            return;
        }

        match result {
            Ok(channel) => {
                if self.fusion.attach_media(&application.session_id) {
                    if let Some(session) = self.session.as_mut() {
                        info!(session_id = %application.session_id, "Joined application session");
                        session.attach_media(application.session_id, channel);
                    }
                }
            }
            Err(error) => self.handle_failure(FailureKind::classify(&error), &error.to_string()),
        }
    }

    fn on_session_message(&mut self, message: SessionMessage) {
        let SessionMessage { generation, event } = message;
        if !self.supervisor.is_current(generation) || self.session.is_none() {
            debug!(%generation, "Discarding event from a closed session");
            return;
        }

        match event {
            SessionEvent::ReceiverStatus(status) => self.on_receiver_status(&status),
            SessionEvent::MediaStatus { session_id, status } => {
                if let Some(casting) = self.fusion.apply_media_status(&session_id, &status) {
                    self.publisher.update(casting);
                }
            }
            SessionEvent::Disconnected { reason } => {
                let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                self.handle_failure(FailureKind::ConnectionLost, &reason);
            }
            SessionEvent::HeartbeatTimeout => warn!(%generation, "Device heartbeat timed out"),
            SessionEvent::ClientError(error) => {
                self.handle_failure(FailureKind::classify(&error), &error.to_string())
            }
        }
    }

    fn on_receiver_status(&mut self, status: &ReceiverStatus) {
        let update = self.fusion.apply_receiver_status(status);

        if update.detach_media {
            if let Some(session) = self.session.as_mut() {
                session.detach_media();
            }
        }
        if let Some(application) = update.join {
            self.join(application);
        }
        if let Some(casting) = update.casting {
            self.publisher.update(casting);
        }
        if let Some(level) = update.volume {
            self.published.publish_volume(level_to_percent(level));
        }
    }

    fn join(&self, application: CastingApplication) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        info!(
            session_id = %application.session_id,
            app = ?application.display_name,
            "Joining application session"
        );

        let connection = session.connection();
        let generation = session.generation();
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = connection.join(&application).await;
            let _ = completions.send(Completion::Joined {
                generation,
                application,
                result,
            });
        });
    }

    fn handle_failure(&mut self, kind: FailureKind, reason: &str) {
        warn!(?kind, reason, "Lost connection to device");
        self.teardown_session();

        match self.supervisor.connection_failed(kind) {
            NextStep::Retry { attempt, delay } => {
                info!(
                    attempt,
                    ceiling = self.config.reconnect_ceiling,
                    ?delay,
                    "Scheduling reconnect"
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            NextStep::Rediscover => {
                warn!(
                    failures = self.supervisor.failures(),
                    "Reconnect ceiling reached, returning to discovery"
                );
                if let Err(e) = self.discovery.rescan() {
                    warn!(error = %e, "Failed to restart discovery");
                }
            }
        }
        self.sync_link();
    }

    /// Returns false when the controller should stop.
    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::SetCasting(on) => self.set_casting(on),
            Command::SetVolume(percent) => self.set_volume(percent),
            Command::Disconnect => self.disconnect(),
            Command::Shutdown => return false,
        }
        true
    }

    fn set_casting(&self, on: bool) {
        let Some(media) = self.session.as_ref().and_then(|session| session.media()) else {
            debug!(on, "No media session, ignoring casting request");
            return;
        };

        let operation = match (on, self.fusion.is_casting()) {
            (true, false) => MediaOperation::Play,
            (false, true) => match self.config.stop_behavior {
                StopBehavior::Stop => MediaOperation::Stop,
                StopBehavior::Pause => MediaOperation::Pause,
            },
            _ => {
                debug!(on, "Device already in requested casting state");
                return;
            }
        };

        let channel = media.channel();
        let session_id = media.session_id().to_string();
        debug!(%operation, %session_id, "Sending media command");
        tokio::spawn(async move {
            let result = match operation {
                MediaOperation::Play => channel.play().await,
                MediaOperation::Pause => channel.pause().await,
                MediaOperation::Stop => channel.stop().await,
            };
            if let Err(e) = result {
                warn!(%operation, %session_id, error = %e, "Media command failed");
            }
        });
    }

    fn set_volume(&self, percent: u8) {
        if !self.config.volume_control {
            debug!(percent, "Volume control disabled, ignoring");
            return;
        }
        let Some(session) = self.session.as_ref() else {
            debug!(percent, "Not connected, ignoring volume request");
            return;
        };

        let connection = session.connection();
        let level = percent_to_level(percent);
        tokio::spawn(async move {
            if let Err(e) = connection.set_volume(level).await {
                warn!(level, error = %e, "Volume command failed");
            }
        });
    }

    fn disconnect(&mut self) {
        if !self.supervisor.stop() {
            debug!("Already disconnected");
            return;
        }
        info!("Disconnecting from device");
        self.teardown_session();
        self.sync_link();
    }

    fn shutdown(&mut self) {
        self.teardown_session();
        self.supervisor.stop();
        self.discovery.stop();
        self.sync_link();
        info!("Device controller stopped");
    }

    fn teardown_session(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.retry_at = None;
        if let Some(session) = self.session.take() {
            session.disconnect();
        }
        if let Some(casting) = self.fusion.reset() {
            self.publisher.update(casting);
        }
    }

    fn sync_link(&self) {
        self.published.publish_link(LinkStatus {
            state: self.supervisor.state(),
            failures: self.supervisor.failures(),
        });
    }
}

fn close_quietly(connection: Arc<dyn CastConnection>) {
    tokio::spawn(async move {
        if let Err(e) = connection.close().await {
            debug!(error = %e, "Ignoring error while closing connection");
        }
    });
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
