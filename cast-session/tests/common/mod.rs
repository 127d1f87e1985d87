//! Scripted cast client, connection and media channel for controller tests.
//!
//! The mocks never touch the network. Each connection owns a broadcast
//! sender the test uses to push events, and counters record every call the
//! controller makes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::pending;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cast_discovery::{
    DiscoveryError, DiscoveryWatcher, ServiceAnnouncement, ServiceBrowser, WatcherConfig,
};
use cast_session::{
    AccessoryHandle, Application, CastConnection, CastConnector, CastingApplication,
    CastingObserver, ClientError, ConnectionEvent, ControllerConfig, DeviceController,
    MediaChannel, MediaStatus, PlayerState, ReceiverStatus, VolumeStatus,
};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;

/// What new connections report.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub receiver_status: ReceiverStatus,
    pub media_status: Option<MediaStatus>,
    pub fail_join: bool,
    /// When set, `join` waits for a permit before completing.
    pub join_gate: Option<Arc<Notify>>,
}

#[derive(Default)]
pub struct MockConnector {
    script: Mutex<Script>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    addresses: Mutex<Vec<SocketAddr>>,
    fail_with: Mutex<Option<ClientError>>,
    hang: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn set_fail_with(&self, error: Option<ClientError>) {
        *self.fail_with.lock().unwrap() = error;
    }

    /// Make connect attempts never complete.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::Relaxed);
    }

    pub fn connect_count(&self) -> usize {
        self.addresses.lock().unwrap().len()
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.addresses.lock().unwrap().clone()
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().unwrap().clone()
    }

    /// The most recently opened connection.
    pub fn latest(&self) -> Arc<MockConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection opened yet")
    }
}

#[async_trait]
impl CastConnector for MockConnector {
    async fn connect(&self, address: SocketAddr) -> Result<Arc<dyn CastConnection>, ClientError> {
        self.addresses.lock().unwrap().push(address);

        if self.hang.load(Ordering::Relaxed) {
            pending::<()>().await;
        }
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }

        let connection = Arc::new(MockConnection::new(self.script.lock().unwrap().clone()));
        self.connections.lock().unwrap().push(Arc::clone(&connection));
        Ok(connection)
    }
}

pub struct MockConnection {
    events: broadcast::Sender<ConnectionEvent>,
    script: Mutex<Script>,
    joins: Mutex<Vec<CastingApplication>>,
    media: Mutex<Vec<Arc<MockMedia>>>,
    media_by_session: Mutex<HashMap<String, Arc<MockMedia>>>,
    volume_levels: Mutex<Vec<f32>>,
    status_requests: AtomicU32,
    close_count: AtomicU32,
    fail_close: AtomicBool,
}

impl MockConnection {
    pub fn new(script: Script) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            script: Mutex::new(script),
            joins: Mutex::new(Vec::new()),
            media: Mutex::new(Vec::new()),
            media_by_session: Mutex::new(HashMap::new()),
            volume_levels: Mutex::new(Vec::new()),
            status_requests: AtomicU32::new(0),
            close_count: AtomicU32::new(0),
            fail_close: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    pub fn emit_status(&self, status: ReceiverStatus) {
        self.emit(ConnectionEvent::ReceiverStatus(status));
    }

    pub fn drop_connection(&self) {
        self.emit(ConnectionEvent::Disconnected {
            reason: Some("socket closed".to_string()),
        });
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::Relaxed);
    }

    pub fn joins(&self) -> Vec<CastingApplication> {
        self.joins.lock().unwrap().clone()
    }

    pub fn latest_media(&self) -> Arc<MockMedia> {
        self.media
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no application joined yet")
    }

    /// The media channel handed out for `session_id`, once its join returned.
    pub fn media_for(&self, session_id: &str) -> Option<Arc<MockMedia>> {
        self.media_by_session.lock().unwrap().get(session_id).cloned()
    }

    pub fn volume_levels(&self) -> Vec<f32> {
        self.volume_levels.lock().unwrap().clone()
    }

    pub fn status_requests(&self) -> u32 {
        self.status_requests.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CastConnection for MockConnection {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn receiver_status(&self) -> Result<ReceiverStatus, ClientError> {
        self.status_requests.fetch_add(1, Ordering::Relaxed);
        Ok(self.script.lock().unwrap().receiver_status.clone())
    }

    async fn join(
        &self,
        application: &CastingApplication,
    ) -> Result<Arc<dyn MediaChannel>, ClientError> {
        self.joins.lock().unwrap().push(application.clone());

        let script = self.script.lock().unwrap().clone();
        if let Some(gate) = &script.join_gate {
            gate.notified().await;
        }
        if script.fail_join {
            return Err(ClientError::JoinFailed(application.session_id.clone()));
        }

        let media = Arc::new(MockMedia::new(script.media_status));
        self.media.lock().unwrap().push(Arc::clone(&media));
        self.media_by_session
            .lock()
            .unwrap()
            .insert(application.session_id.clone(), Arc::clone(&media));
        Ok(media)
    }

    async fn set_volume(&self, level: f32) -> Result<(), ClientError> {
        self.volume_levels.lock().unwrap().push(level);
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.close_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_close.load(Ordering::Relaxed) {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }
}

pub struct MockMedia {
    events: broadcast::Sender<MediaStatus>,
    initial: Option<MediaStatus>,
    status_gate: Option<Arc<Notify>>,
    play_count: AtomicU32,
    pause_count: AtomicU32,
    stop_count: AtomicU32,
}

impl MockMedia {
    pub fn new(initial: Option<MediaStatus>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            initial,
            status_gate: None,
            play_count: AtomicU32::new(0),
            pause_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
        }
    }

    /// A channel whose `media_status` reply waits for a permit on `gate`.
    pub fn gated(initial: Option<MediaStatus>, gate: Arc<Notify>) -> Self {
        Self {
            status_gate: Some(gate),
            ..Self::new(initial)
        }
    }

    pub fn emit(&self, state: PlayerState) {
        let _ = self.events.send(MediaStatus::with_player_state(state));
    }

    /// Number of live subscriptions to pushed media status.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn play_count(&self) -> u32 {
        self.play_count.load(Ordering::Relaxed)
    }

    pub fn pause_count(&self) -> u32 {
        self.pause_count.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> u32 {
        self.stop_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MediaChannel for MockMedia {
    fn subscribe(&self) -> broadcast::Receiver<MediaStatus> {
        self.events.subscribe()
    }

    async fn media_status(&self) -> Result<Option<MediaStatus>, ClientError> {
        if let Some(gate) = &self.status_gate {
            gate.notified().await;
        }
        Ok(self.initial.clone())
    }

    async fn play(&self) -> Result<(), ClientError> {
        self.play_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn pause(&self) -> Result<(), ClientError> {
        self.pause_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ClientError> {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Service browser whose announcements are pushed by the test.
#[derive(Default)]
pub struct MockBrowser {
    current: Mutex<Option<mpsc::UnboundedSender<ServiceAnnouncement>>>,
    browse_count: AtomicU32,
    stop_count: AtomicU32,
}

impl MockBrowser {
    pub fn announce(&self, announcement: ServiceAnnouncement) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(tx) => tx.send(announcement).is_ok(),
            None => false,
        }
    }

    pub fn browse_count(&self) -> u32 {
        self.browse_count.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> u32 {
        self.stop_count.load(Ordering::Relaxed)
    }
}

impl ServiceBrowser for MockBrowser {
    fn browse(
        &self,
        _service_type: &str,
    ) -> Result<mpsc::UnboundedReceiver<ServiceAnnouncement>, DiscoveryError> {
        self.browse_count.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn stop_browse(&self, _service_type: &str) -> Result<(), DiscoveryError> {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        self.current.lock().unwrap().take();
        Ok(())
    }
}

/// Records every published casting value.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<bool>>);

impl Recorder {
    pub fn values(&self) -> Vec<bool> {
        self.0.lock().unwrap().clone()
    }
}

impl CastingObserver for Recorder {
    fn casting_changed(&self, casting: bool) {
        self.0.lock().unwrap().push(casting);
    }
}

pub fn announcement(name: &str, address: &str) -> ServiceAnnouncement {
    let mut attributes = HashMap::new();
    attributes.insert("fn".to_string(), name.to_string());
    attributes.insert("md".to_string(), "Chromecast Audio".to_string());
    attributes.insert("id".to_string(), "b2c1e0d4".to_string());

    ServiceAnnouncement {
        fullname: format!("{}-b2c1e0d4._googlecast._tcp.local.", name),
        addresses: vec![address.parse().unwrap()],
        port: 8009,
        attributes,
    }
}

pub fn status_with_app(session_id: &str) -> ReceiverStatus {
    ReceiverStatus {
        applications: Some(vec![Application {
            app_id: Some("CC1AD845".to_string()),
            display_name: Some("Default Media Receiver".to_string()),
            session_id: session_id.to_string(),
            transport_id: None,
            status_text: None,
        }]),
        volume: None,
    }
}

pub fn empty_status() -> ReceiverStatus {
    ReceiverStatus {
        applications: Some(vec![]),
        volume: None,
    }
}

pub fn with_volume(mut status: ReceiverStatus, level: f32) -> ReceiverStatus {
    status.volume = Some(VolumeStatus {
        level: Some(level),
        muted: Some(false),
    });
    status
}

pub fn playing() -> Option<MediaStatus> {
    Some(MediaStatus::with_player_state(PlayerState::Playing))
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused time, then let everything woken by it run.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// A running controller for the "Lounge" device wired to mocks.
pub struct Harness {
    pub browser: Arc<MockBrowser>,
    pub connector: Arc<MockConnector>,
    pub accessory: AccessoryHandle,
    pub recorder: Arc<Recorder>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub async fn start(config: ControllerConfig, script: Script) -> Self {
        let browser = Arc::new(MockBrowser::default());
        let discovery =
            DiscoveryWatcher::new(WatcherConfig::new("Lounge"), browser.clone()).start();

        let connector = Arc::new(MockConnector::new());
        connector.set_script(script);

        let (mut controller, accessory) =
            DeviceController::new(config, connector.clone(), discovery).unwrap();
        let recorder = Arc::new(Recorder::default());
        controller.add_observer(recorder.clone());
        let task = controller.spawn();
        settle().await;

        Self {
            browser,
            connector,
            accessory,
            recorder,
            task,
        }
    }

    /// Announce "Lounge" at `address:8009` and let the controller react.
    pub async fn announce(&self, address: &str) {
        assert!(self.browser.announce(announcement("Lounge", address)));
        settle().await;
    }
}
