//! Shared test helpers for discovery tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use cast_discovery::{DiscoveryError, ServiceAnnouncement, ServiceBrowser};
use tokio::sync::mpsc;

/// Service browser that hands announcements to the watcher on demand.
#[derive(Default)]
pub struct MockBrowser {
    current: Mutex<Option<mpsc::UnboundedSender<ServiceAnnouncement>>>,
    browse_count: AtomicU32,
    stop_count: AtomicU32,
    fail_browse: AtomicBool,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `browse` calls fail.
    pub fn set_fail_browse(&self, should_fail: bool) {
        self.fail_browse.store(should_fail, Ordering::Relaxed);
    }

    /// Deliver an announcement on the active browse stream.
    pub fn announce(&self, announcement: ServiceAnnouncement) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(tx) => tx.send(announcement).is_ok(),
            None => false,
        }
    }

    /// End the active browse stream, as if the daemon stopped it.
    pub fn end_stream(&self) {
        self.current.lock().unwrap().take();
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
    ) -> cast_discovery::Result<mpsc::UnboundedReceiver<ServiceAnnouncement>> {
        self.browse_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_browse.load(Ordering::Relaxed) {
            return Err(DiscoveryError::Browse("mock browse failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn stop_browse(&self, _service_type: &str) -> cast_discovery::Result<()> {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        self.current.lock().unwrap().take();
        Ok(())
    }
}

/// Build an announcement for a device called `name` at `address:8009`.
pub fn announcement(name: &str, address: &str) -> ServiceAnnouncement {
    let mut attributes = HashMap::new();
    attributes.insert("fn".to_string(), name.to_string());
    attributes.insert("md".to_string(), "Chromecast".to_string());
    attributes.insert("id".to_string(), format!("{}-id", name.to_lowercase()));

    ServiceAnnouncement {
        fullname: format!("{}-0001._googlecast._tcp.local.", name),
        addresses: vec![address.parse().unwrap()],
        port: 8009,
        attributes,
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
