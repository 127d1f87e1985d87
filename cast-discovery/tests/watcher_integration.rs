//! Watcher behavior against a scripted service browser.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cast_discovery::{DeviceEvent, DiscoveryWatcher, WatcherConfig};
use common::{announcement, settle, MockBrowser};
use rstest::rstest;

fn start_watcher(browser: &Arc<MockBrowser>, target: &str) -> cast_discovery::DiscoveryHandle {
    let config = WatcherConfig::new(target).with_rescan_interval(Duration::from_secs(30 * 60));
    DiscoveryWatcher::new(config, browser.clone()).start()
}

#[tokio::test(start_paused = true)]
async fn test_emits_location_for_matching_device() {
    let browser = Arc::new(MockBrowser::new());
    let mut handle = start_watcher(&browser, "Lounge");
    settle().await;

    assert!(browser.announce(announcement("Lounge", "10.0.0.5")));

    let event = handle.next().await.expect("watcher should emit");
    let DeviceEvent::Found(location) = event;
    assert_eq!(location.name, "Lounge");
    assert_eq!(location.address, "10.0.0.5".parse::<std::net::IpAddr>().unwrap());
    assert_eq!(location.port, 8009);
    assert_eq!(location.device_type, "Chromecast");
    assert_eq!(location.device_id, "lounge-id");
}

#[rstest]
#[case("Kitchen")]
#[case("Lounge 2")]
#[case("Loung")]
#[tokio::test(start_paused = true)]
async fn test_ignores_other_devices(#[case] other: &str) {
    let browser = Arc::new(MockBrowser::new());
    let mut handle = start_watcher(&browser, "Lounge");
    settle().await;

    browser.announce(announcement(other, "10.0.0.6"));

    let result = tokio::time::timeout(Duration::from_secs(5), handle.next()).await;
    assert!(result.is_err(), "no event expected for {}", other);
}

#[tokio::test(start_paused = true)]
async fn test_match_is_case_insensitive() {
    let browser = Arc::new(MockBrowser::new());
    let mut handle = start_watcher(&browser, "lounge");
    settle().await;

    browser.announce(announcement("LOUNGE", "10.0.0.5"));
    assert!(handle.next().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_browse_restarts_periodically() {
    let browser = Arc::new(MockBrowser::new());
    let _handle = start_watcher(&browser, "Lounge");
    settle().await;
    assert_eq!(browser.browse_count(), 1);

    tokio::time::advance(Duration::from_secs(30 * 60)).await;
    settle().await;
    assert_eq!(browser.browse_count(), 2);

    tokio::time::advance(Duration::from_secs(30 * 60)).await;
    settle().await;
    assert_eq!(browser.browse_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_device_found_after_restart() {
    let browser = Arc::new(MockBrowser::new());
    let mut handle = start_watcher(&browser, "Lounge");
    settle().await;

    // The first announcement was missed; the device reappears after the restart.
    tokio::time::advance(Duration::from_secs(30 * 60)).await;
    settle().await;
    browser.announce(announcement("Lounge", "10.0.0.42"));

    let DeviceEvent::Found(location) = handle.next().await.unwrap();
    assert_eq!(location.display_address(), "10.0.0.42:8009");
}

#[tokio::test(start_paused = true)]
async fn test_rescan_restarts_immediately() {
    let browser = Arc::new(MockBrowser::new());
    let handle = start_watcher(&browser, "Lounge");
    settle().await;

    handle.rescan().unwrap();
    settle().await;

    assert_eq!(browser.browse_count(), 2);
    assert!(browser.stop_count() >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_browse_failure_is_retried_on_next_restart() {
    let browser = Arc::new(MockBrowser::new());
    browser.set_fail_browse(true);
    let mut handle = start_watcher(&browser, "Lounge");
    settle().await;
    assert_eq!(browser.browse_count(), 1);
    assert!(handle.is_running());

    browser.set_fail_browse(false);
    tokio::time::advance(Duration::from_secs(30 * 60)).await;
    settle().await;
    assert_eq!(browser.browse_count(), 2);

    browser.announce(announcement("Lounge", "10.0.0.5"));
    assert!(handle.next().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_ended_stream_waits_for_restart() {
    let browser = Arc::new(MockBrowser::new());
    let handle = start_watcher(&browser, "Lounge");
    settle().await;

    browser.end_stream();
    settle().await;
    assert!(handle.is_running());
    assert_eq!(browser.browse_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let browser = Arc::new(MockBrowser::new());
    let mut handle = start_watcher(&browser, "Lounge");
    settle().await;

    handle.stop();
    handle.stop();
    settle().await;

    assert!(!handle.is_running());
    assert!(handle.rescan().is_err());
    assert!(handle.next().await.is_none());
}
