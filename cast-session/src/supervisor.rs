//! Reconnect supervision.
//!
//! [`ReconnectSupervisor`] owns the connection lifecycle state, the
//! consecutive failure counter and the connection generation. Every connect
//! attempt gets a fresh [`Generation`]; completions carrying an older one are
//! stale and must be dropped by the caller.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::ControllerConfig;
use crate::error::FailureKind;

/// Connection lifecycle of the controlled device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for discovery to report the device
    #[default]
    Searching,
    Connecting,
    Connected,
    /// Lost the connection, a retry is scheduled
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Searching => "searching",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Identifies one connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Reconnect to the same address after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Give up on the address and wait for discovery
    Rediscover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub ceiling: u32,
    pub stable_after: Duration,
}

impl From<&ControllerConfig> for ReconnectPolicy {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            delay: config.reconnect_delay,
            ceiling: config.reconnect_ceiling,
            stable_after: config.stable_connection,
        }
    }
}

#[derive(Debug)]
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
    state: ConnectionState,
    failures: u32,
    generation: Generation,
    connected_at: Option<Instant>,
}

impl ReconnectSupervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Searching,
            failures: 0,
            generation: Generation::default(),
            connected_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last stable connection.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    /// Discovery matched the device: everything starts over.
    pub fn device_found(&mut self) {
        self.failures = 0;
        self.invalidate(ConnectionState::Searching);
    }

    /// Start a connect attempt and return its generation.
    pub fn begin_connect(&mut self) -> Generation {
        self.invalidate(ConnectionState::Connecting);
        self.generation
    }

    /// Record a successful connect. Returns false for stale generations.
    pub fn connected(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        if self.policy.stable_after.is_zero() {
            self.failures = 0;
        } else {
            self.connected_at = Some(Instant::now());
        }
        true
    }

    /// Record a failure of the current connection or connect attempt.
    pub fn connection_failed(&mut self, kind: FailureKind) -> NextStep {
        if let Some(since) = self.connected_at.take() {
            if since.elapsed() >= self.policy.stable_after {
                debug!(failures = self.failures, "Connection was stable, resetting failure count");
                self.failures = 0;
            }
        }

        self.failures = self.failures.saturating_add(1);

        if self.failures >= self.policy.ceiling {
            self.invalidate(ConnectionState::Searching);
            return NextStep::Rediscover;
        }

        self.invalidate(ConnectionState::Disconnected);
        let delay = if self.failures == 1 && kind.retry_immediately() {
            Duration::ZERO
        } else {
            self.policy.delay
        };

        NextStep::Retry {
            attempt: self.failures,
            delay,
        }
    }

    /// Drop the current connection without counting a failure.
    ///
    /// Returns false when already searching.
    pub fn stop(&mut self) -> bool {
        if self.state == ConnectionState::Searching {
            return false;
        }
        self.invalidate(ConnectionState::Searching);
        true
    }

    fn invalidate(&mut self, state: ConnectionState) {
        self.generation = self.generation.next();
        self.connected_at = None;
        self.state = state;
    }
}
