//! Debounced publication of the casting signal.
//!
//! A `true` observation is published at once and cancels any pending
//! `false`. A `false` observation is published after the switch-off delay,
//! unless a `true` arrives first. Observers only see changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

/// Receives every published casting value.
pub trait CastingObserver: Send + Sync {
    fn casting_changed(&self, casting: bool);
}

pub struct CastingStatePublisher {
    switch_off_delay: Duration,
    published: bool,
    pending_off: Option<Instant>,
    observers: Vec<Arc<dyn CastingObserver>>,
}

impl CastingStatePublisher {
    pub fn new(switch_off_delay: Duration) -> Self {
        Self {
            switch_off_delay,
            published: false,
            pending_off: None,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn CastingObserver>) {
        self.observers.push(observer);
    }

    /// Last value handed to observers.
    pub fn published(&self) -> bool {
        self.published
    }

    /// When a pending `false` becomes due.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending_off
    }

    /// Feed one casting observation.
    pub fn update(&mut self, casting: bool) {
        if casting {
            if self.pending_off.take().is_some() {
                debug!("Casting resumed, pending switch-off cancelled");
            }
            if !self.published {
                self.publish(true);
            }
            return;
        }

        if !self.published {
            return;
        }

        if self.switch_off_delay.is_zero() {
            self.publish(false);
        } else if self.pending_off.is_none() {
            debug!(delay = ?self.switch_off_delay, "Delaying switch-off");
            self.pending_off = Some(Instant::now() + self.switch_off_delay);
        }
    }

    /// Publish the pending `false`, if any. Called once its deadline passes.
    pub fn fire_pending(&mut self) {
        if self.pending_off.take().is_some() {
            self.publish(false);
        }
    }

    fn publish(&mut self, casting: bool) {
        info!(casting, "Casting status changed");
        self.published = casting;
        for observer in &self.observers {
            observer.casting_changed(casting);
        }
    }
}
