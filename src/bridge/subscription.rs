//! Scoped subscriber handles
//!
//! Dropping a `SubscriberGuard` releases exactly one subscriber count on
//! its bridge, whatever path the holder leaves by: explicit unsubscribe,
//! connection teardown, or a panic unwinding the task.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::{BridgeEvent, output::BridgeShared};

/// Holds one subscriber count on a bridge without keeping the bridge alive
pub struct SubscriberGuard {
    shared: Weak<BridgeShared>,
    released: bool,
}

impl SubscriberGuard {
    pub(crate) fn new(shared: Weak<BridgeShared>) -> Self {
        Self {
            shared,
            released: false,
        }
    }

    /// Whether the bridge this guard counts against still exists
    pub fn is_live(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Release the subscriber count now
    pub fn release(mut self) {
        self.release_once();
    }

    pub(crate) fn points_to(&self, shared: &Weak<BridgeShared>) -> bool {
        Weak::ptr_eq(&self.shared, shared)
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(shared) = self.shared.upgrade() {
            shared.release();
        }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for SubscriberGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberGuard")
            .field("live", &self.is_live())
            .field("released", &self.released)
            .finish()
    }
}

/// Stream of events from one bridge
#[derive(Debug)]
pub struct BridgeEvents {
    rx: broadcast::Receiver<BridgeEvent>,
}

impl BridgeEvents {
    pub(crate) fn new(rx: broadcast::Receiver<BridgeEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the bridge is gone
    ///
    /// Outputs are whole snapshots, so a lagging receiver just skips ahead.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// A registered watcher on a bridge
#[derive(Debug)]
pub struct Subscription {
    /// Keeps the subscriber count held until dropped
    pub guard: SubscriberGuard,
    /// Events published after the subscription was taken
    pub events: BridgeEvents,
    /// Text the bridge held at subscription time (empty if none yet)
    pub replay: Arc<str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeSettings, OutputBridge};
    use crate::tmux::fake::FakeMultiplexer;

    #[tokio::test(start_paused = true)]
    async fn test_explicit_release_then_drop_counts_once() {
        let bridge = OutputBridge::new(
            "s",
            Arc::new(FakeMultiplexer::new()),
            BridgeSettings::default(),
        );
        let _keep = bridge.subscribe();
        let sub = bridge.subscribe();
        assert_eq!(bridge.subscriber_count(), 2);

        sub.guard.release();
        assert_eq!(bridge.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_identifies_its_guard() {
        let fake = Arc::new(FakeMultiplexer::new());
        let a = OutputBridge::new("a", fake.clone(), BridgeSettings::default());
        let b = OutputBridge::new("b", fake, BridgeSettings::default());

        let sub = a.subscribe();
        assert!(a.handle().same_bridge(&sub.guard));
        assert!(!b.handle().same_bridge(&sub.guard));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_outliving_bridge_is_harmless() {
        let bridge = OutputBridge::new(
            "s",
            Arc::new(FakeMultiplexer::new()),
            BridgeSettings::default(),
        );
        let sub = bridge.subscribe();
        drop(bridge);

        assert!(!sub.guard.is_live());
        drop(sub);
    }
}
