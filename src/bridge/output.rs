//! Polling output bridge for a single tmux session
//!
//! Two states:
//! - inactive: no poller, zero subscribers
//! - active: poller task running, at least one subscriber
//!
//! The poller is started on the 0 -> 1 subscriber edge and aborted on the
//! 1 -> 0 edge. Its first tick fires immediately, so a new watcher gets a
//! fresh capture without waiting a full interval.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::{BridgeEvents, SubscriberGuard, Subscription};
use crate::tmux::{CONFIRM_KEY, Multiplexer, split_raw_keys};

/// Default capture interval (250ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default number of scrollback lines included in each capture
pub const DEFAULT_SCROLLBACK_LINES: u32 = 500;

/// Buffered events per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 64;

/// Polling parameters shared by every bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Time between captures while active
    pub poll_interval: Duration,
    /// History lines requested from tmux per capture
    pub scrollback_lines: u32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
        }
    }
}

/// Events broadcast to every subscriber of a bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Captured text changed; carries the full new capture
    Output(Arc<str>),
    /// Forwarding input to the session failed
    Error(Arc<str>),
}

#[derive(Debug)]
struct BridgeState {
    subscribers: usize,
    last_output: Arc<str>,
    poller: Option<JoinHandle<()>>,
}

pub(crate) struct BridgeShared {
    session_name: String,
    mux: Arc<dyn Multiplexer>,
    settings: BridgeSettings,
    events: broadcast::Sender<BridgeEvent>,
    state: Mutex<BridgeState>,
}

impl BridgeShared {
    /// Add a subscriber, starting the poller on the 0 -> 1 edge
    ///
    /// The receiver and the replay snapshot are taken under the same lock
    /// that guards captures, so nothing falls between them.
    fn subscribe(self: &Arc<Self>) -> Subscription {
        let mut state = self.state.lock();
        let events = self.events.subscribe();
        let replay = state.last_output.clone();

        state.subscribers += 1;
        if state.subscribers == 1 {
            info!(session = %self.session_name, "Bridge activated");
            let weak = Arc::downgrade(self);
            let period = self.settings.poll_interval.max(Duration::from_millis(1));
            state.poller = Some(tokio::spawn(run_poller(weak, period)));
        }

        Subscription {
            guard: SubscriberGuard::new(Arc::downgrade(self)),
            events: BridgeEvents::new(events),
            replay,
        }
    }

    /// Drop one subscriber, stopping the poller on the 1 -> 0 edge
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        if state.subscribers == 0 {
            return;
        }
        state.subscribers -= 1;
        if state.subscribers == 0 {
            info!(session = %self.session_name, "Bridge deactivated");
            abort_poller(&mut state);
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        abort_poller(&mut state);
    }

    async fn poll_once(&self) {
        match self
            .mux
            .capture_pane(&self.session_name, self.settings.scrollback_lines)
            .await
        {
            Ok(text) => self.record_capture(text),
            Err(e) => debug!(session = %self.session_name, "Capture failed: {}", e),
        }
    }

    fn record_capture(&self, text: String) {
        let mut state = self.state.lock();
        if *state.last_output == *text {
            return;
        }
        let text: Arc<str> = text.into();
        state.last_output = text.clone();
        // No receivers is fine; the text is retained for the next subscriber
        let _ = self.events.send(BridgeEvent::Output(text));
    }

    async fn send_input(&self, text: &str) {
        let result = match self.mux.send_literal(&self.session_name, text).await {
            Ok(()) => {
                self.mux
                    .send_keys(&self.session_name, &[CONFIRM_KEY])
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.report_error(format!("Failed to send input: {}", e));
        }
    }

    async fn send_raw_keys(&self, keys: &str) {
        let keys = split_raw_keys(keys);
        if let Err(e) = self.mux.send_keys(&self.session_name, &keys).await {
            self.report_error(format!("Failed to send keys: {}", e));
        }
    }

    fn report_error(&self, message: String) {
        warn!(session = %self.session_name, "{}", message);
        let _ = self.events.send(BridgeEvent::Error(message.into()));
    }
}

fn abort_poller(state: &mut BridgeState) {
    if let Some(poller) = state.poller.take() {
        poller.abort();
    }
}

async fn run_poller(shared: Weak<BridgeShared>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.poll_once().await;
    }
}

/// Output bridge for one session, exclusively owned by the registry
///
/// Dropping it stops polling and closes every subscriber's event stream.
pub struct OutputBridge {
    shared: Arc<BridgeShared>,
}

impl OutputBridge {
    /// Create an inactive bridge
    pub fn new(
        session_name: impl Into<String>,
        mux: Arc<dyn Multiplexer>,
        settings: BridgeSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(BridgeShared {
                session_name: session_name.into(),
                mux,
                settings,
                events,
                state: Mutex::new(BridgeState {
                    subscribers: 0,
                    last_output: Arc::from(""),
                    poller: None,
                }),
            }),
        }
    }

    /// Non-owning handle for callers outside the registry
    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Register a subscriber
    pub fn subscribe(&self) -> Subscription {
        self.shared.subscribe()
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers
    }

    /// Whether the poller is running
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().poller.is_some()
    }

    /// Latest captured text (empty before the first capture)
    pub fn last_output(&self) -> Arc<str> {
        self.shared.state.lock().last_output.clone()
    }

    /// Cancel the poller; safe to call repeatedly or on an inactive bridge
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Type text into the session followed by Enter
    pub async fn send_input(&self, text: &str) {
        self.shared.send_input(text).await;
    }

    /// Send a pre-encoded key sequence without a trailing Enter
    pub async fn send_raw_keys(&self, keys: &str) {
        self.shared.send_raw_keys(keys).await;
    }
}

impl Drop for OutputBridge {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl std::fmt::Debug for OutputBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBridge")
            .field("session_name", &self.shared.session_name)
            .field("subscribers", &self.subscriber_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Weak reference to a bridge, safe to hold after the session is gone
#[derive(Clone)]
pub struct BridgeHandle {
    shared: Weak<BridgeShared>,
}

impl BridgeHandle {
    /// Register a subscriber, or `None` if the bridge has been removed
    pub fn subscribe(&self) -> Option<Subscription> {
        self.shared.upgrade().map(|shared| shared.subscribe())
    }

    /// Whether this handle and `guard` point at the same bridge
    pub fn same_bridge(&self, guard: &SubscriberGuard) -> bool {
        guard.points_to(&self.shared)
    }

    /// Forward input if the bridge still exists
    pub async fn send_input(&self, text: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.send_input(text).await;
        }
    }

    /// Forward raw keys if the bridge still exists
    pub async fn send_raw_keys(&self, keys: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.send_raw_keys(keys).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::fake::FakeMultiplexer;

    fn make_bridge(fake: &FakeMultiplexer) -> OutputBridge {
        OutputBridge::new("mt-demo-0001", Arc::new(fake.clone()), BridgeSettings::default())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_subscribers_means_no_captures() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fake.capture_count(), 0);
        assert!(!bridge.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_captures_immediately_then_periodically() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);

        let sub = bridge.subscribe();
        settle().await;
        assert_eq!(fake.capture_count(), 1);
        assert!(bridge.is_active());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(fake.capture_count() >= 4);

        drop(sub);
        assert!(!bridge.is_active());
        let halted_at = fake.capture_count();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fake.capture_count(), halted_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_counting_edges() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);

        let first = bridge.subscribe();
        let second = bridge.subscribe();
        assert_eq!(bridge.subscriber_count(), 2);

        drop(first);
        assert_eq!(bridge.subscriber_count(), 1);
        assert!(bridge.is_active());

        second.guard.release();
        assert_eq!(bridge.subscriber_count(), 0);
        assert!(!bridge.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_below_zero_clamps() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);

        bridge.shared.release();
        bridge.shared.release();
        assert_eq!(bridge.subscriber_count(), 0);

        let _sub = bridge.subscribe();
        assert_eq!(bridge.subscriber_count(), 1);
        assert!(bridge.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_only_emitted_on_change() {
        let fake = FakeMultiplexer::new();
        fake.set_screen("mt-demo-0001", "first");
        let bridge = make_bridge(&fake);

        let mut sub = bridge.subscribe();
        assert_eq!(&*sub.replay, "");
        assert_eq!(
            sub.events.recv().await,
            Some(BridgeEvent::Output(Arc::from("first")))
        );

        // Several identical captures must not produce events
        tokio::time::sleep(Duration::from_millis(900)).await;
        fake.set_screen("mt-demo-0001", "second");

        assert_eq!(
            sub.events.recv().await,
            Some(BridgeEvent::Output(Arc::from("second")))
        );
        assert_eq!(&*bridge.last_output(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_gets_replay() {
        let fake = FakeMultiplexer::new();
        fake.set_screen("mt-demo-0001", "$ cargo test");
        let bridge = make_bridge(&fake);

        let _early = bridge.subscribe();
        settle().await;

        let late = bridge.subscribe();
        assert_eq!(&*late.replay, "$ cargo test");
    }

    #[tokio::test]
    async fn test_send_input_appends_enter() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);

        bridge.send_input("fix the tests").await;

        assert_eq!(
            fake.literals(),
            vec![("mt-demo-0001".to_string(), "fix the tests".to_string())]
        );
        assert_eq!(
            fake.keys(),
            vec![("mt-demo-0001".to_string(), vec!["Enter".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_send_raw_keys_is_verbatim() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);

        bridge.send_raw_keys("C-c").await;

        assert!(fake.literals().is_empty());
        assert_eq!(
            fake.keys(),
            vec![("mt-demo-0001".to_string(), vec!["C-c".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_send_failure_becomes_error_event() {
        let fake = FakeMultiplexer::new();
        fake.fail_send(true);
        let bridge = make_bridge(&fake);
        let mut sub = bridge.subscribe();

        bridge.send_input("hello").await;

        match sub.events.recv().await {
            Some(BridgeEvent::Error(message)) => assert!(message.contains("Failed to send input")),
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);

        bridge.stop();
        bridge.stop();
        assert!(!bridge.is_active());

        let _sub = bridge.subscribe();
        assert!(bridge.is_active());
        bridge.stop();
        bridge.stop();
        assert!(!bridge.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_bridge_ends_subscriptions() {
        let fake = FakeMultiplexer::new();
        let bridge = make_bridge(&fake);
        let handle = bridge.handle();
        let mut sub = bridge.subscribe();
        settle().await;

        drop(bridge);

        assert_eq!(sub.events.recv().await, None);
        assert!(!sub.guard.is_live());
        assert!(handle.subscribe().is_none());
    }
}
