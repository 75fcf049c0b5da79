//! Per-client connection state
//!
//! A `Connection` owns this client's subscriptions. Each one pairs a
//! subscriber guard with a forwarding task that relays bridge events onto
//! the client's outbound channel. Dropping the connection drops every
//! subscription, which aborts the forwarders and releases the counts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ClientFrame, ServerFrame};
use crate::bridge::{BridgeEvent, BridgeEvents, SubscriberGuard, Subscription};
use crate::session::SessionRegistry;

/// Outbound half of a client connection
pub type Outbound = mpsc::UnboundedSender<ServerFrame>;

struct ActiveSubscription {
    guard: SubscriberGuard,
    forwarder: JoinHandle<()>,
}

impl ActiveSubscription {
    fn is_live(&self) -> bool {
        self.guard.is_live() && !self.forwarder.is_finished()
    }
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// State of one client connection
pub struct Connection {
    registry: Arc<SessionRegistry>,
    outbound: Outbound,
    subscriptions: HashMap<String, ActiveSubscription>,
}

impl Connection {
    pub fn new(registry: Arc<SessionRegistry>, outbound: Outbound) -> Self {
        Self {
            registry,
            outbound,
            subscriptions: HashMap::new(),
        }
    }

    /// Sessions this connection currently watches
    pub fn subscribed_sessions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscriptions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Queue a frame; a closed connection drops it
    fn send(&self, frame: ServerFrame) {
        let _ = self.outbound.send(frame);
    }

    /// Send the full listing to this client
    pub async fn send_listing(&self) {
        let listing = self.registry.listing().await;
        self.send(ServerFrame::sessions(listing));
    }

    /// Parse and dispatch one text frame; malformed input gets an error frame
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.handle_frame(frame).await,
            Err(e) => {
                debug!("Rejected malformed frame: {}", e);
                self.send(ServerFrame::error(format!("Invalid message: {}", e), None));
            }
        }
    }

    pub async fn handle_frame(&mut self, frame: ClientFrame) {
        match frame {
            ClientFrame::Subscribe { session } => self.subscribe(session).await,
            ClientFrame::Unsubscribe { session } => self.unsubscribe(&session),
            ClientFrame::Input { session, data } => {
                if let Some(bridge) = self.registry.bridge(&session).await {
                    bridge.send_input(&data).await;
                }
            }
            ClientFrame::RawKeys { session, data } => {
                if let Some(bridge) = self.registry.bridge(&session).await {
                    bridge.send_raw_keys(&data).await;
                }
            }
            ClientFrame::List => self.send_listing().await,
            ClientFrame::Kill { session } => {
                self.registry.kill_session(&session).await;
                self.subscriptions.remove(&session);
                self.send(ServerFrame::Killed { session });
            }
            ClientFrame::Cleanup => {
                let killed = self.registry.kill_stale().await;
                for name in &killed {
                    self.subscriptions.remove(name);
                }
                self.send(ServerFrame::cleaned(killed));
            }
        }
    }

    async fn subscribe(&mut self, session: String) {
        let Some(handle) = self.registry.bridge(&session).await else {
            self.subscriptions.remove(&session);
            self.send(ServerFrame::error(
                format!("Session not found: {}", session),
                Some(&session),
            ));
            return;
        };

        if let Some(existing) = self.subscriptions.get(&session) {
            if existing.is_live() && handle.same_bridge(&existing.guard) {
                return;
            }
        }
        // Anything left under this name belongs to a bridge that is gone
        self.subscriptions.remove(&session);

        let Some(Subscription {
            guard,
            events,
            replay,
        }) = handle.subscribe()
        else {
            self.send(ServerFrame::error(
                format!("Session not found: {}", session),
                Some(&session),
            ));
            return;
        };

        if !replay.is_empty() {
            self.send(ServerFrame::Output {
                session: session.clone(),
                data: replay.to_string(),
            });
        }

        let forwarder = tokio::spawn(forward_events(
            session.clone(),
            events,
            self.outbound.clone(),
        ));
        info!(session = %session, "Client subscribed");
        self.subscriptions
            .insert(session, ActiveSubscription { guard, forwarder });
    }

    fn unsubscribe(&mut self, session: &str) {
        if self.subscriptions.remove(session).is_some() {
            info!(session = %session, "Client unsubscribed");
        }
    }
}

/// Relay one bridge's events to a client until either side goes away
async fn forward_events(session: String, mut events: BridgeEvents, outbound: Outbound) {
    while let Some(event) = events.recv().await {
        let frame = match event {
            BridgeEvent::Output(text) => ServerFrame::Output {
                session: session.clone(),
                data: text.to_string(),
            },
            BridgeEvent::Error(message) => ServerFrame::error(message.to_string(), Some(&session)),
        };
        if outbound.send(frame).is_err() {
            break;
        }
    }
    debug!(session = %session, "Forwarder finished");
}
