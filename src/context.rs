//! Process-wide application context
//!
//! Built once at startup and cloned into every request handler and
//! connection task.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::config::{Config, Credentials};
use crate::error::Result;
use crate::gateway::ServerFrame;
use crate::session::{RegistrySettings, SessionRegistry};
use crate::tmux::Multiplexer;

/// Listings buffered per connection before it starts skipping
const LISTING_CAPACITY: usize = 16;

/// Shared handles to configuration, registry and credentials
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub credentials: Arc<Credentials>,
    listings: broadcast::Sender<ServerFrame>,
}

impl AppContext {
    /// Assemble the context around a multiplexer and loaded credentials
    pub fn new(config: Config, mux: Arc<dyn Multiplexer>, credentials: Credentials) -> Result<Self> {
        let settings = RegistrySettings::from_config(&config)?;
        let (listings, _) = broadcast::channel(LISTING_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new(mux, settings)),
            credentials: Arc::new(credentials),
            listings,
        })
    }

    /// Receiver for periodic listing broadcasts
    pub fn subscribe_listings(&self) -> broadcast::Receiver<ServerFrame> {
        self.listings.subscribe()
    }

    /// Compute one listing and push it to every connection
    ///
    /// Returns the number of connections that received it.
    pub async fn broadcast_listing(&self) -> usize {
        let frame = ServerFrame::sessions(self.registry.listing().await);
        match self.listings.send(frame) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No connections to broadcast listing to");
                0
            }
        }
    }
}
