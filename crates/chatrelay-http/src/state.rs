//! Shared state for the HTTP relay.
//!
//! Wraps the OpenCode client, the page defaults and the event fan-out
//! needed by HTTP handlers, plus the signal that ends open browser streams
//! when the server stops.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use chatrelay_core::event_bus::EventBus;
use chatrelay_core::{ChatDefaults, OpenCodeClient};

use crate::relay::{RelayHub, RelayOptions};

/// Shared state available to all HTTP handlers.
#[derive(Clone)]
pub struct SharedState {
    /// Client for the upstream OpenCode server.
    pub client: OpenCodeClient,
    /// Fixed model/agent selection and history limit.
    pub defaults: ChatDefaults,
    /// The event bus browser streams subscribe to.
    pub event_bus: Arc<EventBus>,
    /// Upstream subscriptions feeding the event bus.
    pub hub: Arc<RelayHub>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SharedState {
    pub fn new(client: OpenCodeClient, defaults: ChatDefaults, options: RelayOptions) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let hub = Arc::new(RelayHub::new(client.clone(), Arc::clone(&event_bus), options));
        let (shutdown, _) = watch::channel(false);
        Self {
            client,
            defaults,
            event_bus,
            hub,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Tell every open browser stream to finish.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`begin_shutdown`](Self::begin_shutdown) has been
    /// called, immediately if it already was.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }
}
