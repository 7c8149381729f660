//! Upstream event subscriptions, one per working directory.
//!
//! The OpenCode event stream is per directory, not per session, so every
//! browser watching a session in the same directory shares one upstream
//! connection. Decoded events are published to the [`EventBus`] tagged with
//! their directory; browser streams filter by session.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatrelay_core::event_bus::{EventBus, RelayEvent};
use chatrelay_core::subscription::{
    EventSubscription, ReconnectPolicy, SubscriptionEvent, SubscriptionOptions,
};
use chatrelay_core::transcript;
use chatrelay_core::OpenCodeClient;

/// How upstream subscriptions behave.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    pub reconnect: ReconnectPolicy,
    /// Write a frame transcript per directory here, if set.
    pub transcript_dir: Option<PathBuf>,
}

pub struct RelayHub {
    client: OpenCodeClient,
    event_bus: Arc<EventBus>,
    options: RelayOptions,
    upstreams: Mutex<HashMap<String, EventSubscription>>,
}

impl RelayHub {
    pub fn new(client: OpenCodeClient, event_bus: Arc<EventBus>, options: RelayOptions) -> Self {
        Self {
            client,
            event_bus,
            options,
            upstreams: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure `directory`'s upstream stream is being followed.
    ///
    /// Returns `true` if a subscription was started. One that gave up after
    /// exhausting its reconnect attempts is replaced.
    pub fn ensure(&self, directory: &str) -> bool {
        let mut upstreams = self.lock();
        if upstreams.get(directory).is_some_and(|s| s.is_active()) {
            return false;
        }

        let options = SubscriptionOptions {
            directory: Some(directory.to_string()),
            reconnect: self.options.reconnect.clone(),
            transcript: transcript::open_transcript(
                self.options.transcript_dir.as_deref(),
                &transcript_name(directory),
            ),
        };

        let bus = Arc::clone(&self.event_bus);
        let dir = directory.to_string();
        let subscription = EventSubscription::start(self.client.clone(), options, move |event| {
            match event {
                SubscriptionEvent::Event(event) => {
                    bus.publish(RelayEvent::new(dir.as_str(), event));
                }
                SubscriptionEvent::Disconnected {
                    error,
                    will_retry: false,
                } => {
                    log::warn!(
                        "Upstream events for {} stopped: {}",
                        dir,
                        error.as_deref().unwrap_or("stream ended")
                    );
                }
                _ => {}
            }
        });

        log::info!("Relaying events for {}", directory);
        upstreams.insert(directory.to_string(), subscription);
        true
    }

    /// Directories with a live upstream subscription.
    pub fn active_directories(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(d, _)| d.clone())
            .collect();
        dirs.sort();
        dirs
    }

    /// Close every upstream subscription.
    pub fn shutdown(&self) {
        let mut upstreams = self.lock();
        for (directory, subscription) in upstreams.drain() {
            subscription.close();
            log::debug!("Closed upstream events for {}", directory);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, EventSubscription>> {
        self.upstreams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RelayHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// File-safe transcript name for a directory, e.g. `/home/me` -> `events-home-me`.
fn transcript_name(directory: &str) -> String {
    let slug: String = directory
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "events".to_string()
    } else {
        format!("events-{}", slug)
    }
}
