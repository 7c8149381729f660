//! A live chat view: reconciled state plus the subscription feeding it.
//!
//! The view holds at most one event subscription, keyed by the open session
//! and the event stream URL. Opening the same pair again is a no-op; opening
//! a different pair closes the old subscription first. Dropping the view
//! closes it.
//!
//! Every open or close starts a new generation. A subscription only touches
//! the state while its own generation is current, so a frame that was
//! already in flight when the view switched is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::OpenCodeClient;
use crate::error::ClientError;
use crate::reducer::ChatState;
use crate::subscription::{EventSubscription, SubscriptionEvent, SubscriptionOptions};
use crate::types::MessageWithParts;

/// Called with the new state after every event that changed it.
pub type ChangeCallback = Arc<dyn Fn(&ChatState) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewKey {
    session_id: String,
    event_url: String,
}

pub struct ChatView {
    client: OpenCodeClient,
    options: SubscriptionOptions,
    state: Arc<Mutex<ChatState>>,
    generation: Arc<AtomicU64>,
    current: Option<(ViewKey, EventSubscription)>,
    on_change: Option<ChangeCallback>,
}

/// The sink side of one subscription.
struct Feed {
    state: Arc<Mutex<ChatState>>,
    generation: Arc<AtomicU64>,
    opened_as: u64,
    on_change: Option<ChangeCallback>,
    session_id: String,
}

impl Feed {
    fn deliver(&self, event: SubscriptionEvent) {
        match event {
            SubscriptionEvent::Event(event) => {
                let mut guard = lock(&self.state);
                // Checked under the lock that open() resets the state with
                if self.generation.load(Ordering::SeqCst) != self.opened_as {
                    return;
                }
                if guard.apply(&event) {
                    if let Some(callback) = &self.on_change {
                        callback(&*guard);
                    }
                }
            }
            SubscriptionEvent::Disconnected {
                will_retry: false, ..
            } => {
                log::warn!("Chat view for {} lost its event stream", self.session_id);
            }
            _ => {}
        }
    }
}

fn lock(state: &Mutex<ChatState>) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatView {
    /// `options.directory` is ignored; each `open` names its own.
    pub fn new(client: OpenCodeClient, options: SubscriptionOptions) -> Self {
        Self {
            client,
            options,
            state: Arc::new(Mutex::new(ChatState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            current: None,
            on_change: None,
        }
    }

    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ChatState) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(callback));
        self
    }

    /// Show `session_id`, seeded with `history`, and follow its events.
    ///
    /// Returns `Ok(false)` if this session and stream were already open; the
    /// existing state is kept and `history` is ignored.
    pub fn open(
        &mut self,
        session_id: &str,
        history: Vec<MessageWithParts>,
        directory: Option<&str>,
    ) -> Result<bool, ClientError> {
        let key = ViewKey {
            session_id: session_id.to_string(),
            event_url: self.client.event_url(directory)?,
        };

        if matches!(&self.current, Some((current, _)) if *current == key) {
            return Ok(false);
        }

        self.close();
        {
            let mut state = self.lock_state();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = ChatState::new(session_id, history);
        }

        let options = SubscriptionOptions {
            directory: directory.map(String::from),
            ..self.options.clone()
        };
        let feed = self.feed(session_id);
        let subscription =
            EventSubscription::start(self.client.clone(), options, move |event| {
                feed.deliver(event)
            });

        log::debug!("Chat view opened {} on {}", key.session_id, key.event_url);
        self.current = Some((key, subscription));
        Ok(true)
    }

    /// Stop following events. The last state stays readable.
    pub fn close(&mut self) {
        if let Some((key, subscription)) = self.current.take() {
            subscription.close();
            let _state = self.lock_state();
            self.generation.fetch_add(1, Ordering::SeqCst);
            log::debug!("Chat view closed {}", key.session_id);
        }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn session_id(&self) -> Option<String> {
        self.current.as_ref().map(|(key, _)| key.session_id.clone())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ChatState {
        self.lock_state().clone()
    }

    fn feed(&self, session_id: &str) -> Feed {
        Feed {
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            opened_as: self.generation.load(Ordering::SeqCst),
            on_change: self.on_change.clone(),
            session_id: session_id.to_string(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ChatState> {
        lock(&self.state)
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.close();
    }
}
