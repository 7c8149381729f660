//! Long-lived subscription to an OpenCode event stream.
//!
//! One background thread per subscription reads the stream, splits it into
//! SSE frames and decodes each frame on its own. A frame that fails to
//! decode is logged and reported as [`SubscriptionEvent::FrameError`]; the
//! stream keeps going.
//!
//! When the stream ends or the connection fails, the [`ReconnectPolicy`]
//! decides whether to reconnect after an exponential, jittered delay.
//! [`ReconnectPolicy::never`] keeps the old behaviour of staying
//! disconnected. Frames lost while disconnected are not recovered; callers
//! that care should re-fetch history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::client::OpenCodeClient;
use crate::events::{decode_event, ChatEvent};
use crate::sse::{self, SseFrames};
use crate::transcript::{self, TranscriptHandle};
use crate::transport::EventReader;

/// Granularity at which a sleeping subscription notices `close()`.
const CLOSE_POLL: Duration = Duration::from_millis(50);

/// What a subscription reports to its sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The stream is open.
    Connected,
    /// A decoded event. Not filtered by session.
    Event(ChatEvent),
    /// A frame that could not be decoded.
    FrameError(String),
    /// The stream ended or could not be opened.
    Disconnected {
        error: Option<String>,
        will_retry: bool,
    },
}

/// How to react to a lost event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts allowed before giving up. `0` disables
    /// reconnection.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Options for [`EventSubscription::start`].
#[derive(Clone)]
pub struct SubscriptionOptions {
    /// Working directory whose stream to follow; client default if `None`.
    pub directory: Option<String>,
    pub reconnect: ReconnectPolicy,
    pub transcript: TranscriptHandle,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            directory: None,
            reconnect: ReconnectPolicy::default(),
            transcript: transcript::disabled(),
        }
    }
}

/// A running subscription. Closed on drop.
pub struct EventSubscription {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Start following the event stream on a background thread.
    pub fn start<F>(client: OpenCodeClient, options: SubscriptionOptions, sink: F) -> Self
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let thread_active = Arc::clone(&active);

        let handle = std::thread::spawn(move || {
            run(client, options, thread_active, sink);
        });

        Self {
            active,
            handle: Some(handle),
        }
    }

    /// Whether the background thread is still following the stream.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop following the stream. The thread exits at the next frame, idle
    /// read timeout or backoff tick, dropping its connection.
    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Wait for the background thread to finish on its own.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn run<F>(client: OpenCodeClient, options: SubscriptionOptions, active: Arc<AtomicBool>, mut sink: F)
where
    F: FnMut(SubscriptionEvent),
{
    let directory = client
        .resolve_directory(options.directory.as_deref())
        .to_string();
    let mut attempt: u32 = 0;

    while active.load(Ordering::SeqCst) {
        let error = match client.open_event_stream(Some(&directory)) {
            Ok(reader) => {
                log::info!("Event stream connected for {}", directory);
                sink(SubscriptionEvent::Connected);

                let (delivered, error) = pump(reader, &active, &options.transcript, &mut sink);
                if delivered > 0 {
                    attempt = 0;
                }
                error
            }
            Err(e) => {
                log::error!("Failed to open event stream for {}: {}", directory, e);
                Some(e.to_string())
            }
        };

        if !active.load(Ordering::SeqCst) {
            break;
        }

        attempt += 1;
        let will_retry = attempt <= options.reconnect.max_attempts;
        log::info!(
            "Event stream for {} disconnected (attempt {}, retry: {})",
            directory,
            attempt,
            will_retry
        );
        sink(SubscriptionEvent::Disconnected { error, will_retry });

        if !will_retry {
            break;
        }

        sleep_while_active(jittered(options.reconnect.delay_for(attempt)), &active);
    }

    active.store(false, Ordering::SeqCst);
    log::debug!("Event subscription ended for {}", directory);
}

/// Read frames until EOF, error or close. Returns frames seen and the read
/// error, if any.
fn pump<F>(
    reader: EventReader,
    active: &AtomicBool,
    transcript: &TranscriptHandle,
    sink: &mut F,
) -> (usize, Option<String>)
where
    F: FnMut(SubscriptionEvent),
{
    let mut delivered = 0;

    for frame in SseFrames::new(reader) {
        if !active.load(Ordering::SeqCst) {
            break;
        }

        let frame = match frame {
            Ok(f) => f,
            Err(e) if sse::is_idle(&e) => continue,
            Err(e) => {
                log::error!("Event stream read error: {}", e);
                return (delivered, Some(e.to_string()));
            }
        };

        delivered += 1;
        transcript::record(transcript, "FRAME", &frame.data);

        match decode_event(&frame.data) {
            Ok(event) => {
                log::debug!("Event {}", event.event_type());
                sink(SubscriptionEvent::Event(event));
            }
            Err(e) => {
                log::warn!("Dropping malformed event frame: {}", e);
                sink(SubscriptionEvent::FrameError(e.to_string()));
            }
        }
    }

    (delivered, None)
}

fn jittered(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 4) as u64;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

fn sleep_while_active(delay: Duration, active: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while active.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(CLOSE_POLL.min(deadline - now));
    }
}

// ============================================================================
// TESTS
// ============================================================================
