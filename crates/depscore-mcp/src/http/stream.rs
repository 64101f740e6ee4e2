//! Long-lived server-to-client SSE channels.
//!
//! A channel is opened by a GET on an existing session. While open it
//! emits a keep-alive comment on a fixed interval. It closes when the
//! client goes away, when its session closes, or when a newer GET on the
//! same session replaces it. Closing is idempotent and always stops the
//! keep-alive task.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Buffered events per channel before writes start being dropped.
const CHANNEL_CAPACITY: usize = 64;

const KEEP_ALIVE_COMMENT: &str = "keep-alive";

/// Shortest keep-alive period; `interval` panics on zero.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

/// Body stream handed to axum's `Sse` response.
pub type EventStream = std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub struct StreamingChannel {
    session_id: String,
    open: AtomicBool,
    cancel: CancellationToken,
    sender: mpsc::Sender<Event>,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
    keep_alives_sent: AtomicU64,
}

impl StreamingChannel {
    /// Open a channel and start its keep-alive timer.
    ///
    /// The channel is cancelled together with `parent`.
    pub fn open(
        session_id: &str,
        keep_alive: Duration,
        parent: &CancellationToken,
    ) -> (Arc<Self>, EventStream) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = parent.child_token();

        let channel = Arc::new(Self {
            session_id: session_id.to_string(),
            open: AtomicBool::new(true),
            cancel: cancel.clone(),
            sender: sender.clone(),
            keep_alive: Mutex::new(None),
            keep_alives_sent: AtomicU64::new(0),
        });

        let task = tokio::spawn(keep_alive_loop(
            Arc::downgrade(&channel),
            sender,
            cancel.clone(),
            keep_alive,
        ));
        *channel.keep_alive_slot() = Some(task);

        tracing::info!(session_id, "Streaming channel attached");

        let events = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (Ok(event), receiver))
        })
        .take_until(cancel.cancelled_owned());

        (channel, Box::pin(events))
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Whether the keep-alive task is still running.
    pub fn keep_alive_active(&self) -> bool {
        self.keep_alive_slot()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn keep_alives_sent(&self) -> u64 {
        self.keep_alives_sent.load(Ordering::Relaxed)
    }

    /// Queue an event. A closed or full channel drops it and returns `false`.
    pub fn send(&self, event: Event) -> bool {
        if !self.is_open() {
            tracing::debug!(session_id = %self.session_id, "Dropping event for closed stream");
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to queue stream event");
                false
            }
        }
    }

    /// Queue a JSON-RPC message as an SSE `message` event.
    pub fn send_message<T: Serialize>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(data) => self.send(Event::default().event("message").data(data)),
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "Failed to serialize stream message");
                false
            }
        }
    }

    /// Close the channel. Returns `true` only for the call that closed it.
    pub fn close(&self, reason: &str) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }

        if let Some(task) = self.keep_alive_slot().take() {
            task.abort();
        }
        self.cancel.cancel();

        tracing::info!(
            session_id = %self.session_id,
            reason,
            keep_alives = self.keep_alives_sent(),
            "Streaming channel torn down"
        );
        true
    }

    fn keep_alive_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.keep_alive.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn keep_alive_loop(
    channel: Weak<StreamingChannel>,
    sender: mpsc::Sender<Event>,
    cancel: CancellationToken,
    period: Duration,
) {
    let period = period.max(MIN_KEEP_ALIVE);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Session shutdown cancels the token directly; make sure the
                // channel is marked closed as well.
                if let Some(channel) = channel.upgrade() {
                    channel.close("session closed");
                }
                break;
            }
            _ = sender.closed() => {
                if let Some(channel) = channel.upgrade() {
                    channel.close("client disconnected");
                }
                break;
            }
            _ = ticker.tick() => {
                let Some(channel) = channel.upgrade() else { break };
                if !channel.is_open() {
                    break;
                }
                if sender.try_send(Event::default().comment(KEEP_ALIVE_COMMENT)).is_ok() {
                    channel.keep_alives_sent.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(session_id = %channel.session_id, "Keep-alive sent");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const PERIOD: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_ticks_while_open() {
        let parent = CancellationToken::new();
        let (channel, _events) = StreamingChannel::open("s1", PERIOD, &parent);

        sleep(Duration::from_secs(29)).await;
        assert_eq!(channel.keep_alives_sent(), 0);

        sleep(Duration::from_secs(62)).await;
        assert_eq!(channel.keep_alives_sent(), 3);
        assert!(channel.keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_abort_stops_keep_alive() {
        let parent = CancellationToken::new();
        let (channel, events) = StreamingChannel::open("s1", PERIOD, &parent);

        sleep(Duration::from_secs(31)).await;
        assert_eq!(channel.keep_alives_sent(), 1);

        drop(events);
        sleep(Duration::from_secs(1)).await;

        assert!(!channel.is_open());
        assert!(!channel.keep_alive_active());

        sleep(Duration::from_secs(300)).await;
        assert_eq!(channel.keep_alives_sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_still_watches_disconnect() {
        let parent = CancellationToken::new();
        let (channel, events) = StreamingChannel::open("s1", Duration::ZERO, &parent);

        sleep(Duration::from_millis(1500)).await;
        assert!(channel.keep_alive_active());
        assert_eq!(channel.keep_alives_sent(), 1);

        drop(events);
        sleep(Duration::from_millis(10)).await;

        assert!(!channel.is_open());
        assert!(!channel.keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let parent = CancellationToken::new();
        let (channel, _events) = StreamingChannel::open("s1", PERIOD, &parent);

        assert!(channel.close("replaced"));
        assert!(!channel.close("client disconnected"));
        assert!(!channel.keep_alive_active());

        sleep(Duration::from_secs(120)).await;
        assert_eq!(channel.keep_alives_sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_closes_channel_and_ends_stream() {
        let parent = CancellationToken::new();
        let (channel, mut events) = StreamingChannel::open("s1", PERIOD, &parent);

        parent.cancel();
        assert!(events.next().await.is_none());

        sleep(Duration::from_millis(10)).await;
        assert!(!channel.is_open());
        assert!(!channel.keep_alive_active());
    }

    #[tokio::test]
    async fn test_send_after_close_is_noop() {
        let parent = CancellationToken::new();
        let (channel, mut events) = StreamingChannel::open("s1", PERIOD, &parent);

        assert!(channel.send_message(&serde_json::json!({"jsonrpc": "2.0", "method": "x"})));
        assert!(events.next().await.is_some());

        channel.close("test");
        assert!(!channel.send_message(&serde_json::json!({"jsonrpc": "2.0", "method": "y"})));
        assert!(events.next().await.is_none());
    }
}
