//! The conversation demultiplexer.
//!
//! A [`Dispatcher`] splits one shared [`Messageable`] stream by
//! [`ChatId`](crate::events::ChatId) into per-conversation sub-streams,
//! each independently driving its own scenario sessions on a dedicated
//! task. Values produced by completed sessions across all conversations
//! are merged into the single output stream returned by
//! [`pipe`](Dispatcher::pipe).
//!
//! Routing guarantees:
//!
//! - events reach their conversation's matcher in source order;
//! - a slow conversation never stalls the others: each conversation has a
//!   bounded buffer, and when it is full the router drops the event and
//!   counts it (see [`DispatcherMetrics`]) instead of waiting;
//! - a conversation is spun up on first sighting of its key and evicted
//!   after [`idle_timeout`](DispatcherConfig::idle_timeout) with no events
//!   and no session in progress; a later event for the same key spins it
//!   up again.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use flume::r#async::RecvStream;
use futures_util::{Stream, StreamExt};
use rustc_hash::FxHashMap;

use crate::events::{ChatId, Messageable};
use crate::matcher::CancelReason;
use crate::scenario::{Scenario, SessionEnd};

/// Tuning knobs for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Capacity of each per-conversation buffer. When a conversation's
    /// buffer is full, further events for it are dropped (and counted)
    /// rather than stalling the router.
    pub buffer_capacity: usize,
    /// How long a conversation may sit with no incoming events and no
    /// session in progress before its task exits.
    pub idle_timeout: Duration,
    /// Whether a conversation keeps running new sessions after one
    /// completes (matched or failed). With `false` each spun-up
    /// conversation drives at most one completed session.
    pub restart_completed: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 64,
            idle_timeout: Duration::from_secs(300),
            restart_completed: true,
        }
    }
}

impl DispatcherConfig {
    /// Set the per-conversation buffer capacity.
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Set the idle eviction interval.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set whether conversations restart after a completed session.
    #[must_use]
    pub fn with_restart_completed(mut self, restart: bool) -> Self {
        self.restart_completed = restart;
        self
    }
}

/// Running counters for a dispatcher, shared across its tasks.
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    dropped_events: AtomicUsize,
    conversations_started: AtomicUsize,
    conversations_evicted: AtomicUsize,
}

/// Point-in-time copy of [`DispatcherMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherMetricsSnapshot {
    pub dropped_events: usize,
    pub conversations_started: usize,
    pub conversations_evicted: usize,
}

impl DispatcherMetrics {
    /// Total events dropped because a conversation buffer was full.
    pub fn dropped_events(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Total conversations spun up (respawns included).
    pub fn conversations_started(&self) -> usize {
        self.conversations_started.load(Ordering::Relaxed)
    }

    /// Total conversations evicted for idleness.
    pub fn conversations_evicted(&self) -> usize {
        self.conversations_evicted.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    pub fn snapshot(&self) -> DispatcherMetricsSnapshot {
        DispatcherMetricsSnapshot {
            dropped_events: self.dropped_events(),
            conversations_started: self.conversations_started(),
            conversations_evicted: self.conversations_evicted(),
        }
    }

    fn note_dropped(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    fn note_started(&self) {
        self.conversations_started.fetch_add(1, Ordering::Relaxed);
    }

    fn note_evicted(&self) {
        self.conversations_evicted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fans a shared event stream out into per-conversation scenario runs.
pub struct Dispatcher<A> {
    scenario: Scenario<A>,
    config: DispatcherConfig,
    metrics: Arc<DispatcherMetrics>,
}

impl<A: Send + 'static> Dispatcher<A> {
    /// Create a dispatcher with default configuration.
    #[must_use]
    pub fn new(scenario: Scenario<A>) -> Self {
        Self::with_config(scenario, DispatcherConfig::default())
    }

    /// Create a dispatcher with explicit configuration.
    #[must_use]
    pub fn with_config(scenario: Scenario<A>, config: DispatcherConfig) -> Self {
        Self {
            scenario,
            config,
            metrics: Arc::new(DispatcherMetrics::default()),
        }
    }

    /// Handle to the dispatcher's shared counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<DispatcherMetrics> {
        self.metrics.clone()
    }

    /// Route `updates` into per-conversation scenario runs.
    ///
    /// Returns a stream emitting one value per completed scenario run, in
    /// completion order across conversations. The routing task runs until
    /// `updates` ends; it must be called from within a tokio runtime.
    pub fn pipe<S>(self, updates: S) -> impl Stream<Item = A> + Unpin
    where
        S: Stream<Item = Messageable> + Send + 'static,
    {
        let (out_tx, out_rx) = flume::unbounded();
        tokio::spawn(route_updates(
            self.scenario,
            self.config,
            self.metrics,
            Box::pin(updates),
            out_tx,
        ));
        out_rx.into_stream()
    }
}

async fn route_updates<A, S>(
    scenario: Scenario<A>,
    config: DispatcherConfig,
    metrics: Arc<DispatcherMetrics>,
    mut updates: Pin<Box<S>>,
    out: flume::Sender<A>,
) where
    A: Send + 'static,
    S: Stream<Item = Messageable> + Send,
{
    let mut conversations: FxHashMap<ChatId, flume::Sender<Messageable>> = FxHashMap::default();

    while let Some(event) = updates.next().await {
        let chat = event.conversation_id();
        let mut event = event;
        loop {
            let tx = conversations.entry(chat).or_insert_with(|| {
                metrics.note_started();
                tracing::debug!(target: "colloquy::dispatcher", %chat, "starting conversation");
                let (tx, rx) = flume::bounded(config.buffer_capacity);
                tokio::spawn(conversation_worker(
                    chat,
                    scenario.clone(),
                    rx,
                    out.clone(),
                    config.clone(),
                    metrics.clone(),
                ));
                tx
            });
            match tx.try_send(event) {
                Ok(()) => break,
                Err(flume::TrySendError::Full(_)) => {
                    metrics.note_dropped();
                    tracing::warn!(
                        target: "colloquy::dispatcher",
                        %chat,
                        total_dropped = metrics.dropped_events(),
                        "conversation buffer full; dropping event"
                    );
                    break;
                }
                Err(flume::TrySendError::Disconnected(returned)) => {
                    // Worker exited (idle or one-shot); respawn and retry.
                    conversations.remove(&chat);
                    event = returned;
                }
            }
        }
    }
    // Upstream ended; dropping the senders lets workers drain and finish.
}

/// Input for one scenario session: a possibly buffered first event followed
/// by the conversation's channel. An event left unconsumed by a zero-input
/// session stays in `pending` for the next one.
struct SessionSource<'a> {
    pending: &'a mut Option<Messageable>,
    events: &'a mut RecvStream<'static, Messageable>,
}

impl Stream for SessionSource<'_> {
    type Item = Messageable;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.pending.take() {
            return Poll::Ready(Some(event));
        }
        Pin::new(&mut *self.events).poll_next(cx)
    }
}

async fn conversation_worker<A: Send + 'static>(
    chat: ChatId,
    scenario: Scenario<A>,
    rx: flume::Receiver<Messageable>,
    out: flume::Sender<A>,
    config: DispatcherConfig,
    metrics: Arc<DispatcherMetrics>,
) {
    let mut events = rx.into_stream();
    let mut pending: Option<Messageable> = None;

    loop {
        // Between sessions the conversation is idle; only then does the
        // eviction timer apply.
        if pending.is_none() {
            match tokio::time::timeout(config.idle_timeout, events.next()).await {
                Ok(Some(event)) => pending = Some(event),
                Ok(None) => return,
                Err(_) => {
                    metrics.note_evicted();
                    tracing::debug!(
                        target: "colloquy::dispatcher",
                        %chat,
                        "conversation idle; evicting"
                    );
                    return;
                }
            }
        }

        let mut source = SessionSource {
            pending: &mut pending,
            events: &mut events,
        };
        let end = scenario.run(&mut source).await;
        if pending.is_some() {
            // The session consumed nothing, so rerunning it on the same
            // buffered event can never progress. Discard the event and wait
            // for fresh input instead of spinning.
            tracing::debug!(
                target: "colloquy::dispatcher",
                %chat,
                "session consumed no input; discarding buffered event"
            );
            pending = None;
        }
        match end {
            SessionEnd::Matched(value) => {
                if out.send(value).is_err() {
                    return;
                }
                if !config.restart_completed {
                    return;
                }
            }
            SessionEnd::Mismatched { .. } => {
                // Offending event is consumed; try again on what follows.
            }
            SessionEnd::Failed(error) => {
                tracing::warn!(
                    target: "colloquy::dispatcher",
                    %chat,
                    %error,
                    "scenario session failed"
                );
                if !config.restart_completed {
                    return;
                }
            }
            SessionEnd::Cancelled(CancelReason::UpstreamClosed) => return,
            SessionEnd::Cancelled(_) => {}
        }
    }
}
