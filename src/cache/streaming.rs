//! Generic self-maintaining cache.
//!
//! A [`StreamingCache`] owns one background task that keeps an immutable
//! snapshot current:
//!
//! ```text
//! Connecting ──subscribe ok──▶ Backfilling ──backfill ok──▶ Live
//!     ▲                            ▲                          │
//!     │ retry                      │ resync                   │ stream dropped
//!     └────────────────────  Reconnecting ◀──────────────────┘
//!
//! any state ──cancel──▶ Stopped
//! ```
//!
//! What is subscribed to, how the full state is fetched and how events are
//! merged is supplied by a [`Feed`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::backoff::{BackoffConfig, DelayIterator, sleep_or_cancel};
use crate::cache::gate::ReadinessGate;
use crate::error::ProxyError;
use crate::types::StreamKey;

/// Lifecycle of a cache's background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Opening the first subscription.
    Connecting,
    /// Fetching a full snapshot.
    Backfilling,
    /// Merging streamed events.
    Live,
    /// Waiting to resubscribe after the subscription dropped.
    Reconnecting,
    /// Cancelled; terminal.
    Stopped,
}

/// Strategy plugged into a [`StreamingCache`].
pub trait Feed: Send + Sync + 'static {
    /// Working state mutated by merges.
    type State: Send + 'static;
    /// Immutable value handed to readers.
    type Snapshot: Send + Sync + 'static;
    /// One incremental update.
    type Event: Send + 'static;
    /// Source of incremental updates.
    type Events: Stream<Item = Result<Self::Event>> + Send + Unpin + 'static;

    /// Identity of the cache, for logging.
    fn key(&self) -> &StreamKey;

    /// Open the event source.
    fn subscribe(&self) -> impl Future<Output = Result<Self::Events>> + Send;

    /// Fetch the complete current state.
    fn backfill(&self, cancel: &CancellationToken) -> impl Future<Output = Result<Self::State>> + Send;

    /// Merge one event.
    ///
    /// Returns `Ok(true)` if the snapshot changed. An error means the state
    /// can no longer be patched and a fresh backfill is needed.
    fn apply(&self, state: &mut Self::State, event: Self::Event) -> Result<bool>;

    /// Materialize the reader-facing value.
    fn snapshot(&self, state: &Self::State) -> Self::Snapshot;
}

struct Shared<F: Feed> {
    feed: F,
    snapshot: RwLock<Option<Arc<F::Snapshot>>>,
    gate: ReadinessGate,
    state: watch::Sender<CacheState>,
    cancel: CancellationToken,
    backoff: BackoffConfig,
    started: AtomicBool,
    created: Instant,
    /// Milliseconds after `created` of the latest read.
    last_read_ms: AtomicU64,
}

/// A cache kept current by a background task.
///
/// Cloning yields another handle to the same cache.
pub struct StreamingCache<F: Feed> {
    shared: Arc<Shared<F>>,
}

impl<F: Feed> Clone for StreamingCache<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<F: Feed> std::fmt::Debug for StreamingCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCache")
            .field("key", self.shared.feed.key())
            .field("state", &self.state())
            .finish()
    }
}

impl<F: Feed> StreamingCache<F> {
    /// Create a cache whose lifetime is bounded by `cancel`.
    ///
    /// Nothing happens until [`start`](Self::start) is called.
    pub fn new(feed: F, backoff: BackoffConfig, cancel: CancellationToken) -> Self {
        let (state, _rx) = watch::channel(CacheState::Connecting);
        Self {
            shared: Arc::new(Shared {
                feed,
                snapshot: RwLock::new(None),
                gate: ReadinessGate::new(),
                state,
                cancel,
                backoff,
                started: AtomicBool::new(false),
                created: Instant::now(),
                last_read_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Identity of the cache.
    pub fn key(&self) -> &StreamKey {
        self.shared.feed.key()
    }

    /// The feed driving this cache.
    pub fn feed(&self) -> &F {
        &self.shared.feed
    }

    /// Whether both handles refer to the same cache.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Spawn the background task. Further calls do nothing.
    pub fn start(&self) {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = self.shared.clone();
        tokio::spawn(run(shared));
    }

    /// Cancel the background task. Idempotent.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
        if !self.shared.started.load(Ordering::Acquire) {
            self.shared.state.send_replace(CacheState::Stopped);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CacheState {
        *self.shared.state.borrow()
    }

    /// Whether a snapshot has ever been published.
    pub fn is_ready(&self) -> bool {
        self.shared.gate.is_ready()
    }

    /// Wait until the cache reaches `target` or stops.
    pub async fn wait_for_state(&self, target: CacheState) -> CacheState {
        let mut rx = self.shared.state.subscribe();
        match rx
            .wait_for(|state| *state == target || *state == CacheState::Stopped)
            .await
        {
            Ok(state) => *state,
            Err(_) => CacheState::Stopped,
        }
    }

    /// Return the current snapshot, waiting for the first one if needed.
    ///
    /// Fails with [`ProxyError::Cancelled`] only if the cache is stopped
    /// before it ever became ready. Once ready, a stale snapshot is served
    /// while the cache reconnects.
    pub async fn read(&self) -> Result<Arc<F::Snapshot>> {
        self.touch();

        tokio::select! {
            biased;
            _ = self.shared.gate.wait() => {}
            _ = self.shared.cancel.cancelled() => {
                if !self.shared.gate.is_ready() {
                    return Err(ProxyError::Cancelled);
                }
            }
        }

        self.shared
            .snapshot
            .read()
            .await
            .clone()
            .ok_or(ProxyError::Cancelled)
    }

    /// Time since the cache was last read (or created).
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.shared.last_read_ms.load(Ordering::Relaxed));
        self.shared.created.elapsed().saturating_sub(last)
    }

    /// Mark the cache as in use.
    pub fn touch(&self) {
        let now = self.shared.created.elapsed().as_millis() as u64;
        self.shared.last_read_ms.fetch_max(now, Ordering::Relaxed);
    }
}

/// How the live phase ended.
enum LiveExit {
    Cancelled,
    /// Subscription is fine but the state must be rebuilt.
    Resync,
    /// Subscription dropped.
    Dropped,
}

async fn run<F: Feed>(shared: Arc<Shared<F>>) {
    let key = shared.feed.key().clone();
    let cancel = shared.cancel.clone();
    let mut delays = DelayIterator::with_config(shared.backoff);
    let mut events: Option<F::Events> = None;

    info!(%key, "Cache started");

    'lifecycle: loop {
        let mut source = match events.take() {
            Some(source) => source,
            None => loop {
                let opened = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'lifecycle,
                    opened = shared.feed.subscribe() => opened,
                };
                match opened {
                    Ok(source) => break source,
                    Err(e) => {
                        let delay = delays.next_delay();
                        warn!(%key, "Subscribe failed, retrying in {:?}: {}", delay, e);
                        if !sleep_or_cancel(delay, &cancel).await {
                            break 'lifecycle;
                        }
                    }
                }
            },
        };

        set_state(&shared, &key, CacheState::Backfilling);

        let mut state = loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'lifecycle,
                fetched = shared.feed.backfill(&cancel) => fetched,
            };
            match fetched {
                Ok(state) => break state,
                Err(ProxyError::Cancelled) => break 'lifecycle,
                Err(e) => {
                    let delay = delays.next_delay();
                    warn!(%key, "Backfill failed, retrying in {:?}: {}", delay, e);
                    if !sleep_or_cancel(delay, &cancel).await {
                        break 'lifecycle;
                    }
                }
            }
        };

        publish(&shared, shared.feed.snapshot(&state)).await;
        if shared.gate.open() {
            debug!(%key, "Cache ready");
        }
        set_state(&shared, &key, CacheState::Live);
        delays.reset();

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break LiveExit::Cancelled,
                next = source.next() => next,
            };
            match next {
                Some(Ok(event)) => match shared.feed.apply(&mut state, event) {
                    Ok(true) => publish(&shared, shared.feed.snapshot(&state)).await,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(%key, "Resync required: {}", e);
                        break LiveExit::Resync;
                    }
                },
                Some(Err(e)) => {
                    warn!(%key, "Subscription failed: {}", e);
                    break LiveExit::Dropped;
                }
                None => {
                    warn!(%key, "Subscription ended");
                    break LiveExit::Dropped;
                }
            }
        };

        match exit {
            LiveExit::Cancelled => break 'lifecycle,
            LiveExit::Resync => events = Some(source),
            LiveExit::Dropped => {
                drop(source);
                set_state(&shared, &key, CacheState::Reconnecting);
            }
        }

        if !sleep_or_cancel(delays.next_delay(), &cancel).await {
            break 'lifecycle;
        }
    }

    set_state(&shared, &key, CacheState::Stopped);
    info!(%key, "Cache stopped");
}

async fn publish<F: Feed>(shared: &Shared<F>, snapshot: F::Snapshot) {
    *shared.snapshot.write().await = Some(Arc::new(snapshot));
}

fn set_state<F: Feed>(shared: &Shared<F>, key: &StreamKey, next: CacheState) {
    let previous = shared.state.send_replace(next);
    if previous != next {
        debug!(%key, from = ?previous, to = ?next, "Cache state changed");
    }
}
