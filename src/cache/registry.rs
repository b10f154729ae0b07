//! Cache instances of one market class, keyed by [`StreamKey`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backoff::BackoffConfig;
use crate::cache::depth::DepthFeed;
use crate::cache::exchange_info::{DEFAULT_REFRESH_INTERVAL, ExchangeInfoFeed};
use crate::cache::klines::KlinesFeed;
use crate::cache::streaming::{CacheState, Feed, StreamingCache};
use crate::cache::ticker::TickerFeed;
use crate::types::{MarketClass, StreamKey};
use crate::upstream::rest::MarketRestClient;
use crate::upstream::ws::MarketWsClient;

/// Settings shared by every cache of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Retry delays for subscribe, backfill and refresh failures.
    pub backoff: BackoffConfig,
    /// Time between exchange info refreshes.
    pub exchange_info_refresh: Duration,
    /// Caches not read for this long are stopped and dropped. `None` keeps
    /// them forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            exchange_info_refresh: DEFAULT_REFRESH_INTERVAL,
            idle_timeout: Some(Duration::from_secs(1800)),
        }
    }
}

/// One row of the debug listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Cache identity.
    pub key: StreamKey,
    /// Lifecycle state.
    pub state: CacheState,
    /// Whether a snapshot has been published.
    pub ready: bool,
    /// Seconds since the cache was last read.
    pub idle_secs: u64,
}

type Slots<F> = Mutex<HashMap<StreamKey, StreamingCache<F>>>;

/// Lazily creates and evicts caches.
///
/// Lookups for the same key always return the same running cache, so any
/// number of concurrent first requests share one subscription and one
/// backfill.
#[derive(Debug)]
pub struct CacheRegistry {
    class: MarketClass,
    rest: MarketRestClient,
    ws: MarketWsClient,
    options: CacheOptions,
    cancel: CancellationToken,
    klines: Slots<KlinesFeed>,
    depth: Slots<DepthFeed>,
    ticker: Slots<TickerFeed>,
    exchange_info: Slots<ExchangeInfoFeed>,
}

impl CacheRegistry {
    /// Create an empty registry. Every cache stops when `cancel` fires.
    pub fn new(rest: MarketRestClient, ws: MarketWsClient, options: CacheOptions, cancel: CancellationToken) -> Self {
        Self {
            class: rest.class(),
            rest,
            ws,
            options,
            cancel,
            klines: Mutex::new(HashMap::new()),
            depth: Mutex::new(HashMap::new()),
            ticker: Mutex::new(HashMap::new()),
            exchange_info: Mutex::new(HashMap::new()),
        }
    }

    /// Market class served.
    pub fn class(&self) -> MarketClass {
        self.class
    }

    /// Candlestick cache of `(symbol, interval)`.
    pub async fn klines(&self, symbol: &str, interval: &str) -> StreamingCache<KlinesFeed> {
        let key = StreamKey::klines(self.class, symbol, interval);
        self.get_or_create(&self.klines, key, || {
            KlinesFeed::new(self.rest.clone(), self.ws.clone(), symbol, interval)
        })
        .await
    }

    /// Order book cache of `symbol`.
    pub async fn depth(&self, symbol: &str) -> StreamingCache<DepthFeed> {
        let key = StreamKey::depth(self.class, symbol);
        self.get_or_create(&self.depth, key, || {
            DepthFeed::new(self.rest.clone(), self.ws.clone(), symbol)
        })
        .await
    }

    /// 24h ticker cache of `symbol`.
    pub async fn ticker(&self, symbol: &str) -> StreamingCache<TickerFeed> {
        let key = StreamKey::ticker(self.class, symbol);
        self.get_or_create(&self.ticker, key, || {
            TickerFeed::new(self.rest.clone(), self.ws.clone(), symbol)
        })
        .await
    }

    /// Exchange info cache of this class.
    pub async fn exchange_info(&self) -> StreamingCache<ExchangeInfoFeed> {
        let key = StreamKey::exchange_info(self.class);
        let refresh = self.options.exchange_info_refresh;
        let cancel = self.cancel.clone();
        self.get_or_create(&self.exchange_info, key, move || {
            ExchangeInfoFeed::new(self.rest.clone(), refresh, cancel)
        })
        .await
    }

    async fn get_or_create<F: Feed>(
        &self,
        slots: &Slots<F>,
        key: StreamKey,
        make: impl FnOnce() -> F,
    ) -> StreamingCache<F> {
        let mut slots = slots.lock().await;

        if let Some(cache) = slots.get(&key) {
            if cache.state() != CacheState::Stopped {
                cache.touch();
                return cache.clone();
            }
        }

        let cache = StreamingCache::new(make(), self.options.backoff, self.cancel.child_token());
        cache.touch();
        cache.start();
        debug!(%key, "Cache created");
        slots.insert(key, cache.clone());
        cache
    }

    /// Stop and drop every cache idle for at least `timeout`.
    ///
    /// Runs under the same locks as creation, so a cache handed out by a
    /// concurrent lookup is never evicted in between.
    pub async fn sweep_idle(&self, timeout: Duration) -> usize {
        sweep(&self.klines, timeout).await
            + sweep(&self.depth, timeout).await
            + sweep(&self.ticker, timeout).await
            + sweep(&self.exchange_info, timeout).await
    }

    /// Periodically evict idle caches until the registry is shut down.
    ///
    /// Returns `None` when eviction is disabled.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let timeout = self.options.idle_timeout?;
        let period = (timeout / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
        let registry = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = registry.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = registry.sweep_idle(timeout).await;
                        if evicted > 0 {
                            info!(class = %registry.class, evicted, "Evicted idle caches");
                        }
                    }
                }
            }
        }))
    }

    /// State of every cache, ordered by key.
    pub async fn entries(&self) -> Vec<CacheInfo> {
        let mut entries = Vec::new();
        collect(&self.klines, &mut entries).await;
        collect(&self.depth, &mut entries).await;
        collect(&self.ticker, &mut entries).await;
        collect(&self.exchange_info, &mut entries).await;
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Number of caches held.
    pub async fn len(&self) -> usize {
        self.klines.lock().await.len()
            + self.depth.lock().await.len()
            + self.ticker.lock().await.len()
            + self.exchange_info.lock().await.len()
    }

    /// Whether no cache is held.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every cache.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn sweep<F: Feed>(slots: &Slots<F>, timeout: Duration) -> usize {
    let mut slots = slots.lock().await;
    let before = slots.len();
    slots.retain(|key, cache| {
        let keep = cache.state() != CacheState::Stopped && cache.idle_for() < timeout;
        if !keep {
            debug!(%key, idle = ?cache.idle_for(), "Evicting cache");
            cache.stop();
        }
        keep
    });
    before - slots.len()
}

async fn collect<F: Feed>(slots: &Slots<F>, out: &mut Vec<CacheInfo>) {
    let slots = slots.lock().await;
    out.extend(slots.iter().map(|(key, cache)| CacheInfo {
        key: key.clone(),
        state: cache.state(),
        ready: cache.is_ready(),
        idle_secs: cache.idle_for().as_secs(),
    }));
}
