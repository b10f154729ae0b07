//! Per-class HTTP entry point.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::cache::klines::newest;
use crate::cache::{CacheRegistry, Feed, StreamingCache};
use crate::proxy::passthrough::PassthroughProxy;
use crate::proxy::routes::{Route, route};
use crate::types::{MarketClass, QueryParams};

/// How long a request waits for a brand-new cache before it is forwarded
/// upstream instead.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Answers requests for one market class from its caches, forwarding the
/// rest upstream.
#[derive(Debug)]
pub struct Dispatcher {
    class: MarketClass,
    registry: Arc<CacheRegistry>,
    passthrough: PassthroughProxy,
    ready_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(registry: Arc<CacheRegistry>, passthrough: PassthroughProxy) -> Self {
        Self {
            class: registry.class(),
            registry,
            passthrough,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    /// Change how long a request waits for a cache that is not ready yet.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Market class served.
    pub fn class(&self) -> MarketClass {
        self.class
    }

    /// The caches behind this dispatcher.
    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// Router sending every request through [`dispatch`](Self::dispatch).
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .fallback(handle)
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }

    /// Answer one request.
    pub async fn dispatch(&self, request: Request) -> Response {
        let query = QueryParams::parse(request.uri().query());
        let route = route(self.class, request.method(), request.uri().path(), &query);

        match route {
            Route::Klines {
                symbol,
                interval,
                limit,
            } => {
                let cache = self.registry.klines(&symbol, &interval).await;
                self.serve(cache, request, |candles| json(newest(candles, limit)))
                    .await
            }
            Route::Depth { symbol, limit } => {
                let cache = self.registry.depth(&symbol).await;
                self.serve(cache, request, |book| json(&book.truncated(limit)))
                    .await
            }
            Route::Ticker { symbol } => {
                let cache = self.registry.ticker(&symbol).await;
                self.serve(cache, request, |ticker| json(ticker)).await
            }
            Route::ExchangeInfo => {
                let cache = self.registry.exchange_info().await;
                self.serve(cache, request, |document| {
                    ([(header::CONTENT_TYPE, "application/json")], document.clone()).into_response()
                })
                .await
            }
            Route::Passthrough => self.passthrough.forward(request).await,
        }
    }

    /// Render the cache's snapshot, or forward the request if the cache
    /// does not become ready in time or is stopped before it does.
    async fn serve<F, R>(&self, cache: StreamingCache<F>, request: Request, render: R) -> Response
    where
        F: Feed,
        R: FnOnce(&F::Snapshot) -> Response,
    {
        match tokio::time::timeout(self.ready_timeout, cache.read()).await {
            Ok(Ok(snapshot)) => render(snapshot.as_ref()),
            Ok(Err(e)) => {
                debug!(key = %cache.key(), "Cache unavailable ({}), forwarding", e);
                self.passthrough.forward(request).await
            }
            Err(_) => {
                debug!(key = %cache.key(), "Cache not ready, forwarding");
                self.passthrough.forward(request).await
            }
        }
    }
}

async fn handle(State(dispatcher): State<Arc<Dispatcher>>, request: Request) -> Response {
    dispatcher.dispatch(request).await
}

fn json<T: Serialize + ?Sized>(value: &T) -> Response {
    axum::Json(value).into_response()
}
