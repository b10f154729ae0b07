//! Listener wiring.
//!
//! One listener per enabled market class, each with its own
//! [`Dispatcher`], plus an optional debug listener. All of them shut down
//! gracefully when the root cancellation token fires.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

use crate::Result;
use crate::cache::{CacheInfo, CacheRegistry};
use crate::config::{ClassConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::proxy::{Dispatcher, PassthroughProxy};
use crate::rate_limit::{ClassUsage, RateLimiters};
use crate::types::MarketClass;
use crate::upstream::rest::MarketRestClient;
use crate::upstream::ws::MarketWsClient;

/// The assembled proxy: limiters, caches and dispatchers for every enabled
/// class.
///
/// # Example
///
/// ```rust,no_run
/// use binance_proxy::config::ProxyConfig;
/// use binance_proxy::server::ProxyServer;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> binance_proxy::Result<()> {
///     let cancel = CancellationToken::new();
///     ProxyServer::new(ProxyConfig::default(), cancel).run().await
/// }
/// ```
#[derive(Debug)]
pub struct ProxyServer {
    config: ProxyConfig,
    limiters: RateLimiters,
    dispatchers: Vec<Arc<Dispatcher>>,
    cancel: CancellationToken,
}

impl ProxyServer {
    /// Assemble the proxy. Nothing is bound or started yet.
    pub fn new(config: ProxyConfig, cancel: CancellationToken) -> Self {
        let limiters = RateLimiters::new(&config.rate_limit);
        let dispatchers = config
            .enabled_classes()
            .map(|class_config| Arc::new(build_dispatcher(class_config, &config, &limiters, &cancel)))
            .collect();

        Self {
            config,
            limiters,
            dispatchers,
            cancel,
        }
    }

    /// Dispatcher of an enabled class.
    pub fn dispatcher(&self, class: MarketClass) -> Option<&Arc<Dispatcher>> {
        self.dispatchers.iter().find(|d| d.class() == class)
    }

    /// The shared upstream limiters.
    pub fn limiters(&self) -> &RateLimiters {
        &self.limiters
    }

    /// Router of the debug listener.
    pub fn debug_router(&self) -> Router {
        let state = Arc::new(DebugState {
            registries: self.dispatchers.iter().map(|d| d.registry().clone()).collect(),
            limiters: self.limiters.clone(),
        });

        Router::new()
            .route("/debug/caches", get(debug_caches))
            .route("/debug/limits", get(debug_limits))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind every listener. Failing to bind any address, or an unparsable
    /// upstream URL, is fatal.
    pub async fn bind(self) -> Result<BoundProxy> {
        let mut listeners = Vec::new();

        for class_config in self.config.enabled_classes() {
            Url::parse(&class_config.rest_url)?;
            Url::parse(&class_config.ws_url)?;
        }

        for dispatcher in &self.dispatchers {
            let class = dispatcher.class();
            let listener = bind(&self.config.class(class).listen).await?;
            info!(%class, addr = %local_addr(&listener), "Proxy listening");
            listeners.push(Listener {
                class: Some(class),
                listener,
                router: dispatcher.clone().router(),
            });
        }

        if let Some(addr) = &self.config.debug_addr {
            let listener = bind(addr).await?;
            info!(addr = %local_addr(&listener), "Debug listening");
            listeners.push(Listener {
                class: None,
                listener,
                router: self.debug_router(),
            });
        }

        Ok(BoundProxy {
            server: self,
            listeners,
        })
    }

    /// Bind and serve until cancelled.
    pub async fn run(self) -> Result<()> {
        self.bind().await?.serve().await
    }
}

struct Listener {
    /// `None` for the debug listener.
    class: Option<MarketClass>,
    listener: TcpListener,
    router: Router,
}

/// A proxy whose listeners are bound but not yet serving.
pub struct BoundProxy {
    server: ProxyServer,
    listeners: Vec<Listener>,
}

impl BoundProxy {
    /// Address a class listener is bound to.
    pub fn local_addr(&self, class: MarketClass) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.class == Some(class))
            .and_then(|l| l.listener.local_addr().ok())
    }

    /// Address the debug listener is bound to.
    pub fn debug_addr(&self) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.class.is_none())
            .and_then(|l| l.listener.local_addr().ok())
    }

    /// Serve until the root token is cancelled, then stop every cache.
    pub async fn serve(self) -> Result<()> {
        let BoundProxy { server, listeners } = self;

        let sweepers: Vec<_> = server
            .dispatchers
            .iter()
            .filter_map(|d| d.registry().spawn_sweeper())
            .collect();

        let mut servers = JoinSet::new();
        for Listener { class, listener, router } in listeners {
            let shutdown = server.cancel.clone().cancelled_owned();
            servers.spawn(async move {
                let served = axum::serve(listener, router).with_graceful_shutdown(shutdown).await;
                (class, served)
            });
        }

        while let Some(joined) = servers.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((class, Err(e))) => warn!(?class, "Listener failed: {}", e),
                Err(e) => warn!("Listener task failed: {}", e),
            }
        }

        for dispatcher in &server.dispatchers {
            dispatcher.registry().shutdown();
        }
        for sweeper in sweepers {
            let _ = sweeper.await;
        }

        info!("Proxy stopped");
        Ok(())
    }
}

fn build_dispatcher(
    class_config: &ClassConfig,
    config: &ProxyConfig,
    limiters: &RateLimiters,
    cancel: &CancellationToken,
) -> Dispatcher {
    let class = class_config.class;
    let class_cancel = cancel.child_token();
    let limiter = limiters.for_class(class).clone();

    let rest = MarketRestClient::builder(class)
        .base_url(&class_config.rest_url)
        .limiter(limiter.clone())
        .build();
    let ws = MarketWsClient::with_config(class, config.ws.clone()).with_base_url(&class_config.ws_url);
    let registry = Arc::new(CacheRegistry::new(rest, ws, config.cache, class_cancel.clone()));

    let passthrough = PassthroughProxy::builder(class)
        .base_url(&class_config.rest_url)
        .limiter(limiter)
        .cancel(class_cancel)
        .build();

    Dispatcher::new(registry, passthrough).with_ready_timeout(config.ready_timeout)
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| ProxyError::Bind {
        addr: addr.to_string(),
        source,
    })
}

fn local_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

struct DebugState {
    registries: Vec<Arc<CacheRegistry>>,
    limiters: RateLimiters,
}

async fn debug_caches(State(state): State<Arc<DebugState>>) -> Json<BTreeMap<MarketClass, Vec<CacheInfo>>> {
    let mut caches = BTreeMap::new();
    for registry in &state.registries {
        caches.insert(registry.class(), registry.entries().await);
    }
    Json(caches)
}

async fn debug_limits(State(state): State<Arc<DebugState>>) -> Json<Vec<ClassUsage>> {
    Json(state.limiters.usage().await)
}
