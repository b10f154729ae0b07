//! `binance-proxy` binary.

use std::process::ExitCode;
use std::time::Duration;

use binance_proxy::config::{DEFAULT_DEBUG_ADDR, DEFAULT_DELIVERY_ADDR, DEFAULT_FUTURES_ADDR, DEFAULT_SPOT_ADDR, ProxyConfig};
use binance_proxy::rate_limit::RateLimitConfig;
use binance_proxy::server::ProxyServer;
use binance_proxy::types::MarketClass;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn cli() -> Command {
    Command::new("binance-proxy")
        .version(VERSION)
        .about("Caching, rate-limited reverse proxy for the Binance REST APIs")
        .arg(
            Arg::new("spot")
                .short('s')
                .long("spot")
                .value_name("ADDR")
                .default_value(DEFAULT_SPOT_ADDR)
                .help("Spot listen address"),
        )
        .arg(
            Arg::new("futures")
                .short('f')
                .long("futures")
                .value_name("ADDR")
                .default_value(DEFAULT_FUTURES_ADDR)
                .help("USD-M futures listen address"),
        )
        .arg(
            Arg::new("delivery")
                .short('d')
                .long("delivery")
                .value_name("ADDR")
                .default_value(DEFAULT_DELIVERY_ADDR)
                .help("COIN-M futures listen address"),
        )
        .arg(
            Arg::new("debug-addr")
                .long("debug-addr")
                .value_name("ADDR")
                .default_value(DEFAULT_DEBUG_ADDR)
                .help("Debug status listen address"),
        )
        .arg(
            Arg::new("disable-spot")
                .long("disable-spot")
                .help("Do not start the spot listener")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("disable-futures")
                .long("disable-futures")
                .help("Do not start the futures listener")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("disable-delivery")
                .long("disable-delivery")
                .help("Do not start the delivery listener")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("idle-timeout")
                .long("idle-timeout")
                .value_name("SECS")
                .default_value("1800")
                .help("Stop caches not read for this many seconds (0 keeps them forever)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("exchange-info-refresh")
                .long("exchange-info-refresh")
                .value_name("SECS")
                .default_value("3600")
                .help("Seconds between exchange info refreshes")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("no-rate-limit")
                .long("no-rate-limit")
                .help("Do not throttle upstream requests")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print debug logs")
                .action(ArgAction::SetTrue),
        )
}

fn config_from(matches: &ArgMatches) -> ProxyConfig {
    let addr = |name: &str| matches.get_one::<String>(name).cloned().unwrap_or_default();
    let secs = |name: &str| Duration::from_secs(matches.get_one::<u64>(name).copied().unwrap_or_default());

    let idle_timeout = Some(secs("idle-timeout")).filter(|timeout| !timeout.is_zero());

    ProxyConfig::builder()
        .listen(MarketClass::Spot, addr("spot"))
        .listen(MarketClass::Futures, addr("futures"))
        .listen(MarketClass::Delivery, addr("delivery"))
        .enabled(MarketClass::Spot, !matches.get_flag("disable-spot"))
        .enabled(MarketClass::Futures, !matches.get_flag("disable-futures"))
        .enabled(MarketClass::Delivery, !matches.get_flag("disable-delivery"))
        .debug_addr(Some(addr("debug-addr")).filter(|a| !a.is_empty()))
        .idle_timeout(idle_timeout)
        .exchange_info_refresh(secs("exchange-info-refresh"))
        .rate_limit(RateLimitConfig {
            enabled: !matches.get_flag("no-rate-limit"),
            ..RateLimitConfig::default()
        })
        .build()
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut term), Ok(mut hup), Ok(mut quit)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
        signal(SignalKind::quit()),
    ) else {
        error!("Failed to install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = hup.recv() => info!("Received SIGHUP"),
        _ = quit.recv() => info!("Received SIGQUIT"),
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

/// Cancel `cancel` on the first termination signal.
async fn shutdown_on_signal(cancel: CancellationToken) {
    tokio::select! {
        Ok(()) = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = terminate() => {}
        _ = cancel.cancelled() => return,
    }

    info!("Shutting down");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    let config = config_from(&matches);
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    info!(version = VERSION, "Starting binance-proxy");
    match ProxyServer::new(config, cancel).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
