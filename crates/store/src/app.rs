//! Wiring of the gateway: routes, admission, server and the store-loss watchdog.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::{select, time};
use tracing::{error, info};
use webstore_web::{AddressCheck, RouteError, RouteRegistry, Server, ServerError, Shutdown, ShutdownReason};

use crate::context::AppContext;
use crate::handlers::{ConfigHandler, StoreHandler};
use crate::kv::{ConnectError, KvConnection, KvStore};
use crate::limiter::RateLimiter;
use crate::settings::Settings;
use crate::token::Algorithm;

pub const CONFIG_PREFIX: &str = "/config/";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("connect store error: {source}")]
    Connect {
        #[from]
        source: ConnectError,
    },

    #[error("route setup error: {source}")]
    Route {
        #[from]
        source: RouteError,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Registers the six store routes, in ascending digest size, then the config route.
///
/// # Errors
///
/// Propagates registry failures.
pub fn build_routes(app: &Arc<AppContext>, chronometry: bool) -> Result<Arc<RouteRegistry>, RouteError> {
    let registry = if chronometry { RouteRegistry::with_chronometry() } else { RouteRegistry::new() };

    for algorithm in Algorithm::ALL {
        registry.add(algorithm.prefix(), StoreHandler::new(algorithm, Arc::clone(app)))?;
    }
    registry.add(CONFIG_PREFIX, ConfigHandler::new(app.options, app.shutdown.clone()))?;

    Ok(Arc::new(registry))
}

/// One line per store route whose timing is ready, labelled with its digest size.
pub fn stats_report(registry: &RouteRegistry) -> Vec<String> {
    Algorithm::ALL
        .iter()
        .filter_map(|algorithm| {
            let average = registry.average_duration(algorithm.prefix())?;
            (average > Duration::ZERO).then(|| format!("{:>6}: {}", algorithm.bits(), average.as_nanos()))
        })
        .collect()
}

/// Prints [`stats_report`] every second until shutdown.
pub async fn report_stats(registry: Arc<RouteRegistry>, shutdown: Shutdown) {
    let mut ticker = time::interval(Duration::from_secs(1));
    loop {
        select! {
            _ = shutdown.wait() => return,
            _ = ticker.tick() => {
                for line in stats_report(&registry) {
                    println!("{line}");
                }
            }
        }
    }
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hangup = signal(SignalKind::hangup())?;

    select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
        _ = hangup.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn watch_signals(shutdown: Shutdown) {
    tokio::spawn(async move {
        select! {
            received = termination_signal() => match received {
                Ok(()) => {
                    shutdown.trigger(ShutdownReason::Signal);
                }
                Err(e) => error!(cause = %e, "cannot listen for signals"),
            },
            _ = shutdown.wait() => {}
        }
    });
}

/// Runs the gateway until a signal arrives or the store link is lost.
///
/// # Errors
///
/// Fails when the store cannot be reached or the server cannot start.
pub async fn run(settings: Settings) -> Result<ShutdownReason, AppError> {
    let shutdown = Shutdown::new();
    let connection = Arc::new(KvConnection::with_shutdown(shutdown.clone()));
    connection.connect(&settings.store).await?;

    let result = serve(&settings, Arc::clone(&connection) as Arc<dyn KvStore>, shutdown.clone()).await;

    connection.disconnect().await;
    info!("webstore shutdown");
    result.map(|()| shutdown.reason().unwrap_or(ShutdownReason::Signal))
}

async fn serve(settings: &Settings, store: Arc<dyn KvStore>, shutdown: Shutdown) -> Result<(), AppError> {
    let app = Arc::new(AppContext::new(Arc::clone(&store), shutdown.clone(), settings.options));
    let registry = build_routes(&app, settings.stats)?;

    let mut builder = Server::builder().config(settings.server.clone()).registry(Arc::clone(&registry)).shutdown(shutdown.clone());
    if let Some(limiter) = settings.limiter {
        info!(period = limiter.period, max_count = limiter.max_count, "rate limiting enabled");
        builder = builder.address_check(Arc::new(RateLimiter::new(store, limiter)) as Arc<dyn AddressCheck>);
    }
    let server = builder.build()?;
    let listener = server.bind().await?;

    watch_signals(shutdown.clone());
    if settings.stats {
        tokio::spawn(report_stats(registry, shutdown.clone()));
    }

    info!("webstore started on port {}", settings.server.port);
    server.serve(listener).await?;
    Ok(())
}
