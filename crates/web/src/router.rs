//! The route registry.
//!
//! Routes are matched by literal path prefix, in registration order: the first route
//! whose prefix starts the request path wins, even when a later one is more specific.
//! One lock guards lookups, enable/disable and the per-route counters.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{error, info};

use crate::chronometry::Chronometry;
use crate::handler::RequestHandler;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route prefix must not be empty")]
    MissingPrefix,

    #[error("no route matches {path}")]
    UnknownPrefix { path: String },
}

struct Route {
    prefix: String,
    seq: usize,
    enabled: bool,
    handler: Arc<dyn RequestHandler>,
    last_access: Option<SystemTime>,
    access_count: u64,
    chronometry: Option<Chronometry>,
}

impl Route {
    fn matches(&self, path: &str) -> bool {
        path.as_bytes().starts_with(self.prefix.as_bytes())
    }
}

/// A route found for a request path.
#[derive(Clone)]
pub struct RouteMatch {
    pub seq: usize,
    pub prefix_len: usize,
    pub enabled: bool,
    pub handler: Arc<dyn RequestHandler>,
}

impl RouteMatch {
    /// The part of `path` after the matched prefix.
    pub fn suffix<'a>(&self, path: &'a str) -> &'a str {
        path.get(self.prefix_len..).unwrap_or_default()
    }
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("seq", &self.seq)
            .field("prefix_len", &self.prefix_len)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Counters of one route, as reported by [`RouteRegistry::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStats {
    pub prefix: String,
    pub seq: usize,
    pub enabled: bool,
    pub last_access: Option<SystemTime>,
    pub access_count: u64,
    /// Average handler duration, `None` when not sampled or not enough samples yet
    pub average: Option<Duration>,
}

pub struct RouteRegistry {
    routes: Mutex<Vec<Route>>,
    chronometry: bool,
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry").field("count", &self.count()).field("chronometry", &self.chronometry).finish()
    }
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self { routes: Mutex::new(Vec::new()), chronometry: false }
    }

    /// A registry that samples handler durations on every route.
    pub fn with_chronometry() -> Self {
        Self { routes: Mutex::new(Vec::new()), chronometry: true }
    }

    pub fn chronometry_enabled(&self) -> bool {
        self.chronometry
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Route>> {
        // counters stay usable even if a holder panicked
        self.routes.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends a route and returns its sequence number, starting at 1.
    ///
    /// # Errors
    ///
    /// Fails with [`RouteError::MissingPrefix`] on an empty prefix.
    pub fn add(&self, prefix: impl Into<String>, handler: impl RequestHandler + 'static) -> Result<usize, RouteError> {
        self.add_shared(prefix, Arc::new(handler))
    }

    /// Like [`add`](Self::add), for a handler shared between several routes.
    ///
    /// # Errors
    ///
    /// Fails with [`RouteError::MissingPrefix`] on an empty prefix.
    pub fn add_shared(&self, prefix: impl Into<String>, handler: Arc<dyn RequestHandler>) -> Result<usize, RouteError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            error!("refuse to register a route without prefix");
            return Err(RouteError::MissingPrefix);
        }

        let mut routes = self.lock();
        let seq = routes.len() + 1;
        let chronometry = self.chronometry.then(Chronometry::new);
        info!(seq, prefix = %prefix, "route registered");
        routes.push(Route { prefix, seq, enabled: true, handler, last_access: None, access_count: 0, chronometry });
        Ok(seq)
    }

    /// The first registered route whose prefix starts `path`.
    pub fn find(&self, path: &str) -> Option<RouteMatch> {
        self.lock().iter().find(|route| route.matches(path)).map(|route| RouteMatch {
            seq: route.seq,
            prefix_len: route.prefix.len(),
            enabled: route.enabled,
            handler: Arc::clone(&route.handler),
        })
    }

    /// Enables or disables the route `path` resolves to.
    ///
    /// # Errors
    ///
    /// Fails with [`RouteError::UnknownPrefix`] when no route matches `path`.
    pub fn set_enabled(&self, path: &str, enabled: bool) -> Result<(), RouteError> {
        let mut routes = self.lock();
        let route = routes
            .iter_mut()
            .find(|route| route.matches(path))
            .ok_or_else(|| RouteError::UnknownPrefix { path: path.to_owned() })?;

        route.enabled = enabled;
        info!(seq = route.seq, prefix = %route.prefix, enabled, "route toggled");
        Ok(())
    }

    /// The highest sequence number, which is the number of routes.
    pub fn count(&self) -> usize {
        self.lock().last().map_or(0, |route| route.seq)
    }

    /// Marks a dispatched request on route `seq`.
    pub fn record_access(&self, seq: usize) {
        if let Some(route) = self.lock().get_mut(seq.wrapping_sub(1)) {
            route.last_access = Some(SystemTime::now());
            route.access_count += 1;
        }
    }

    /// Adds a handler duration sample on route `seq`; a no-op without chronometry.
    pub fn record_duration(&self, seq: usize, duration: Duration) {
        if let Some(chronometry) = self.lock().get_mut(seq.wrapping_sub(1)).and_then(|route| route.chronometry.as_mut()) {
            chronometry.record(duration);
        }
    }

    /// Average handler duration of the route `path` resolves to.
    pub fn average_duration(&self, path: &str) -> Option<Duration> {
        self.lock().iter().find(|route| route.matches(path)).and_then(|route| route.chronometry.as_ref()?.average())
    }

    pub fn stats(&self) -> Vec<RouteStats> {
        self.lock()
            .iter()
            .map(|route| RouteStats {
                prefix: route.prefix.clone(),
                seq: route.seq,
                enabled: route.enabled,
                last_access: route.last_access,
                access_count: route.access_count,
                average: route.chronometry.as_ref().and_then(Chronometry::average),
            })
            .collect()
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
