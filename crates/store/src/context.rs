use std::fmt;
use std::sync::Arc;

use webstore_web::Shutdown;

use crate::kv::KvStore;

/// Storage behaviour switches, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Largest accepted POST body in bytes
    pub max_post: u64,
    /// Seconds until a stored object expires; 0 keeps it forever
    pub expiration: u64,
    /// Refuse to overwrite an existing object
    pub immutable: bool,
    /// Delete an object once it has been read
    pub burn_after_read: bool,
}

impl StoreOptions {
    pub const DEFAULT_MAX_POST: u64 = 10 * 1024 * 1024;
    pub const MIN_MAX_POST: u64 = 1024;
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { max_post: Self::DEFAULT_MAX_POST, expiration: 0, immutable: false, burn_after_read: false }
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn KvStore>,
    pub shutdown: Shutdown,
    pub options: StoreOptions,
}

impl AppContext {
    pub fn new(store: Arc<dyn KvStore>, shutdown: Shutdown, options: StoreOptions) -> Self {
        Self { store, shutdown, options }
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext").field("shutdown", &self.shutdown).field("options", &self.options).finish_non_exhaustive()
    }
}
