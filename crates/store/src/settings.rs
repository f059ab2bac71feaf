//! Startup configuration, validated once into an immutable [`Settings`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use webstore_web::{Limits, ServerConfig, ThreadingModel, TlsMaterial};

use crate::cli::Cli;
use crate::context::StoreOptions;
use crate::kv::Destination;
use crate::limiter::LimiterConfig;
use crate::token::Algorithm;

/// Shortest path served: `/config/bar`.
pub const MIN_URL_LEN: usize = "/config/bar".len();

/// Longest path served: a sha512 token under its route.
pub const MAX_URL_LEN: usize = Algorithm::Sha512.prefix().len() + Algorithm::Sha512.token_len();

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no store destination given")]
    MissingStore,

    #[error("environment variable {name}={value} is not an integer")]
    InvalidEnv { name: &'static str, value: String },

    #[error("cannot read {path}: {source}")]
    ReadFile { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub store: Destination,
    pub options: StoreOptions,
    pub limiter: Option<LimiterConfig>,
    pub log_file: Option<PathBuf>,
    pub stats: bool,
}

impl Settings {
    /// Combines the command line with `REQPERIOD`, `REQCOUNT` and `EXPIRATION` from `env`.
    ///
    /// Rate limiting needs both limiter variables; either one missing leaves it off.
    ///
    /// # Errors
    ///
    /// Fails on a non-integer environment value or an unreadable TLS file.
    pub fn resolve(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store = cli.destination().ok_or(ConfigError::MissingStore)?;

        let limiter = match (env_integer(&env, "REQPERIOD")?, env_integer(&env, "REQCOUNT")?) {
            (Some(period), Some(count)) => LimiterConfig::new(period, count),
            _ => None,
        };
        let expiration = env_integer(&env, "EXPIRATION")?.unwrap_or(0);

        let max_post = if cli.maxpost < StoreOptions::MIN_MAX_POST {
            warn!(maxpost = cli.maxpost, floor = StoreOptions::MIN_MAX_POST, "maxpost raised to floor");
            StoreOptions::MIN_MAX_POST
        } else {
            cli.maxpost
        };

        let options = StoreOptions {
            max_post,
            expiration: u64::try_from(expiration).unwrap_or(0),
            immutable: cli.immutable,
            burn_after_read: cli.bar,
        };

        let tls = match (&cli.cert, &cli.key) {
            (Some(cert), Some(key)) => Some(TlsMaterial {
                cert: read(cert)?,
                key: read(key)?,
                ca: cli.ca.as_deref().map(read).transpose()?,
            }),
            _ => None,
        };

        let server = ServerConfig {
            address: cli.ip,
            port: cli.port,
            threading: if cli.single_threaded { ThreadingModel::SingleThreaded } else { ThreadingModel::ThreadPerConnection },
            tls,
            idle_timeout: (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout)),
            connection_limit: ServerConfig::DEFAULT_CONNECTION_LIMIT,
            limits: Limits { min_url_len: MIN_URL_LEN, max_url_len: MAX_URL_LEN, max_body_len: max_post },
        };

        Ok(Self { server, store, options, limiter, log_file: cli.log, stats: cli.stats })
    }

    /// [`resolve`](Self::resolve) against the process environment.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn from_env(cli: Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |name| std::env::var(name).ok())
    }
}

fn env_integer(env: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<i64>, ConfigError> {
    env(name)
        .map(|value| value.trim().parse().map_err(|_| ConfigError::InvalidEnv { name, value: value.clone() }))
        .transpose()
}

fn read(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::ReadFile { path: path.to_owned(), source })
}
