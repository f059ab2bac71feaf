//! Log output setup for the binary.
//!
//! Filtering follows `RUST_LOG` and defaults to `info`. With a log file, lines are
//! appended to it without ANSI colors; otherwise they go to stderr.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("cannot open log file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails when the log file cannot be opened or a subscriber is already set.
pub fn init(log_file: Option<&Path>) -> Result<(), LogError> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter()).with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LogError::Open { path: path.to_owned(), source })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };

    installed.map_err(|_| LogError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unopenable_file() {
        let result = init(Some(Path::new("/nonexistent/dir/webstore.log")));
        assert!(matches!(result, Err(LogError::Open { .. })));
    }
}
