//! The key/value store behind the gateway.
//!
//! ```text
//!   handlers / limiter
//!          │  Command
//!          ▼
//!   ┌─────────────┐      ┌──────────────┐
//!   │ dyn KvStore │ ───▶ │ KvConnection │ ── RESP over tcp / unix socket
//!   └─────────────┘      └──────────────┘
//!          │
//!          └───────────▶ MemoryStore (tests)
//! ```
//!
//! Callers speak a handful of commands: `GET`, `SET` (with `EX` / `NX`), `DEL`,
//! `INCR` and `PING`. Each [`KvStore::execute`] call is one command round trip,
//! serialized against every other caller of the same store.

use std::io;

use async_trait::async_trait;
use thiserror::Error;

mod connection;
pub mod memory;
mod resp;

pub use connection::{ConnectError, Destination, KvConnection};
pub use memory::{ManualClock, MemoryStore};
pub use resp::{Command, RespCodec, RespError, RespValue};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store not connected")]
    NotConnected,

    #[error("store transport error: {source}")]
    Transport {
        #[from]
        source: io::Error,
    },

    #[error("store protocol error: {source}")]
    Protocol { source: RespError },
}

impl StoreError {
    /// Whether the failure came from the link rather than from the store's answer.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Protocol { .. })
    }
}

impl From<RespError> for StoreError {
    fn from(e: RespError) -> Self {
        match e {
            RespError::Io { source } => Self::Transport { source },
            source => Self::Protocol { source },
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Sends one command and waits for its reply.
    ///
    /// A reply of type error is a successful round trip; only transport and framing
    /// failures are `Err`.
    async fn execute(&self, command: Command) -> Result<RespValue, StoreError>;
}
