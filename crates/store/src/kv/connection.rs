use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::codec::Framed;
use tracing::{debug, error, info};
use webstore_web::{Shutdown, ShutdownReason};

use super::resp::{Command, RespCodec, RespValue};
use super::{KvStore, StoreError};

/// Where the store listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("store already connected")]
    AlreadyConnected,

    #[error("store connection is locked by another caller")]
    Lock,

    #[error("store connect error: {source}")]
    Transport {
        #[from]
        source: io::Error,
    },

    #[error("store refused the session: {0}")]
    Store(String),
}

/// Any duplex byte stream the client can speak RESP over.
pub trait KvStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> KvStream for T {}

type Session = Framed<Box<dyn KvStream>, RespCodec>;

/// The single shared link to the store.
///
/// Commands are serialized by an async mutex held for the whole round trip. When the
/// link breaks the connection flips to disconnected and, if a [`Shutdown`] was
/// attached, raises it with [`ShutdownReason::StoreLost`].
pub struct KvConnection {
    session: Mutex<Option<Session>>,
    connected: AtomicBool,
    shutdown: Option<Shutdown>,
}

impl fmt::Debug for KvConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvConnection").field("connected", &self.is_connected()).finish_non_exhaustive()
    }
}

impl KvConnection {
    pub fn new() -> Self {
        Self { session: Mutex::new(None), connected: AtomicBool::new(false), shutdown: None }
    }

    /// A connection whose transport failures shut the process down.
    pub fn with_shutdown(shutdown: Shutdown) -> Self {
        Self { shutdown: Some(shutdown), ..Self::new() }
    }

    /// Opens the link and checks it with a `PING`.
    ///
    /// # Errors
    ///
    /// See [`ConnectError`] for the distinct failure cases.
    pub async fn connect(&self, destination: &Destination) -> Result<(), ConnectError> {
        let session = self.begin_connect()?;

        let stream: Box<dyn KvStream> = match destination {
            Destination::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
            #[cfg(unix)]
            Destination::Unix(path) => Box::new(tokio::net::UnixStream::connect(path).await?),
            #[cfg(not(unix))]
            Destination::Unix(_) => {
                return Err(ConnectError::Transport { source: io::ErrorKind::Unsupported.into() });
            }
        };

        self.attach(session, stream).await?;
        info!(%destination, "store connected");
        Ok(())
    }

    /// Like [`connect`](Self::connect) over an already open stream.
    ///
    /// # Errors
    ///
    /// See [`ConnectError`].
    pub async fn connect_stream(&self, stream: impl KvStream + 'static) -> Result<(), ConnectError> {
        let session = self.begin_connect()?;
        self.attach(session, Box::new(stream)).await
    }

    fn begin_connect(&self) -> Result<MutexGuard<'_, Option<Session>>, ConnectError> {
        if self.is_connected() {
            return Err(ConnectError::AlreadyConnected);
        }
        let session = self.session.try_lock().map_err(|_| ConnectError::Lock)?;
        if session.is_some() {
            return Err(ConnectError::AlreadyConnected);
        }
        Ok(session)
    }

    async fn attach(
        &self,
        mut session: MutexGuard<'_, Option<Session>>,
        stream: Box<dyn KvStream>,
    ) -> Result<(), ConnectError> {
        let mut framed = Framed::new(stream, RespCodec);

        match round_trip(&mut framed, Command::new("PING")).await {
            Ok(RespValue::Error(message)) => return Err(ConnectError::Store(message)),
            Ok(_) => {}
            Err(StoreError::Transport { source }) => return Err(ConnectError::Transport { source }),
            Err(e) => return Err(ConnectError::Store(e.to_string())),
        }

        *session = Some(framed);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Takes the session for one command round trip.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotConnected`] when no link is open.
    pub async fn lock(&self) -> Result<KvSession<'_>, StoreError> {
        let guard = self.session.lock().await;
        if guard.is_none() {
            return Err(StoreError::NotConnected);
        }
        Ok(KvSession { guard, owner: self })
    }

    /// Closes the link; calling it again is a no-op.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut framed) = session.take() {
            if let Err(e) = framed.close().await {
                debug!(cause = %e, "store close failed");
            }
            info!("store disconnected");
        }
        self.connected.store(false, Ordering::Release);
    }

    fn mark_lost(&self, cause: &StoreError) {
        if self.connected.swap(false, Ordering::AcqRel) {
            error!(%cause, "store connection lost");
        }
        if let Some(shutdown) = &self.shutdown {
            shutdown.trigger(ShutdownReason::StoreLost);
        }
    }
}

impl Default for KvConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the store link; released on drop.
pub struct KvSession<'a> {
    guard: MutexGuard<'a, Option<Session>>,
    owner: &'a KvConnection,
}

impl fmt::Debug for KvSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvSession").field("open", &self.guard.is_some()).finish_non_exhaustive()
    }
}

impl KvSession<'_> {
    /// # Errors
    ///
    /// A transport failure also drops the link and marks the store lost.
    pub async fn execute(&mut self, command: Command) -> Result<RespValue, StoreError> {
        let Some(framed) = self.guard.as_mut() else {
            return Err(StoreError::NotConnected);
        };

        let result = round_trip(framed, command).await;
        if let Err(e) = &result {
            if e.is_transport() {
                self.guard.take();
                self.owner.mark_lost(e);
            }
        }
        result
    }
}

async fn round_trip(framed: &mut Session, command: Command) -> Result<RespValue, StoreError> {
    debug!(%command, "store command");
    framed.send(command).await?;
    match framed.next().await {
        Some(reply) => Ok(reply?),
        None => Err(StoreError::Transport { source: io::ErrorKind::UnexpectedEof.into() }),
    }
}

#[async_trait]
impl KvStore for KvConnection {
    async fn execute(&self, command: Command) -> Result<RespValue, StoreError> {
        let mut session = self.lock().await?;
        session.execute(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[tokio::test]
    async fn connect_pings_then_executes() {
        let (client, mut server) = duplex(1024);
        let store = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"*1\r\n$4\r\nPING\r\n");
            server.write_all(b"+PONG\r\n").await.unwrap();

            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
            server.write_all(b"$5\r\nvalue\r\n").await.unwrap();
            server
        });

        let connection = KvConnection::new();
        connection.connect_stream(client).await.unwrap();
        assert!(connection.is_connected());
        assert!(matches!(connection.connect_stream(duplex(8).0).await, Err(ConnectError::AlreadyConnected)));

        let reply = connection.execute(Command::new("GET").arg("k")).await.unwrap();
        assert_eq!(reply, RespValue::Bulk(Bytes::from_static(b"value")));

        let _server = store.await.unwrap();
        connection.disconnect().await;
        connection.disconnect().await;
        assert!(!connection.is_connected());
        assert!(matches!(connection.execute(Command::new("PING")).await, Err(StoreError::NotConnected)));
    }

    #[tokio::test]
    async fn error_reply_to_ping_is_refused() {
        let (client, mut server) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(b"-NOAUTH Authentication required.\r\n").await.unwrap();
            server
        });

        let connection = KvConnection::new();
        let result = connection.connect_stream(client).await;
        assert!(matches!(result, Err(ConnectError::Store(message)) if message.starts_with("NOAUTH")));
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn lost_link_triggers_shutdown() {
        let (client, mut server) = duplex(1024);
        let store = tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(b"+PONG\r\n").await.unwrap();
            // hang up once the next command arrives
            let _ = server.read(&mut buf).await.unwrap();
        });

        let shutdown = Shutdown::new();
        let connection = KvConnection::with_shutdown(shutdown.clone());
        connection.connect_stream(client).await.unwrap();

        let result = connection.execute(Command::new("GET").arg("k")).await;
        assert!(matches!(result, Err(StoreError::Transport { .. })));
        assert!(!connection.is_connected());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::StoreLost));
        store.await.unwrap();
    }

    #[tokio::test]
    async fn connect_while_session_is_held_is_lock_error() {
        let connection = KvConnection::new();
        let _held = connection.session.lock().await;
        assert!(matches!(connection.connect_stream(duplex(8).0).await, Err(ConnectError::Lock)));
    }

    #[test]
    fn destination_display() {
        assert_eq!(Destination::Tcp { host: "localhost".into(), port: 6379 }.to_string(), "localhost:6379");
        assert_eq!(Destination::Unix("/tmp/redis.sock".into()).to_string(), "unix:/tmp/redis.sock");
    }
}
