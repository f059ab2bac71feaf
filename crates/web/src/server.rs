use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tokio::{select, time};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use webstore_http::connection::HttpConnection;
use webstore_http::exchange::Limits;
use webstore_http::protocol::HttpError;

use crate::admission::AddressCheck;
use crate::dispatch::RouteDispatcher;
use crate::router::RouteRegistry;
use crate::shutdown::Shutdown;
use crate::tls::{TlsError, TlsMaterial};

/// How connections are scheduled onto threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingModel {
    /// Every connection is its own task on a multi-threaded runtime
    #[default]
    ThreadPerConnection,
    /// All connections are multiplexed on the current thread
    SingleThreaded,
}

impl ThreadingModel {
    /// Builds the tokio runtime matching this model.
    ///
    /// # Errors
    ///
    /// Propagates the runtime builder's I/O error.
    pub fn runtime(self) -> io::Result<Runtime> {
        match self {
            Self::ThreadPerConnection => Builder::new_multi_thread().enable_all().build(),
            Self::SingleThreaded => Builder::new_current_thread().enable_all().build(),
        }
    }
}

/// Everything the server needs besides its routes; immutable once the server starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub threading: ThreadingModel,
    pub tls: Option<TlsMaterial>,
    pub idle_timeout: Option<Duration>,
    pub connection_limit: usize,
    pub limits: Limits,
}

impl ServerConfig {
    pub const DEFAULT_CONNECTION_LIMIT: usize = 1020;

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            threading: ThreadingModel::default(),
            tls: None,
            idle_timeout: Some(Duration::from_secs(30)),
            connection_limit: Self::DEFAULT_CONNECTION_LIMIT,
            limits: Limits::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("no route registered")]
    NoRoutes,

    #[error("bind {address} error: {source}")]
    Bind { address: SocketAddr, source: io::Error },

    #[error("tls setup error: {source}")]
    Tls {
        #[from]
        source: TlsError,
    },
}

pub struct ServerBuilder {
    config: ServerConfig,
    registry: Option<Arc<RouteRegistry>>,
    address_check: Option<Arc<dyn AddressCheck>>,
    shutdown: Option<Shutdown>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { config: ServerConfig::default(), registry: None, address_check: None, shutdown: None }
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: Arc<RouteRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn address_check(mut self, address_check: Arc<dyn AddressCheck>) -> Self {
        self.address_check = Some(address_check);
        self
    }

    #[must_use]
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// # Errors
    ///
    /// Fails without routes, or when the TLS material cannot be loaded.
    pub fn build(self) -> Result<Server, ServerError> {
        let registry = self.registry.ok_or(ServerError::NoRoutes)?;
        if registry.count() == 0 {
            return Err(ServerError::NoRoutes);
        }

        let tls = self.config.tls.as_ref().map(TlsMaterial::acceptor).transpose()?;

        Ok(Server {
            config: self.config,
            dispatcher: RouteDispatcher::new(registry),
            address_check: self.address_check,
            shutdown: self.shutdown.unwrap_or_default(),
            tls,
        })
    }
}

pub struct Server {
    config: ServerConfig,
    dispatcher: RouteDispatcher,
    address_check: Option<Arc<dyn AddressCheck>>,
    shutdown: Shutdown,
    tls: Option<TlsAcceptor>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("address_check", &self.address_check.is_some())
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.config.socket_addr();
        let listener = TcpListener::bind(address).await.map_err(|source| ServerError::Bind { address, source })?;
        info!(%address, tls = self.tls.is_some(), "start listening");
        Ok(listener)
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections from `listener` until the shutdown flag is raised.
    ///
    /// At most `connection_limit` connections are served at once; further peers wait
    /// in the listen backlog.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept failures are logged and skipped.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let shutdown = self.shutdown.clone();
        let permits = Arc::new(Semaphore::new(self.config.connection_limit.max(1)));
        let server = Arc::new(self);

        loop {
            let permit = select! {
                biased;
                reason = shutdown.wait() => {
                    info!(%reason, "stop accepting connections");
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_closed) => break,
                },
            };

            let (stream, peer) = select! {
                biased;
                reason = shutdown.wait() => {
                    info!(%reason, "stop accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server.serve_stream(stream, peer.ip()).await;
                drop(permit);
            });
        }

        Ok(())
    }

    /// Serves one accepted stream: admission check, optional TLS handshake, then HTTP.
    pub async fn serve_stream<S>(&self, stream: S, peer_ip: IpAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if let Some(address_check) = &self.address_check {
            if !address_check.allow(peer_ip).await {
                debug!(client_ip = %peer_ip, "connection refused by address check");
                return;
            }
        }

        match &self.tls {
            Some(acceptor) => {
                let handshake = acceptor.accept(stream);
                let tls_stream = match self.config.idle_timeout {
                    Some(timeout) => match time::timeout(timeout, handshake).await {
                        Ok(result) => result,
                        Err(_elapsed) => {
                            info!(client_ip = %peer_ip, "tls handshake timeout");
                            return;
                        }
                    },
                    None => handshake.await,
                };
                match tls_stream {
                    Ok(tls_stream) => self.serve_http(tls_stream, peer_ip).await,
                    Err(e) => warn!(client_ip = %peer_ip, cause = %e, "tls handshake failed"),
                }
            }
            None => self.serve_http(stream, peer_ip).await,
        }
    }

    async fn serve_http<S>(&self, stream: S, peer_ip: IpAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (reader, writer) = tokio::io::split(stream);
        let connection =
            HttpConnection::new(reader, writer, peer_ip, self.config.limits).with_idle_timeout(self.config.idle_timeout);

        match connection.process(&self.dispatcher).await {
            Ok(()) => debug!(client_ip = %peer_ip, "finished process, connection shutdown"),
            Err(HttpError::Rejected { source }) => {
                info!(client_ip = %peer_ip, cause = %source, "request rejected, connection aborted");
            }
            Err(e) => error!(client_ip = %peer_ip, cause = %e, "service has error, connection shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::MockAddressCheck;
    use crate::handler::MockRequestHandler;
    use crate::shutdown::ShutdownReason;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn registry() -> Arc<RouteRegistry> {
        let mut handler = MockRequestHandler::new();
        handler.expect_handle().returning(|suffix, _| format!("BAR: {}\n", suffix.len()));
        let registry = Arc::new(RouteRegistry::new());
        registry.add("/config/", handler).unwrap();
        registry
    }

    fn config() -> ServerConfig {
        ServerConfig {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            limits: Limits { min_url_len: 5, max_url_len: 64, max_body_len: 1024 },
            ..ServerConfig::default()
        }
    }

    async fn round_trip(address: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(request).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn build_requires_routes() {
        assert!(matches!(Server::builder().build(), Err(ServerError::NoRoutes)));
        let empty = Arc::new(RouteRegistry::new());
        assert!(matches!(Server::builder().registry(empty).build(), Err(ServerError::NoRoutes)));
    }

    #[test]
    fn runtimes_for_both_models() {
        ThreadingModel::SingleThreaded.runtime().unwrap().block_on(async {});
        ThreadingModel::ThreadPerConnection.runtime().unwrap().block_on(async {});
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let shutdown = Shutdown::new();
        let server = Server::builder().config(config()).registry(registry()).shutdown(shutdown.clone()).build().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let serving = tokio::spawn(server.serve(listener));

        let response = round_trip(address, b"GET /config/bar HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.1 200 OK\r\ncontent-length: 7\r\n\r\nBAR: 3\n");

        shutdown.trigger(ShutdownReason::Signal);
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn denied_peer_is_closed_without_response() {
        let mut check = MockAddressCheck::new();
        check.expect_allow().times(1).returning(|_| false);

        let shutdown = Shutdown::new();
        let server = Server::builder()
            .config(config())
            .registry(registry())
            .address_check(Arc::new(check))
            .shutdown(shutdown.clone())
            .build()
            .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let serving = tokio::spawn(server.serve(listener));

        let mut stream = TcpStream::connect(address).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());

        shutdown.trigger(ShutdownReason::Signal);
        serving.await.unwrap().unwrap();
    }
}
