use std::net::IpAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use http::StatusCode;
use http::header::EXPECT;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::exchange::{Exchange, Feed, Limits};
use crate::handler::Dispatcher;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, Reply, RequestHeader, SendError};

use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

type RequestMessage = Message<(RequestHeader, PayloadSize)>;

/// One client connection, serving requests one after another until the peer
/// closes, stays idle for too long, or sends something the lifecycle rejects.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    client_ip: IpAddr,
    limits: Limits,
    idle_timeout: Option<Duration>,
}

impl<R, W> std::fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("client_ip", &self.client_ip)
            .field("limits", &self.limits)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, client_ip: IpAddr, limits: Limits) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            client_ip,
            limits,
            idle_timeout: None,
        }
    }

    /// Closes the connection when no bytes arrive for `timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Serves requests until the connection ends.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Rejected`] when a request broke a lifecycle limit; nothing
    /// was written back in that case. Malformed requests are answered with a bare 400
    /// before the parse error is returned.
    pub async fn process<D>(mut self, dispatcher: &D) -> Result<(), HttpError>
    where
        D: Dispatcher + ?Sized,
    {
        loop {
            match self.next_message().await {
                Some(Ok(Message::Header((header, _)))) => {
                    self.do_process(header, dispatcher).await?;
                }

                Some(Ok(Message::Payload(_))) => {
                    warn!(client_ip = %self.client_ip, "receive body while expecting a request head");
                    self.do_send_reply(Reply::empty(StatusCode::BAD_REQUEST)).await?;
                    return Err(ParseError::UnexpectedFrame { reason: "body chunk before any request head" }.into());
                }

                Some(Err(e)) => {
                    warn!(client_ip = %self.client_ip, cause = %e, "can't receive next request");
                    self.do_send_reply(Reply::empty(StatusCode::BAD_REQUEST)).await?;
                    return Err(e.into());
                }

                None => {
                    debug!(client_ip = %self.client_ip, "no more requests, closing connection");
                    return Ok(());
                }
            }
        }
    }

    async fn do_process<D>(&mut self, header: RequestHeader, dispatcher: &D) -> Result<(), HttpError>
    where
        D: Dispatcher + ?Sized,
    {
        let mut exchange = Exchange::begin(&header, self.client_ip, &self.limits)?;

        if exchange.context().content_length() > 0 && expects_continue(&header) {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::from)?;
            writer.flush().await.map_err(SendError::from)?;
            debug!(client_ip = %self.client_ip, "sent 100 continue");
        }

        loop {
            match self.next_message().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(chunk)))) => {
                    if let Feed::Reject(reject) = exchange.feed(&chunk) {
                        return Err(reject.into());
                    }
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => break,
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::UnexpectedFrame { reason: "request head while reading a body" }.into());
                }
                Some(Err(e)) => return Err(e.into()),
                // the peer went away mid body; finish decides whether enough arrived
                None => break,
            }
        }

        let ctx = exchange.finish()?;
        let reply = dispatcher.dispatch(ctx).await;
        self.do_send_reply(reply).await
    }

    async fn next_message(&mut self) -> Option<Result<RequestMessage, ParseError>> {
        let Some(timeout) = self.idle_timeout else {
            return self.framed_read.next().await;
        };

        match time::timeout(timeout, self.framed_read.next()).await {
            Ok(message) => message,
            Err(_) => {
                info!(client_ip = %self.client_ip, timeout_secs = timeout.as_secs(), "connection idle timeout");
                None
            }
        }
    }

    async fn do_send_reply(&mut self, reply: Reply) -> Result<(), HttpError> {
        let payload_size = reply.payload_size();
        let (head, body) = reply.into_parts();

        // feed buffers, the final send flushes head and body together
        self.framed_write.feed(Message::Header((head, payload_size))).await?;
        if !payload_size.is_empty() {
            self.framed_write.feed(Message::Payload(PayloadItem::Chunk(body))).await?;
        }
        self.framed_write.send(Message::Payload(PayloadItem::Eof)).await?;
        Ok(())
    }
}

fn expects_continue(header: &RequestHeader) -> bool {
    header.headers().get(EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::RequestContext;
    use crate::handler::dispatch_fn;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 9));

    fn limits() -> Limits {
        Limits { min_url_len: 5, max_url_len: 64, max_body_len: 64 }
    }

    /// Writes `input` from the client side, closes it, and returns what the server wrote back
    /// along with the connection result.
    async fn exchange_bytes<D: Dispatcher>(input: &str, dispatcher: &D) -> (Result<(), HttpError>, String) {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        client_write.write_all(input.as_bytes()).await.unwrap();
        client_write.shutdown().await.unwrap();

        let connection = HttpConnection::new(server_read, server_write, CLIENT, limits());
        let result = connection.process(dispatcher).await;

        drop(client_write);
        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        (result, String::from_utf8(output).unwrap())
    }

    fn echo(calls: Arc<AtomicUsize>) -> impl Dispatcher {
        dispatch_fn(move |ctx: RequestContext| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let body = format!("{} {} {}", ctx.method(), ctx.path(), String::from_utf8_lossy(ctx.body()));
                ctx.into_reply(body)
            }
        })
    }

    #[tokio::test]
    async fn keep_alive_serves_every_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let input = "POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /again HTTP/1.1\r\n\r\n";

        let (result, output) = exchange_bytes(input, &echo(Arc::clone(&calls))).await;
        result.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            output,
            "HTTP/1.1 200 OK\r\ncontent-length: 14\r\n\r\nPOST /echo abcHTTP/1.1 200 OK\r\ncontent-length: 11\r\n\r\nGET /again "
        );
    }

    #[tokio::test]
    async fn expect_continue_is_answered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let input = "POST /echo HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\nhi";

        let (result, output) = exchange_bytes(input, &echo(Arc::clone(&calls))).await;
        result.unwrap();
        assert!(output.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("POST /echo hi"));
    }

    #[tokio::test]
    async fn short_body_aborts_without_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let input = format!("POST /echo HTTP/1.1\r\nContent-Length: 60\r\n\r\n{}", "x".repeat(30));

        let (result, output) = exchange_bytes(&input, &echo(Arc::clone(&calls))).await;
        assert!(matches!(result, Err(HttpError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_rejections_abort_without_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inputs = [
            "PATCH /echo HTTP/1.1\r\n\r\n",
            "GET /e HTTP/1.1\r\n\r\n",
            "POST /echo HTTP/1.1\r\nContent-Length: 65\r\n\r\n",
        ];

        for input in inputs {
            let (result, output) = exchange_bytes(input, &echo(Arc::clone(&calls))).await;
            assert!(matches!(result, Err(HttpError::Rejected { .. })), "{input}");
            assert!(output.is_empty(), "{input}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_request_gets_bare_400() {
        let calls = Arc::new(AtomicUsize::new(0));
        let input = "POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";

        let (result, output) = exchange_bytes(input, &echo(Arc::clone(&calls))).await;
        assert!(matches!(result, Err(HttpError::Parse { .. })));
        assert_eq!(output, "HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);

        let connection = HttpConnection::new(server_read, server_write, CLIENT, limits())
            .with_idle_timeout(Some(Duration::from_millis(20)));
        let calls = Arc::new(AtomicUsize::new(0));

        connection.process(&echo(calls)).await.unwrap();
        drop(client);
    }
}
