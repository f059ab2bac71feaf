use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tracing::{error, info, warn};
use webstore_web::{RequestContext, RequestHandler, RequestMethod};

use crate::context::AppContext;
use crate::handlers::{method_not_allowed, reply, shutting_down};
use crate::kv::{Command, RespValue};
use crate::token::{Algorithm, Token};
use crate::z85;

/// Smallest body worth storing: one Z85 group.
const MIN_BODY_LEN: usize = 5;

/// Reads and writes objects of one digest algorithm under its `/store/<bits>/` route.
#[derive(Debug, Clone)]
pub struct StoreHandler {
    algorithm: Algorithm,
    app: Arc<AppContext>,
}

impl StoreHandler {
    pub fn new(algorithm: Algorithm, app: Arc<AppContext>) -> Self {
        Self { algorithm, app }
    }

    async fn get(&self, suffix: &str, ctx: &mut RequestContext) -> String {
        let ip = ctx.client_ip();
        let Ok(token) = Token::parse(self.algorithm, suffix) else {
            info!("{ip} 400 GET {suffix}");
            return reply(ctx, StatusCode::BAD_REQUEST, "malformed request");
        };

        let value = match self.app.store.execute(Command::new("GET").arg(token.clone())).await {
            Ok(RespValue::Bulk(value)) => value,
            Ok(other) => {
                if let RespValue::Error(message) = &other {
                    warn!(algorithm = %self.algorithm, cause = %message, "store refused GET");
                }
                info!("{ip} 404 GET {suffix}");
                return reply(ctx, StatusCode::NOT_FOUND, "not found");
            }
            Err(e) => {
                error!(algorithm = %self.algorithm, cause = %e, "{ip} 503 GET {suffix}");
                return reply(ctx, StatusCode::SERVICE_UNAVAILABLE, "service unavailable");
            }
        };

        if self.app.options.burn_after_read {
            // the read already succeeded, a failed delete only leaves the object in place
            if let Err(e) = self.app.store.execute(Command::new("DEL").arg(token)).await {
                warn!(algorithm = %self.algorithm, cause = %e, "store DEL after read failed");
            }
            info!("{ip} 200 GET {suffix} BURNT");
        } else {
            info!("{ip} 200 GET {suffix}");
        }

        ctx.set_status(StatusCode::OK);
        String::from_utf8_lossy(&value).into_owned()
    }

    async fn post(&self, suffix: &str, ctx: &mut RequestContext) -> String {
        let ip = ctx.client_ip();
        let rejected = |ctx: &mut RequestContext, text: &str| {
            info!("{ip} 400 POST {suffix}");
            reply(ctx, StatusCode::BAD_REQUEST, text)
        };

        if suffix.len() != self.algorithm.token_len() {
            return rejected(ctx, "malformed request - invalid url");
        }
        let body = ctx.body().clone();
        if body.len() < MIN_BODY_LEN {
            return rejected(ctx, "malformed request - invalid length");
        }
        if !z85::is_z85(&body) {
            return rejected(ctx, "malformed request - invalid Z85");
        }
        let Ok(token) = Token::parse(self.algorithm, suffix) else {
            return rejected(ctx, "malformed request - invalid token");
        };

        match self.app.store.execute(self.set_command(token, body)).await {
            Ok(status) if status.is_ok_status() => {
                info!("{ip} 200 POST {suffix}");
                reply(ctx, StatusCode::OK, "ok")
            }
            Ok(RespValue::Nil) => {
                info!("{ip} 304 POST {suffix} NOTMOD");
                reply(ctx, StatusCode::NOT_MODIFIED, "object immutable - not modified")
            }
            Ok(RespValue::Error(message)) => {
                error!(algorithm = %self.algorithm, cause = %message, "{ip} 417 POST {suffix}");
                reply(ctx, StatusCode::EXPECTATION_FAILED, "redis reply error")
            }
            Ok(other) => {
                error!(algorithm = %self.algorithm, reply = other.type_name(), "{ip} 500 POST {suffix}");
                reply(ctx, StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
            Err(e) if e.is_transport() => {
                error!(algorithm = %self.algorithm, cause = %e, "{ip} 503 POST {suffix}");
                reply(ctx, StatusCode::SERVICE_UNAVAILABLE, "service unavailable")
            }
            Err(e) => {
                error!(algorithm = %self.algorithm, cause = %e, "{ip} 500 POST {suffix}");
                reply(ctx, StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }

    fn set_command(&self, token: Token, value: Bytes) -> Command {
        let options = &self.app.options;
        let mut command = Command::new("SET").arg(token).arg(value);
        if options.expiration > 0 {
            command = command.arg("EX").arg(options.expiration.to_string());
        }
        if options.immutable {
            command = command.arg("NX");
        }
        command
    }
}

#[async_trait]
impl RequestHandler for StoreHandler {
    async fn handle(&self, suffix: &str, ctx: &mut RequestContext) -> String {
        if self.app.shutdown.is_triggered() {
            return shutting_down(ctx);
        }

        match ctx.method() {
            RequestMethod::Get => self.get(suffix, ctx).await,
            RequestMethod::Post => self.post(suffix, ctx).await,
            _ => method_not_allowed(ctx, "GET, POST"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StoreOptions;
    use crate::kv::{KvStore, MemoryStore, MockKvStore, StoreError};
    use std::io;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;
    use webstore_web::{Shutdown, ShutdownReason};

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct LogLines(Arc<Mutex<Vec<u8>>>);

    impl LogLines {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for LogLines {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogLines {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    const MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn app(store: Arc<dyn KvStore>, options: StoreOptions) -> Arc<AppContext> {
        Arc::new(AppContext::new(store, Shutdown::new(), options))
    }

    fn request(method: RequestMethod, suffix: &str, body: &'static str) -> RequestContext {
        RequestContext::builder(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)), method, format!("/store/128/{suffix}"))
            .body(body)
            .build()
    }

    async fn call(handler: &StoreHandler, mut ctx: RequestContext, suffix: &str) -> (StatusCode, String) {
        let body = handler.handle(suffix, &mut ctx).await;
        (ctx.status().unwrap_or(StatusCode::OK), body)
    }

    #[tokio::test]
    async fn get_validates_token_before_store() {
        let mut store = MockKvStore::new();
        store.expect_execute().never();
        let handler = StoreHandler::new(Algorithm::Md5, app(Arc::new(store), StoreOptions::default()));

        let short = "d41d8cd9";
        assert_eq!(call(&handler, request(RequestMethod::Get, short, ""), short).await, (StatusCode::BAD_REQUEST, "malformed request".to_owned()));
        let bad = "z41d8cd98f00b204e9800998ecf8427e";
        assert_eq!(call(&handler, request(RequestMethod::Get, bad, ""), bad).await, (StatusCode::BAD_REQUEST, "malformed request".to_owned()));
    }

    #[tokio::test]
    async fn post_checks_in_order() {
        let store = Arc::new(MemoryStore::new());
        let handler = StoreHandler::new(Algorithm::Md5, app(Arc::clone(&store) as Arc<dyn KvStore>, StoreOptions::default()));

        let cases = [
            ("abc", "HelloWorld", "malformed request - invalid url"),
            (MD5, "Hell", "malformed request - invalid length"),
            (MD5, "Hello World", "malformed request - invalid Z85"),
            ("g41d8cd98f00b204e9800998ecf8427e", "HelloWorld", "malformed request - invalid token"),
        ];
        for (suffix, body, expected) in cases {
            let (status, text) = call(&handler, request(RequestMethod::Post, suffix, body), suffix).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(text, expected);
        }
        assert!(store.commands().is_empty());
    }

    #[tokio::test]
    async fn post_builds_set_variants() {
        let variants = [
            (0, false, "SET d41d8cd98f00b204e9800998ecf8427e HelloWorld"),
            (0, true, "SET d41d8cd98f00b204e9800998ecf8427e HelloWorld NX"),
            (60, false, "SET d41d8cd98f00b204e9800998ecf8427e HelloWorld EX 60"),
            (60, true, "SET d41d8cd98f00b204e9800998ecf8427e HelloWorld EX 60 NX"),
        ];
        for (expiration, immutable, expected) in variants {
            let store = Arc::new(MemoryStore::new());
            let options = StoreOptions { expiration, immutable, ..StoreOptions::default() };
            let handler = StoreHandler::new(Algorithm::Md5, app(Arc::clone(&store) as Arc<dyn KvStore>, options));
            let upper = MD5.to_ascii_uppercase();
            let result = call(&handler, request(RequestMethod::Post, &upper, "HelloWorld"), &upper).await;
            assert_eq!(result, (StatusCode::OK, "ok".to_owned()));
            assert_eq!(store.commands(), vec![expected]);
        }
    }

    #[tokio::test]
    async fn store_replies_map_to_statuses() {
        let replies: [(Result<RespValue, StoreError>, StatusCode, &str); 4] = [
            (Ok(RespValue::Error("ERR oom".to_owned())), StatusCode::EXPECTATION_FAILED, "redis reply error"),
            (Ok(RespValue::Integer(1)), StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
            (
                Err(StoreError::Transport { source: io::ErrorKind::BrokenPipe.into() }),
                StatusCode::SERVICE_UNAVAILABLE,
                "service unavailable",
            ),
            (Ok(RespValue::Nil), StatusCode::NOT_MODIFIED, "object immutable - not modified"),
        ];

        for (result, status, text) in replies {
            let mut store = MockKvStore::new();
            store.expect_execute().times(1).return_once(move |_| result);
            let handler = StoreHandler::new(Algorithm::Md5, app(Arc::new(store), StoreOptions::default()));
            assert_eq!(call(&handler, request(RequestMethod::Post, MD5, "HelloWorld"), MD5).await, (status, text.to_owned()));
        }
    }

    #[tokio::test]
    async fn every_post_outcome_is_logged() {
        let lines = LogLines::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(lines.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = Arc::new(MemoryStore::new());
        let handler = StoreHandler::new(Algorithm::Md5, app(Arc::clone(&store) as Arc<dyn KvStore>, StoreOptions::default()));
        call(&handler, request(RequestMethod::Post, MD5, "Hell"), MD5).await;
        call(&handler, request(RequestMethod::Post, MD5, "HelloWorld"), MD5).await;
        store.set_offline(true);
        call(&handler, request(RequestMethod::Post, MD5, "HelloWorld"), MD5).await;

        let mut refused = MockKvStore::new();
        refused.expect_execute().times(1).return_once(|_| Ok(RespValue::Error("ERR oom".to_owned())));
        let handler = StoreHandler::new(Algorithm::Md5, app(Arc::new(refused), StoreOptions::default()));
        call(&handler, request(RequestMethod::Post, MD5, "HelloWorld"), MD5).await;

        let text = lines.text();
        for status in [400, 200, 503, 417] {
            assert!(text.contains(&format!("10.1.2.3 {status} POST {MD5}")), "no {status} line in {text}");
        }
    }

    #[tokio::test]
    async fn get_unavailable_store_is_503() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let handler = StoreHandler::new(Algorithm::Md5, app(store, StoreOptions::default()));
        assert_eq!(
            call(&handler, request(RequestMethod::Get, MD5, ""), MD5).await,
            (StatusCode::SERVICE_UNAVAILABLE, "service unavailable".to_owned())
        );
    }

    #[tokio::test]
    async fn other_methods_and_shutdown() {
        let mut store = MockKvStore::new();
        store.expect_execute().never();
        let app = app(Arc::new(store), StoreOptions::default());
        let handler = StoreHandler::new(Algorithm::Md5, Arc::clone(&app));

        let mut ctx = request(RequestMethod::Delete, MD5, "");
        assert_eq!(handler.handle(MD5, &mut ctx).await, "method not allowed");
        assert_eq!(ctx.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
        let reply = ctx.into_reply("");
        assert_eq!(reply.allow.as_deref(), Some("GET, POST"));

        app.shutdown.trigger(ShutdownReason::Signal);
        assert_eq!(
            call(&handler, request(RequestMethod::Get, MD5, ""), MD5).await,
            (StatusCode::SERVICE_UNAVAILABLE, "service unavailable: shutting down".to_owned())
        );
    }
}
