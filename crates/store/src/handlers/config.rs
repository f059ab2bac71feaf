use std::fmt::Write as _;

use async_trait::async_trait;
use http::StatusCode;
use webstore_web::{RequestContext, RequestHandler, RequestMethod, Shutdown};

use crate::context::StoreOptions;
use crate::handlers::{method_not_allowed, reply, shutting_down};

/// Reports the storage options at `/config/<option>`.
#[derive(Debug, Clone)]
pub struct ConfigHandler {
    options: StoreOptions,
    shutdown: Shutdown,
}

impl ConfigHandler {
    pub fn new(options: StoreOptions, shutdown: Shutdown) -> Self {
        Self { options, shutdown }
    }

    fn render(&self, option: &str) -> Option<String> {
        let options = &self.options;
        let mut text = String::new();
        let all = option == "all";

        // writing into a String cannot fail
        if all || option == "maxuploadsize" {
            let _ = writeln!(text, "MAXUPLOADSIZE: {} bytes", options.max_post);
        }
        if all || option == "expiration" {
            let _ = writeln!(text, "EXPIRATION: {} seconds", options.expiration);
        }
        if all || option == "immutable" {
            let _ = writeln!(text, "IMMUTABLE: {}", u8::from(options.immutable));
        }
        if all || option == "bar" {
            let _ = writeln!(text, "BAR: {}", u8::from(options.burn_after_read));
        }

        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl RequestHandler for ConfigHandler {
    async fn handle(&self, suffix: &str, ctx: &mut RequestContext) -> String {
        if self.shutdown.is_triggered() {
            return shutting_down(ctx);
        }
        if ctx.method() != RequestMethod::Get {
            return method_not_allowed(ctx, "GET");
        }

        match self.render(suffix) {
            Some(text) => reply(ctx, StatusCode::OK, &text),
            None => reply(ctx, StatusCode::NOT_FOUND, &format!("Unknown Config Option: {suffix}\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::net::{IpAddr, Ipv4Addr};

    fn handler() -> ConfigHandler {
        let options = StoreOptions { max_post: 2048, expiration: 3600, immutable: true, burn_after_read: false };
        ConfigHandler::new(options, Shutdown::new())
    }

    async fn get(handler: &ConfigHandler, method: RequestMethod, option: &str) -> (StatusCode, String) {
        let mut ctx = RequestContext::builder(IpAddr::V4(Ipv4Addr::LOCALHOST), method, format!("/config/{option}")).build();
        let body = handler.handle(option, &mut ctx).await;
        (ctx.status().unwrap_or(StatusCode::OK), body)
    }

    #[tokio::test]
    async fn all_options() {
        let (status, body) = get(&handler(), RequestMethod::Get, "all").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            indoc! {"
                MAXUPLOADSIZE: 2048 bytes
                EXPIRATION: 3600 seconds
                IMMUTABLE: 1
                BAR: 0
            "}
        );
    }

    #[tokio::test]
    async fn single_options() {
        let handler = handler();
        assert_eq!(get(&handler, RequestMethod::Get, "maxuploadsize").await.1, "MAXUPLOADSIZE: 2048 bytes\n");
        assert_eq!(get(&handler, RequestMethod::Get, "expiration").await.1, "EXPIRATION: 3600 seconds\n");
        assert_eq!(get(&handler, RequestMethod::Get, "immutable").await.1, "IMMUTABLE: 1\n");
        assert_eq!(get(&handler, RequestMethod::Get, "bar").await.1, "BAR: 0\n");
    }

    #[tokio::test]
    async fn unknown_option_and_methods() {
        let handler = handler();
        let (status, body) = get(&handler, RequestMethod::Get, "barx").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Unknown Config Option: barx\n");

        let (status, body) = get(&handler, RequestMethod::Post, "all").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "method not allowed");
    }
}
