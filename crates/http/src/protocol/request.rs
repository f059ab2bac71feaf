use http::header::{AsHeaderName, CONTENT_LENGTH};
use http::{HeaderMap, Method, Request, Uri, Version};

/// A parsed request head. The body, if any, follows as [`PayloadItem`](super::PayloadItem)s.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl RequestHeader {
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Path without the query; routing and the URL length limits see only this.
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// `None` when absent or not visible ASCII.
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_str(CONTENT_LENGTH)?.trim().parse().ok()
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
