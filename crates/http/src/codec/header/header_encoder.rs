//! HTTP response head encoder.
//!
//! Writes the status line and the header fields, then a `Content-Length` that always
//! matches the buffered body the connection is about to write.

use crate::protocol::{PayloadSize, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size reserved for a response head
const INIT_HEADER_SIZE: usize = 512;

/// Encoder for response heads implementing the [`Encoder`] trait.
#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// Encodes the head into `dst`.
    ///
    /// # Errors
    ///
    /// Fails for any version other than HTTP/1.1.
    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        match head.version() {
            Version::HTTP_11 => {
                write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", head.status().as_str(), head.status().canonical_reason().unwrap_or(""))?;
            }
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        }

        let length = match payload_size {
            PayloadSize::Length(n) => HeaderValue::from(n),
            PayloadSize::Empty => HeaderValue::from_static("0"),
        };
        head.headers_mut().insert(header::CONTENT_LENGTH, length);

        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `io::Write` over a `BytesMut`, so the status line can be written with `write!`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Response, StatusCode};

    #[test]
    fn encode_not_found() {
        let mut head = Response::new(());
        *head.status_mut() = StatusCode::NOT_FOUND;
        head.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, PayloadSize::Length(9)), &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("content-type: text/plain\r\n"));
        assert!(text.contains("content-length: 9\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn encode_empty_overrides_length() {
        let mut head = Response::new(());
        head.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("99"));

        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, PayloadSize::Empty), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn reject_http_10() {
        let mut head = Response::new(());
        *head.version_mut() = Version::HTTP_10;
        assert!(HeaderEncoder.encode((head, PayloadSize::Empty), &mut BytesMut::new()).is_err());
    }
}
