//! Body framing by `Content-Length`, the only framing the engine speaks.
//!
//! A request without a length has no body: its decoder reports EOF at once.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::protocol::{ParseError, PayloadItem, PayloadSize, SendError};

/// Hands out request body bytes as they arrive, never reading past the declared
/// length; whatever follows stays buffered for the next request on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyDecoder {
    remaining: u64,
}

impl BodyDecoder {
    pub fn new(declared: u64) -> Self {
        Self { remaining: declared }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl From<PayloadSize> for BodyDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        Self::new(payload_size.len())
    }
}

impl Decoder for BodyDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let take = usize::try_from(self.remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
        let chunk = src.split_to(take).freeze();
        self.remaining -= chunk.len() as u64;
        Ok(Some(PayloadItem::Chunk(chunk)))
    }
}

/// Writes a response body whose length was announced in the head, refusing to
/// write more or to finish with less.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyEncoder {
    remaining: u64,
}

impl BodyEncoder {
    pub fn new(announced: u64) -> Self {
        Self { remaining: announced }
    }
}

impl Encoder<PayloadItem> for BodyEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let chunk = match item {
            PayloadItem::Eof if self.remaining == 0 => return Ok(()),
            PayloadItem::Eof => {
                return Err(SendError::invalid_body(format!("response body short by {} bytes", self.remaining)));
            }
            PayloadItem::Chunk(chunk) => chunk,
        };

        let len = chunk.len() as u64;
        if len > self.remaining {
            warn!(remaining = self.remaining, chunk = len, "response body longer than content-length");
            return Err(SendError::invalid_body("response body longer than content-length"));
        }
        dst.extend_from_slice(&chunk);
        self.remaining -= len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn chunk(item: Option<PayloadItem>) -> Bytes {
        match item {
            Some(PayloadItem::Chunk(bytes)) => bytes,
            other => panic!("expect chunk, got {other:?}"),
        }
    }

    #[test]
    fn no_body_is_eof_at_once() {
        let mut buffer = BytesMut::from(&b"GET /config/all HTTP/1.1\r\n\r\n"[..]);
        let mut decoder = BodyDecoder::from(PayloadSize::Empty);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(buffer.len(), 28);
    }

    #[test]
    fn body_stops_at_declared_length() {
        let mut buffer = BytesMut::from(&b"HelloWorldGET /next"[..]);
        let mut decoder = BodyDecoder::new(10);

        assert_eq!(chunk(decoder.decode(&mut buffer).unwrap()), "HelloWorld");
        assert_eq!(&buffer[..], b"GET /next");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn body_arrives_in_pieces() {
        let mut decoder = BodyDecoder::new(6);
        let mut buffer = BytesMut::from(&b"abc"[..]);

        assert_eq!(chunk(decoder.decode(&mut buffer).unwrap()), "abc");
        assert_eq!(decoder.remaining(), 3);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"def");
        assert_eq!(chunk(decoder.decode(&mut buffer).unwrap()), "def");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn encoder_writes_exact_length() {
        let mut encoder = BodyEncoder::new(2);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ok")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Eof, &mut dst).unwrap();
        assert_eq!(&dst[..], b"ok");
    }

    #[test]
    fn encoder_refuses_overflow_and_short_eof() {
        let mut encoder = BodyEncoder::new(2);
        let mut dst = BytesMut::new();
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"abc")), &mut dst).is_err());
        assert!(encoder.encode(PayloadItem::Eof, &mut dst).is_err());
        assert!(dst.is_empty());
    }
}
