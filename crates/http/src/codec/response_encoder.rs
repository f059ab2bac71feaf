use crate::codec::body::BodyEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};
use bytes::BytesMut;
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes a response head followed by its body chunks.
///
/// A head must be followed by exactly as many body bytes as its [`PayloadSize`] announces
/// before the next head is accepted.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<BodyEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl Encoder<Message<(ResponseHead, PayloadSize)>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.payload_encoder = Some(BodyEncoder::new(payload_size.len()));
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let is_eof = payload_item.is_eof();
                let result = payload_encoder.encode(payload_item, dst);
                if is_eof {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PayloadItem, Reply};
    use bytes::Bytes;
    use http::StatusCode;

    #[test]
    fn encode_reply() {
        let reply = Reply::new(StatusCode::OK, "ok");
        let payload_size = reply.payload_size();
        let (head, body) = reply.into_parts();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Message::Header((head, payload_size)), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(body)), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok");
    }

    #[test]
    fn payload_before_head_is_refused() {
        let mut encoder = ResponseEncoder::new();
        let result = encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"x"))), &mut BytesMut::new());
        assert!(result.is_err());
    }
}
