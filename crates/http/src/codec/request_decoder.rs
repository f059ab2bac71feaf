//! HTTP request decoder.
//!
//! Splits the incoming byte stream into a head followed by body chunks and a final
//! EOF marker, one request after another on the same connection.

use crate::codec::body::BodyDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for HTTP requests that handles both heads and bodies.
///
/// `body_decoder` is `None` while a head is being parsed and `Some` while the
/// body of the last head is being read.
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    body_decoder: Option<BodyDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, body_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    /// - `Ok(Some(Message::Header(_)))`: a request head
    /// - `Ok(Some(Message::Payload(_)))`: a body chunk, or EOF once the body is complete
    /// - `Ok(None)`: need more data
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(body_decoder) = &mut self.body_decoder {
            let message = match body_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.body_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.body_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}
