use bytes::Bytes;

/// What flows through the codec: a head, then the body as zero or more chunks and one EOF.
///
/// On the request side `T` is `(RequestHeader, PayloadSize)`; on the response side
/// `(ResponseHead, PayloadSize)`.
#[derive(Debug)]
pub enum Message<T> {
    Header(T),
    Payload(PayloadItem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    /// Emitted once the declared length is exhausted
    Eof,
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        *self == Self::Eof
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        if let Self::Chunk(bytes) = self { Some(bytes) } else { None }
    }
}

/// Declared body size. Only `Content-Length` framing exists here, so a body is
/// either absent or of known length.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    Length(u64),
    Empty,
}

impl PayloadSize {
    /// Zero maps to [`PayloadSize::Empty`].
    #[inline]
    pub fn from_length(length: u64) -> Self {
        match length {
            0 => Self::Empty,
            n => Self::Length(n),
        }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }

    #[inline]
    pub fn len(self) -> u64 {
        if let Self::Length(n) = self { n } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_empty() {
        assert_eq!(PayloadSize::from_length(0), PayloadSize::Empty);
        assert!(PayloadSize::from_length(0).is_empty());
        assert_eq!(PayloadSize::from_length(7).len(), 7);
        assert_eq!(PayloadSize::Empty.len(), 0);
    }

    #[test]
    fn chunk_bytes() {
        let chunk = PayloadItem::Chunk(Bytes::from_static(b"z85"));
        assert_eq!(chunk.as_bytes().map(Bytes::as_ref), Some(&b"z85"[..]));
        assert!(PayloadItem::Eof.as_bytes().is_none());
        assert!(PayloadItem::Eof.is_eof());
    }
}
