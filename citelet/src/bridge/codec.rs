//! Frame codec for byte-stream channels.
//!
//! Length-prefixed JSON: each frame carries one `serde_json::Value`. The
//! codec stays untyped on purpose; the channel is allowed to carry traffic
//! that is not part of the protocol, and envelope validation happens later.

use std::io;

use serde_json::Value;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Frames JSON values with a 4-byte length prefix.
///
/// Works over any AsyncRead/AsyncWrite (pipes, sockets, in-process duplex).
pub struct ValueCodec {
    inner: LengthDelimitedCodec,
}

impl ValueCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .new_codec(),
        }
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ValueCodec {
    type Item = Value;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, io::Error> {
        match self.inner.decode(src)? {
            Some(frame) => {
                let value = serde_json::from_slice(&frame)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Value> for ValueCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), io::Error> {
        let json = serde_json::to_vec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.encode(Bytes::from(json), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codec_roundtrips_value() {
        let mut codec = ValueCodec::new();
        let mut buf = BytesMut::new();

        let value = json!({"id": 1, "payload": {"op": "echo"}});
        codec.encode(value.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, value);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = ValueCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(json!([1, 2, 3]), &mut buf).unwrap();
        let full = buf.split();
        let mut partial = BytesMut::from(&full[..full.len() - 2]);

        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[full.len() - 2..]);
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(json!([1, 2, 3])));
    }

    #[test]
    fn invalid_json_frame_is_an_error() {
        let mut inner = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .new_codec();
        let mut buf = BytesMut::new();
        inner.encode(Bytes::from_static(b"not json"), &mut buf).unwrap();

        let mut codec = ValueCodec::new();
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn frames_decode_in_order() {
        let mut codec = ValueCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(json!(1), &mut buf).unwrap();
        codec.encode(json!(2), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!(1)));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!(2)));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
