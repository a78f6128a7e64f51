//! Channel endpoints the protocol runs over.
//!
//! The protocol does not own a transport. A [`ChannelHandle`] is handed to
//! the client or worker at construction (injected, never ambient state) and
//! promises only two things: an outbound `send` of structured values, and an
//! inbound stream of structured values. The underlying link may be shared
//! with unrelated traffic; inbound values are validated by the consumer.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use futures::{SinkExt, StreamExt};

use crate::bridge::codec::ValueCodec;

/// Error returned when sending on a released or disconnected channel.
#[derive(Debug, thiserror::Error)]
#[error("channel closed")]
pub struct ChannelClosed;

/// Clonable outbound half of a channel endpoint.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelSender {
    pub fn send(&self, message: Value) -> Result<(), ChannelClosed> {
        self.tx.send(message).map_err(|_| ChannelClosed)
    }
}

/// One endpoint of a bidirectional message channel.
///
/// Values must survive structural serialization; live handles or other
/// non-serializable state must never be placed in a message.
pub struct ChannelHandle {
    sender: ChannelSender,
    inbound: mpsc::UnboundedReceiver<Value>,
}

impl ChannelHandle {
    /// Assemble an endpoint from raw queue halves.
    ///
    /// Useful for adapting a transport this crate does not know about; the
    /// built-in constructors are [`pair`] and [`framed`].
    pub fn from_parts(
        tx: mpsc::UnboundedSender<Value>,
        rx: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self {
            sender: ChannelSender { tx },
            inbound: rx,
        }
    }

    /// An extra handle on the outbound half.
    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub(crate) fn split(self) -> (ChannelSender, mpsc::UnboundedReceiver<Value>) {
        (self.sender, self.inbound)
    }
}

/// Cross-wired in-memory endpoint pair.
///
/// Delivery order is preserved per direction and each end sees everything
/// the other sends, including traffic that is not part of the protocol.
/// This is the reference channel for tests and in-process workers.
pub fn pair() -> (ChannelHandle, ChannelHandle) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
    (
        ChannelHandle::from_parts(a_to_b_tx, b_to_a_rx),
        ChannelHandle::from_parts(b_to_a_tx, a_to_b_rx),
    )
}

/// Wrap one end of a byte stream in a channel endpoint.
///
/// Spawns pump tasks translating between length-prefixed JSON frames and the
/// in-process queues. The pumps stop when the stream fails or when the
/// handle's consumer goes away; the inbound queue then ends, which the
/// client side treats as channel closure.
pub fn framed<R, W>(reader: R, writer: W) -> ChannelHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Value>();

    let mut frames_out = FramedWrite::new(writer, ValueCodec::new());
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if let Err(error) = frames_out.send(message).await {
                tracing::warn!(%error, "outbound frame write failed");
                break;
            }
        }
    });

    let mut frames_in = FramedRead::new(reader, ValueCodec::new());
    tokio::spawn(async move {
        while let Some(frame) = frames_in.next().await {
            match frame {
                Ok(value) => {
                    if in_tx.send(value).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "inbound frame decode failed");
                    break;
                }
            }
        }
    });

    ChannelHandle::from_parts(out_tx, in_rx)
}
