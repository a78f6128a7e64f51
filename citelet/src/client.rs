//! Client-side request multiplexer.
//!
//! [`RequestClient`] turns calls into correlated request envelopes and
//! resolves each caller's future when the matching reply arrives. Every call
//! registers a oneshot sender in a pending table keyed by correlation id;
//! a background receive loop validates inbound traffic, looks up the entry,
//! and settles it. Replies may complete in any order relative to requests —
//! the id is the only matching key.
//!
//! # Concurrency
//!
//! Any number of calls can be in flight at once. The pending table sits
//! behind a mutex, but operations are plain HashMap insert/remove so
//! contention is negligible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::bridge::envelope::{CorrelationId, Outcome, Reply, Request};
use crate::channel::{ChannelHandle, ChannelSender};

/// Error surfaced to a caller awaiting [`RequestClient::call`].
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The worker handler reported a failure. The message is the handler's
    /// own description, reconstructed on this side of the channel.
    #[error("{0}")]
    Handler(String),

    /// The channel was torn down or closed before a reply arrived.
    #[error("channel closed before reply")]
    ChannelClosed,

    /// Typed payload (de)serialization failed on this side of the channel.
    #[error("payload serialization error: {0}")]
    Codec(#[from] serde_json::Error),
}

type PendingMap = HashMap<CorrelationId, oneshot::Sender<Result<Value, CallError>>>;

/// Acquire a mutex guard, ignoring poisoning.
///
/// The protected state is either the pending table (independent oneshot
/// senders, no cross-entry invariants) or an optional sender handle. The
/// worst outcome after a panic elsewhere is an unmatched reply, which the
/// receive loop already tolerates.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Client half of the worker protocol.
///
/// Cheap to clone; all clones share one pending table and one receive loop.
#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Outbound half, `None` once torn down.
    outbound: Mutex<Option<ChannelSender>>,
    pending: Arc<Mutex<PendingMap>>,
    next_id: AtomicU64,
    rx_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = lock_ignore_poison(&self.rx_task).take() {
            task.abort();
        }
    }
}

impl RequestClient {
    /// Construct over an injected channel endpoint and start the receive
    /// loop immediately.
    pub fn new(channel: ChannelHandle) -> Self {
        let (outbound, mut inbound) = channel.split();
        let pending = Arc::new(Mutex::new(PendingMap::new()));

        let pending_for_loop = Arc::clone(&pending);
        let rx_task = tokio::spawn(async move {
            while let Some(raw) = inbound.recv().await {
                let Some(reply) = Reply::from_value(raw) else {
                    tracing::trace!("ignoring non-reply traffic on channel");
                    continue;
                };
                let slot = lock_ignore_poison(&pending_for_loop).remove(&reply.id);
                let Some(slot) = slot else {
                    tracing::trace!(id = %reply.id, "ignoring reply with no pending call");
                    continue;
                };
                let settled = match reply.outcome {
                    Outcome::Success(value) => Ok(value),
                    Outcome::Failure(description) => Err(CallError::Handler(description)),
                };
                if slot.send(settled).is_err() {
                    tracing::debug!(id = %reply.id, "reply arrived after caller gave up");
                }
            }
            // End of channel: nothing still pending can ever settle.
            let orphaned: Vec<_> = lock_ignore_poison(&pending_for_loop).drain().collect();
            for (_, slot) in orphaned {
                let _ = slot.send(Err(CallError::ChannelClosed));
            }
        });

        Self {
            inner: Arc::new(ClientInner {
                outbound: Mutex::new(Some(outbound)),
                pending,
                next_id: AtomicU64::new(1),
                rx_task: Mutex::new(Some(rx_task)),
            }),
        }
    }

    /// Send a payload to the worker and await its outcome.
    ///
    /// Settles at most once: with the handler's return value, with the
    /// handler's failure description as [`CallError::Handler`], or with
    /// [`CallError::ChannelClosed`] if the channel goes away first. There is
    /// no built-in timeout; `tokio::time::timeout` composes with this
    /// future, and an abandoned call's table entry is collected at teardown.
    pub async fn call(&self, payload: Value) -> Result<Value, CallError> {
        let (tx, rx) = oneshot::channel();
        let id = self.claim_id(tx);

        let sent = {
            let outbound = lock_ignore_poison(&self.inner.outbound);
            match outbound.as_ref() {
                Some(sender) => sender.send(Request { id, payload }.into()).is_ok(),
                None => false,
            }
        };
        if !sent {
            lock_ignore_poison(&self.inner.pending).remove(&id);
            return Err(CallError::ChannelClosed);
        }

        match rx.await {
            Ok(settled) => settled,
            // Entry consumed without settling: teardown raced the reply.
            Err(_) => Err(CallError::ChannelClosed),
        }
    }

    /// Typed convenience wrapper around [`call`](Self::call).
    pub async fn call_as<Req, Resp>(&self, request: &Req) -> Result<Resp, CallError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let reply = self.call(payload).await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Release the channel and fail every call still in flight.
    ///
    /// Pending continuations are rejected with [`CallError::ChannelClosed`]
    /// rather than left permanently unsettled. Subsequent calls fail the
    /// same way.
    pub fn teardown(&self) {
        if let Some(task) = lock_ignore_poison(&self.inner.rx_task).take() {
            task.abort();
        }
        lock_ignore_poison(&self.inner.outbound).take();
        let orphaned: Vec<_> = lock_ignore_poison(&self.inner.pending).drain().collect();
        for (_, slot) in orphaned {
            let _ = slot.send(Err(CallError::ChannelClosed));
        }
    }

    /// Claim an id not colliding with any pending request and register the
    /// continuation under it.
    ///
    /// The counter alone cannot repeat until it wraps; the bump loop covers
    /// that case and keeps the at-most-one-entry-per-id invariant local to
    /// this one place.
    fn claim_id(&self, slot: oneshot::Sender<Result<Value, CallError>>) -> CorrelationId {
        let mut pending = lock_ignore_poison(&self.inner.pending);
        let mut id = CorrelationId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        while pending.contains_key(&id) {
            id = id.next();
        }
        pending.insert(id, slot);
        id
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }
}
