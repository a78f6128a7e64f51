//! Worker-side dispatcher.
//!
//! [`WorkerEndpoint`] services the other end of the channel: it validates
//! inbound request envelopes, invokes the registered handler, and replies
//! with a correlated outcome. Each dispatch runs in its own task so a slow
//! handler never delays reading the next envelope.
//!
//! Per correlation id the dispatcher moves Received → Dispatched →
//! Replied-{Success,Failure}; terminal states are final and no id is
//! serviced twice.

use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::bridge::envelope::{Outcome, Reply, Request};
use crate::channel::{ChannelHandle, ChannelSender};

/// Application logic dispatched by a [`WorkerEndpoint`].
///
/// Handlers may suspend and may run for a long time; invocations are
/// logically concurrent. A failure crosses the channel as a plain
/// description string and is reconstructed as a typed error on the client.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, payload: Value) -> anyhow::Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, payload: Value) -> anyhow::Result<Value> {
        (self.0)(payload).await
    }
}

type HandlerSlot = Arc<RwLock<Option<Arc<dyn RequestHandler>>>>;

fn installed_handler(slot: &HandlerSlot) -> Option<Arc<dyn RequestHandler>> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Worker half of the protocol.
///
/// Listening starts at construction; requests that arrive before a handler
/// is registered are answered with a failure outcome rather than dropped.
pub struct WorkerEndpoint {
    handler: HandlerSlot,
    rx_task: JoinHandle<()>,
}

impl Drop for WorkerEndpoint {
    fn drop(&mut self) {
        self.rx_task.abort();
    }
}

impl WorkerEndpoint {
    /// Start servicing requests on an injected channel endpoint.
    pub fn start(channel: ChannelHandle) -> Self {
        let (outbound, mut inbound) = channel.split();
        let handler: HandlerSlot = Arc::new(RwLock::new(None));

        let handler_for_loop = Arc::clone(&handler);
        let rx_task = tokio::spawn(async move {
            while let Some(raw) = inbound.recv().await {
                let Some(request) = Request::from_value(raw) else {
                    tracing::trace!("ignoring non-request traffic on channel");
                    continue;
                };
                dispatch(request, installed_handler(&handler_for_loop), outbound.clone());
            }
            tracing::debug!("request channel closed, dispatcher exiting");
        });

        Self { handler, rx_task }
    }

    /// Install the handler servicing every subsequent request.
    pub fn register<H: RequestHandler>(&self, handler: H) {
        let installed: Arc<dyn RequestHandler> = Arc::new(handler);
        match self.handler.write() {
            Ok(mut guard) => *guard = Some(installed),
            Err(poisoned) => *poisoned.into_inner() = Some(installed),
        }
    }

    /// Register a plain async closure as the handler.
    pub fn register_fn<F, Fut>(&self, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(FnHandler(handler));
    }
}

/// Service one request. Never blocks the read loop: handler invocations are
/// spawned, only the no-handler reply is produced inline.
fn dispatch(request: Request, handler: Option<Arc<dyn RequestHandler>>, outbound: ChannelSender) {
    let Request { id, payload } = request;

    let Some(handler) = handler else {
        tracing::debug!(%id, "request arrived with no handler registered");
        let reply = Reply {
            id,
            outcome: Outcome::Failure("no handler registered".to_string()),
        };
        if outbound.send(reply.into()).is_err() {
            tracing::debug!(%id, "reply channel closed");
        }
        return;
    };

    tokio::spawn(async move {
        let outcome = match handler.handle(payload).await {
            Ok(value) => Outcome::Success(value),
            Err(error) => {
                // Keep the failure observable on this side too; the reply is
                // the only copy the caller ever sees.
                let description = format!("{error:#}");
                tracing::warn!(%id, error = %description, "handler failed");
                Outcome::Failure(description)
            }
        };
        let reply = Reply { id, outcome };
        if outbound.send(reply.into()).is_err() {
            tracing::debug!(%id, "reply channel closed before outcome was sent");
        }
    });
}
