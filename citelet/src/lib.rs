//! citelet: correlated request/reply for offloading blocking work to a worker.
//!
//! A [`RequestClient`] turns calls into correlated envelopes over an injected
//! channel and resolves each caller's future when the matching reply comes
//! back; a [`WorkerEndpoint`] on the other end dispatches requests to a
//! registered handler and replies with a tagged outcome. The channel may be
//! shared with unrelated traffic; both sides validate before acting.

pub mod bridge;
pub mod channel;
pub mod client;
pub mod worker;

pub use bridge::envelope::{CorrelationId, Outcome, Reply, Request};
pub use channel::{ChannelClosed, ChannelHandle, ChannelSender};
pub use client::{CallError, RequestClient};
pub use worker::{RequestHandler, WorkerEndpoint};
