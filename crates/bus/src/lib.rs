//! A thin adapter over the durable message bus driver: connect, declare streams, publish, and
//! subscribe with manual acknowledgement.
//!
//! [`Bus`] is the contract the dispatch and entrypoint crates program against. [`nats::NatsBus`]
//! is the production implementation, backed by `async-nats`'s JetStream API. [`fake::FakeBus`] is
//! an in-memory stand-in used by tests so they don't require a running NATS server.

pub mod fake;
pub mod nats;

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to bus at '{0}': {1}")]
    Connect(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to declare stream '{0}': {1}")]
    EnsureStream(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to subscribe to '{0}': {1}")]
    Subscribe(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to publish to '{0}': {1}")]
    Publish(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to acknowledge message: {0}")]
    Ack(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Governs where a durable consumer starts reading from when it first attaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Ignore history; only deliver messages published after the consumer is created. Used by
    /// node runners, which care only about new work.
    New,
    /// Deliver every retained message in the stream, including ones published before the
    /// consumer attached. Used by the entrypoint's reply subscription, which must not miss a
    /// reply that arrived a moment before it subscribed.
    All,
}

/// A message delivered off a durable consumer, pending acknowledgement.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn subject(&self) -> &str;
    fn payload(&self) -> &[u8];
    /// Acknowledge successful processing. Idempotent at the bus level.
    async fn ack(&self) -> Result<(), Error>;
}

/// A pull-style subscription yielding at most one [`Delivery`] per call, per the entrypoint's
/// request/reply bridge.
#[async_trait]
pub trait PullSubscription: Send + Sync {
    async fn next_msg(&self, timeout: Duration) -> Result<Option<Box<dyn Delivery>>, Error>;
}

/// The bus client contract. Node runners and the entrypoint program exclusively against this
/// trait; see [`nats::NatsBus`] for the production adapter.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Declares `subjects` on `stream` if the stream does not already exist. Idempotent.
    async fn ensure_stream(&self, stream: &str, subjects: &[String]) -> Result<(), Error>;

    /// Registers a durable, queue-grouped consumer and spawns a task that invokes `callback` for
    /// every delivered message. The callback is responsible for acknowledging via
    /// [`Delivery::ack`].
    async fn subscribe_durable(
        &self,
        stream: &str,
        subject: &str,
        queue_group: &str,
        durable_name: &str,
        deliver_policy: DeliverPolicy,
        ack_wait: Duration,
        callback: Box<dyn Fn(Box<dyn Delivery>) + Send + Sync>,
    ) -> Result<(), Error>;

    /// Registers a pull-style consumer for one-off request/reply polling.
    async fn subscribe_pull(
        &self,
        stream: &str,
        subject: &str,
        durable_name: &str,
        deliver_policy: DeliverPolicy,
    ) -> Result<Box<dyn PullSubscription>, Error>;

    /// Publishes `payload` to `subject` on `stream`. Fire-and-forget from the caller's
    /// perspective; the bus acknowledges the write internally.
    async fn publish(&self, stream: &str, subject: &str, payload: Vec<u8>) -> Result<(), Error>;

    /// The maximum payload size the bus will accept, if it advertises one. Used to tighten the
    /// envelope codec's compression ceiling below the 1 MiB default.
    async fn max_payload_size(&self, stream: &str) -> Result<Option<usize>, Error>;

    /// Idempotent; safe to call multiple times or after the bus is already closed.
    async fn close(&self) -> Result<(), Error>;
}

/// Computes the durable name and queue group for a node's input subject, per §6: dots become
/// dashes, suffixed with the node's name.
pub fn durable_name(subject: &str, node_name: &str) -> String {
    format!("{}-{}", subject.replace('.', "-"), node_name)
}
