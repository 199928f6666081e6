use crate::HandlerError;
use krt_bus::Bus;
use krt_config::NodeConfig;
use krt_envelope::{CompressionLimit, Envelope, MessageType};
use krt_observability::{MetricsSink, NodeElapsed};
use krt_store::DocumentStore;
use std::sync::Arc;

/// Shared, immutable state handed to every handler invocation. Lives for the process lifetime
/// and is wrapped in an `Arc` by the owning node binary.
pub struct SharedContext {
    pub config: NodeConfig,
    pub bus: Arc<dyn Bus>,
    pub store: Arc<dyn DocumentStore>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// A request-scoped view handed to handler code: borrows the shared base and owns the envelope
/// currently being processed. Constructed fresh per incoming message and discarded when the
/// invocation returns.
pub struct HandlerContext<'a> {
    shared: &'a SharedContext,
    envelope: Envelope,
}

impl<'a> HandlerContext<'a> {
    pub fn new(shared: &'a SharedContext, envelope: Envelope) -> Self {
        Self { shared, envelope }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.shared.store
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.shared.metrics
    }

    async fn record(&self, from_node: &str, elapsed_ms: f64, success: bool) {
        self.shared
            .metrics
            .record_node_elapsed(NodeElapsed {
                from_node,
                elapsed_ms,
                success,
            })
            .await;
    }

    /// Reports the outcome of dispatching this message's handler. Called once by the dispatch
    /// loop after the handler invocation returns, never by handler code itself.
    pub async fn record_dispatch_outcome(&self, elapsed_ms: f64, success: bool) {
        self.record(&self.envelope.from_node, elapsed_ms, success).await;
    }

    fn output_subject(&self, channel: Option<&str>) -> String {
        match channel {
            Some(channel) if !channel.is_empty() => {
                format!("{}.{}", self.shared.config.nats_output, channel)
            }
            _ => self.shared.config.nats_output.clone(),
        }
    }

    /// Wraps `payload` as the envelope's reply and publishes it to `output` (or
    /// `output.channel` if `channel` is non-empty).
    pub async fn publish_typed<T: prost::Message>(
        &self,
        payload: &T,
        message_type: MessageType,
        channel: Option<&str>,
    ) -> Result<(), HandlerError> {
        let any = krt_envelope::pack(payload)?;
        self.publish_any(any, message_type, channel).await
    }

    /// Republishes an already-wrapped opaque payload unchanged.
    pub async fn publish_any(
        &self,
        payload: ::prost_types::Any,
        message_type: MessageType,
        channel: Option<&str>,
    ) -> Result<(), HandlerError> {
        let response =
            self.envelope
                .respond(self.shared.config.krt_node_name.clone(), message_type, Some(payload));
        self.publish_envelope(response, channel).await
    }

    /// Emits an `ERROR` envelope preserving `request_id` and `tracking_id`.
    pub async fn publish_error(
        &self,
        message: impl Into<String>,
        channel: Option<&str>,
    ) -> Result<(), HandlerError> {
        let response = Envelope::error_response(
            self.envelope.request_id.clone(),
            self.envelope.tracking_id.clone(),
            self.shared.config.krt_node_name.clone(),
            message,
        );
        self.publish_envelope(response, channel).await
    }

    async fn publish_envelope(
        &self,
        envelope: Envelope,
        channel: Option<&str>,
    ) -> Result<(), HandlerError> {
        let limit = self
            .shared
            .bus
            .max_payload_size(&self.shared.config.nats_stream)
            .await
            .ok()
            .flatten()
            .map(CompressionLimit)
            .unwrap_or_default();

        let bytes = krt_envelope::encode(&envelope, limit).await?;
        let subject = self.output_subject(channel);
        self.shared
            .bus
            .publish(&self.shared.config.nats_stream, &subject, bytes)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krt_bus::fake::FakeBus;
    use krt_bus::{Bus, DeliverPolicy};
    use krt_observability::TracingMetricsSink;
    use krt_store::InMemoryStore;
    use std::time::Duration;

    #[derive(Clone, PartialEq, Default, ::prost::Message)]
    struct Greeting {
        #[prost(string, tag = "1")]
        text: String,
    }

    fn test_shared(bus: FakeBus) -> SharedContext {
        use clap::Parser;
        SharedContext {
            config: NodeConfig::parse_from([
                "node",
                "--runner-name", "node-a",
                "--runtime-id", "rt",
                "--krt-version-id", "v1",
                "--krt-version", "1.0.0",
                "--krt-node-name", "node-a",
                "--nats-stream", "rt-v1-wf",
                "--nats-inputs", "wf.entrypoint",
                "--nats-output", "wf.node-a",
            ]),
            bus: Arc::new(bus),
            store: Arc::new(InMemoryStore::new()),
            metrics: Arc::new(TracingMetricsSink),
        }
    }

    async fn sink(bus: &FakeBus, subject: &'static str) -> tokio::sync::mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe_durable(
            "rt-v1-wf",
            subject,
            subject,
            subject,
            DeliverPolicy::All,
            Duration::from_secs(1),
            Box::new(move |delivery| {
                let _ = tx.send(delivery.payload().to_vec());
            }),
        )
        .await
        .unwrap();
        rx
    }

    #[tokio::test]
    async fn publish_typed_with_no_channel_targets_the_bare_output_subject() {
        let bus = FakeBus::new();
        let shared = test_shared(bus.clone());
        let mut rx = sink(&bus, "wf.node-a").await;

        let envelope = Envelope::new_request(
            "req-1",
            "entrypoint",
            krt_envelope::pack(&Greeting { text: "hi".to_string() }).unwrap(),
            "t0",
        );
        let ctx = HandlerContext::new(&shared, envelope);
        ctx.publish_typed(&Greeting { text: "hi, node-a".to_string() }, MessageType::Ok, None)
            .await
            .unwrap();

        let bytes = rx.recv().await.expect("expected a delivery on the bare output subject");
        let reply = krt_envelope::decode(&bytes).await.unwrap();
        assert_eq!(reply.from_node, "node-a");
        assert_eq!(reply.request_id, "req-1");
    }

    /// Covers the channel fan-out scenario: one handler invocation publishing to two distinct
    /// channels produces two envelopes, each on its own `output.<channel>` subject.
    #[tokio::test]
    async fn publish_typed_with_distinct_channels_fans_out_to_distinct_subjects() {
        let bus = FakeBus::new();
        let shared = test_shared(bus.clone());
        let mut left_rx = sink(&bus, "wf.node-a.left").await;
        let mut right_rx = sink(&bus, "wf.node-a.right").await;

        let envelope = Envelope::new_request(
            "req-1",
            "entrypoint",
            krt_envelope::pack(&Greeting { text: "hi".to_string() }).unwrap(),
            "t0",
        );
        let ctx = HandlerContext::new(&shared, envelope);

        ctx.publish_typed(&Greeting { text: "left".to_string() }, MessageType::Ok, Some("left"))
            .await
            .unwrap();
        ctx.publish_typed(&Greeting { text: "right".to_string() }, MessageType::Ok, Some("right"))
            .await
            .unwrap();

        let left = krt_envelope::decode(&left_rx.recv().await.unwrap()).await.unwrap();
        let right = krt_envelope::decode(&right_rx.recv().await.unwrap()).await.unwrap();

        let left_greeting: Greeting = krt_envelope::unpack(left.payload.as_ref().unwrap()).unwrap();
        let right_greeting: Greeting = krt_envelope::unpack(right.payload.as_ref().unwrap()).unwrap();
        assert_eq!(left_greeting.text, "left");
        assert_eq!(right_greeting.text, "right");
    }

    #[tokio::test]
    async fn publish_error_emits_an_error_envelope_preserving_request_id() {
        let bus = FakeBus::new();
        let shared = test_shared(bus.clone());
        let mut rx = sink(&bus, "wf.node-a").await;

        let envelope = Envelope::new_request(
            "req-1",
            "entrypoint",
            krt_envelope::pack(&Greeting { text: "hi".to_string() }).unwrap(),
            "t0",
        );
        let ctx = HandlerContext::new(&shared, envelope);
        ctx.publish_error("boom", None).await.unwrap();

        let reply = krt_envelope::decode(&rx.recv().await.unwrap()).await.unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.error, "boom");
        assert_eq!(reply.request_id, "req-1");
        assert_eq!(reply.from_node, "node-a");
    }
}
