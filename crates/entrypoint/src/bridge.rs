use krt_bus::{Bus, DeliverPolicy};
use krt_config::EntrypointConfig;
use krt_envelope::{CompressionLimit, Envelope};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bus error: {0}")]
    Bus(#[from] krt_bus::Error),
    #[error("envelope codec error: {0}")]
    Codec(#[from] krt_envelope::Error),
    #[error("failed to unwrap reply payload: {0}")]
    Unpack(#[from] krt_envelope::UnpackError),
    #[error("failed to wrap request payload: {0}")]
    Pack(#[from] prost::EncodeError),
    #[error("workflow reported an error: {0}")]
    Remote(String),
    #[error("timed out waiting for a reply from workflow '{0}'")]
    Timeout(String),
}

type Waiters = Arc<Mutex<HashMap<String, oneshot::Sender<Envelope>>>>;

/// Wraps an outbound request, publishes it, and awaits the matching reply on the workflow's bare
/// egress subject (`{stream}.{runner_name}`), demultiplexing concurrent calls by `tracking_id`
/// (per SPEC_FULL.md §4.6/§9's correlation note, option b): one persistent subscription per
/// workflow, registered in [`Bridge::register_workflow`], fans replies in to whichever in-flight
/// [`Bridge::call`] is waiting on that `tracking_id`.
pub struct Bridge {
    bus: Arc<dyn Bus>,
    config: EntrypointConfig,
    waiters: Waiters,
}

impl Bridge {
    pub fn new(bus: Arc<dyn Bus>, config: EntrypointConfig) -> Self {
        Self {
            bus,
            config,
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Declares the stream and the ingress/first-hop/reply subjects for `workflow`, and attaches
    /// the durable reply subscription that [`Bridge::call`] demultiplexes by `tracking_id`. Call
    /// once at startup for every workflow this entrypoint instance serves.
    pub async fn register_workflow(&self, workflow: &str) -> Result<(), BridgeError> {
        let stream = self.config.stream_name(workflow);
        let reply_subject = self.reply_subject(&stream);
        let subjects = vec![
            format!("{stream}.entrypoint"),
            format!("{stream}.node-a"),
            reply_subject.clone(),
        ];
        self.bus.ensure_stream(&stream, &subjects).await?;

        let durable = krt_bus::durable_name(&reply_subject, &self.config.runner_name);
        let waiters = self.waiters.clone();
        self.bus
            .subscribe_durable(
                &stream,
                &reply_subject,
                &durable,
                &durable,
                DeliverPolicy::All,
                self.config.reply_timeout(),
                Box::new(move |delivery| {
                    let waiters = waiters.clone();
                    tokio::spawn(async move {
                        match krt_envelope::decode(delivery.payload()).await {
                            Ok(envelope) => {
                                let waiting = waiters.lock().await.remove(&envelope.tracking_id);
                                match waiting {
                                    Some(sender) => {
                                        let _ = sender.send(envelope);
                                    }
                                    None => tracing::debug!(
                                        tracking_id = %envelope.tracking_id,
                                        "no bridge call waiting for this reply; dropping"
                                    ),
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "dropping malformed reply envelope")
                            }
                        }
                        let _ = delivery.ack().await;
                    });
                }),
            )
            .await?;

        Ok(())
    }

    fn reply_subject(&self, stream: &str) -> String {
        format!("{stream}.{}", self.config.runner_name)
    }

    /// Executes one external call against `workflow`: wraps `request`, publishes it, awaits the
    /// correlated reply, and unwraps it as `Resp`. On a remote error or a timed-out wait, returns
    /// a [`BridgeError`] the caller maps to `Status::Internal`.
    pub async fn call<Req, Resp>(&self, workflow: &str, request: &Req) -> Result<Resp, BridgeError>
    where
        Req: ::prost::Message,
        Resp: ::prost::Message + Default,
    {
        let stream = self.config.stream_name(workflow);
        let ingress = format!("{stream}.entrypoint");

        let payload = krt_envelope::pack(request)?;
        let start = chrono::Utc::now().to_rfc3339();
        let mut envelope = Envelope::new_request(
            uuid::Uuid::new_v4().to_string(),
            &self.config.runner_name,
            payload,
            start,
        );
        if let Some(entry) = envelope.tracking.first_mut() {
            entry.end_timestamp = chrono::Utc::now().to_rfc3339();
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.waiters
            .lock()
            .await
            .insert(envelope.tracking_id.clone(), reply_tx);

        let limit = self
            .bus
            .max_payload_size(&stream)
            .await
            .ok()
            .flatten()
            .map(CompressionLimit)
            .unwrap_or_default();

        let bytes = match krt_envelope::encode(&envelope, limit).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.waiters.lock().await.remove(&envelope.tracking_id);
                return Err(err.into());
            }
        };

        if let Err(err) = self.bus.publish(&stream, &ingress, bytes).await {
            self.waiters.lock().await.remove(&envelope.tracking_id);
            return Err(err.into());
        }

        let reply = match tokio::time::timeout(self.config.reply_timeout(), reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(BridgeError::Timeout(workflow.to_string())),
            Err(_) => {
                self.waiters.lock().await.remove(&envelope.tracking_id);
                return Err(BridgeError::Timeout(workflow.to_string()));
            }
        };

        if reply.is_error() {
            return Err(BridgeError::Remote(reply.error));
        }

        let payload = reply
            .payload
            .ok_or_else(|| BridgeError::Remote("reply carried no payload".to_string()))?;
        Ok(krt_envelope::unpack(&payload)?)
    }

    /// Timeout used when no override is configured; exposed for callers constructing bespoke
    /// wait logic around [`Bridge::call`].
    pub fn default_timeout(&self) -> Duration {
        self.config.reply_timeout()
    }
}
