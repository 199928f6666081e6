//! The node dispatch loop: subscribe, decode, invoke a handler, publish, acknowledge.

use krt_bus::{Delivery, DeliverPolicy};
use krt_handler::{HandlerContext, HandlerRegistry, SharedContext};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Builds the future that completes when the process should stop: on `SIGTERM` or `SIGINT`.
pub fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("caught SIGTERM; stopping"),
            _ = sigint.recv() => tracing::info!("caught SIGINT; stopping"),
        }
    })
}

/// Subscribes to every configured input subject and dispatches deliveries until `exit` completes,
/// then closes the bus connection. Each delivery is processed on its own spawned task, gated by a
/// semaphore sized to `shared.config.concurrency_limit` so the runtime never holds more than that
/// many handler invocations in flight at once.
pub async fn serve(
    shared: Arc<SharedContext>,
    registry: Arc<HandlerRegistry>,
    exit: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let mut subjects = shared.config.nats_inputs.clone();
    subjects.push(shared.config.nats_output.clone());
    shared
        .bus
        .ensure_stream(&shared.config.nats_stream, &subjects)
        .await?;

    let semaphore = Arc::new(Semaphore::new(shared.config.concurrency_limit));

    for subject in shared.config.nats_inputs.clone() {
        let durable = krt_bus::durable_name(&subject, &shared.config.krt_node_name);
        let shared_for_cb = shared.clone();
        let registry_for_cb = registry.clone();
        let semaphore_for_cb = semaphore.clone();

        shared
            .bus
            .subscribe_durable(
                &shared.config.nats_stream,
                &subject,
                &durable,
                &durable,
                DeliverPolicy::New,
                shared.config.ack_wait(),
                Box::new(move |delivery| {
                    let shared = shared_for_cb.clone();
                    let registry = registry_for_cb.clone();
                    let semaphore = semaphore_for_cb.clone();
                    tokio::spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .expect("dispatch semaphore should never be closed");
                        if let Err(err) = handle_delivery(&shared, &registry, delivery).await {
                            tracing::error!(error = %err, "dispatch loop failed to process a delivery");
                        }
                    });
                }),
            )
            .await?;
    }

    exit.await;
    tracing::info!("stopping; closing bus connection");
    shared.bus.close().await?;
    Ok(())
}

/// The full per-message algorithm: decode, dispatch, publish, ack. A malformed envelope is acked
/// and dropped (redelivery would loop forever on the same bytes); a handler failure is captured
/// into a published `ERROR` envelope rather than propagated.
async fn handle_delivery(
    shared: &Arc<SharedContext>,
    registry: &Arc<HandlerRegistry>,
    delivery: Box<dyn Delivery>,
) -> anyhow::Result<()> {
    let start = Instant::now();

    let envelope = match krt_envelope::decode(delivery.payload()).await {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed envelope");
            delivery.ack().await?;
            return Ok(());
        }
    };

    let from_node = envelope.from_node.clone();
    let payload = envelope.payload.clone();
    let ctx = HandlerContext::new(shared, envelope);
    let handler = registry.get_handler(&from_node);

    let outcome = handler.handle(&ctx, payload.as_ref()).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(()) => ctx.record_dispatch_outcome(elapsed_ms, true).await,
        Err(err) => {
            tracing::warn!(from_node = %from_node, error = %err, "handler failed; publishing error envelope");
            if let Err(publish_err) = ctx.publish_error(err.to_string(), None).await {
                tracing::error!(error = %publish_err, "failed to publish error envelope");
            }
            ctx.record_dispatch_outcome(elapsed_ms, false).await;
        }
    }

    delivery.ack().await?;
    Ok(())
}
