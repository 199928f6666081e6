//! Process-wide logging init and the handler-invocation metrics sink.

use async_trait::async_trait;

/// Initializes a structured stderr subscriber from `RUST_LOG`, in the style of `agent::main`.
/// Must be called exactly once per process, before any other `tracing` call.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(!matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1"))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");
}

/// One handler invocation's outcome, reported to a [`MetricsSink`] after every dispatch.
#[derive(Clone, Copy, Debug)]
pub struct NodeElapsed<'a> {
    pub from_node: &'a str,
    pub elapsed_ms: f64,
    pub success: bool,
}

/// The narrow interface the dispatch loop reports through. A default implementation logs via
/// `tracing` and records through the `metrics` crate's recorder facade, so a Prometheus/StatsD
/// exporter can be installed globally without touching dispatch code.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_node_elapsed(&self, sample: NodeElapsed<'_>);
}

/// Default [`MetricsSink`]: emits a `tracing` event and a `metrics` crate histogram/counter pair.
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn record_node_elapsed(&self, sample: NodeElapsed<'_>) {
        tracing::info!(
            from_node = sample.from_node,
            elapsed_ms = sample.elapsed_ms,
            success = sample.success,
            "node_elapsed_time"
        );

        metrics::histogram!("node_elapsed_time_ms", "from_node" => sample.from_node.to_string())
            .record(sample.elapsed_ms);
        let outcome = if sample.success { "success" } else { "failure" };
        metrics::counter!(
            "node_elapsed_time_total",
            "from_node" => sample.from_node.to_string(),
            "outcome" => outcome,
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn record_node_elapsed_logs_the_sample() {
        let sink = TracingMetricsSink;
        sink.record_node_elapsed(NodeElapsed {
            from_node: "node-a",
            elapsed_ms: 12.5,
            success: true,
        })
        .await;

        assert!(logs_contain("node_elapsed_time"));
    }
}
