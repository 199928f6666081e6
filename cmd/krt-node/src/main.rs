//! The node runner binary: links in exactly one statically-compiled handler module (here,
//! `greeting-handler`, the worked example from SPEC_FULL.md §9) and drives it against the bus.

use anyhow::Context;
use clap::Parser;
use krt_bus::nats::NatsBus;
use krt_bus::Bus;
use krt_config::NodeConfig;
use krt_handler::{HandlerRegistry, SharedContext};
use krt_observability::TracingMetricsSink;
use krt_store::InMemoryStore;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    krt_observability::init_tracing();

    let config = NodeConfig::parse();
    tracing::info!(?config, "krt-node starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async_main(config));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result
}

async fn async_main(config: NodeConfig) -> anyhow::Result<()> {
    let bus = NatsBus::connect(&config.nats_server, &config.runner_name)
        .await
        .context("connecting to message bus")?;

    let shared = Arc::new(SharedContext {
        bus: Arc::new(bus) as Arc<dyn Bus>,
        store: Arc::new(InMemoryStore::new()),
        metrics: Arc::new(TracingMetricsSink),
        config: config.clone(),
    });

    let mut module = greeting_handler::GreetingModule::new(config.krt_node_name.clone());
    let registry = HandlerRegistry::build(&mut module)
        .await
        .context("building handler registry")?;

    let exit = krt_dispatch::shutdown_signal().context("installing signal handlers")?;
    krt_dispatch::serve(shared, Arc::new(registry), exit)
        .await
        .context("node dispatch loop failed")?;

    Ok(())
}
