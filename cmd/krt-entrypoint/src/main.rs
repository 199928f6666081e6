//! The entrypoint binary: bridges external synchronous traffic onto the bus.
//!
//! The generated gRPC service stubs that would actually accept external connections are out of
//! this repo's scope (SPEC_FULL.md §6); this binary wires up the [`krt_entrypoint::Bridge`] and
//! registers every configured workflow's stream, the part the core owns. A real deployment would
//! add a `tonic::transport::Server` exposing one codegen'd service per workflow, whose unary
//! handlers call [`krt_entrypoint::call_workflow`] the way `crates/entrypoint/src/service.rs`'s
//! tests do.

use anyhow::Context;
use clap::Parser;
use krt_bus::nats::NatsBus;
use krt_bus::Bus;
use krt_config::EntrypointConfig;
use krt_entrypoint::Bridge;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    krt_observability::init_tracing();

    let config = EntrypointConfig::parse();
    tracing::info!(?config, "krt-entrypoint starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async_main(config));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result
}

async fn async_main(config: EntrypointConfig) -> anyhow::Result<()> {
    let bus = NatsBus::connect(&config.nats_server, &config.runner_name)
        .await
        .context("connecting to message bus")?;

    let workflows = read_workflows(config.nats_subjects_file.as_deref())
        .context("reading nats_subjects_file")?;

    let bridge = Bridge::new(Arc::new(bus) as Arc<dyn Bus>, config);
    for workflow in &workflows {
        bridge
            .register_workflow(workflow)
            .await
            .with_context(|| format!("declaring stream for workflow '{workflow}'"))?;
        tracing::info!(%workflow, "workflow stream declared");
    }

    krt_dispatch::shutdown_signal()
        .context("installing signal handlers")?
        .await;
    tracing::info!("stopping");
    Ok(())
}

/// Reads one workflow name per line from `path`, defaulting to a single `"greet"` workflow when
/// no subjects file is configured, matching the worked example in SPEC_FULL.md §8.
fn read_workflows(path: Option<&str>) -> anyhow::Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(vec!["greet".to_string()]);
    };

    let contents = std::fs::read_to_string(path).with_context(|| format!("reading '{path}'"))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
