//! Typed configuration, bound to environment variables via [`clap::Parser`], mirroring
//! `agent::Args` in spirit: every field also accepts a CLI flag, but the environment-variable path
//! is the one used in deployment.

use clap::Parser;
use std::time::Duration;

/// Configuration shared by every node runner binary.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "krt node runner", long_about = None)]
pub struct NodeConfig {
    /// Address of the NATS server carrying the message bus.
    #[clap(long = "nats-server", env = "NATS_SERVER", default_value = "nats://127.0.0.1:4222")]
    pub nats_server: String,

    /// This process's own name, used as the connection name and in tracking entries.
    #[clap(long = "runner-name", env = "RUNNER_NAME")]
    pub runner_name: String,

    /// Identifies the deployment this runtime instance belongs to.
    #[clap(long = "runtime-id", env = "RUNTIME_ID")]
    pub runtime_id: String,

    /// Identifies the deployed workflow version.
    #[clap(long = "krt-version-id", env = "KRT_VERSION_ID")]
    pub krt_version_id: String,

    /// Human-readable workflow version label.
    #[clap(long = "krt-version", env = "KRT_VERSION")]
    pub krt_version: String,

    /// This node's name, used to resolve the handler registry and stamp outgoing envelopes.
    #[clap(long = "krt-node-name", env = "KRT_NODE_NAME")]
    pub krt_node_name: String,

    /// The JetStream stream carrying this node's input and output subjects.
    #[clap(long = "nats-stream", env = "NATS_STREAM")]
    pub nats_stream: String,

    /// Subjects this node subscribes to, comma-separated.
    #[clap(long = "nats-inputs", env = "NATS_INPUTS", value_delimiter = ',')]
    pub nats_inputs: Vec<String>,

    /// Subject this node publishes responses to (channel suffixes are appended per-call).
    #[clap(long = "nats-output", env = "NATS_OUTPUT")]
    pub nats_output: String,

    /// Filesystem root handler code may use for local scratch state.
    #[clap(long = "base-path", env = "BASE_PATH")]
    pub base_path: Option<String>,

    /// Retained for compatibility with the distilled configuration surface; the handler registry
    /// in this implementation is resolved through statically linked `HandlerModule` impls rather
    /// than a path loaded at runtime, so this value is accepted but unused by the registry itself.
    #[clap(long = "handler-path", env = "HANDLER_PATH")]
    pub handler_path: Option<String>,

    /// Connection string for the document store, if a node's handlers use one.
    #[clap(long = "mongo-uri", env = "MONGO_URI")]
    pub mongo_uri: Option<String>,

    /// Connection string for the metrics sink, if wired to an external recorder.
    #[clap(long = "influx-uri", env = "INFLUX_URI")]
    pub influx_uri: Option<String>,

    /// Hours a delivered-but-unacknowledged message is held before redelivery.
    #[clap(long = "ack-wait-hours", env = "ACK_WAIT_HOURS", default_value = "22")]
    pub ack_wait_hours: u64,

    /// Upper bound on concurrently in-flight handler invocations.
    #[clap(long = "concurrency-limit", env = "CONCURRENCY_LIMIT", default_value = "64")]
    pub concurrency_limit: usize,
}

impl NodeConfig {
    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_hours * 3600)
    }
}

/// Configuration for the entrypoint binary, which bridges external gRPC traffic onto the bus.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "krt entrypoint runner", long_about = None)]
pub struct EntrypointConfig {
    #[clap(long = "nats-server", env = "NATS_SERVER", default_value = "nats://127.0.0.1:4222")]
    pub nats_server: String,

    #[clap(long = "runner-name", env = "RUNNER_NAME")]
    pub runner_name: String,

    #[clap(long = "runtime-id", env = "RUNTIME_ID")]
    pub runtime_id: String,

    #[clap(long = "krt-version-id", env = "KRT_VERSION_ID")]
    pub krt_version_id: String,

    #[clap(long = "krt-version", env = "KRT_VERSION")]
    pub krt_version: String,

    /// Path to a file enumerating `{workflow -> stream/subjects}` bindings for every workflow this
    /// entrypoint instance serves.
    #[clap(long = "nats-subjects-file", env = "NATS_SUBJECTS_FILE")]
    pub nats_subjects_file: Option<String>,

    #[clap(long = "mongo-uri", env = "MONGO_URI")]
    pub mongo_uri: Option<String>,

    #[clap(long = "influx-uri", env = "INFLUX_URI")]
    pub influx_uri: Option<String>,

    /// How long to block awaiting a workflow's terminal reply before surfacing `Internal`.
    #[clap(long = "reply-timeout-secs", env = "REPLY_TIMEOUT_SECS", default_value = "1000")]
    pub reply_timeout_secs: u64,

    /// Port the gRPC surface listens on.
    #[clap(long = "api-port", env = "API_PORT", default_value = "8080")]
    pub api_port: u16,
}

impl EntrypointConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    /// Computes the stream name for `workflow`, per the naming rule
    /// `{runtime_id}-{version_id}-{workflow}`.
    pub fn stream_name(&self, workflow: &str) -> String {
        format!("{}-{}-{}", self.runtime_id, self.krt_version_id, workflow)
    }
}
