//! A worked example of a statically linked handler module: appends this node's name to an
//! incoming greeting and republishes it, demonstrating the two-node chain from SPEC_FULL.md §8.
//!
//! A node binary picks exactly one handler module crate at build time and links it in; this one
//! stands in for whatever domain logic a real workflow's node would implement. It is deliberately
//! reusable across more than one node in the same chain: `default_handler` appends whatever node
//! name it is constructed with, so the same crate backs both `node-a` and `node-b` in the demo
//! chain, each started with its own `--krt-node-name`.

use async_trait::async_trait;
use krt_envelope::MessageType;
use krt_handler::{Handler, HandlerContext, HandlerError, HandlerModule};

#[derive(Clone, PartialEq, Default, ::prost::Message)]
pub struct Greeting {
    #[prost(string, tag = "1")]
    pub text: String,
}

/// Appends `node_name` to the incoming greeting and publishes the result, preserving
/// `request_id`/`tracking_id` via [`HandlerContext::publish_typed`].
pub struct GreetingHandler {
    node_name: String,
}

impl GreetingHandler {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }
}

#[async_trait]
impl Handler for GreetingHandler {
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        payload: Option<&::prost_types::Any>,
    ) -> Result<(), HandlerError> {
        let greeting: Greeting = payload
            .map(krt_envelope::unpack)
            .transpose()
            .map_err(|err| HandlerError::Failed(err.to_string()))?
            .unwrap_or_default();

        let reply = Greeting {
            text: format!("{}, {}", greeting.text, self.node_name),
        };
        ctx.publish_typed(&reply, MessageType::Ok, None).await
    }
}

/// The module this demo's node binary links in. `init` just logs; there is no external resource
/// to bootstrap for a pure-function greeting handler.
pub struct GreetingModule {
    node_name: String,
}

impl GreetingModule {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }
}

#[async_trait]
impl HandlerModule for GreetingModule {
    async fn init(&mut self) -> anyhow::Result<()> {
        tracing::info!(node_name = %self.node_name, "greeting handler module initialised");
        Ok(())
    }

    fn default_handler(&self) -> Box<dyn Handler> {
        Box::new(GreetingHandler::new(self.node_name.clone()))
    }
}
