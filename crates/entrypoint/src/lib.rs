//! The entrypoint's external-call bridge: wrap, publish, await reply, unwrap, return.

mod bridge;
mod service;

pub use bridge::{Bridge, BridgeError};
pub use service::{call_workflow, WorkflowService};
