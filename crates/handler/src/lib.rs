//! The handler registry and the per-request context passed to user handler code.

mod context;
mod registry;

pub use context::{HandlerContext, SharedContext};
pub use registry::{Handler, HandlerError, HandlerModule, HandlerRegistry, RegistryError};
