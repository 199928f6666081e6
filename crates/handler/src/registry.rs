use crate::HandlerContext;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A handler raised an application-level failure; captured and published as an `ERROR`
    /// envelope rather than propagated to the process.
    #[error("{0}")]
    Failed(String),
    #[error("failed to wrap handler payload: {0}")]
    Pack(#[from] prost::EncodeError),
    #[error(transparent)]
    Codec(#[from] krt_envelope::Error),
    #[error(transparent)]
    Bus(#[from] krt_bus::Error),
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Failed(err.to_string())
    }
}

/// Fatal at startup: the registry could not be built from a [`HandlerModule`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler module initialisation failed: {0}")]
    InitFailed(#[source] anyhow::Error),
}

/// One node's handler logic. Implemented per upstream node name (a "custom handler") or once as
/// the catch-all default.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        payload: Option<&::prost_types::Any>,
    ) -> Result<(), HandlerError>;
}

/// The statically linked handler crate's registration surface. A node binary links against
/// exactly one implementation of this trait, chosen at build time, in place of loading handler
/// code from a path at runtime.
#[async_trait]
pub trait HandlerModule: Send + Sync {
    /// One-shot initialiser, run before the first message is dispatched.
    async fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoked when no per-source override matches the incoming envelope's `from_node`.
    fn default_handler(&self) -> Box<dyn Handler>;

    /// Maps an upstream node name to the handler that should process its output.
    fn custom_handlers(&self) -> HashMap<String, Box<dyn Handler>> {
        HashMap::new()
    }
}

/// Immutable after [`HandlerRegistry::build`]; resolves an incoming envelope's `from_node` to the
/// handler that should process it.
pub struct HandlerRegistry {
    default_handler: Box<dyn Handler>,
    custom_handlers: HashMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Runs `module.init()`, then captures its `default_handler`/`custom_handlers`. An `init`
    /// failure is fatal: callers should log and exit non-zero rather than attempt to dispatch
    /// with a half-initialised module.
    pub async fn build(module: &mut dyn HandlerModule) -> Result<Self, RegistryError> {
        module.init().await.map_err(RegistryError::InitFailed)?;
        Ok(Self {
            default_handler: module.default_handler(),
            custom_handlers: module.custom_handlers(),
        })
    }

    /// Returns the custom handler registered for `from_node`, else the default. Never undefined
    /// once the registry has built successfully.
    pub fn get_handler(&self, from_node: &str) -> &dyn Handler {
        self.custom_handlers
            .get(from_node)
            .map(|h| h.as_ref())
            .unwrap_or(self.default_handler.as_ref())
    }
}
