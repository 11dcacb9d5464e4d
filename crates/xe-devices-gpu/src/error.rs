use thiserror::Error;
use xe_memory::GuestMemoryError;

use crate::ConfigError;

/// Failure to construct a [`crate::XenosGpu`].
#[derive(Debug, Error)]
pub enum XenosError {
    #[error("invalid display configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("framebuffer window is not backed by RAM")]
    FramebufferWindow(#[source] GuestMemoryError),
    #[error("failed to spawn the production thread")]
    Spawn(#[source] std::io::Error),
}
