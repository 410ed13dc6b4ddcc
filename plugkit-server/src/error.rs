use thiserror::Error;

/// Error type plugins use for their own attach failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced while initializing the plugin server.
///
/// Both variants abort initialization immediately; a half-registered server
/// must never accept connections, so callers are expected to treat any of
/// these as fatal for the process.
#[derive(Debug, Error)]
pub enum InitError {
    /// The named plugin does not expose the rpc attach capability.
    #[error("{0:?} is not an rpc-attachable plugin")]
    NotAttachable(String),

    /// The named plugin's own attach logic failed.
    #[error("error registering {name:?}")]
    Register {
        name: String,
        #[source]
        source: BoxError,
    },
}

impl InitError {
    /// Name of the plugin that aborted initialization.
    pub fn plugin_name(&self) -> &str {
        match self {
            InitError::NotAttachable(name) => name,
            InitError::Register { name, .. } => name,
        }
    }
}
