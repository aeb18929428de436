//! Deployment error types.

/// Errors produced while delivering a bundle to its public location.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required setting '{0}'")]
    MissingSetting(&'static str),

    #[error("unknown deployment method: {0}")]
    UnknownMethod(String),

    #[error("transport exited with status {code}: {stderr}")]
    TransportExit { code: i32, stderr: String },

    #[error("transport error: {0}")]
    Transport(String),
}
