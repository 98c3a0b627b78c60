use crate::config::ConfigError;
use crate::context::ContextError;
use crate::lifecycle::LifecycleError;
use crate::logging::LoggingError;
use crate::messaging::MessagingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeelsonError>;

#[derive(Debug, Error)]
pub enum KeelsonError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A section is enabled that this build has no backend for
    #[error("{section} is enabled but {reason}")]
    Unsupported {
        section: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeelsonError {
    /// Process exit status: 2 for unusable configuration, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            KeelsonError::Config(_) | KeelsonError::Unsupported { .. } => 2,
            _ => 1,
        }
    }
}
