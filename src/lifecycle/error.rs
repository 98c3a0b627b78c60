//! Lifecycle-specific error types

use super::LifecycleState;
use crate::context::ContextError;
use thiserror::Error;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A subsystem's `init` failed; startup stopped here
    #[error("failed to initialize {subsystem}: {source}")]
    InitFailed {
        subsystem: String,
        #[source]
        source: anyhow::Error,
    },

    /// A subsystem's `close` failed; teardown continued past it
    #[error("failed to close {subsystem}: {source}")]
    CloseFailed {
        subsystem: String,
        #[source]
        source: anyhow::Error,
    },

    /// A subsystem reported itself unhealthy
    #[error("{subsystem} is unhealthy: {source}")]
    HealthFailed {
        subsystem: String,
        #[source]
        source: anyhow::Error,
    },

    /// Several independent failures collected during one operation
    #[error("{} failures: {}", .0.len(), join_failures(.0))]
    Multiple(Vec<LifecycleError>),

    /// The operation is not allowed from the current state
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error(transparent)]
    Context(#[from] ContextError),
}

fn join_failures(errors: &[LifecycleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LifecycleError {
    /// Create an initialization failure error
    pub fn init_failed(subsystem: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::InitFailed {
            subsystem: subsystem.into(),
            source: source.into(),
        }
    }

    /// Create a close failure error
    pub fn close_failed(subsystem: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::CloseFailed {
            subsystem: subsystem.into(),
            source: source.into(),
        }
    }

    /// Create a health failure error
    pub fn health_failed(subsystem: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::HealthFailed {
            subsystem: subsystem.into(),
            source: source.into(),
        }
    }

    /// Fold collected failures into one result
    ///
    /// No failures is success, one failure is returned as is, and several
    /// are wrapped in [`LifecycleError::Multiple`].
    pub fn aggregate(mut errors: Vec<LifecycleError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }

    /// Names of the subsystems this error is about, in the order they failed
    pub fn subsystems(&self) -> Vec<&str> {
        match self {
            Self::InitFailed { subsystem, .. }
            | Self::CloseFailed { subsystem, .. }
            | Self::HealthFailed { subsystem, .. } => vec![subsystem.as_str()],
            Self::Multiple(errors) => errors.iter().flat_map(|e| e.subsystems()).collect(),
            Self::InvalidState { .. } | Self::Context(_) => Vec::new(),
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
