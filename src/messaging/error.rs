//! Messaging error types

use crate::context::ContextError;
use thiserror::Error;

/// Errors reported by a broker transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The local send queue is full; the envelope was not accepted
    #[error("local queue full")]
    QueueFull,

    #[error("unknown topic {0}")]
    UnknownTopic(String),

    #[error("unknown partition {partition} of topic {topic}")]
    UnknownPartition { topic: String, partition: i32 },

    /// The transport has been closed
    #[error("client closed")]
    Closed,

    #[error("operation timed out")]
    Timeout,

    #[error("broker transport error: {0}")]
    Transport(String),
}

/// Errors returned by [`MessagingClient`](super::MessagingClient) operations
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("failed to create {role}: {source}")]
    ConnectFailed {
        role: &'static str,
        #[source]
        source: BrokerError,
    },

    #[error("failed to provision topic {topic}: {source}")]
    ProvisionFailed {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("producer not initialized")]
    ProducerNotInitialized,

    #[error("consumer not initialized")]
    ConsumerNotInitialized,

    /// Another consume loop already owns this client's consumer
    #[error("consumer already running a loop, cannot consume {topic}")]
    ConsumerBusy { topic: String },

    /// The transport rejected the envelope synchronously
    #[error("failed to produce message to topic {topic}: {source}")]
    SubmitFailed {
        topic: String,
        #[source]
        source: BrokerError,
    },

    /// The broker reported a delivery error for the envelope
    #[error("delivery to topic {topic} failed{position}: {source}", position = describe_position(.partition, .offset))]
    DeliveryFailed {
        topic: String,
        partition: Option<i32>,
        offset: Option<i64>,
        #[source]
        source: BrokerError,
    },

    #[error("failed to assign consumer to {topic}[{partition}]: {source}")]
    AssignmentFailed {
        topic: String,
        partition: i32,
        #[source]
        source: BrokerError,
    },

    #[error("metadata request failed: {0}")]
    Metadata(#[source] BrokerError),

    #[error("failed to close messaging client: {}", join_errors(.0))]
    CloseFailed(Vec<BrokerError>),

    #[error(transparent)]
    Context(#[from] ContextError),
}

fn describe_position(partition: &Option<i32>, offset: &Option<i64>) -> String {
    match (partition, offset) {
        (Some(p), Some(o)) => format!(" (partition {p}, offset {o})"),
        (Some(p), None) => format!(" (partition {p})"),
        _ => String::new(),
    }
}

fn join_errors(errors: &[BrokerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MessagingError {
    /// Whether the operation stopped because its context ended
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Context(_))
    }
}
