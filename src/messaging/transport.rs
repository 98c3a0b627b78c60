//! Broker transport seam
//!
//! The client only talks to a broker through these traits, so the same
//! publish/consume logic runs against the Kafka binding (feature `kafka`)
//! and against the in-process broker used in tests (feature `testing`).

use super::envelope::{DeliveryResult, Envelope, Message, Offset};
use super::error::BrokerError;
use crate::config::MessagingConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Broker-side failure of a submitted envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    /// Partition the envelope was routed to, when known
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub error: BrokerError,
}

impl DeliveryError {
    pub fn new(error: BrokerError) -> Self {
        Self {
            partition: None,
            offset: None,
            error,
        }
    }
}

pub type DeliveryReport = Result<DeliveryResult, DeliveryError>;

/// Single-use channel carrying the delivery report of one envelope
pub type DeliveryReceiver = oneshot::Receiver<DeliveryReport>;

/// What one consumer poll produced
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    Message(Message),
    /// A broker-level error; the consumer stays usable
    Error(BrokerError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicMetadata {
    pub name: String,
    pub partitions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterMetadata {
    pub brokers: Vec<String>,
    pub topics: Vec<TopicMetadata>,
}

impl ClusterMetadata {
    pub fn topic(&self, name: &str) -> Option<&TopicMetadata> {
        self.topics.iter().find(|topic| topic.name == name)
    }
}

#[async_trait]
pub trait ProducerTransport: Send + Sync {
    /// Queue an envelope for delivery
    ///
    /// Returns without waiting for the broker; the report arrives on the
    /// returned receiver. An error here means the envelope was never
    /// queued.
    fn submit(&self, envelope: Envelope) -> Result<DeliveryReceiver, BrokerError>;

    async fn fetch_metadata(&self, timeout: Duration) -> Result<ClusterMetadata, BrokerError>;

    /// Wait until every queued envelope has a delivery report
    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait ConsumerTransport: Send + Sync {
    async fn assign(&self, topic: &str, partition: i32, offset: Offset) -> Result<(), BrokerError>;

    async fn unassign(&self) -> Result<(), BrokerError>;

    /// Wait up to `timeout` for the next event on the current assignment
    async fn poll(&self, timeout: Duration) -> Option<ConsumerEvent>;

    async fn fetch_metadata(&self, timeout: Duration) -> Result<ClusterMetadata, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Builds transports for one broker cluster
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    async fn connect_producer(
        &self,
        config: &MessagingConfig,
    ) -> Result<Arc<dyn ProducerTransport>, BrokerError>;

    async fn connect_consumer(
        &self,
        config: &MessagingConfig,
    ) -> Result<Arc<dyn ConsumerTransport>, BrokerError>;

    /// Create `topic` with `partitions` partitions unless it already exists
    async fn ensure_topic(
        &self,
        config: &MessagingConfig,
        topic: &str,
        partitions: u32,
    ) -> Result<(), BrokerError>;
}
