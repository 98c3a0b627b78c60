//! Broker messaging
//!
//! Publish-with-acknowledgment and a cancellable consume loop over a
//! pluggable broker transport. `KafkaConnector` (feature `kafka`) binds
//! it to a Kafka cluster through librdkafka; `MemoryBroker` (feature
//! `testing`) is an in-process stand-in for tests.
//!
//! # Flow
//!
//! ```text
//! publish(ctx, topic, key, value)
//!     → Producer::publish → ProducerTransport::submit   (queued, receiver returned)
//!     → await delivery report  ⟂  ctx.done()
//!     → DeliveryResult { topic, partition, offset }
//!
//! consume(ctx, topic, handler)
//!     → ConsumerTransport::assign(topic, partition, End)
//!     → loop { poll(poll_timeout) ⟂ ctx.done() → handler.handle(&message) }
//!     → unassign → Err(ctx error)
//! ```

mod client;
mod consumer;
pub mod envelope;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
mod producer;
pub mod transport;

pub use client::{MessagingClient, MessagingSubsystem};
pub use consumer::{Consumer, MessageHandler};
pub use envelope::{DeliveryResult, Envelope, Message, Offset, Partition};
pub use error::{BrokerError, MessagingError};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConnector, KafkaConsumer, KafkaProducer};
#[cfg(any(test, feature = "testing"))]
pub use memory::{MemoryBroker, MemoryConsumer, MemoryProducer};
pub use producer::Producer;
pub use transport::{
    BrokerConnector, ClusterMetadata, ConsumerEvent, ConsumerTransport, DeliveryError,
    DeliveryReceiver, DeliveryReport, ProducerTransport, TopicMetadata,
};
