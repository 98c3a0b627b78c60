//! Kafka binding over librdkafka
//!
//! Client properties come from [`MessagingConfig::client_properties`]. The
//! producer is a `FutureProducer` whose delivery futures are forwarded to
//! the transport's single-use receivers. The consumer is a `BaseConsumer`
//! with manual partition assignment and no consumer group, so it never
//! joins a rebalance. librdkafka calls that block (poll, flush, metadata)
//! run on the blocking pool.

use super::envelope::{DeliveryResult, Envelope, Message, Offset, Partition};
use super::error::BrokerError;
use super::transport::{
    BrokerConnector, ClusterMetadata, ConsumerEvent, ConsumerTransport, DeliveryError,
    DeliveryReceiver, ProducerTransport, TopicMetadata,
};
use crate::config::MessagingConfig;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer as _};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Message as _, OwnedMessage};
use rdkafka::metadata::Metadata;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::{Offset as KafkaOffset, TopicPartitionList};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task;

/// Base client configuration shared by producer, consumer and admin clients
pub fn client_config(config: &MessagingConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    for (key, value) in config.client_properties() {
        client.set(key, value);
    }
    client
}

fn producer_config(config: &MessagingConfig) -> ClientConfig {
    let mut client = client_config(config);
    client.set(
        "queue.buffering.max.messages",
        config.producer.queue_capacity.to_string(),
    );
    client
}

fn consumer_config(config: &MessagingConfig) -> ClientConfig {
    let mut client = client_config(config);
    // No group.id: partitions are assigned manually and offsets never committed
    client
        .set("enable.auto.commit", "false")
        .set("enable.partition.eof", "false")
        .set(
            "allow.auto.create.topics",
            config.auto_create_topics.to_string(),
        );
    client
}

/// Map a librdkafka error onto the transport's error kinds
fn broker_error(err: KafkaError, topic: Option<&str>) -> BrokerError {
    match (err.rdkafka_error_code(), topic) {
        (Some(RDKafkaErrorCode::QueueFull), _) => BrokerError::QueueFull,
        (
            Some(
                RDKafkaErrorCode::MessageTimedOut
                | RDKafkaErrorCode::OperationTimedOut
                | RDKafkaErrorCode::RequestTimedOut,
            ),
            _,
        ) => BrokerError::Timeout,
        (
            Some(RDKafkaErrorCode::UnknownTopic | RDKafkaErrorCode::UnknownTopicOrPartition),
            Some(topic),
        ) => BrokerError::UnknownTopic(topic.to_string()),
        _ => BrokerError::Transport(err.to_string()),
    }
}

fn join_error(err: task::JoinError) -> BrokerError {
    BrokerError::Transport(format!("blocking broker call failed: {err}"))
}

fn kafka_offset(offset: Offset) -> KafkaOffset {
    match offset {
        // No committed offsets without a group; fall back to auto.offset.reset
        Offset::Unset => KafkaOffset::Invalid,
        Offset::Beginning => KafkaOffset::Beginning,
        Offset::End => KafkaOffset::End,
        Offset::At(offset) => KafkaOffset::Offset(offset),
    }
}

fn cluster_metadata(metadata: &Metadata) -> ClusterMetadata {
    ClusterMetadata {
        brokers: metadata
            .brokers()
            .iter()
            .map(|broker| format!("{}:{}", broker.host(), broker.port()))
            .collect(),
        topics: metadata
            .topics()
            .iter()
            .map(|topic| TopicMetadata {
                name: topic.name().to_string(),
                partitions: topic.partitions().len() as u32,
            })
            .collect(),
    }
}

fn to_message(message: &OwnedMessage) -> Message {
    let timestamp = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);
    Message {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: Bytes::copy_from_slice(message.key().unwrap_or_default()),
        value: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
        timestamp,
    }
}

/// Producer transport backed by a `FutureProducer`
pub struct KafkaProducer {
    producer: FutureProducer,
    closed: AtomicBool,
}

#[async_trait]
impl ProducerTransport for KafkaProducer {
    /// Must be called from within a Tokio runtime; the delivery future is
    /// forwarded by a spawned task
    fn submit(&self, envelope: Envelope) -> Result<DeliveryReceiver, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        let Envelope {
            topic,
            key,
            value,
            partition,
            ..
        } = envelope;

        let mut record = FutureRecord::<[u8], [u8]>::to(&topic).payload(value.as_ref());
        if !key.is_empty() {
            record = record.key(key.as_ref());
        }
        if let Partition::Fixed(partition) = partition {
            record = record.partition(partition);
        }
        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(err, _)| broker_error(err, Some(&topic)))?;

        let (reply, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let report = match delivery.await {
                Ok(Ok((partition, offset))) => Ok(DeliveryResult {
                    topic,
                    partition,
                    offset,
                }),
                Ok(Err((err, message))) => Err(DeliveryError {
                    partition: (message.partition() >= 0).then_some(message.partition()),
                    offset: (message.offset() >= 0).then_some(message.offset()),
                    error: broker_error(err, Some(&topic)),
                }),
                // Producer dropped before reporting
                Err(_) => Err(DeliveryError::new(BrokerError::Closed)),
            };
            let _ = reply.send(report);
        });
        Ok(receiver)
    }

    async fn fetch_metadata(&self, timeout: Duration) -> Result<ClusterMetadata, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        let producer = self.producer.clone();
        let metadata = task::spawn_blocking(move || producer.client().fetch_metadata(None, timeout))
            .await
            .map_err(join_error)?
            .map_err(|err| broker_error(err, None))?;
        Ok(cluster_metadata(&metadata))
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        let producer = self.producer.clone();
        task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(join_error)?
            .map_err(|err| broker_error(err, None))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Consumer transport backed by a `BaseConsumer`
pub struct KafkaConsumer {
    consumer: Arc<BaseConsumer>,
    closed: AtomicBool,
}

impl KafkaConsumer {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConsumerTransport for KafkaConsumer {
    async fn assign(&self, topic: &str, partition: i32, offset: Offset) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, partition, kafka_offset(offset))
            .map_err(|err| broker_error(err, Some(topic)))?;
        self.consumer
            .assign(&assignment)
            .map_err(|err| broker_error(err, Some(topic)))
    }

    async fn unassign(&self) -> Result<(), BrokerError> {
        self.consumer
            .assign(&TopicPartitionList::new())
            .map_err(|err| broker_error(err, None))
    }

    async fn poll(&self, timeout: Duration) -> Option<ConsumerEvent> {
        if self.ensure_open().is_err() {
            tokio::time::sleep(timeout).await;
            return Some(ConsumerEvent::Error(BrokerError::Closed));
        }
        let consumer = Arc::clone(&self.consumer);
        let polled = task::spawn_blocking(move || {
            consumer
                .poll(timeout)
                .map(|result| result.map(|message| message.detach()))
        })
        .await;

        match polled {
            Ok(Some(Ok(message))) => Some(ConsumerEvent::Message(to_message(&message))),
            Ok(Some(Err(err))) => Some(ConsumerEvent::Error(broker_error(err, None))),
            Ok(None) => None,
            Err(err) => Some(ConsumerEvent::Error(join_error(err))),
        }
    }

    async fn fetch_metadata(&self, timeout: Duration) -> Result<ClusterMetadata, BrokerError> {
        self.ensure_open()?;
        let consumer = Arc::clone(&self.consumer);
        let metadata = task::spawn_blocking(move || consumer.fetch_metadata(None, timeout))
            .await
            .map_err(join_error)?
            .map_err(|err| broker_error(err, None))?;
        Ok(cluster_metadata(&metadata))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.unassign().await
    }
}

/// Connects transports to the cluster named by `messaging.host`/`messaging.port`
///
/// Creating a librdkafka client does not contact the cluster; an unreachable
/// broker surfaces on the first metadata request, which
/// [`MessagingClient::connect`](super::MessagingClient::connect) makes
/// before returning.
#[derive(Debug, Clone, Default)]
pub struct KafkaConnector;

impl KafkaConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect_producer(
        &self,
        config: &MessagingConfig,
    ) -> Result<Arc<dyn ProducerTransport>, BrokerError> {
        let producer: FutureProducer = producer_config(config)
            .create()
            .map_err(|err| broker_error(err, None))?;
        tracing::debug!(bootstrap = %config.bootstrap_servers(), "Kafka producer created");
        Ok(Arc::new(KafkaProducer {
            producer,
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect_consumer(
        &self,
        config: &MessagingConfig,
    ) -> Result<Arc<dyn ConsumerTransport>, BrokerError> {
        let consumer: BaseConsumer = consumer_config(config)
            .create()
            .map_err(|err| broker_error(err, None))?;
        tracing::debug!(bootstrap = %config.bootstrap_servers(), "Kafka consumer created");
        Ok(Arc::new(KafkaConsumer {
            consumer: Arc::new(consumer),
            closed: AtomicBool::new(false),
        }))
    }

    async fn ensure_topic(
        &self,
        config: &MessagingConfig,
        topic: &str,
        partitions: u32,
    ) -> Result<(), BrokerError> {
        let admin: AdminClient<DefaultClientContext> = client_config(config)
            .create()
            .map_err(|err| broker_error(err, None))?;
        let partitions = i32::try_from(partitions)
            .map_err(|_| BrokerError::Transport(format!("too many partitions for {topic}")))?;
        let new_topic = NewTopic::new(
            topic,
            partitions,
            TopicReplication::Fixed(config.replication_factor),
        );

        let results = admin
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|err| broker_error(err, Some(topic)))?;
        for result in results {
            match result {
                Ok(name) => tracing::info!(topic = %name, partitions, "Created topic"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::debug!(topic = %name, "Topic already exists");
                }
                Err((name, code)) => {
                    return Err(BrokerError::Transport(format!(
                        "failed to create topic {name}: {code}"
                    )));
                }
            }
        }
        Ok(())
    }
}
