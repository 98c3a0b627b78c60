//! In-process broker for tests
//!
//! A partitioned, append-only log per topic that implements the transport
//! traits, so code built on the messaging client can be exercised without
//! a cluster. Producers hand envelopes to a bounded queue drained by a
//! delivery task; consumers read from an assigned partition and wake up
//! as soon as a record is appended.

use super::envelope::{DeliveryResult, Envelope, Message, Offset, Partition};
use super::error::BrokerError;
use super::transport::{
    BrokerConnector, ClusterMetadata, ConsumerEvent, ConsumerTransport, DeliveryError,
    DeliveryReceiver, DeliveryReport, ProducerTransport, TopicMetadata,
};
use crate::config::MessagingConfig;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const BROKER_ADDRESS: &str = "memory";

#[derive(Debug, Clone)]
struct Record {
    key: Bytes,
    value: Bytes,
    timestamp: DateTime<Utc>,
}

struct PartitionLog {
    records: RwLock<Vec<Record>>,
    appended: Notify,
}

impl PartitionLog {
    fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            appended: Notify::new(),
        }
    }

    async fn append(&self, record: Record) -> i64 {
        let offset = {
            let mut records = self.records.write().await;
            records.push(record);
            records.len() as i64 - 1
        };
        self.appended.notify_waiters();
        offset
    }

    async fn end(&self) -> i64 {
        self.records.read().await.len() as i64
    }

    async fn get(&self, offset: i64) -> Option<Record> {
        let index = usize::try_from(offset).ok()?;
        self.records.read().await.get(index).cloned()
    }
}

struct TopicLog {
    name: String,
    partitions: Vec<PartitionLog>,
    round_robin: AtomicUsize,
}

impl TopicLog {
    fn new(name: &str, partitions: u32) -> Self {
        Self {
            name: name.to_string(),
            partitions: (0..partitions.max(1)).map(|_| PartitionLog::new()).collect(),
            round_robin: AtomicUsize::new(0),
        }
    }

    fn partition_index(&self, partition: i32) -> Result<usize, BrokerError> {
        usize::try_from(partition)
            .ok()
            .filter(|index| *index < self.partitions.len())
            .ok_or_else(|| BrokerError::UnknownPartition {
                topic: self.name.clone(),
                partition,
            })
    }

    fn select_partition(&self, envelope: &Envelope) -> Result<usize, BrokerError> {
        let count = self.partitions.len();
        match envelope.partition {
            Partition::Fixed(partition) => self.partition_index(partition),
            Partition::Any if envelope.key.is_empty() => {
                Ok(self.round_robin.fetch_add(1, Ordering::Relaxed) % count)
            }
            Partition::Any => {
                let mut hasher = DefaultHasher::new();
                envelope.key.hash(&mut hasher);
                Ok((hasher.finish() % count as u64) as usize)
            }
        }
    }
}

struct BrokerInner {
    topics: DashMap<String, Arc<TopicLog>>,
    available: AtomicBool,
    /// Pending transient errors per consumer id
    injected_errors: DashMap<u64, VecDeque<BrokerError>>,
    assignments: DashMap<u64, (String, i32)>,
    next_consumer_id: AtomicU64,
}

/// In-process broker shared by every transport it connects
///
/// Clones share the same topics.
///
/// # Example
///
/// ```rust,ignore
/// use keelson::messaging::MemoryBroker;
///
/// let broker = MemoryBroker::new();
/// broker.create_topic("orders", 3);
/// let subsystem = MessagingSubsystem::new(broker.clone());
/// // ... start the application, then inspect `broker.read("orders", 0)`
/// ```
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("topics", &self.inner.topics.len())
            .field("available", &self.is_available())
            .finish()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                available: AtomicBool::new(true),
                injected_errors: DashMap::new(),
                assignments: DashMap::new(),
                next_consumer_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create a topic; returns `false` if it already existed
    pub fn create_topic(&self, name: &str, partitions: u32) -> bool {
        let mut created = false;
        self.inner.topics.entry(name.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(TopicLog::new(name, partitions))
        });
        created
    }

    pub fn topics(&self) -> Vec<TopicMetadata> {
        let mut topics: Vec<TopicMetadata> = self
            .inner
            .topics
            .iter()
            .map(|entry| TopicMetadata {
                name: entry.key().clone(),
                partitions: entry.value().partitions.len() as u32,
            })
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        topics
    }

    /// Simulate an outage: while unavailable, connects, metadata requests
    /// and deliveries fail
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    /// Queue a transient error for one consumer; its next poll returns it
    pub fn inject_consumer_error(&self, consumer: u64, error: BrokerError) {
        self.inner
            .injected_errors
            .entry(consumer)
            .or_default()
            .push_back(error);
    }

    /// Id of the consumer currently assigned to `topic`/`partition`
    pub fn assigned_consumer(&self, topic: &str, partition: i32) -> Option<u64> {
        self.inner
            .assignments
            .iter()
            .find(|entry| entry.value().0 == topic && entry.value().1 == partition)
            .map(|entry| *entry.key())
    }

    /// Current consumer assignments as `(topic, partition)`
    pub fn assignments(&self) -> Vec<(String, i32)> {
        self.inner
            .assignments
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Every record of one partition, oldest first
    pub async fn read(&self, topic: &str, partition: i32) -> Result<Vec<Message>, BrokerError> {
        let log = self
            .topic(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        let index = log.partition_index(partition)?;
        let records = log.partitions[index].records.read().await;
        Ok(records
            .iter()
            .enumerate()
            .map(|(offset, record)| to_message(record.clone(), topic, partition, offset as i64))
            .collect())
    }

    pub fn metadata(&self) -> Result<ClusterMetadata, BrokerError> {
        self.ensure_available()?;
        Ok(ClusterMetadata {
            brokers: vec![BROKER_ADDRESS.to_string()],
            topics: self.topics(),
        })
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BrokerError::Transport("broker unavailable".to_string()))
        }
    }

    fn topic(&self, name: &str) -> Option<Arc<TopicLog>> {
        self.inner.topics.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Look a topic up, creating it when `auto_create` carries a partition count
    fn resolve_topic(&self, name: &str, auto_create: Option<u32>) -> Result<Arc<TopicLog>, BrokerError> {
        if let Some(topic) = self.topic(name) {
            return Ok(topic);
        }
        match auto_create {
            Some(partitions) => {
                let entry = self
                    .inner
                    .topics
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(TopicLog::new(name, partitions)));
                Ok(Arc::clone(entry.value()))
            }
            None => Err(BrokerError::UnknownTopic(name.to_string())),
        }
    }

    async fn append(&self, envelope: &Envelope, auto_create: Option<u32>) -> DeliveryReport {
        self.ensure_available().map_err(DeliveryError::new)?;
        let topic = self
            .resolve_topic(&envelope.topic, auto_create)
            .map_err(DeliveryError::new)?;
        let index = topic.select_partition(envelope).map_err(DeliveryError::new)?;

        let record = Record {
            key: envelope.key.clone(),
            value: envelope.value.clone(),
            timestamp: Utc::now(),
        };
        let offset = topic.partitions[index].append(record).await;

        Ok(DeliveryResult {
            topic: topic.name.clone(),
            partition: index as i32,
            offset,
        })
    }

    fn take_injected_error(&self, consumer: u64) -> Option<BrokerError> {
        self.inner
            .injected_errors
            .get_mut(&consumer)
            .and_then(|mut pending| pending.pop_front())
    }
}

fn to_message(record: Record, topic: &str, partition: i32, offset: i64) -> Message {
    Message {
        topic: topic.to_string(),
        partition,
        offset,
        key: record.key,
        value: record.value,
        timestamp: record.timestamp,
    }
}

fn auto_create_partitions(config: &MessagingConfig) -> Option<u32> {
    config
        .auto_create_topics
        .then_some(config.default_partitions.max(1))
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect_producer(
        &self,
        config: &MessagingConfig,
    ) -> Result<Arc<dyn ProducerTransport>, BrokerError> {
        self.ensure_available()?;
        Ok(Arc::new(MemoryProducer::spawn(
            self.clone(),
            config.producer.queue_capacity,
            auto_create_partitions(config),
        )))
    }

    async fn connect_consumer(
        &self,
        config: &MessagingConfig,
    ) -> Result<Arc<dyn ConsumerTransport>, BrokerError> {
        self.ensure_available()?;
        Ok(Arc::new(MemoryConsumer::new(
            self.clone(),
            auto_create_partitions(config),
        )))
    }

    async fn ensure_topic(
        &self,
        _config: &MessagingConfig,
        topic: &str,
        partitions: u32,
    ) -> Result<(), BrokerError> {
        self.ensure_available()?;
        if self.create_topic(topic, partitions) {
            tracing::debug!(topic, partitions, "Created topic");
        }
        Ok(())
    }
}

struct Pending {
    envelope: Envelope,
    reply: oneshot::Sender<DeliveryReport>,
}

/// Envelopes accepted but not yet reported
struct InFlight {
    count: AtomicUsize,
    drained: Notify,
}

impl InFlight {
    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Producer transport of a [`MemoryBroker`]
pub struct MemoryProducer {
    broker: MemoryBroker,
    queue: mpsc::Sender<Pending>,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryProducer {
    fn spawn(broker: MemoryBroker, queue_capacity: usize, auto_create: Option<u32>) -> Self {
        let (queue, pending) = mpsc::channel(queue_capacity.max(1));
        let in_flight = Arc::new(InFlight {
            count: AtomicUsize::new(0),
            drained: Notify::new(),
        });
        let worker = tokio::spawn(deliver(
            broker.clone(),
            pending,
            Arc::clone(&in_flight),
            auto_create,
        ));
        Self {
            broker,
            queue,
            in_flight,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Envelopes accepted but not yet reported
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }
}

async fn deliver(
    broker: MemoryBroker,
    mut pending: mpsc::Receiver<Pending>,
    in_flight: Arc<InFlight>,
    auto_create: Option<u32>,
) {
    while let Some(Pending { envelope, reply }) = pending.recv().await {
        let report = broker.append(&envelope, auto_create).await;
        if let Err(failure) = &report {
            tracing::debug!(
                message_id = %envelope.message_id,
                topic = %envelope.topic,
                error = %failure.error,
                "Delivery failed"
            );
        }
        // The publisher stops listening once its context ends
        let _ = reply.send(report);
        in_flight.done();
    }
}

#[async_trait]
impl ProducerTransport for MemoryProducer {
    fn submit(&self, envelope: Envelope) -> Result<DeliveryReceiver, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        let (reply, receiver) = oneshot::channel();
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        match self.queue.try_send(Pending { envelope, reply }) {
            Ok(()) => Ok(receiver),
            Err(err) => {
                self.in_flight.done();
                Err(match err {
                    mpsc::error::TrySendError::Full(_) => BrokerError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => BrokerError::Closed,
                })
            }
        }
    }

    async fn fetch_metadata(&self, _timeout: Duration) -> Result<ClusterMetadata, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.broker.metadata()
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        let drained = async {
            loop {
                let notified = self.in_flight.drained.notified();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained)
            .await
            .map_err(|_| BrokerError::Timeout)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(worker) = self.worker.lock().await.take() {
            worker.abort();
        }
        Ok(())
    }
}

struct Assignment {
    topic: Arc<TopicLog>,
    partition: usize,
    position: i64,
}

/// Consumer transport of a [`MemoryBroker`]
pub struct MemoryConsumer {
    id: u64,
    broker: MemoryBroker,
    auto_create: Option<u32>,
    assignment: Mutex<Option<Assignment>>,
    closed: AtomicBool,
}

impl MemoryConsumer {
    fn new(broker: MemoryBroker, auto_create: Option<u32>) -> Self {
        let id = broker.inner.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            broker,
            auto_create,
            assignment: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Advance past `position` unless the assignment changed meanwhile
    async fn commit_position(&self, topic: &Arc<TopicLog>, partition: usize, position: i64) {
        let mut assignment = self.assignment.lock().await;
        if let Some(current) = assignment.as_mut() {
            if Arc::ptr_eq(&current.topic, topic)
                && current.partition == partition
                && current.position == position
            {
                current.position += 1;
            }
        }
    }
}

#[async_trait]
impl ConsumerTransport for MemoryConsumer {
    async fn assign(&self, topic: &str, partition: i32, offset: Offset) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.broker.ensure_available()?;
        let log = self.broker.resolve_topic(topic, self.auto_create)?;
        let index = log.partition_index(partition)?;
        let position = match offset {
            Offset::Beginning => 0,
            Offset::End | Offset::Unset => log.partitions[index].end().await,
            Offset::At(offset) => offset.max(0),
        };

        *self.assignment.lock().await = Some(Assignment {
            topic: log,
            partition: index,
            position,
        });
        self.broker
            .inner
            .assignments
            .insert(self.id, (topic.to_string(), partition));
        Ok(())
    }

    async fn unassign(&self) -> Result<(), BrokerError> {
        self.assignment.lock().await.take();
        self.broker.inner.assignments.remove(&self.id);
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Option<ConsumerEvent> {
        if let Some(error) = self.broker.take_injected_error(self.id) {
            return Some(ConsumerEvent::Error(error));
        }
        if self.closed.load(Ordering::Acquire) {
            tokio::time::sleep(timeout).await;
            return Some(ConsumerEvent::Error(BrokerError::Closed));
        }

        let current = self
            .assignment
            .lock()
            .await
            .as_ref()
            .map(|a| (Arc::clone(&a.topic), a.partition, a.position));
        let Some((topic, partition, position)) = current else {
            tokio::time::sleep(timeout).await;
            return None;
        };

        let log = &topic.partitions[partition];
        let deadline = Instant::now() + timeout;
        loop {
            let appended = log.appended.notified();
            if let Some(record) = log.get(position).await {
                self.commit_position(&topic, partition, position).await;
                return Some(ConsumerEvent::Message(to_message(
                    record,
                    &topic.name,
                    partition as i32,
                    position,
                )));
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return None;
            }
        }
    }

    async fn fetch_metadata(&self, _timeout: Duration) -> Result<ClusterMetadata, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.broker.metadata()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.unassign().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MessagingConfig {
        MessagingConfig {
            enabled: true,
            ..MessagingConfig::default()
        }
    }

    async fn produce(producer: &dyn ProducerTransport, envelope: Envelope) -> DeliveryReport {
        producer.submit(envelope).unwrap().await.unwrap()
    }

    #[tokio::test]
    async fn test_same_key_lands_on_same_partition() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 4);
        let producer = broker.connect_producer(&config()).await.unwrap();

        let first = produce(&*producer, Envelope::new("orders", "o-1", "a")).await.unwrap();
        let second = produce(&*producer, Envelope::new("orders", "o-1", "b")).await.unwrap();

        assert_eq!(first.partition, second.partition);
        assert_eq!(second.offset, first.offset + 1);
    }

    #[tokio::test]
    async fn test_empty_keys_round_robin() {
        let broker = MemoryBroker::new();
        broker.create_topic("events", 3);
        let producer = broker.connect_producer(&config()).await.unwrap();

        let mut partitions = Vec::new();
        for _ in 0..3 {
            let delivery = produce(&*producer, Envelope::new("events", Bytes::new(), "x"))
                .await
                .unwrap();
            partitions.push(delivery.partition);
        }
        partitions.sort();
        assert_eq!(partitions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_fixed_partition_out_of_range_fails_delivery() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let producer = broker.connect_producer(&config()).await.unwrap();

        let report = produce(&*producer, Envelope::new("orders", "k", "v").with_partition(5)).await;
        let failure = report.unwrap_err();
        assert_eq!(
            failure.error,
            BrokerError::UnknownPartition {
                topic: "orders".to_string(),
                partition: 5
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_topic_fails_without_auto_create() {
        let broker = MemoryBroker::new();
        let producer = broker.connect_producer(&config()).await.unwrap();

        let report = produce(&*producer, Envelope::new("missing", "k", "v")).await;
        assert_eq!(
            report.unwrap_err().error,
            BrokerError::UnknownTopic("missing".to_string())
        );
        assert!(broker.topics().is_empty());
    }

    #[tokio::test]
    async fn test_auto_create_topics() {
        let broker = MemoryBroker::new();
        let mut config = config();
        config.auto_create_topics = true;
        config.default_partitions = 2;
        let producer = broker.connect_producer(&config).await.unwrap();

        produce(&*producer, Envelope::new("created", "k", "v")).await.unwrap();
        assert_eq!(
            broker.topics(),
            vec![TopicMetadata {
                name: "created".to_string(),
                partitions: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_full_queue_rejects_submission() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let mut config = config();
        config.producer.queue_capacity = 1;
        let producer = broker.connect_producer(&config).await.unwrap();

        // The delivery task cannot run between these two calls
        let accepted = producer.submit(Envelope::new("orders", "k", "1")).unwrap();
        let rejected = producer.submit(Envelope::new("orders", "k", "2"));
        assert_eq!(rejected.unwrap_err(), BrokerError::QueueFull);

        assert!(accepted.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_flush_waits_for_reports() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let producer = broker.connect_producer(&config()).await.unwrap();

        for i in 0..10 {
            drop(producer.submit(Envelope::new("orders", "k", i.to_string())).unwrap());
        }
        producer.flush(Duration::from_secs(1)).await.unwrap();
        assert_eq!(broker.read("orders", 0).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_closed_producer_rejects_submission() {
        let broker = MemoryBroker::new();
        let producer = broker.connect_producer(&config()).await.unwrap();
        producer.close().await.unwrap();
        producer.close().await.unwrap();

        assert_eq!(
            producer.submit(Envelope::new("orders", "k", "v")).unwrap_err(),
            BrokerError::Closed
        );
    }

    #[tokio::test]
    async fn test_consumer_at_end_sees_only_new_records() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let producer = broker.connect_producer(&config()).await.unwrap();
        produce(&*producer, Envelope::new("orders", "old", "v")).await.unwrap();

        let consumer = broker.connect_consumer(&config()).await.unwrap();
        consumer.assign("orders", 0, Offset::End).await.unwrap();
        assert!(consumer.poll(Duration::from_millis(10)).await.is_none());

        produce(&*producer, Envelope::new("orders", "new", "v")).await.unwrap();
        match consumer.poll(Duration::from_millis(100)).await {
            Some(ConsumerEvent::Message(message)) => {
                assert_eq!(message.key_str(), Some("new"));
                assert_eq!(message.offset, 1);
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_wakes_on_append() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let consumer = broker.connect_consumer(&config()).await.unwrap();
        consumer.assign("orders", 0, Offset::End).await.unwrap();

        let producer = broker.connect_producer(&config()).await.unwrap();
        let poll = tokio::spawn(async move { consumer.poll(Duration::from_secs(5)).await });
        tokio::task::yield_now().await;
        produce(&*producer, Envelope::new("orders", "k", "v")).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), poll)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, Some(ConsumerEvent::Message(_))));
    }

    #[tokio::test]
    async fn test_injected_error_surfaces_once() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let consumer = broker.connect_consumer(&config()).await.unwrap();
        consumer.assign("orders", 0, Offset::End).await.unwrap();

        let id = broker.assigned_consumer("orders", 0).unwrap();
        broker.inject_consumer_error(id, BrokerError::Transport("rebalance".to_string()));
        assert!(matches!(
            consumer.poll(Duration::from_millis(10)).await,
            Some(ConsumerEvent::Error(BrokerError::Transport(_)))
        ));
        assert!(consumer.poll(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_injected_error_reaches_only_its_consumer() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 2);
        let first = broker.connect_consumer(&config()).await.unwrap();
        let second = broker.connect_consumer(&config()).await.unwrap();
        first.assign("orders", 0, Offset::End).await.unwrap();
        second.assign("orders", 1, Offset::End).await.unwrap();

        let target = broker.assigned_consumer("orders", 1).unwrap();
        broker.inject_consumer_error(target, BrokerError::Timeout);

        assert!(first.poll(Duration::from_millis(10)).await.is_none());
        assert!(matches!(
            second.poll(Duration::from_millis(10)).await,
            Some(ConsumerEvent::Error(BrokerError::Timeout))
        ));
    }

    #[tokio::test]
    async fn test_assignment_tracking() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 2);
        let consumer = broker.connect_consumer(&config()).await.unwrap();

        consumer.assign("orders", 1, Offset::End).await.unwrap();
        assert_eq!(broker.assignments(), vec![("orders".to_string(), 1)]);

        consumer.unassign().await.unwrap();
        assert!(broker.assignments().is_empty());
    }

    #[tokio::test]
    async fn test_assign_unknown_topic_fails() {
        let broker = MemoryBroker::new();
        let consumer = broker.connect_consumer(&config()).await.unwrap();
        let err = consumer.assign("missing", 0, Offset::End).await.unwrap_err();
        assert_eq!(err, BrokerError::UnknownTopic("missing".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_broker() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        assert!(broker.metadata().is_err());
        assert!(broker.connect_producer(&config()).await.is_err());

        broker.set_available(true);
        let metadata = broker.metadata().unwrap();
        assert_eq!(metadata.brokers, vec!["memory".to_string()]);
    }
}
