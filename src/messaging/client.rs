//! Messaging client and its lifecycle subsystem

use super::consumer::{Consumer, MessageHandler};
use super::envelope::DeliveryResult;
use super::error::{BrokerError, MessagingError};
use super::producer::Producer;
use super::transport::{BrokerConnector, ClusterMetadata, ConsumerTransport, ProducerTransport};
use crate::config::{AppConfig, MessagingConfig};
use crate::context::Context;
use crate::lifecycle::Subsystem;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Upper bound of a single metadata request
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

struct ClientInner {
    producer: RwLock<Option<Producer>>,
    consumer: RwLock<Option<Consumer>>,
    /// Held by the running consume loop
    consume_lock: Mutex<()>,
    flush_timeout: Duration,
}

/// Producer and consumer connections to one broker cluster
///
/// Cheap to clone; clones share the connections. Publishing is safe from
/// any number of tasks; at most one consume loop runs at a time.
///
/// # Example
///
/// ```rust,ignore
/// use keelson::messaging::{Message, MessagingClient};
///
/// let client = app.resolve::<MessagingSubsystem>().await.expect("messaging enabled");
/// let delivery = client.publish(&ctx, "orders", "o-1", r#"{"amount":10}"#).await?;
///
/// client
///     .consume(&ctx, "orders", |message: &Message| -> anyhow::Result<()> {
///         tracing::info!(offset = message.offset, "got order");
///         Ok(())
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct MessagingClient {
    inner: Arc<ClientInner>,
}

impl MessagingClient {
    /// Connect the producer, then the consumer, then provision topics
    ///
    /// On failure every transport created so far is closed again.
    pub async fn connect(
        ctx: &Context,
        connector: &dyn BrokerConnector,
        config: &MessagingConfig,
    ) -> Result<Self, MessagingError> {
        let producer = ctx
            .run(connector.connect_producer(config))
            .await?
            .map_err(|source| MessagingError::ConnectFailed {
                role: "producer",
                source,
            })?;

        let consumer = match ctx.run(connector.connect_consumer(config)).await {
            Ok(Ok(consumer)) => consumer,
            Ok(Err(source)) => {
                close_quietly(&*producer).await;
                return Err(MessagingError::ConnectFailed {
                    role: "consumer",
                    source,
                });
            }
            Err(err) => {
                close_quietly(&*producer).await;
                return Err(err.into());
            }
        };

        let client = Self::from_transports(Some(producer), Some(consumer), config);
        if let Err(err) = client.provision(ctx, connector, config).await {
            if let Err(close_err) = client.close().await {
                tracing::warn!(error = %close_err, "Failed to release messaging client");
            }
            return Err(err);
        }
        Ok(client)
    }

    /// Wrap existing transports; a missing one leaves that side uninitialized
    pub fn from_transports(
        producer: Option<Arc<dyn ProducerTransport>>,
        consumer: Option<Arc<dyn ConsumerTransport>>,
        config: &MessagingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                producer: RwLock::new(producer.map(Producer::new)),
                consumer: RwLock::new(consumer.map(|c| Consumer::new(c, &config.consumer))),
                consume_lock: Mutex::new(()),
                flush_timeout: config.producer.flush_timeout(),
            }),
        }
    }

    /// A client with neither producer nor consumer
    pub fn disconnected(config: &MessagingConfig) -> Self {
        Self::from_transports(None, None, config)
    }

    async fn provision(
        &self,
        ctx: &Context,
        connector: &dyn BrokerConnector,
        config: &MessagingConfig,
    ) -> Result<(), MessagingError> {
        for topic in &config.topics {
            ctx.run(connector.ensure_topic(config, &topic.name, topic.partitions))
                .await?
                .map_err(|source| MessagingError::ProvisionFailed {
                    topic: topic.name.clone(),
                    source,
                })?;
            tracing::debug!(topic = %topic.name, partitions = topic.partitions, "Topic provisioned");
        }

        let metadata = self.metadata(ctx).await?;
        tracing::info!(
            brokers = ?metadata.brokers,
            topics = metadata.topics.len(),
            "Messaging client connected"
        );
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.producer.read().await.is_some() || self.inner.consumer.read().await.is_some()
    }

    /// Publish one message and wait for its delivery report
    ///
    /// # Errors
    ///
    /// - `Context` when `ctx` is done before submission or before the report
    /// - `ProducerNotInitialized` when the client was never connected or is closed
    /// - `SubmitFailed` when the transport refused the message
    /// - `DeliveryFailed` when the broker reported an error
    pub async fn publish(
        &self,
        ctx: &Context,
        topic: &str,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<DeliveryResult, MessagingError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let producer = self
            .inner
            .producer
            .read()
            .await
            .clone()
            .ok_or(MessagingError::ProducerNotInitialized)?;
        producer.publish(ctx, topic, key, value).await
    }

    /// Consume `topic` from the latest offset until `ctx` is done
    ///
    /// Blocks the calling task. Returns the context's error on a normal
    /// exit.
    ///
    /// # Errors
    ///
    /// - `ConsumerNotInitialized` when the client has no consumer
    /// - `ConsumerBusy` when another loop is already running on this client
    /// - `AssignmentFailed` when the partition could not be assigned
    pub async fn consume<H: MessageHandler>(
        &self,
        ctx: &Context,
        topic: &str,
        handler: H,
    ) -> Result<(), MessagingError> {
        let consumer = self
            .inner
            .consumer
            .read()
            .await
            .clone()
            .ok_or(MessagingError::ConsumerNotInitialized)?;
        let _running = self
            .inner
            .consume_lock
            .try_lock()
            .map_err(|_| MessagingError::ConsumerBusy {
                topic: topic.to_string(),
            })?;
        consumer.consume(ctx, topic, handler).await
    }

    /// Fetch cluster metadata, capped at five seconds and raced against `ctx`
    pub async fn metadata(&self, ctx: &Context) -> Result<ClusterMetadata, MessagingError> {
        let ctx = ctx.with_timeout(METADATA_TIMEOUT);
        let timeout = ctx.remaining().unwrap_or(METADATA_TIMEOUT);

        let producer = self.inner.producer.read().await.clone();
        let result = match producer {
            Some(producer) => ctx.run(producer.transport().fetch_metadata(timeout)).await?,
            None => {
                let consumer = self
                    .inner
                    .consumer
                    .read()
                    .await
                    .clone()
                    .ok_or(MessagingError::ProducerNotInitialized)?;
                ctx.run(consumer.transport().fetch_metadata(timeout)).await?
            }
        };
        result.map_err(MessagingError::Metadata)
    }

    /// Liveness probe: a metadata round trip
    pub async fn health(&self, ctx: &Context) -> Result<(), MessagingError> {
        self.metadata(ctx).await.map(|_| ())
    }

    /// Flush and close the producer, then close the consumer
    ///
    /// Every step runs even if an earlier one failed. Closing twice is a
    /// no-op.
    pub async fn close(&self) -> Result<(), MessagingError> {
        let producer = self.inner.producer.write().await.take();
        let consumer = self.inner.consumer.write().await.take();
        let mut failures: Vec<BrokerError> = Vec::new();

        if let Some(producer) = producer {
            let transport = producer.transport();
            if let Err(e) = transport.flush(self.inner.flush_timeout).await {
                tracing::warn!(error = %e, "Producer flush incomplete");
                failures.push(e);
            }
            if let Err(e) = transport.close().await {
                tracing::error!(error = %e, "Failed to close producer");
                failures.push(e);
            }
        }
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.transport().close().await {
                tracing::error!(error = %e, "Failed to close consumer");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MessagingError::CloseFailed(failures))
        }
    }
}

async fn close_quietly(producer: &dyn ProducerTransport) {
    if let Err(e) = producer.close().await {
        tracing::warn!(error = %e, "Failed to close producer after aborted connect");
    }
}

/// Broker messaging as an orchestrated subsystem
///
/// Enabled by `messaging.enabled`; its handle is a [`MessagingClient`].
pub struct MessagingSubsystem {
    connector: Arc<dyn BrokerConnector>,
}

impl MessagingSubsystem {
    pub fn new(connector: impl BrokerConnector) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    pub fn with_connector(connector: Arc<dyn BrokerConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Subsystem for MessagingSubsystem {
    type Handle = MessagingClient;

    fn name(&self) -> &str {
        "messaging"
    }

    fn is_enabled(&self, config: &AppConfig) -> bool {
        config.messaging.enabled
    }

    async fn init(&self, ctx: &Context, config: &AppConfig) -> anyhow::Result<MessagingClient> {
        let messaging = &config.messaging;
        for (key, value) in messaging.redacted_properties() {
            tracing::debug!(key, %value, "Messaging client property");
        }
        let client = MessagingClient::connect(ctx, &*self.connector, messaging).await?;
        Ok(client)
    }

    async fn close(&self, client: MessagingClient) -> anyhow::Result<()> {
        client.close().await?;
        Ok(())
    }

    async fn health(&self, ctx: &Context, client: &MessagingClient) -> anyhow::Result<()> {
        client.health(ctx).await?;
        Ok(())
    }
}
