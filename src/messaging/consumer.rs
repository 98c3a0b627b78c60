use super::envelope::{Message, Offset};
use super::error::MessagingError;
use super::transport::{ConsumerEvent, ConsumerTransport};
use crate::config::ConsumerConfig;
use crate::context::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Processes messages delivered by a consume loop
///
/// Any `FnMut(&Message) -> anyhow::Result<()>` closure is a handler.
/// Errors are logged by the loop and never stop it.
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle(&mut self, message: &Message) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: FnMut(&Message) -> anyhow::Result<()> + Send,
{
    async fn handle(&mut self, message: &Message) -> anyhow::Result<()> {
        (self)(message)
    }
}

/// Reads one partition of a topic from the latest offset onwards
#[derive(Clone)]
pub struct Consumer {
    transport: Arc<dyn ConsumerTransport>,
    partition: i32,
    poll_timeout: Duration,
}

impl Consumer {
    pub fn new(transport: Arc<dyn ConsumerTransport>, config: &ConsumerConfig) -> Self {
        Self {
            transport,
            partition: config.partition,
            poll_timeout: config.poll_timeout(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn ConsumerTransport> {
        &self.transport
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Run the poll loop until `ctx` is done
    ///
    /// Only messages published after the assignment are seen. Returns the
    /// context's error once it ends; the assignment is released first.
    pub async fn consume<H: MessageHandler>(
        &self,
        ctx: &Context,
        topic: &str,
        mut handler: H,
    ) -> Result<(), MessagingError> {
        let partition = self.partition;
        self.transport
            .assign(topic, partition, Offset::End)
            .await
            .map_err(|source| MessagingError::AssignmentFailed {
                topic: topic.to_string(),
                partition,
                source,
            })?;
        tracing::info!(topic, partition, "Consumer assigned at latest offset");

        let reason = loop {
            if let Some(err) = ctx.err() {
                break err;
            }
            let event = match ctx.run(self.transport.poll(self.poll_timeout)).await {
                Ok(event) => event,
                Err(err) => break err,
            };
            match event {
                None => continue,
                Some(ConsumerEvent::Message(message)) => {
                    tracing::debug!(topic, partition, offset = message.offset, "Received message");
                    if let Err(e) = handler.handle(&message).await {
                        let error = format!("{e:#}");
                        tracing::error!(
                            topic,
                            partition,
                            offset = message.offset,
                            %error,
                            "Message handler failed"
                        );
                    }
                }
                Some(ConsumerEvent::Error(e)) => {
                    tracing::error!(topic, partition, error = %e, "Consumer error");
                }
            }
        };

        if let Err(e) = self.transport.unassign().await {
            tracing::warn!(topic, partition, error = %e, "Failed to unassign consumer");
        }
        tracing::info!(topic, partition, reason = %reason, "Consume loop stopped");
        Err(reason.into())
    }
}
