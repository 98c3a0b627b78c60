use super::envelope::{DeliveryResult, Envelope};
use super::error::{BrokerError, MessagingError};
use super::transport::ProducerTransport;
use crate::context::Context;
use bytes::Bytes;
use std::sync::Arc;

/// Publishes envelopes and waits for each one's delivery report
#[derive(Clone)]
pub struct Producer {
    transport: Arc<dyn ProducerTransport>,
}

impl Producer {
    pub fn new(transport: Arc<dyn ProducerTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn ProducerTransport> {
        &self.transport
    }

    /// Publish one message and wait for the broker's acknowledgment
    ///
    /// A context that is already done fails before anything is submitted.
    /// If the context ends while waiting, the delivery report is abandoned;
    /// the message may still be delivered.
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

        let envelope = Envelope::new(topic, key, value);
        let message_id = envelope.message_id;
        let receiver = self.transport.submit(envelope).map_err(|source| {
            tracing::error!(%message_id, topic, error = %source, "Failed to produce message");
            MessagingError::SubmitFailed {
                topic: topic.to_string(),
                source,
            }
        })?;

        let report = match ctx.run(receiver).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(%message_id, topic, reason = %err, "Stopped waiting for delivery");
                return Err(err.into());
            }
        };

        match report {
            Ok(Ok(delivery)) => {
                tracing::info!(
                    %message_id,
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Message delivered"
                );
                Ok(delivery)
            }
            Ok(Err(failure)) => {
                tracing::error!(%message_id, topic, error = %failure.error, "Delivery failed");
                Err(MessagingError::DeliveryFailed {
                    topic: topic.to_string(),
                    partition: failure.partition,
                    offset: failure.offset,
                    source: failure.error,
                })
            }
            // The transport dropped the report sender without answering
            Err(_) => Err(MessagingError::DeliveryFailed {
                topic: topic.to_string(),
                partition: None,
                offset: None,
                source: BrokerError::Closed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::messaging::transport::{ClusterMetadata, DeliveryError, DeliveryReceiver, DeliveryReport};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Answers each submission with a scripted report, or holds it back
    #[derive(Default)]
    struct ScriptedTransport {
        submitted: AtomicUsize,
        reject: Option<BrokerError>,
        report: Option<DeliveryReport>,
        held: Mutex<Vec<oneshot::Sender<DeliveryReport>>>,
    }

    #[async_trait]
    impl ProducerTransport for ScriptedTransport {
        fn submit(&self, _envelope: Envelope) -> Result<DeliveryReceiver, BrokerError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.reject {
                return Err(err.clone());
            }
            let (tx, rx) = oneshot::channel();
            match &self.report {
                Some(report) => {
                    let _ = tx.send(report.clone());
                }
                None => self.held.lock().unwrap().push(tx),
            }
            Ok(rx)
        }

        async fn fetch_metadata(&self, _timeout: Duration) -> Result<ClusterMetadata, BrokerError> {
            Ok(ClusterMetadata {
                brokers: vec![],
                topics: vec![],
            })
        }

        async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn producer(transport: ScriptedTransport) -> (Producer, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        (Producer::new(transport.clone()), transport)
    }

    #[tokio::test]
    async fn test_cancelled_context_submits_nothing() {
        let (producer, transport) = producer(ScriptedTransport::default());
        let ctx = Context::background();
        ctx.cancel();

        let err = producer.publish(&ctx, "orders", "k", "v").await.unwrap_err();
        assert!(matches!(err, MessagingError::Context(ContextError::Cancelled)));
        assert_eq!(transport.submitted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_delivery() {
        let delivered = DeliveryResult {
            topic: "orders".to_string(),
            partition: 0,
            offset: 7,
        };
        let (producer, _) = producer(ScriptedTransport {
            report: Some(Ok(delivered.clone())),
            ..Default::default()
        });

        let result = producer
            .publish(&Context::background(), "orders", "o-1", "{}")
            .await
            .unwrap();
        assert_eq!(result, delivered);
    }

    #[tokio::test]
    async fn test_synchronous_rejection() {
        let (producer, _) = producer(ScriptedTransport {
            reject: Some(BrokerError::QueueFull),
            ..Default::default()
        });

        let err = producer
            .publish(&Context::background(), "orders", "k", "v")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MessagingError::SubmitFailed {
                source: BrokerError::QueueFull,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delivery_error_keeps_position() {
        let (producer, _) = producer(ScriptedTransport {
            report: Some(Err(DeliveryError {
                partition: Some(1),
                offset: Some(3),
                error: BrokerError::Transport("not leader".to_string()),
            })),
            ..Default::default()
        });

        let err = producer
            .publish(&Context::background(), "orders", "k", "v")
            .await
            .unwrap_err();
        match err {
            MessagingError::DeliveryFailed {
                topic,
                partition,
                offset,
                ..
            } => {
                assert_eq!(topic, "orders");
                assert_eq!(partition, Some(1));
                assert_eq!(offset, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_while_waiting_for_report() {
        let (producer, transport) = producer(ScriptedTransport::default());
        let ctx = Context::background().with_timeout(Duration::from_millis(50));

        let err = producer.publish(&ctx, "orders", "k", "v").await.unwrap_err();
        assert!(matches!(err, MessagingError::Context(ContextError::DeadlineExceeded)));
        assert_eq!(transport.submitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_report_is_delivery_failure() {
        let (producer, transport) = producer(ScriptedTransport::default());
        let ctx = Context::background();

        let publish = producer.publish(&ctx, "orders", "k", "v");
        let drop_reports = async {
            tokio::task::yield_now().await;
            transport.held.lock().unwrap().clear();
        };
        let (result, ()) = tokio::join!(publish, drop_reports);

        assert!(matches!(
            result.unwrap_err(),
            MessagingError::DeliveryFailed {
                source: BrokerError::Closed,
                ..
            }
        ));
    }
}
