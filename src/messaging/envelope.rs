use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Target partition of an outgoing envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Let the broker pick (key hash, or round-robin for empty keys)
    Any,
    Fixed(i32),
}

/// Position in a partition's log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Offset {
    /// Not assigned yet; set by the broker on delivery
    Unset,
    /// Oldest record still in the log
    Beginning,
    /// Next record to be appended; only new messages are seen
    End,
    At(i64),
}

/// An outgoing message
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Correlates this envelope's log lines from submit to delivery
    pub message_id: Uuid,
    pub topic: String,
    pub key: Bytes,
    pub value: Bytes,
    pub partition: Partition,
    pub offset: Offset,
}

impl Envelope {
    /// An envelope with broker-assigned partition and offset
    pub fn new(topic: impl Into<String>, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
            partition: Partition::Any,
            offset: Offset::Unset,
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Partition::Fixed(partition);
        self
    }
}

/// Broker acknowledgment of one published envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message read from an assigned partition
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Key as UTF-8, if it is valid UTF-8
    pub fn key_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.key).ok()
    }

    /// Deserialize the value as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.value)
    }
}
