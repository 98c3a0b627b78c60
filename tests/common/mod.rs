//! Shared test doubles

#![allow(dead_code)]

use async_trait::async_trait;
use keelson::config::{AppConfig, ConfigBuilder};
use keelson::{Context, Subsystem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log of lifecycle calls, e.g. `"init:mysql"`, `"close:redis"`
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Names passed to `op`, in call order
    pub fn calls(&self, op: &str) -> Vec<String> {
        let prefix = format!("{op}:");
        self.entries()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[derive(Clone)]
pub struct RecordingHandle {
    pub name: String,
    healthy: Arc<AtomicBool>,
}

impl RecordingHandle {
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

/// A subsystem that records every call and fails where it is told to
pub struct RecordingSubsystem {
    name: &'static str,
    journal: Journal,
    enabled: bool,
    fail_init: bool,
    fail_close: bool,
    fail_health: bool,
    close_delay: Option<Duration>,
}

impl RecordingSubsystem {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            enabled: true,
            fail_init: false,
            fail_close: false,
            fail_health: false,
            close_delay: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_health(mut self) -> Self {
        self.fail_health = true;
        self
    }

    pub fn slow_close(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }
}

#[async_trait]
impl Subsystem for RecordingSubsystem {
    type Handle = RecordingHandle;

    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self, _config: &AppConfig) -> bool {
        self.enabled
    }

    async fn init(&self, _ctx: &Context, _config: &AppConfig) -> anyhow::Result<RecordingHandle> {
        self.journal.record(format!("init:{}", self.name));
        if self.fail_init {
            anyhow::bail!("{} refused connection", self.name);
        }
        Ok(RecordingHandle {
            name: self.name.to_string(),
            healthy: Arc::new(AtomicBool::new(!self.fail_health)),
        })
    }

    async fn close(&self, handle: RecordingHandle) -> anyhow::Result<()> {
        self.journal.record(format!("close:{}", handle.name));
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_close {
            anyhow::bail!("{} did not close cleanly", self.name);
        }
        Ok(())
    }

    async fn health(&self, _ctx: &Context, handle: &RecordingHandle) -> anyhow::Result<()> {
        self.journal.record(format!("health:{}", handle.name));
        if !handle.healthy.load(Ordering::SeqCst) {
            anyhow::bail!("{} ping failed", self.name);
        }
        Ok(())
    }
}

/// Config with messaging enabled against the in-process broker
pub fn messaging_config(topics: &[(&str, u32)]) -> Arc<AppConfig> {
    let topics: Vec<keelson::config::TopicConfig> = topics
        .iter()
        .map(|(name, partitions)| keelson::config::TopicConfig {
            name: name.to_string(),
            partitions: *partitions,
        })
        .collect();
    ConfigBuilder::new()
        .messaging(|messaging| {
            messaging.enabled = true;
            messaging.topics = topics;
        })
        .build()
        .unwrap()
}
