//! Lifecycle Orchestrator
//!
//! Owns the startup/shutdown state machine and every live subsystem handle.

use super::traits::{AnyHandle, Erased, ErasedSubsystem};
use super::{LifecycleError, LifecycleState, Result, Subsystem};
use crate::config::AppConfig;
use crate::context::Context;
use crate::health::{HealthAggregator, HealthProbe, HealthReport};
use async_trait::async_trait;
use std::any::TypeId;
use std::sync::Arc;
use std::time::Duration;

/// Default bound for a `close` started after the shutdown deadline
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(500);

/// A subsystem whose `init` succeeded and whose `close` has not run yet
struct StartedSubsystem {
    subsystem: Arc<dyn ErasedSubsystem>,
    handle: AnyHandle,
}

impl StartedSubsystem {
    fn name(&self) -> &str {
        self.subsystem.name()
    }
}

#[async_trait]
impl HealthProbe for StartedSubsystem {
    fn name(&self) -> &str {
        self.subsystem.name()
    }

    async fn check(&self, ctx: &Context) -> anyhow::Result<()> {
        self.subsystem.health(ctx, &*self.handle).await
    }
}

/// Sequences subsystem startup and teardown
///
/// Startup is fail-fast: the first `init` error stops the sequence.
/// Shutdown is best-effort: every started subsystem is closed in reverse
/// order of initialization, whatever happens to the others. A close that
/// outlives the shutdown context is abandoned (it keeps running in the
/// background) and the next one still starts, bounded by the close grace.
///
/// # Example
///
/// ```rust,ignore
/// use keelson::lifecycle::Orchestrator;
/// use keelson::messaging::{KafkaConnector, MessagingSubsystem};
///
/// let mut orchestrator = Orchestrator::builder()
///     .register(PostgresSubsystem::default())
///     .register(MessagingSubsystem::new(KafkaConnector::new()))
///     .build();
///
/// orchestrator.start(&ctx, config).await?;
/// let client = orchestrator.resolve::<MessagingSubsystem>().unwrap();
/// // ... serve traffic ...
/// orchestrator.shutdown(&ctx).await?;
/// ```
pub struct Orchestrator {
    subsystems: Vec<Arc<dyn ErasedSubsystem>>,
    started: Vec<StartedSubsystem>,
    state: LifecycleState,
    last_error: Option<String>,
    config: Option<Arc<AppConfig>>,
    close_grace: Duration,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            subsystems: Vec::new(),
            started: Vec::new(),
            state: LifecycleState::NotStarted,
            last_error: None,
            config: None,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Append a subsystem to the declaration order
    ///
    /// Registration after `start` has no effect on the running set.
    pub fn register<S: Subsystem>(&mut self, subsystem: S) -> &mut Self {
        self.subsystems.push(Arc::new(Erased(subsystem)));
        self
    }

    /// Bound for each `close` that starts once the shutdown context is done
    pub fn set_close_grace(&mut self, grace: Duration) -> &mut Self {
        self.close_grace = grace;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Names of started subsystems, in initialization order
    pub fn started(&self) -> Vec<&str> {
        self.started.iter().map(StartedSubsystem::name).collect()
    }

    pub fn is_started(&self, name: &str) -> bool {
        self.started.iter().any(|s| s.name() == name)
    }

    /// Names of every registered subsystem, in declaration order
    pub fn registered(&self) -> Vec<&str> {
        self.subsystems.iter().map(|s| s.name()).collect()
    }

    /// Config sections switched on that no registered subsystem is named after
    pub fn unbacked_sections(&self, config: &AppConfig) -> Vec<&'static str> {
        config
            .enabled_sections()
            .into_iter()
            .filter(|section| !self.subsystems.iter().any(|s| s.name() == *section))
            .collect()
    }

    /// Display form of the error that ended the last `start` or `shutdown`
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The snapshot passed to the last successful or partial `start`
    pub fn config(&self) -> Option<&Arc<AppConfig>> {
        self.config.as_ref()
    }

    /// Clone the handle of a started subsystem by its type
    pub fn resolve<S: Subsystem>(&self) -> Option<S::Handle> {
        let wanted = TypeId::of::<S>();
        self.started
            .iter()
            .find(|s| s.subsystem.subsystem_type() == wanted)
            .and_then(|s| s.handle.downcast_ref::<S::Handle>())
            .cloned()
    }

    /// Clone the handle of a started subsystem by its name
    pub fn resolve_named<H: Clone + 'static>(&self, name: &str) -> Option<H> {
        self.started
            .iter()
            .find(|s| s.name() == name)
            .and_then(|s| s.handle.downcast_ref::<H>())
            .cloned()
    }

    /// Initialize every enabled subsystem in declaration order
    ///
    /// Stops at the first failure and leaves earlier subsystems started;
    /// call [`shutdown`](Self::shutdown) to release them.
    pub async fn start(&mut self, ctx: &Context, config: Arc<AppConfig>) -> Result<()> {
        if !self.state.can_start() {
            return Err(LifecycleError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        self.state = LifecycleState::Starting;
        self.config = Some(Arc::clone(&config));
        tracing::info!(subsystems = self.subsystems.len(), "Starting subsystems...");

        for subsystem in &self.subsystems {
            let name = subsystem.name().to_string();
            if !subsystem.is_enabled(&config) {
                tracing::debug!(subsystem = %name, "Skipping disabled subsystem");
                continue;
            }

            tracing::debug!(subsystem = %name, "Initializing");
            let outcome = match ctx.run(subsystem.init(ctx, &config)).await {
                Ok(result) => result,
                Err(cancelled) => Err(cancelled.into()),
            };

            match outcome {
                Ok(handle) => {
                    tracing::info!(subsystem = %name, "Subsystem initialized");
                    self.started.push(StartedSubsystem {
                        subsystem: Arc::clone(subsystem),
                        handle,
                    });
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::error!(subsystem = %name, %error, "Subsystem failed to initialize");
                    let err = LifecycleError::init_failed(name, e);
                    self.state = LifecycleState::Failed;
                    self.last_error = Some(err.to_string());
                    return Err(err);
                }
            }
        }

        self.state = LifecycleState::Running;
        tracing::info!(started = self.started.len(), "Startup complete");
        Ok(())
    }

    /// [`start`](Self::start) bounded by `timeout`
    pub async fn start_with_timeout(
        &mut self,
        ctx: &Context,
        config: Arc<AppConfig>,
        timeout: Duration,
    ) -> Result<()> {
        let ctx = ctx.with_timeout(timeout);
        self.start(&ctx, config).await
    }

    /// Close every started subsystem in reverse order of initialization
    ///
    /// Idempotent: once `Stopped`, further calls return `Ok` without
    /// closing anything. Failures are logged and aggregated, never cut the
    /// sequence short, and the state ends `Stopped` regardless.
    ///
    /// Every started subsystem's `close` is called. One still pending when
    /// `ctx` is done is reported as failed and left running; each close
    /// started after that point gets the close grace instead.
    pub async fn shutdown(&mut self, ctx: &Context) -> Result<()> {
        if self.state == LifecycleState::Stopped {
            tracing::debug!("Shutdown requested but already stopped");
            return Ok(());
        }

        self.state = LifecycleState::ShuttingDown;
        tracing::info!(started = self.started.len(), "Shutting down subsystems...");

        let mut failures = Vec::new();
        while let Some(started) = self.started.pop() {
            let StartedSubsystem { subsystem, handle } = started;
            let name = subsystem.name().to_string();
            tracing::debug!(subsystem = %name, "Closing");

            // Detached so an abandoned close still runs to completion
            let mut close = tokio::spawn(async move { subsystem.close(handle).await });
            let joined = match ctx.err() {
                None => ctx.run(&mut close).await.map_err(anyhow::Error::from),
                Some(expired) => {
                    tracing::warn!(subsystem = %name, grace = ?self.close_grace, "Closing after shutdown deadline");
                    tokio::time::timeout(self.close_grace, &mut close)
                        .await
                        .map_err(|_| anyhow::Error::from(expired))
                }
            };
            let outcome = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(anyhow::anyhow!("close task failed: {join_err}")),
                Err(abandoned) => Err(abandoned),
            };

            match outcome {
                Ok(()) => tracing::info!(subsystem = %name, "Subsystem closed"),
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::error!(subsystem = %name, %error, "Subsystem failed to close");
                    failures.push(LifecycleError::close_failed(name, e));
                }
            }
        }

        self.state = LifecycleState::Stopped;
        let result = LifecycleError::aggregate(failures);
        match &result {
            Ok(()) => tracing::info!("Shutdown complete"),
            Err(e) => {
                tracing::warn!(failed = ?e.subsystems(), "Shutdown complete with failures");
                self.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// [`shutdown`](Self::shutdown) bounded by `timeout`
    pub async fn shutdown_with_timeout(&mut self, ctx: &Context, timeout: Duration) -> Result<()> {
        let ctx = ctx.with_timeout(timeout);
        self.shutdown(&ctx).await
    }

    fn aggregator(&self) -> HealthAggregator<'_> {
        HealthAggregator::new(
            self.started
                .iter()
                .map(|s| s as &dyn HealthProbe)
                .collect(),
        )
    }

    /// Probe every started subsystem
    pub async fn check_all(&self, ctx: &Context) -> Result<()> {
        self.aggregator().check_all(ctx).await
    }

    /// Probe every started subsystem and report per-subsystem outcomes
    pub async fn health_report(&self, ctx: &Context) -> HealthReport {
        self.aggregator().report(ctx).await
    }
}

/// Builder fixing the declaration order of subsystems
#[derive(Default)]
pub struct OrchestratorBuilder {
    orchestrator: Orchestrator,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem; registration order is startup order
    pub fn register<S: Subsystem>(mut self, subsystem: S) -> Self {
        self.orchestrator.register(subsystem);
        self
    }

    pub fn close_grace(mut self, grace: Duration) -> Self {
        self.orchestrator.set_close_grace(grace);
        self
    }

    pub fn build(self) -> Orchestrator {
        self.orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct TestSubsystem {
        name: &'static str,
        enabled: bool,
        fail_init: bool,
        journal: Journal,
    }

    impl TestSubsystem {
        fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                enabled: true,
                fail_init: false,
                journal: Arc::clone(journal),
            }
        }
    }

    #[async_trait]
    impl Subsystem for TestSubsystem {
        type Handle = String;

        fn name(&self) -> &str {
            self.name
        }

        fn is_enabled(&self, _config: &AppConfig) -> bool {
            self.enabled
        }

        async fn init(&self, _ctx: &Context, _config: &AppConfig) -> anyhow::Result<String> {
            self.journal.lock().unwrap().push(format!("init:{}", self.name));
            if self.fail_init {
                anyhow::bail!("connection refused");
            }
            Ok(format!("{}-handle", self.name))
        }

        async fn close(&self, handle: String) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(format!("close:{handle}"));
            Ok(())
        }

        async fn health(&self, _ctx: &Context, _handle: &String) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn config() -> Arc<AppConfig> {
        Arc::new(AppConfig::default())
    }

    #[tokio::test]
    async fn test_start_then_shutdown_reverse_order() {
        let journal = Journal::default();
        let mut orchestrator = Orchestrator::builder()
            .register(TestSubsystem::new("mysql", &journal))
            .register(TestSubsystem::new("redis", &journal))
            .register(TestSubsystem::new("messaging", &journal))
            .build();

        let ctx = Context::background();
        orchestrator.start(&ctx, config()).await.unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Running);
        assert_eq!(orchestrator.started(), vec!["mysql", "redis", "messaging"]);

        orchestrator.shutdown(&ctx).await.unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Stopped);
        assert!(orchestrator.started().is_empty());

        let journal = journal.lock().unwrap();
        assert_eq!(
            *journal,
            vec![
                "init:mysql",
                "init:redis",
                "init:messaging",
                "close:messaging-handle",
                "close:redis-handle",
                "close:mysql-handle",
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled_subsystem_is_skipped() {
        let journal = Journal::default();
        let mut disabled = TestSubsystem::new("elasticsearch", &journal);
        disabled.enabled = false;
        let mut orchestrator = Orchestrator::builder()
            .register(disabled)
            .register(TestSubsystem::new("redis", &journal))
            .build();

        orchestrator.start(&Context::background(), config()).await.unwrap();
        assert_eq!(orchestrator.started(), vec!["redis"]);
        assert_eq!(orchestrator.registered(), vec!["elasticsearch", "redis"]);
        assert_eq!(*journal.lock().unwrap(), vec!["init:redis"]);
    }

    #[tokio::test]
    async fn test_resolve_handles() {
        let journal = Journal::default();
        let mut orchestrator = Orchestrator::builder()
            .register(TestSubsystem::new("redis", &journal))
            .build();

        assert!(orchestrator.resolve::<TestSubsystem>().is_none());
        orchestrator.start(&Context::background(), config()).await.unwrap();
        assert_eq!(orchestrator.resolve::<TestSubsystem>().as_deref(), Some("redis-handle"));
        assert_eq!(orchestrator.resolve_named::<String>("redis").as_deref(), Some("redis-handle"));
        assert!(orchestrator.resolve_named::<u32>("redis").is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut orchestrator = Orchestrator::new();
        orchestrator.start(&Context::background(), config()).await.unwrap();
        let err = orchestrator.start(&Context::background(), config()).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState { operation: "start", state: LifecycleState::Running }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_first_enabled_init() {
        let journal = Journal::default();
        let mut orchestrator = Orchestrator::builder()
            .register(TestSubsystem::new("postgres", &journal))
            .build();

        let ctx = Context::background();
        ctx.cancel();
        let err = orchestrator.start(&ctx, config()).await.unwrap_err();

        assert!(matches!(err, LifecycleError::InitFailed { ref subsystem, .. } if subsystem == "postgres"));
        assert_eq!(orchestrator.state(), LifecycleState::Failed);
        assert!(journal.lock().unwrap().is_empty());
    }
}
