//! Application Bootstrap
//!
//! Ties the configuration snapshot, the orchestrator and a root
//! cancellation context together for a hosting process.

use super::{Orchestrator, Result, Subsystem};
use crate::config::AppConfig;
use crate::context::Context;
use crate::health::HealthReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A started application
///
/// Cheap to clone; every clone shares the same orchestrator and root
/// context. Cancelling the root context (which `shutdown` does first)
/// stops every long-running operation derived from it, such as consume
/// loops.
///
/// # Example
///
/// ```rust,ignore
/// use keelson::lifecycle::Application;
/// use keelson::messaging::{KafkaConnector, MessagingSubsystem};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let app = Application::builder(config)
///         .register(MessagingSubsystem::new(KafkaConnector::new()))
///         .start()
///         .await?;
///
///     // Serve traffic...
///
///     app.shutdown().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Application {
    config: Arc<AppConfig>,
    orchestrator: Arc<RwLock<Orchestrator>>,
    root: Context,
    shutdown_timeout: Duration,
}

impl Application {
    pub fn builder(config: Arc<AppConfig>) -> ApplicationBuilder {
        ApplicationBuilder::new(config)
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Root context; derive request and worker contexts from it
    pub fn context(&self) -> &Context {
        &self.root
    }

    pub fn orchestrator(&self) -> &Arc<RwLock<Orchestrator>> {
        &self.orchestrator
    }

    /// Clone the handle of a started subsystem by its type
    pub async fn resolve<S: Subsystem>(&self) -> Option<S::Handle> {
        self.orchestrator.read().await.resolve::<S>()
    }

    /// Probe every started subsystem, bounded by `lifecycle.health_timeout_secs`
    pub async fn check_all(&self) -> Result<()> {
        let ctx = self.root.with_timeout(self.config.lifecycle.health_timeout());
        self.orchestrator.read().await.check_all(&ctx).await
    }

    /// Same probes as [`check_all`](Self::check_all), reported per subsystem
    pub async fn health_report(&self) -> HealthReport {
        let ctx = self.root.with_timeout(self.config.lifecycle.health_timeout());
        self.orchestrator.read().await.health_report(&ctx).await
    }

    /// Cancel the root context, then close every started subsystem
    ///
    /// Bounded by `lifecycle.shutdown_timeout_secs`, plus
    /// `lifecycle.close_grace_ms` for each close still queued once that
    /// passes, so a stuck `close` cannot keep the process alive. Calling it
    /// again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.root.cancel();

        let ctx = Context::background();
        let result = self
            .orchestrator
            .write()
            .await
            .shutdown_with_timeout(&ctx, self.shutdown_timeout)
            .await;

        tracing::info!("Application shutdown complete");
        result
    }
}

/// Builder for Application
pub struct ApplicationBuilder {
    config: Arc<AppConfig>,
    orchestrator: Orchestrator,
    root: Context,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ApplicationBuilder {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let startup_timeout = config.lifecycle.startup_timeout();
        let shutdown_timeout = config.lifecycle.shutdown_timeout();
        Self {
            config,
            orchestrator: Orchestrator::new(),
            root: Context::background(),
            startup_timeout,
            shutdown_timeout,
        }
    }

    /// Register a subsystem; registration order is startup order
    pub fn register<S: Subsystem>(mut self, subsystem: S) -> Self {
        self.orchestrator.register(subsystem);
        self
    }

    /// Use `root` as the application's root context instead of a fresh one
    pub fn context(mut self, root: Context) -> Self {
        self.root = root;
        self
    }

    /// Override `lifecycle.startup_timeout_secs`
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Override `lifecycle.shutdown_timeout_secs`
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start every enabled subsystem
    ///
    /// # Errors
    ///
    /// Returns the `InitFailed` error of the first subsystem that failed.
    /// Subsystems that had already started are closed (best-effort) before
    /// the error is returned, so the process can exit without leaking them.
    pub async fn start(self) -> Result<Application> {
        let Self {
            config,
            mut orchestrator,
            root,
            startup_timeout,
            shutdown_timeout,
        } = self;

        tracing::info!(
            app = %config.app.name,
            version = %config.app.version,
            env = %config.app.env,
            "Starting application initialization..."
        );

        for section in orchestrator.unbacked_sections(&config) {
            tracing::warn!(section, "Section is enabled but no subsystem is registered for it");
        }
        orchestrator.set_close_grace(config.lifecycle.close_grace());

        if let Err(err) = orchestrator
            .start_with_timeout(&root, Arc::clone(&config), startup_timeout)
            .await
        {
            if !orchestrator.started().is_empty() {
                tracing::warn!(started = ?orchestrator.started(), "Releasing partially started subsystems");
                let cleanup = Context::background();
                if let Err(cleanup_err) = orchestrator.shutdown_with_timeout(&cleanup, shutdown_timeout).await {
                    tracing::error!(error = %cleanup_err, "Cleanup after failed startup reported errors");
                }
            }
            root.cancel();
            return Err(err);
        }

        tracing::info!("Application initialization complete");
        Ok(Application {
            config,
            orchestrator: Arc::new(RwLock::new(orchestrator)),
            root,
            shutdown_timeout,
        })
    }
}

