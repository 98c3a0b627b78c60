//! # Keelson
//!
//! Service scaffolding for processes that depend on optional backing
//! services: a lifecycle orchestrator that brings subsystems up in order
//! and tears them down in reverse, health aggregation across whatever is
//! running, and a broker messaging client with publish-with-ack and a
//! cancellable consume loop.
//!
//! ## Features
//!
//! - **Fail-fast startup**: the first subsystem that cannot start aborts
//!   the sequence, and nothing after it is touched
//! - **Best-effort shutdown**: every started subsystem is closed, in
//!   reverse order, and all failures are reported together
//! - **Explicit handles**: no globals; handles are resolved from the
//!   orchestrator by subsystem type
//! - **Cancellation everywhere**: every blocking call takes a [`Context`]
//!
//! ## Quick Start
//!
//! Requires the `kafka` feature.
//!
//! ```rust,ignore
//! use keelson::config::ConfigBuilder;
//! use keelson::lifecycle::Application;
//! use keelson::messaging::{KafkaConnector, MessagingSubsystem};
//!
//! #[tokio::main]
//! async fn main() -> keelson::Result<()> {
//!     let config = ConfigBuilder::new()
//!         .messaging(|m| m.enabled = true)
//!         .build()?;
//!
//!     let app = Application::builder(config)
//!         .register(MessagingSubsystem::new(KafkaConnector::new()))
//!         .start()
//!         .await?;
//!
//!     if let Some(client) = app.resolve::<MessagingSubsystem>().await {
//!         let ctx = app.context().child();
//!         let _ = client.publish(&ctx, "orders", "o-1", r#"{"amount":10}"#).await;
//!     }
//!
//!     app.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod common;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod messaging;

// Re-export core types
pub use common::ApiResponse;
pub use config::AppConfig;
pub use context::{Context, ContextError};
pub use error::{KeelsonError, Result};
pub use health::{HealthProbe, HealthReport};
pub use lifecycle::{Application, Orchestrator, Subsystem};
pub use messaging::{MessagingClient, MessagingSubsystem};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use keelson::prelude::*;
/// ```
pub mod prelude {
    pub use crate::common::ApiResponse;
    pub use crate::config::{AppConfig, ConfigBuilder};
    pub use crate::context::{Context, ContextError};
    pub use crate::error::{KeelsonError, Result};
    pub use crate::health::{HealthProbe, HealthReport, HealthStatus};
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, LifecycleError, LifecycleState, Orchestrator, Subsystem,
        shutdown_signal,
    };
    #[cfg(feature = "kafka")]
    pub use crate::messaging::KafkaConnector;
    #[cfg(any(test, feature = "testing"))]
    pub use crate::messaging::MemoryBroker;
    pub use crate::messaging::{
        BrokerConnector, DeliveryResult, Message, MessageHandler, MessagingClient, MessagingError,
        MessagingSubsystem,
    };
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
