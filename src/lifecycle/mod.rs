//! Lifecycle Module
//!
//! Brings optional backing subsystems up in a fixed order and tears them
//! down deterministically.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Configuration snapshot (immutable Arc<AppConfig>)
//!    ↓
//! 2. Subsystem registration (declaration order)
//!    ↓
//! 3. start: init each enabled subsystem      ← fail-fast
//!    ↓
//! 4. Serve traffic (handles resolved from the orchestrator)
//!    ↓
//! 5. Shutdown signal (SIGTERM/SIGINT)
//!    ↓
//! 6. shutdown: close in reverse init order   ← best-effort, idempotent
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use keelson::lifecycle::{Orchestrator, Subsystem};
//! use keelson::Context;
//!
//! let mut orchestrator = Orchestrator::builder()
//!     .register(MySqlSubsystem::default())
//!     .register(RedisSubsystem::default())
//!     .build();
//!
//! let ctx = Context::background();
//! if let Err(e) = orchestrator.start(&ctx, config).await {
//!     tracing::error!("{e}");
//!     orchestrator.shutdown(&ctx).await.ok();
//!     std::process::exit(1);
//! }
//! ```

mod application;
mod error;
mod orchestrator;
mod shutdown;
mod state;
mod traits;

pub use application::{Application, ApplicationBuilder};
pub use error::{LifecycleError, Result};
pub use orchestrator::{DEFAULT_CLOSE_GRACE, Orchestrator, OrchestratorBuilder};
pub use shutdown::shutdown_signal;
pub use state::LifecycleState;
pub use traits::Subsystem;
