//! Subsystem contract
//!
//! A subsystem is an optional backing dependency (database, cache, search
//! index, broker) that the orchestrator brings up and tears down. Its
//! connection lives in a `Handle` value produced by `init` and consumed by
//! `close`.

use crate::config::AppConfig;
use crate::context::Context;
use async_trait::async_trait;
use std::any::{Any, TypeId};

/// A named, independently enable-able backing service
///
/// Implementations should be cheap to construct and do no I/O until
/// `init` is called.
///
/// # Example
///
/// ```rust,ignore
/// use keelson::lifecycle::Subsystem;
/// use keelson::{AppConfig, Context};
/// use async_trait::async_trait;
///
/// pub struct RedisSubsystem;
///
/// #[async_trait]
/// impl Subsystem for RedisSubsystem {
///     type Handle = redis::aio::ConnectionManager;
///
///     fn name(&self) -> &str {
///         "redis"
///     }
///
///     fn is_enabled(&self, config: &AppConfig) -> bool {
///         config.cache.redis.enabled
///     }
///
///     async fn init(&self, ctx: &Context, config: &AppConfig) -> anyhow::Result<Self::Handle> {
///         let redis = &config.cache.redis;
///         let client = redis::Client::open(format!("redis://{}:{}", redis.host, redis.port))?;
///         Ok(ctx.run(client.get_connection_manager()).await??)
///     }
///
///     async fn close(&self, _handle: Self::Handle) -> anyhow::Result<()> {
///         Ok(())
///     }
///
///     async fn health(&self, ctx: &Context, handle: &Self::Handle) -> anyhow::Result<()> {
///         let mut conn = handle.clone();
///         ctx.run(redis::cmd("PING").query_async::<String>(&mut conn)).await??;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Subsystem: Send + Sync + 'static {
    /// Live connection state, handed out to request-handling code by clone
    type Handle: Clone + Send + Sync + 'static;

    /// Stable name used in logs and errors
    fn name(&self) -> &str;

    /// Read this subsystem's `enabled` flag from the snapshot
    fn is_enabled(&self, config: &AppConfig) -> bool;

    /// Connect and verify the dependency is reachable
    async fn init(&self, ctx: &Context, config: &AppConfig) -> anyhow::Result<Self::Handle>;

    /// Release the handle; called at most once per successful `init`
    async fn close(&self, handle: Self::Handle) -> anyhow::Result<()>;

    /// Probe the live handle
    async fn health(&self, ctx: &Context, handle: &Self::Handle) -> anyhow::Result<()>;
}

pub(crate) type AnyHandle = Box<dyn Any + Send + Sync>;

/// Object-safe view of a [`Subsystem`] with its handle type erased
#[async_trait]
pub(crate) trait ErasedSubsystem: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self, config: &AppConfig) -> bool;

    /// `TypeId` of the concrete subsystem, for typed handle lookup
    fn subsystem_type(&self) -> TypeId;

    async fn init(&self, ctx: &Context, config: &AppConfig) -> anyhow::Result<AnyHandle>;

    async fn close(&self, handle: AnyHandle) -> anyhow::Result<()>;

    async fn health(&self, ctx: &Context, handle: &(dyn Any + Send + Sync)) -> anyhow::Result<()>;
}

pub(crate) struct Erased<S>(pub(crate) S);

#[async_trait]
impl<S: Subsystem> ErasedSubsystem for Erased<S> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn is_enabled(&self, config: &AppConfig) -> bool {
        self.0.is_enabled(config)
    }

    fn subsystem_type(&self) -> TypeId {
        TypeId::of::<S>()
    }

    async fn init(&self, ctx: &Context, config: &AppConfig) -> anyhow::Result<AnyHandle> {
        let handle = self.0.init(ctx, config).await?;
        Ok(Box::new(handle))
    }

    async fn close(&self, handle: AnyHandle) -> anyhow::Result<()> {
        let handle = handle
            .downcast::<S::Handle>()
            .map_err(|_| anyhow::anyhow!("handle type mismatch for {}", self.0.name()))?;
        self.0.close(*handle).await
    }

    async fn health(&self, ctx: &Context, handle: &(dyn Any + Send + Sync)) -> anyhow::Result<()> {
        let handle = handle
            .downcast_ref::<S::Handle>()
            .ok_or_else(|| anyhow::anyhow!("handle type mismatch for {}", self.0.name()))?;
        self.0.health(ctx, handle).await
    }
}
