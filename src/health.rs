//! Health aggregation across started subsystems.
//!
//! The aggregator adds no timeout of its own: every probe receives the
//! caller's [`Context`] and is raced against it, so the caller's deadline
//! bounds the whole sweep.

use crate::context::Context;
use crate::lifecycle::LifecycleError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Something that can report whether it is healthy
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &Context) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Point-in-time health of every started subsystem
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub version: String,
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Folds probe results into one status
pub struct HealthAggregator<'a> {
    probes: Vec<&'a dyn HealthProbe>,
}

impl<'a> HealthAggregator<'a> {
    pub fn new(probes: Vec<&'a dyn HealthProbe>) -> Self {
        Self { probes }
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Check every probe in order
    ///
    /// Returns `Ok` only when all pass; otherwise a `HealthFailed` per
    /// failing probe, aggregated. A probe cut short by the context counts
    /// as failed with the context's error as cause.
    pub async fn check_all(&self, ctx: &Context) -> Result<(), LifecycleError> {
        let mut failures = Vec::new();
        for probe in &self.probes {
            if let Err(e) = run_probe(*probe, ctx).await {
                tracing::warn!(subsystem = %probe.name(), error = %e, "Health check failed");
                failures.push(LifecycleError::health_failed(probe.name(), e));
            }
        }
        LifecycleError::aggregate(failures)
    }

    /// Check every probe in order and record per-probe outcomes
    pub async fn report(&self, ctx: &Context) -> HealthReport {
        let mut checks = Vec::with_capacity(self.probes.len());
        let mut status = HealthStatus::Healthy;

        for probe in &self.probes {
            let start = Instant::now();
            let outcome = run_probe(*probe, ctx).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (check_status, message) = match outcome {
                Ok(()) => (CheckStatus::Pass, None),
                Err(e) => {
                    status = HealthStatus::Unhealthy;
                    (CheckStatus::Fail, Some(format!("{e:#}")))
                }
            };
            checks.push(CheckResult {
                name: probe.name().to_string(),
                status: check_status,
                message,
                duration_ms,
            });
        }

        HealthReport {
            status,
            checked_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks,
        }
    }
}

async fn run_probe(probe: &dyn HealthProbe, ctx: &Context) -> anyhow::Result<()> {
    match ctx.run(probe.check(ctx)).await {
        Ok(result) => result,
        Err(cancelled) => Err(cancelled.into()),
    }
}
