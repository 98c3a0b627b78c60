//! HTTP surface for orchestrator health
//!
//! - `GET /health` probes every started subsystem; 200 when all pass, 503
//!   otherwise, with the per-subsystem report as the body either way
//! - `GET /livez` reports the lifecycle state without touching any backend
//! - anything else answers 404 in the same envelope

use crate::common::{ApiResponse, ErrorCode};
use crate::health::{CheckStatus, HealthReport};
use crate::lifecycle::{Application, LifecycleState};
use axum::{Router, extract::State, routing::get};
use serde::Serialize;
use std::future::Future;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    pub state: LifecycleState,
    pub started: Vec<String>,
}

/// Build the router; every handler shares the application handle
pub fn router(app: Application) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/livez", get(livez))
        .fallback(not_found)
        .with_state(app)
}

async fn health(State(app): State<Application>) -> ApiResponse<HealthReport> {
    let report = app.health_report().await;
    if report.is_healthy() {
        return ApiResponse::success(report);
    }
    let failing = report
        .checks
        .iter()
        .filter(|check| check.status == CheckStatus::Fail)
        .count();
    let message = format!("{failing} of {} checks failing", report.checks.len());
    ApiResponse::success(report).with_error(ErrorCode::ServiceUnavailable, message)
}

async fn livez(State(app): State<Application>) -> ApiResponse<Liveness> {
    let orchestrator = app.orchestrator().read().await;
    let state = orchestrator.state();
    let liveness = Liveness {
        state,
        started: orchestrator.started().into_iter().map(String::from).collect(),
    };
    if state == LifecycleState::Running {
        ApiResponse::success(liveness)
    } else {
        ApiResponse::success(liveness)
            .with_error(ErrorCode::ServiceUnavailable, format!("lifecycle state is {state}"))
    }
}

async fn not_found() -> ApiResponse<()> {
    ApiResponse::error(ErrorCode::NotFound, "no such route")
}

/// Serve `app` on `listener` until `shutdown` resolves
pub async fn serve<F>(app: Application, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
