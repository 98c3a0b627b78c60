//! Cancellable, deadline-bearing request context
//!
//! Every blocking operation in keelson (`publish`, `consume`, `health`,
//! `init`, `close`) takes a [`Context`] and returns promptly once it is
//! cancelled or its deadline passes.
//!
//! ```rust,ignore
//! use keelson::context::Context;
//! use std::time::Duration;
//!
//! let ctx = Context::background().with_timeout(Duration::from_secs(5));
//! let delivery = client.publish(&ctx, "orders", b"o-1", payload).await?;
//! ```

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped being live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context (or one of its parents) was cancelled explicitly
    #[error("context cancelled")]
    Cancelled,

    /// The context's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A cancellation scope with an optional deadline.
///
/// Cloning a context shares its cancellation state. Use [`Context::child`]
/// or [`Context::with_timeout`] to derive a narrower scope: cancelling the
/// parent cancels every child, never the other way around.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A root context that is never cancelled on its own
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child that shares this context's deadline
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child whose deadline is at most `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child whose deadline is at most `deadline`
    ///
    /// A parent deadline that is earlier always wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the reason this context is done, or `None` while it is live
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => ContextError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Run `future` unless the context finishes first
    ///
    /// The future is polled before the context on every wake-up, so work
    /// that is already complete wins over a simultaneous cancellation.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, ContextError>
    where
        F: std::future::Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            output = future => Ok(output),
            err = self.done() => Err(err),
        }
    }
}
