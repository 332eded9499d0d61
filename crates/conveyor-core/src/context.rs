//! Cancellation and deadline token threaded through every queue operation.
//!
//! A [`Context`] pairs a [`CancellationToken`] with an optional deadline.
//! Children inherit cancellation from their parent and never extend the
//! parent's deadline. Cancellation is cooperative: code holding a context is
//! expected to check [`Context::is_done`] or await [`Context::done`].

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ConveyorError, Result};

/// Cancellable, deadline-bound execution token.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Wrap an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child that can be cancelled independently of this context.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that expires at `at` (or at the parent's deadline if earlier).
    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < at => parent,
            _ => at,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether `cancel` was called on this context or an ancestor.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Cancelled or expired.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast with `OperationCancelled` if the context is already done.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_done() {
            return Err(ConveyorError::OperationCancelled);
        }
        Ok(())
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
