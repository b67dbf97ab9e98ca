//! Cancellation and deadline carrier threaded through every backend call.

use crate::core::domain::error::{BackendError, BackendResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call context: a cancellation token plus an optional deadline.
///
/// Every suspension point inside the backends (HTTP I/O, subprocess wait,
/// lease-file reads, poll sleeps) goes through [`OpContext::run`] or
/// [`OpContext::sleep`], so cancelling the token or passing the deadline
/// ends the call within one poll interval.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A background context: never cancelled unless the token is, no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a caller-owned cancellation token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Derives a context that additionally expires after `timeout`.
    ///
    /// The resulting deadline is the earlier of the parent's and `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// Derives a context with an absolute deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels this context and every context sharing its token.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the context's error if it has already ended.
    pub fn check(&self) -> BackendResult<()> {
        if self.cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BackendError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Interruptible sleep.
    pub async fn sleep(&self, duration: Duration) -> BackendResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// Drives `fut` to completion unless the context ends first.
    pub async fn run<T, F>(&self, fut: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        self.check()?;
        let deadline = self.deadline;
        let expiry = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BackendError::Cancelled),
            _ = expiry => Err(BackendError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
