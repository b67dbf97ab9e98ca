//! Polls hypervisor tasks (UPIDs) until they stop.

use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult};
use crate::core::domain::model::task::{TaskHandle, TaskStatus, upid_node};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Where a transport reads task status from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    async fn task_status(&self, ctx: &OpContext, node: &str, upid: &str)
    -> BackendResult<TaskStatus>;
}

/// Exponential-backoff poller shared by both transports.
#[derive(Debug, Clone, Copy)]
pub struct TaskWaiter {
    initial_wait: Duration,
    max_wait: Duration,
}

impl Default for TaskWaiter {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(5),
        }
    }
}

impl TaskWaiter {
    pub fn with_backoff(initial_wait: Duration, max_wait: Duration) -> Self {
        Self {
            initial_wait,
            max_wait: max_wait.max(initial_wait),
        }
    }

    /// Waits for `handle` to reach a terminal state.
    ///
    /// Synchronous handles return immediately. Status is read from the node
    /// embedded in the UPID, falling back to `node`. A stopped task succeeds when
    /// its exit status is empty or `OK`; anything else is
    /// [`BackendError::TaskFailed`]. Cancellation and status-read errors
    /// propagate unchanged.
    pub async fn wait(
        &self,
        ctx: &OpContext,
        source: &(dyn TaskStatusSource + '_),
        node: &str,
        handle: &TaskHandle,
    ) -> BackendResult<()> {
        let Some(upid) = handle.upid() else {
            return Ok(());
        };
        // Clones may run on the template's node; the UPID names it.
        let node = upid_node(upid).unwrap_or(node);

        let mut wait = self.initial_wait;
        loop {
            ctx.check()?;
            let status = source.task_status(ctx, node, upid).await?;
            if status.is_stopped() {
                if status.succeeded() {
                    debug!(upid, node, "task finished");
                    return Ok(());
                }
                return Err(BackendError::TaskFailed {
                    upid: upid.to_string(),
                    exit_status: status.exit_status().to_string(),
                });
            }
            ctx.sleep(wait).await?;
            wait = (wait * 2).min(self.max_wait);
        }
    }
}
