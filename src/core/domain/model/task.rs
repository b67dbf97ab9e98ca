//! Asynchronous task (UPID) models.

use serde::{Deserialize, Serialize};

const UPID_PREFIX: &str = "UPID:";

/// Outcome of a write request: either the work already happened, or the
/// hypervisor queued a task that must be awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskHandle {
    Sync,
    Upid(String),
}

impl TaskHandle {
    /// Builds a handle from a response payload (`.data` of the API envelope,
    /// or the parsed output of a CLI call).
    pub fn from_response(data: &serde_json::Value) -> Self {
        match data.as_str() {
            Some(text) => Self::from_text(text),
            None => TaskHandle::Sync,
        }
    }

    /// Builds a handle from raw text; any line starting with `UPID:` wins.
    pub fn from_text(text: &str) -> Self {
        text.lines()
            .map(|line| line.trim().trim_matches('"'))
            .find(|line| is_upid(line))
            .map(|upid| TaskHandle::Upid(upid.to_string()))
            .unwrap_or(TaskHandle::Sync)
    }

    pub fn upid(&self) -> Option<&str> {
        match self {
            TaskHandle::Upid(upid) => Some(upid),
            TaskHandle::Sync => None,
        }
    }
}

pub fn is_upid(text: &str) -> bool {
    text.starts_with(UPID_PREFIX)
}

/// Node name embedded in a UPID (`UPID:{node}:...`).
pub fn upid_node(upid: &str) -> Option<&str> {
    upid.strip_prefix(UPID_PREFIX)?
        .split(':')
        .next()
        .filter(|node| !node.is_empty())
}

/// Status payload of `/nodes/{node}/tasks/{upid}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskStatus {
    /// `running` or `stopped`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exitstatus: Option<String>,
}

impl TaskStatus {
    pub fn is_stopped(&self) -> bool {
        self.status.eq_ignore_ascii_case("stopped")
    }

    /// A stopped task succeeded when its exit status is empty or `OK`.
    pub fn succeeded(&self) -> bool {
        match self.exitstatus.as_deref().map(str::trim) {
            None | Some("") | Some("OK") => true,
            Some(_) => false,
        }
    }

    pub fn exit_status(&self) -> &str {
        self.exitstatus.as_deref().unwrap_or("")
    }
}
