use thiserror::Error;

/// Details of a CLI invocation that exited unsuccessfully.
#[derive(Debug, Clone)]
pub struct CommandFailureInfo {
    /// Display form of the command line (quoted for humans, never executed).
    pub command: String,
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandFailureInfo {
    /// The most useful human-readable message the tool produced.
    pub fn message(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

impl std::fmt::Display for CommandFailureInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "command [{}] failed with exit code {}", self.command, code)?,
            None => write!(f, "command [{}] terminated by signal", self.command)?,
        }
        let message = self.message();
        if !message.is_empty() {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// The main error type for backend operations.
///
/// The first four variants are the stable, caller-visible kinds every
/// transport maps known remote failures onto. Everything else is surfaced
/// wrapped with the remote message preserved.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The target VM does not exist on the node
    #[error("vm not found: {0}")]
    VmNotFound(String),

    /// The target volume does not exist on the storage
    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    /// Neither the guest agent nor the DHCP leases produced an address in time
    ///
    /// # Fields
    /// * `vmid` - The VM that was queried
    /// * `agent` - Last failure reported by the guest agent source
    /// * `lease` - Last failure reported by the DHCP lease source
    #[error("guest ip not found for vm {vmid} (agent: {agent}; dhcp leases: {lease})")]
    GuestIpNotFound {
        vmid: u32,
        agent: String,
        lease: String,
    },

    /// A ZFS-only volume operation was requested on another storage type
    #[error("storage {storage} has type {storage_type:?}; volume snapshots and clones require zfs")]
    StorageUnsupported {
        storage: String,
        storage_type: String,
    },

    /// An asynchronous hypervisor task ended with a non-OK exit status
    #[error("task {upid} failed: {exit_status}")]
    TaskFailed { upid: String, exit_status: String },

    /// The HTTP API answered with a non-success status
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A CLI tool exited unsuccessfully
    #[error("{0}")]
    Command(Box<CommandFailureInfo>),

    /// A CLI argument was refused before anything was executed
    #[error("unsafe command argument {arg:?}: {reason}")]
    UnsafeArgument { arg: String, reason: String },

    /// The caller's context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline (or the command timeout) passed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Transport-level failures (connect, TLS, client construction)
    #[error("connection error: {0}")]
    Connection(String),

    /// A remote payload could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Local filesystem or process I/O failures
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Input rejected before any remote call
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl BackendError {
    pub fn is_vm_not_found(&self) -> bool {
        matches!(self, BackendError::VmNotFound(_))
    }

    pub fn is_volume_not_found(&self) -> bool {
        matches!(self, BackendError::VolumeNotFound(_))
    }

    pub fn is_guest_ip_not_found(&self) -> bool {
        matches!(self, BackendError::GuestIpNotFound { .. })
    }

    pub fn is_storage_unsupported(&self) -> bool {
        matches!(self, BackendError::StorageUnsupported { .. })
    }

    /// True for both explicit cancellation and deadline expiry.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled | BackendError::DeadlineExceeded)
    }

    /// The remote's human-readable text, used for error classification.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            BackendError::Api { message, .. } => Some(message),
            BackendError::Command(info) => Some(info.message()),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BackendError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn field(field: &str, message: impl Into<String>) -> Self {
        BackendError::Validation(ValidationError::Field {
            field: field.to_string(),
            message: message.into(),
        })
    }
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    ///
    /// # Fields
    /// * `0` - Description of the format violation
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    ///
    /// # Fields
    /// * `0` - Description of the constraint violation
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Type alias for Results that may fail with a BackendError
pub type BackendResult<T> = Result<T, BackendError>;
