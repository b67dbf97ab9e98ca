//! Safe invocation of the hypervisor CLI tools.
//!
//! Arguments always travel as argv entries. Nothing here concatenates a
//! command into a shell string; the bash runner hands its arguments to
//! `exec "$@"` positionally.

use crate::core::domain::context::OpContext;
use crate::core::domain::error::{BackendError, BackendResult, CommandFailureInfo};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Rejects arguments carrying control bytes (anything below 0x20, and DEL).
pub fn validate_arg(arg: &str) -> BackendResult<()> {
    if let Some(byte) = arg.bytes().find(|b| *b < 0x20 || *b == 0x7f) {
        return Err(BackendError::UnsafeArgument {
            arg: arg.escape_debug().to_string(),
            reason: format!("contains control byte 0x{:02x}", byte),
        });
    }
    Ok(())
}

pub fn validate_args(name: &str, args: &[String]) -> BackendResult<()> {
    if name.trim().is_empty() {
        return Err(BackendError::UnsafeArgument {
            arg: String::new(),
            reason: "command name is empty".to_string(),
        });
    }
    validate_arg(name)?;
    args.iter().try_for_each(|arg| validate_arg(arg))
}

fn is_plain(arg: &str) -> bool {
    !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '@' | '+' | '%')
        })
}

/// Quotes one argument for display with POSIX single-quote rules.
pub fn quote_for_display(arg: &str) -> String {
    if is_plain(arg) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Renders a command line for logs and error messages. Never executed.
pub fn display_command(name: &str, args: &[String]) -> String {
    std::iter::once(name)
        .chain(args.iter().map(String::as_str))
        .map(quote_for_display)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs one CLI tool and returns its stdout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `name args...`. A non-zero exit maps to [`BackendError::Command`]
    /// with stderr preserved for classification.
    async fn run(&self, ctx: &OpContext, name: &str, args: &[String]) -> BackendResult<String>;
}

/// Executes tools directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecRunner;

/// Executes tools through `bash -c 'exec "$@"' bash <name> <args...>` so the
/// tool inherits bash's environment while bash never parses the arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct BashRunner;

pub(crate) const BASH_EXEC_SCRIPT: &str = r#"exec "$@""#;

#[async_trait]
impl CommandRunner for ExecRunner {
    async fn run(&self, ctx: &OpContext, name: &str, args: &[String]) -> BackendResult<String> {
        validate_args(name, args)?;
        let mut command = Command::new(name);
        command.args(args);
        execute(ctx, command, name, args).await
    }
}

#[async_trait]
impl CommandRunner for BashRunner {
    async fn run(&self, ctx: &OpContext, name: &str, args: &[String]) -> BackendResult<String> {
        validate_args(name, args)?;
        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(BASH_EXEC_SCRIPT)
            .arg("bash")
            .arg(name)
            .args(args);
        execute(ctx, command, name, args).await
    }
}

// Spawns the process and checks the exit code. The child is killed if the
// context ends first.
async fn execute(
    ctx: &OpContext,
    mut command: Command,
    name: &str,
    args: &[String],
) -> BackendResult<String> {
    let shown = display_command(name, args);
    debug!(command = %shown, "running command");

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = ctx
        .run(async {
            command
                .output()
                .await
                .map_err(|err| BackendError::io(format!("failed to execute [{}]", shown), err))
        })
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        return Err(BackendError::Command(Box::new(CommandFailureInfo {
            command: shown,
            status: output.status.code(),
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })));
    }
    Ok(stdout)
}
