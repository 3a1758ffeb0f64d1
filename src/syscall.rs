// SPDX-License-Identifier: MIT

//! External command invocation.
//!
//! Every external collaborator of this tool (git, hg, configure, make, the
//! webrev script, rsync) is an opaque command-line program. This module
//! wraps [`std::process::Command`] in the two shapes the rest of the crate
//! needs: inherit the terminal for long-running interactive work, or capture
//! combined output for commands whose text we inspect or relay.

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Command,
};
use tracing::debug;

/// Run a command with inherited stdio.
///
/// Blocks until the command finishes. Used for builds and other long-running
/// work whose output should stream straight to the user's terminal.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if the command cannot be started.
/// - Return [`SyscallError::Failed`] on a non-zero exit status.
pub fn interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<()> {
    interactive_in(Path::new("."), cmd, args)
}

/// Run a command with inherited stdio in a specific working directory.
///
/// Same semantics as [`interactive`]; used for build steps that must run
/// inside a variant's output directory.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if the command cannot be started.
/// - Return [`SyscallError::Failed`] on a non-zero exit status.
pub fn interactive_in(
    dir: impl AsRef<Path>,
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<()> {
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    debug!(
        "calling: {:?} {:?} (in {})",
        cmd.as_ref(),
        args,
        dir.as_ref().display()
    );

    let status = Command::new(cmd.as_ref())
        .args(&args)
        .current_dir(dir.as_ref())
        .spawn()
        .map_err(|err| spawn_error(cmd.as_ref(), err))?
        .wait()
        .map_err(|err| spawn_error(cmd.as_ref(), err))?;

    if !status.success() {
        return Err(SyscallError::Failed {
            command: cmd.as_ref().to_string_lossy().into_owned(),
            output: String::new(),
        });
    }

    Ok(())
}

/// Run a command and capture its combined output.
///
/// Stdout and stderr are concatenated, with a trailing newline chomped.
/// Non-zero exit status is an error carrying that combined output, so the
/// caller's diagnostic shows what the tool actually said.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if the command cannot be started.
/// - Return [`SyscallError::Failed`] on a non-zero exit status.
pub fn captured(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<String> {
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    debug!("calling: {:?} {:?}", cmd.as_ref(), args);

    let output = Command::new(cmd.as_ref())
        .args(&args)
        .output()
        .map_err(|err| spawn_error(cmd.as_ref(), err))?;

    let mut message = String::new();
    message.push_str(String::from_utf8_lossy(&output.stdout).as_ref());
    message.push_str(String::from_utf8_lossy(&output.stderr).as_ref());

    // INVARIANT: Chomp trailing newline.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(SyscallError::Failed {
            command: cmd.as_ref().to_string_lossy().into_owned(),
            output: message,
        });
    }

    debug!("out: {message}");
    Ok(message)
}

fn spawn_error(cmd: &OsStr, err: std::io::Error) -> SyscallError {
    SyscallError::Spawn {
        source: err,
        command: cmd.to_string_lossy().into_owned(),
    }
}

/// External command error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Command could not be started at all.
    #[error("failed to spawn {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Command ran but exited with a non-zero status.
    #[error("command {command:?} failed:\n{output}")]
    Failed { command: String, output: String },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn captured_returns_chomped_stdout() {
        let result = captured("echo", ["hello"]).unwrap();
        assert_eq!(result, "hello");
    }

    #[test]
    fn captured_reports_failure_with_output() {
        let result = captured("sh", ["-c", "echo boom >&2; exit 3"]);
        match result {
            Err(SyscallError::Failed { command, output }) => {
                assert_eq!(command, "sh");
                assert_eq!(output, "boom");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn spawn_of_missing_binary_is_an_error() {
        let result = captured("definitely-not-a-real-binary", Vec::<String>::new());
        assert!(matches!(result, Err(SyscallError::Spawn { .. })));
    }
}
