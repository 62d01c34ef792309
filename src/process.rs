//! External process invocation.
//!
//! Every call across the process boundary goes through [`run`], which spawns
//! the command, awaits it alongside the cancellation token and the optional
//! deadline, and turns a non-zero exit into
//! [`BatchScaleError::ExternalProcess`]. Children are spawned with
//! `kill_on_drop`, so losing the race to cancellation or a timeout kills the
//! process.

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::BatchScaleError;
use crate::progress::CancellationToken;

/// Whether a call may be interrupted.
#[derive(Debug, Clone, Copy)]
pub enum Interrupt<'a> {
    /// Kill the process as soon as the token is cancelled.
    OnCancel(&'a CancellationToken),
    /// Always let the process run to completion.
    Never,
}

/// Run `command` to completion and return its captured output.
///
/// # Errors
///
/// - [`BatchScaleError::ProcessSpawn`] if the program cannot be started.
/// - [`BatchScaleError::Cancelled`] if `interrupt` is [`Interrupt::OnCancel`]
///   and its token fires first.
/// - [`BatchScaleError::ProcessTimeout`] if `timeout` elapses first.
/// - [`BatchScaleError::ExternalProcess`] on a non-zero exit.
pub async fn run(
    mut command: Command,
    interrupt: Interrupt<'_>,
    timeout: Option<Duration>,
) -> Result<Output, BatchScaleError> {
    let program = program_name(command.as_std().get_program());
    log::debug!("Running {:?}", command.as_std());

    if let Interrupt::OnCancel(token) = interrupt {
        if token.is_cancelled() {
            return Err(BatchScaleError::Cancelled);
        }
    }

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| BatchScaleError::ProcessSpawn {
            program: program.clone(),
            reason: error.to_string(),
        })?;

    let completion = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result.map_err(BatchScaleError::from),
                Err(_) => Err(BatchScaleError::ProcessTimeout {
                    program: program.clone(),
                    timeout: limit,
                }),
            },
            None => child.wait_with_output().await.map_err(BatchScaleError::from),
        }
    };

    // Dropping `completion` on cancellation drops the child, which kills it.
    let output = match interrupt {
        Interrupt::OnCancel(token) => {
            tokio::select! {
                output = completion => output?,
                _ = token.cancelled() => {
                    log::debug!("Killed {program} after cancellation");
                    return Err(BatchScaleError::Cancelled);
                }
            }
        }
        Interrupt::Never => completion.await?,
    };

    if !output.status.success() {
        return Err(BatchScaleError::ExternalProcess {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

fn program_name(program: &OsStr) -> String {
    std::path::Path::new(program)
        .file_name()
        .unwrap_or(program)
        .to_string_lossy()
        .into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::progress::CancellationToken;

    #[tokio::test]
    async fn non_zero_exit_is_an_external_failure() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo broken >&2; exit 3"]);
        let error = run(command, Interrupt::Never, None)
            .await
            .unwrap_err();
        match error {
            BatchScaleError::ExternalProcess { program, stderr, .. } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "broken");
            }
            other => panic!("Expected ExternalProcess, got: {other}"),
        }
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut command = Command::new("sleep");
        command.arg("10");
        let started = std::time::Instant::now();
        let result = run(command, Interrupt::OnCancel(&token), None).await;
        assert!(matches!(result, Err(BatchScaleError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let mut command = Command::new("sleep");
        command.arg("10");
        let result = run(command, Interrupt::Never, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(BatchScaleError::ProcessTimeout { .. })));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let command = Command::new("batchscale-definitely-not-installed");
        let result = run(command, Interrupt::Never, None).await;
        assert!(matches!(result, Err(BatchScaleError::ProcessSpawn { .. })));
    }
}
