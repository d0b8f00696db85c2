//! Subprocess plumbing for the JS/TS extractor.
//!
//! Invocations are synchronous with a hard 30-second timeout; exceeding
//! it is fatal to the run.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use seep_core::errors::ExtractError;

pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a prepared command to completion, killing it on timeout.
pub fn run_with_timeout(mut command: Command, label: &Path) -> Result<Output, ExtractError> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let child = command.spawn().map_err(|e| ExtractError::SubprocessFailed {
        message: format!("{}: failed to spawn: {e}", label.display()),
    })?;
    wait_with_timeout(child, label)
}

/// Feed `stdin_data` to a command and collect its output, with the same
/// timeout discipline.
pub fn run_with_stdin(
    mut command: Command,
    stdin_data: &[u8],
    label: &Path,
) -> Result<Output, ExtractError> {
    command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|e| ExtractError::SubprocessFailed {
        message: format!("{}: failed to spawn: {e}", label.display()),
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_data).map_err(|e| ExtractError::SubprocessFailed {
            message: format!("{}: failed to write stdin: {e}", label.display()),
        })?;
    }
    wait_with_timeout(child, label)
}

fn wait_with_timeout(
    child: std::process::Child,
    label: &Path,
) -> Result<Output, ExtractError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = std::thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(SUBPROCESS_TIMEOUT) {
        Ok(result) => {
            let _ = handle.join();
            result.map_err(|e| ExtractError::SubprocessFailed {
                message: format!("{}: {e}", label.display()),
            })
        }
        Err(_) => {
            // The child is orphaned with the waiting thread; the run is
            // aborting anyway.
            Err(ExtractError::SubprocessTimeout {
                seconds: SUBPROCESS_TIMEOUT.as_secs(),
            })
        }
    }
}
