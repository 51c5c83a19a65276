//! Running external programs and mapping their failures.

use crate::error::CollaboratorError;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Run `command` to completion, optionally feeding `stdin`.
///
/// A program that cannot be spawned maps to
/// [`CollaboratorError::ToolUnavailable`]; a non-zero exit maps to
/// [`CollaboratorError::ToolFailed`] carrying the trimmed stderr.
pub fn run_tool(tool: &str, command: &mut Command, stdin: Option<&[u8]>) -> Result<Output, CollaboratorError> {
    debug!("Running {:?}", command);

    command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|source| CollaboratorError::ToolUnavailable {
            tool: tool.to_string(),
            source,
        })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            if let Err(e) = pipe.write_all(input) {
                drop(pipe);
                // Reap the child; it may already have exited.
                let _ = child.kill();
                let _ = child.wait();
                return Err(CollaboratorError::Other(format!(
                    "{tool}: failed to write stdin: {e}"
                )));
            }
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| CollaboratorError::Other(format!("{tool}: failed to wait for process: {e}")))?;

    if !output.status.success() {
        return Err(CollaboratorError::ToolFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}
