//! EXEC runner.
//!
//! Runs file content as a shell command line. This executes arbitrary text
//! from the file store on the Name Server host; it can be switched off with
//! `name_server.exec_enabled = false`.

use crate::core::error::{ScribeError, ScribeResult};
use tokio::process::Command;

/// Captured result of one EXEC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// stdout followed by stderr, lossily decoded.
    pub output: String,
    /// Exit status; -1 when terminated by a signal.
    pub exit_code: i32,
}

/// Run `script` through `sh -c` and capture its output.
pub async fn run_shell(script: &str) -> ScribeResult<ExecOutput> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(script)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ScribeError::ExecFailed {
            message: e.to_string(),
        })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ExecOutput {
        output: text,
        exit_code: output.status.code().unwrap_or(-1),
    })
}
