use anyhow::Result;
use std::process::{Command, Stdio};

use super::common::TestEnvironment;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run the built binary with the run log and config kept inside the test environment.
pub fn run_diskclone_command(env: &TestEnvironment, args: &[&str]) -> Result<CommandOutput> {
    let log_file = env.path().join("cli.log");
    let output = Command::new(env!("CARGO_BIN_EXE_diskclone"))
        .arg("--no-color")
        .arg("--log-file")
        .arg(&log_file)
        .args(args)
        .stdin(Stdio::null())
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
