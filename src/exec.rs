use anyhow::{Context, Result};
use std::{
    fmt,
    process::{Command, Stdio},
};

/// One external command as a parameterized argument vector.
///
/// Device names are passed as discrete arguments, never interpolated into a
/// shell line, so no metacharacter in a device name ever reaches a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExecCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for ExecCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs an external command and captures its streams.
///
/// A trait so tests can substitute a scripted executor and assert which
/// commands were (or were not) issued.
pub trait CommandExecutor: Send {
    fn run(&self, command: &ExecCommand) -> Result<ExecOutput>;
}

/// The real executor: spawns the process and blocks until it exits.
///
/// There is no timeout; a hung external tool hangs the caller.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    fn run(&self, command: &ExecCommand) -> Result<ExecOutput> {
        log::debug!("exec: {command}");
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to spawn {}", command.program))?;

        Ok(ExecOutput {
            // Signal-terminated processes report no code; treat as failure.
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
