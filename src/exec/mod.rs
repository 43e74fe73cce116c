//! Bridge to the external Ansible command-line tools.
//!
//! Each operation builds a [`CommandSpec`], runs it once through a
//! [`CommandRunner`] and classifies the exit status. Failed runs are never
//! retried; their captured output is returned to the caller.

pub mod ansible;
pub mod galaxy;
pub mod vault;

use crate::error::{CapturedOutput, ErrorCode, ToolError, ToolResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info, warn};

/// One external invocation: program, arguments, working directory and the
/// environment layered over the server's own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Shell-quoted command line, for display only.
    pub fn display(&self) -> String {
        self.argv()
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ExecOutcome {
    pub ok: bool,
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
    pub command: String,
}

impl ExecOutcome {
    fn captured(&self, spec: &CommandSpec) -> CapturedOutput {
        CapturedOutput {
            command: spec.argv(),
            rc: self.rc,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

/// Seam between operations and the operating system, so tests can stand in
/// for the Ansible executables.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<ExecOutcome>;
}

/// Runs commands as child processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<ExecOutcome> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        let output = cmd.output().await?;
        Ok(ExecOutcome {
            ok: output.status.success(),
            rc: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            command: spec.display(),
        })
    }
}

/// Run `spec` once. A process that cannot be started or exits non-zero is
/// an `EXTERNAL_FAILURE` carrying whatever was captured.
pub async fn execute(runner: &dyn CommandRunner, spec: &CommandSpec) -> ToolResult<ExecOutcome> {
    let outcome = run_captured(runner, spec).await?;
    if outcome.ok {
        return Ok(outcome);
    }
    warn!(program = %spec.program, rc = outcome.rc, "External command failed");
    Err(ToolError::external(
        format!("{} exited with status {}", spec.program, outcome.rc),
        outcome.captured(spec),
    ))
}

/// Run `spec` once and return the outcome whatever the exit status.
pub async fn run_captured(runner: &dyn CommandRunner, spec: &CommandSpec) -> ToolResult<ExecOutcome> {
    debug!(command = %spec.display(), cwd = ?spec.cwd, "Running external command");
    let start = std::time::Instant::now();
    let outcome = runner.run(spec).await.map_err(|e| {
        ToolError::new(
            ErrorCode::ExternalFailure,
            format!("failed to start {}: {}", spec.program, e),
        )
        .with_output(CapturedOutput {
            command: spec.argv(),
            rc: -1,
            stdout: String::new(),
            stderr: e.to_string(),
        })
    })?;
    info!(
        program = %spec.program,
        rc = outcome.rc,
        duration_ms = start.elapsed().as_millis() as u64,
        "External command finished"
    );
    Ok(outcome)
}

/// Quote `s` for a POSIX shell. Strings made only of safe characters are
/// returned unchanged.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r#"'"'"'"#))
    }
}

/// `-v` through `-vvvv`; levels outside 1..=4 are clamped, 0 means none.
pub fn verbosity_flag(level: Option<u64>) -> Option<String> {
    match level {
        None | Some(0) => None,
        Some(n) => Some(format!("-{}", "v".repeat(n.clamp(1, 4) as usize))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_matches_posix_rules() {
        assert_eq!(shell_quote("plain-value_1.0"), "plain-value_1.0");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
    }

    #[test]
    fn verbosity_clamps() {
        assert_eq!(verbosity_flag(None), None);
        assert_eq!(verbosity_flag(Some(0)), None);
        assert_eq!(verbosity_flag(Some(1)).as_deref(), Some("-v"));
        assert_eq!(verbosity_flag(Some(9)).as_deref(), Some("-vvvv"));
    }

    #[test]
    fn spec_builder_and_display() {
        let spec = CommandSpec::new("ansible")
            .arg("all")
            .args(["-m", "ping"])
            .arg("-a")
            .arg("msg='hi there'");
        assert_eq!(spec.argv()[0], "ansible");
        assert_eq!(
            spec.display(),
            r#"ansible all -m ping -a 'msg='"'"'hi there'"'"''"#
        );
    }

    #[tokio::test]
    async fn process_runner_captures_exit_status() {
        let ok = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2"]);
        let outcome = execute(&ProcessRunner, &ok).await.unwrap();
        assert_eq!(outcome.stdout.trim(), "out");
        assert_eq!(outcome.stderr.trim(), "err");

        let failing = CommandSpec::new("sh").args(["-c", "echo nope; exit 3"]);
        let err = execute(&ProcessRunner, &failing).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalFailure);
        let output = err.output.unwrap();
        assert_eq!(output.rc, 3);
        assert_eq!(output.stdout.trim(), "nope");

        let missing = CommandSpec::new("definitely-not-a-real-program-xyz");
        let err = execute(&ProcessRunner, &missing).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalFailure);
    }
}
