// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::LocalnetError;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};
use zeroize::Zeroizing;

const REDACTED: &str = "***";

#[derive(Debug, Clone)]
enum Arg {
    Plain(String),
    Secret(Zeroizing<String>),
}

impl Arg {
    fn raw(&self) -> &str {
        match self {
            Arg::Plain(arg) => arg,
            Arg::Secret(secret) => secret.as_str(),
        }
    }

    fn displayed(&self) -> &str {
        match self {
            Arg::Plain(arg) => arg,
            Arg::Secret(_) => REDACTED,
        }
    }
}

/// Description of an external command the localnet relies on (git, cargo, the node binary or the wallet cli).
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    program: String,
    args: Vec<Arg>,
    current_dir: Option<PathBuf>,
}

impl Invocation {
    pub(crate) fn new<S: Into<String>>(program: S) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub(crate) fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub(crate) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|arg| Arg::Plain(arg.into())));
        self
    }

    pub(crate) fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        let path = path.as_ref().display().to_string();
        self.arg(path)
    }

    /// Argument that must never end up in logs or error messages, such as a mnemonic.
    pub(crate) fn secret_arg(mut self, secret: &str) -> Self {
        self.args
            .push(Arg::Secret(Zeroizing::new(secret.to_string())));
        self
    }

    pub(crate) fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    fn std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(self.args.iter().map(Arg::raw));
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn spawn_failure(&self, source: io::Error) -> LocalnetError {
        LocalnetError::CommandSpawnFailure {
            program: self.program.clone(),
            source,
        }
    }
}

#[cfg(test)]
impl Invocation {
    pub(crate) fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub(crate) fn starts_with(&self, program: &str, leading: &[&str]) -> bool {
        self.program == program
            && self.args.len() >= leading.len()
            && self
                .args
                .iter()
                .zip(leading)
                .all(|(arg, expected)| arg.displayed() == *expected)
    }

    pub(crate) fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a.displayed() == arg)
    }

    pub(crate) fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a.displayed() == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(Arg::displayed)
    }

    pub(crate) fn raw_flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a.displayed() == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(Arg::raw)
    }

    pub(crate) fn arg_at(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).map(Arg::displayed)
    }

    pub(crate) fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|arg| arg.raw().to_string()))
            .collect()
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.displayed())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommandOutput {
    pub(crate) code: Option<i32>,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl CommandOutput {
    pub(crate) fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProcessStatus {
    Gone,

    /// The process exists. Its command line is `None` where the platform doesn't expose it.
    Running(Option<Vec<String>>),
}

/// Every interaction with the outside world goes through this trait, so that the whole
/// workflow can be exercised without git, cargo, the node binary or the wallet cli being present.
pub(crate) trait CommandRunner {
    /// Runs the command to completion, capturing its output.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, LocalnetError>;

    /// Starts the command in the background, discarding its output, and returns its pid.
    async fn spawn_detached(&self, invocation: &Invocation) -> Result<u32, LocalnetError>;

    fn inspect(&self, pid: u32) -> ProcessStatus;

    /// Forcefully kills the process. Returns `false` if it was no longer running.
    fn terminate(&self, pid: u32) -> Result<bool, LocalnetError>;

    async fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput, LocalnetError> {
        let output = self.run(invocation).await?;
        if !output.success() {
            return Err(LocalnetError::command_failure(
                invocation.to_string(),
                output.code,
                &output.stderr,
            ));
        }
        Ok(output)
    }
}

fn as_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().map(Pid::from_raw)
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, LocalnetError> {
        debug!("executing '{invocation}'");

        let output = Command::from(invocation.std_command())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| invocation.spawn_failure(source))?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(
            "'{}' finished with {:?}. stdout: {} stderr: {}",
            invocation.program(),
            output.code,
            output.stdout,
            output.stderr
        );

        Ok(output)
    }

    async fn spawn_detached(&self, invocation: &Invocation) -> Result<u32, LocalnetError> {
        debug!("spawning '{invocation}' in the background");

        let mut cmd = invocation.std_command();
        // own process group so that a ctrl-c aimed at us doesn't take the node down with it
        cmd.process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|source| invocation.spawn_failure(source))?;
        Ok(child.id())
    }

    fn inspect(&self, pid: u32) -> ProcessStatus {
        let Some(raw) = as_pid(pid) else {
            return ProcessStatus::Gone;
        };
        if kill(raw, None::<Signal>).is_err() {
            return ProcessStatus::Gone;
        }
        if !cfg!(target_os = "linux") {
            return ProcessStatus::Running(None);
        }

        match fs::read(format!("/proc/{pid}/cmdline")) {
            Ok(raw) => ProcessStatus::Running(Some(
                raw.split(|b| *b == 0)
                    .filter(|arg| !arg.is_empty())
                    .map(|arg| String::from_utf8_lossy(arg).into_owned())
                    .collect(),
            )),
            Err(err) if err.kind() == io::ErrorKind::NotFound => ProcessStatus::Gone,
            Err(err) => {
                debug!("could not read the command line of pid {pid}: {err}");
                ProcessStatus::Running(None)
            }
        }
    }

    fn terminate(&self, pid: u32) -> Result<bool, LocalnetError> {
        let Some(raw) = as_pid(pid) else {
            return Ok(false);
        };
        match kill(raw, Signal::SIGKILL) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(source) => Err(LocalnetError::ProcessTerminationFailure { pid, source }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_never_displayed() {
        let invocation = Invocation::new("btcli")
            .args(["wallet", "regen-coldkey", "--mnemonic"])
            .secret_arg("abandon abandon abandon")
            .arg("--quiet");

        let shown = invocation.to_string();
        assert_eq!(shown, "btcli wallet regen-coldkey --mnemonic *** --quiet");
        assert!(!shown.contains("abandon"));

        let raw: Vec<_> = invocation.args.iter().map(Arg::raw).collect();
        assert!(raw.contains(&"abandon abandon abandon"));
    }

    #[tokio::test]
    async fn captures_output_of_finished_commands() {
        let runner = SystemRunner;
        let output = runner
            .run(&Invocation::new("sh").args(["-c", "echo hello; exit 3"]))
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn checked_runs_turn_failures_into_errors() {
        let runner = SystemRunner;
        let err = runner
            .run_checked(&Invocation::new("sh").args(["-c", "echo oops >&2; exit 1"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LocalnetError::CommandFailure { code: Some(1), ref stderr, .. } if stderr == "oops"
        ));
    }

    #[tokio::test]
    async fn missing_programs_fail_to_spawn() {
        let runner = SystemRunner;
        let err = runner
            .run(&Invocation::new("definitely-not-a-real-program-4242"))
            .await
            .unwrap_err();
        assert!(matches!(err, LocalnetError::CommandSpawnFailure { .. }));
    }

    #[tokio::test]
    async fn detached_processes_can_be_terminated() {
        let runner = SystemRunner;
        let pid = runner
            .spawn_detached(&Invocation::new("sleep").arg("30"))
            .await
            .unwrap();

        assert!(matches!(runner.inspect(pid), ProcessStatus::Running(_)));
        assert!(runner.terminate(pid).unwrap());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn running_processes_expose_their_command_line() {
        let runner = SystemRunner;
        let pid = runner
            .spawn_detached(&Invocation::new("sleep").arg("30"))
            .await
            .unwrap();

        let status = runner.inspect(pid);
        runner.terminate(pid).unwrap();

        assert_eq!(
            status,
            ProcessStatus::Running(Some(vec!["sleep".to_string(), "30".to_string()]))
        );
    }
}
