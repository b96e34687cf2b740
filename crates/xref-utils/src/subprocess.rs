use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::error::UtilError;
use crate::Result;

/// Stdio mode for subprocess streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Inherit the parent process's stream.
    Inherit,
    /// Pipe the stream (capture it).
    Pipe,
    /// Redirect to /dev/null.
    Null,
}

impl StdioMode {
    fn to_stdio(self) -> Stdio {
        match self {
            StdioMode::Inherit => Stdio::inherit(),
            StdioMode::Pipe => Stdio::piped(),
            StdioMode::Null => Stdio::null(),
        }
    }
}

/// Result of running a subprocess to completion.
#[derive(Debug)]
pub struct CommandResult {
    /// The exit status.
    pub status: ExitStatus,
    /// Captured stdout (empty if not piped).
    pub stdout: Vec<u8>,
    /// Captured stderr (empty if not piped).
    pub stderr: Vec<u8>,
}

impl CommandResult {
    /// Returns true if the process exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Builder for subprocess execution.
///
/// Wraps `std::process::Command` with a fluent API that remembers the
/// command string for error messages.
pub struct GitCommand {
    program: OsString,
    args: Vec<OsString>,
    stdin_mode: StdioMode,
    stdout_mode: StdioMode,
    stderr_mode: StdioMode,
    working_dir: Option<PathBuf>,
}

impl GitCommand {
    /// Create a new command builder for the given program.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            stdin_mode: StdioMode::Null,
            stdout_mode: StdioMode::Pipe,
            stderr_mode: StdioMode::Pipe,
            working_dir: None,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Self {
        for arg in args {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    /// Set stdin mode.
    pub fn stdin(mut self, mode: StdioMode) -> Self {
        self.stdin_mode = mode;
        self
    }

    /// Set stdout mode.
    pub fn stdout(mut self, mode: StdioMode) -> Self {
        self.stdout_mode = mode;
        self
    }

    /// Set stderr mode.
    pub fn stderr(mut self, mode: StdioMode) -> Self {
        self.stderr_mode = mode;
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The command string, for error messages.
    pub fn command_string(&self) -> String {
        let mut s = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(self.stdin_mode.to_stdio());
        cmd.stdout(self.stdout_mode.to_stdio());
        cmd.stderr(self.stderr_mode.to_stdio());
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run the command and wait for it to complete, capturing output.
    pub fn run(&self) -> Result<CommandResult> {
        let cmd_str = self.command_string();
        let child = self.build_command().spawn().map_err(|e| UtilError::Subprocess {
            command: cmd_str.clone(),
            source: e,
        })?;
        let output = child.wait_with_output().map_err(|e| UtilError::Subprocess {
            command: cmd_str,
            source: e,
        })?;
        Ok(CommandResult {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Run the command and return its stdout, failing on a non-zero exit.
    pub fn output(&self) -> Result<Vec<u8>> {
        let result = self.run()?;
        if !result.success() {
            return Err(UtilError::CommandFailed {
                command: self.command_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(result.stdout)
    }

    /// Spawn the command without waiting, wrapped in a kill-on-drop guard.
    pub fn spawn(&self) -> Result<ChildGuard> {
        let cmd_str = self.command_string();
        let child = self.build_command().spawn().map_err(|e| UtilError::Subprocess {
            command: cmd_str,
            source: e,
        })?;
        Ok(ChildGuard { child: Some(child) })
    }
}

/// A spawned child that is terminated when the guard is dropped.
///
/// Long-running readers (the cat-file pipeline) hold their children through
/// this guard so that every exit path from the ingestion scope, including
/// error returns, reaps them.
pub struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    /// Take the child's piped stdin. Panics if stdin was not piped.
    pub fn take_stdin(&mut self) -> Option<std::process::ChildStdin> {
        self.child.as_mut().and_then(|c| c.stdin.take())
    }

    /// Take the child's piped stdout.
    pub fn take_stdout(&mut self) -> Option<std::process::ChildStdout> {
        self.child.as_mut().and_then(|c| c.stdout.take())
    }

    /// Wait for the child to exit normally, disarming the kill.
    pub fn wait(mut self) -> Result<ExitStatus> {
        let mut child = self.child.take().ok_or_else(|| {
            UtilError::Io(std::io::Error::other("child already reaped"))
        })?;
        Ok(child.wait()?)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
