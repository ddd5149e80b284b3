//! Observable child processes
//!
//! [`ProcessHandle::spawn`] starts a command and watches it on a background
//! task. When the child terminates the handle emits `exit` with the exit
//! code (or the name of the terminating signal) and then `close` carrying
//! the same code.

use crate::error::{Result, TransportError};
use crate::lifecycle::Lifecycle;
use settle_core::{Emitter, Resource, Shape, StreamState};
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Notify;

/// Configuration for spawning a process
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Program to run
    pub program: String,

    /// Arguments to pass to the program
    pub args: Vec<String>,

    /// Environment variables to set
    pub env: HashMap<String, String>,

    /// Start from an empty environment instead of inheriting the parent's
    pub clear_env: bool,

    /// Connect the child's stdout and stderr to the parent's
    pub inherit_output: bool,

    /// Kill the process if it runs longer than this
    pub timeout: Option<Duration>,
}

impl ProcessConfig {
    /// Create a new process configuration
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            clear_env: false,
            inherit_output: false,
            timeout: None,
        }
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Pass only the variables set with [`ProcessConfig::with_env`]
    pub fn with_clean_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Forward the child's output to the parent's stdout/stderr
    pub fn with_inherited_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if self.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&self.env);

        cmd.stdin(Stdio::null());
        if self.inherit_output {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

enum Watch {
    Exited(std::io::Result<ExitStatus>),
    Kill,
    TimedOut,
}

/// Handle to a running process
#[derive(Debug)]
pub struct ProcessHandle {
    lifecycle: Lifecycle,
    kill: Arc<Notify>,
    pid: Option<u32>,
    config: ProcessConfig,
}

impl ProcessHandle {
    /// Spawn a process and start watching it.
    ///
    /// Must be called from within a tokio runtime. The exit may be reported
    /// before any observer attaches; it is recorded in the handle's state.
    pub async fn spawn(config: ProcessConfig) -> Result<Self> {
        let child = config.command().spawn().map_err(|e| {
            TransportError::Process(format!("Failed to spawn {}: {}", config.program, e))
        })?;

        let pid = child.id();
        let lifecycle = Lifecycle::new(StreamState::detached());
        let kill = Arc::new(Notify::new());
        tracing::debug!(program = %config.program, ?pid, "spawned process");

        tokio::spawn(watch(child, lifecycle.clone(), kill.clone(), config.timeout));

        Ok(Self {
            lifecycle,
            kill,
            pid,
            config,
        })
    }

    /// OS process id, if the child was still running when spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Check if the process is still alive
    pub fn is_alive(&self) -> bool {
        !self.lifecycle.is_closed()
    }

    /// Exit code, once the process has exited normally
    pub fn exit_code(&self) -> Option<i32> {
        self.lifecycle.state().exit_code()
    }

    /// Kill the process. The outcome is reported through `exit` and `close`.
    pub fn kill(&self) {
        self.kill.notify_one();
    }

    /// Send a signal to the process.
    ///
    /// # Errors
    ///
    /// Fails if the process already exited or the signal cannot be delivered.
    #[cfg(unix)]
    pub fn signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::unistd::Pid;

        let pid = self
            .pid
            .filter(|_| self.is_alive())
            .ok_or_else(|| TransportError::Process("Process has already exited".to_string()))?;
        let pid = i32::try_from(pid)
            .map_err(|_| TransportError::Process(format!("Invalid pid: {}", pid)))?;
        nix::sys::signal::kill(Pid::from_raw(pid), signal)
            .map_err(|e| TransportError::Process(format!("Failed to send {}: {}", signal, e)))
    }

    /// Get the process configuration
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }
}

impl Resource for ProcessHandle {
    fn emitter(&self) -> &Emitter {
        self.lifecycle.emitter()
    }

    fn state(&self) -> &StreamState {
        self.lifecycle.state()
    }

    fn shape(&self) -> Shape {
        Shape::process()
    }
}

async fn watch(
    mut child: Child,
    lifecycle: Lifecycle,
    kill: Arc<Notify>,
    timeout: Option<Duration>,
) {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    let watched = tokio::select! {
        status = child.wait() => Watch::Exited(status),
        () = kill.notified() => Watch::Kill,
        () = deadline => Watch::TimedOut,
    };

    let status = match watched {
        Watch::Exited(status) => status,
        Watch::Kill => kill_and_wait(&mut child).await,
        Watch::TimedOut => {
            tracing::warn!(?timeout, "process timed out, killing it");
            kill_and_wait(&mut child).await
        }
    };

    match status {
        Ok(status) => {
            let code = status.code();
            let signal = signal_name(&status);
            tracing::debug!(?code, ?signal, "process exited");

            lifecycle.exit(code, signal);
        }
        Err(err) => lifecycle.fail(&err),
    }
    lifecycle.close();
}

async fn kill_and_wait(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Err(err) = child.start_kill() {
        tracing::debug!("kill failed: {}", err);
    }
    child.wait().await
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|raw| {
        nix::sys::signal::Signal::try_from(raw)
            .map(|signal| signal.as_str().to_string())
            .unwrap_or_else(|_| format!("signal {}", raw))
    })
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> Option<String> {
    None
}
