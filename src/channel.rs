//! Remote command channel: the sole point of contact with `adb`.
//!
//! Every higher-level operation in this crate (device discovery, property
//! queries, pushes, shell tests) is expressed as one invocation of the
//! [`CommandChannel`] trait. The production implementation, [`AdbChannel`],
//! spawns the `adb` binary, merges its stdout and stderr line streams in
//! arrival order, and waits for the process to exit.
//!
//! There is deliberately no retry and no timeout at this layer: a hung adb
//! invocation blocks its calling task until the process exits. Callers that
//! need isolation get it from the task fan-out in the orchestrator, not from
//! this channel.
//!
//! # Example
//!
//! ```no_run
//! use fleetrun::channel::{AdbChannel, CommandChannel};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let channel = AdbChannel::new();
//!     let output = channel
//!         .execute(&["devices".to_string()], None)
//!         .await?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```

use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, RemoteCommandError>;

/// An external device-management command failed.
///
/// Raised when the spawned command exits non-zero (or cannot be spawned at
/// all). Carries the full argv and the merged stdout/stderr output so the
/// failure is diagnosable without re-running the command.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}:\n{output}", .args.join(" "))]
pub struct RemoteCommandError {
    /// The argv of the failed command, including the program itself.
    pub args: Vec<String>,

    /// Merged stdout and stderr captured before the command failed.
    pub output: String,
}

impl RemoteCommandError {
    /// The failed command rendered as a single space-joined line.
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

/// Executes one administrative command against zero or one target device.
///
/// This is the seam between the orchestration engine and the external
/// transport. Tests substitute a scripted implementation; production code
/// uses [`AdbChannel`].
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Runs `args` against the device identified by `serial` (or against the
    /// bare transport when `serial` is `None`) and returns the merged
    /// stdout/stderr output.
    ///
    /// # Errors
    ///
    /// [`RemoteCommandError`] when the command exits non-zero, carrying the
    /// merged output for diagnostics.
    async fn execute(&self, args: &[String], serial: Option<&str>) -> ChannelResult<String>;
}

/// Command channel backed by the `adb` binary.
///
/// Device-scoped commands are addressed with `adb -s <serial> ...`; fleet
/// commands (such as `adb devices`) omit the serial.
pub struct AdbChannel {
    program: String,
}

impl AdbChannel {
    /// Creates a channel that resolves `adb` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("adb")
    }

    /// Creates a channel using an explicit program, for non-standard SDK
    /// layouts (or substituting another binary in tests).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for AdbChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandChannel for AdbChannel {
    async fn execute(&self, args: &[String], serial: Option<&str>) -> ChannelResult<String> {
        let mut argv = Vec::with_capacity(args.len() + 3);
        argv.push(self.program.clone());
        if let Some(serial) = serial {
            argv.push("-s".to_string());
            argv.push(serial.to_string());
        }
        argv.extend(args.iter().cloned());

        debug!(cmd = %argv.join(" "), "running device command");

        let mut process = tokio::process::Command::new(&argv[0]);
        process.args(&argv[1..]);
        process.stdin(Stdio::null());
        process.stdout(Stdio::piped());
        process.stderr(Stdio::piped());

        let mut child = process.spawn().map_err(|e| RemoteCommandError {
            args: argv.clone(),
            output: format!("failed to spawn {}: {}", self.program, e),
        })?;

        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        let stdout_lines = tokio_stream::wrappers::LinesStream::new(BufReader::new(stdout).lines())
            .map(|line: Result<String, std::io::Error>| line.unwrap_or_default());
        let stderr_lines = tokio_stream::wrappers::LinesStream::new(BufReader::new(stderr).lines())
            .map(|line: Result<String, std::io::Error>| line.unwrap_or_default());

        // Merge both streams in arrival order so diagnostics read the way
        // they were produced.
        let mut merged = stream::select(stdout_lines, stderr_lines);

        let mut output = String::new();
        while let Some(line) = merged.next().await {
            output.push_str(&line);
            output.push('\n');
        }

        let status = child.wait().await.map_err(|e| RemoteCommandError {
            args: argv.clone(),
            output: format!("failed to wait for {}: {}", self.program, e),
        })?;

        if !status.success() {
            return Err(RemoteCommandError { args: argv, output });
        }

        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory channel used as the device seam in unit tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ChannelResult, CommandChannel, RemoteCommandError};

    fn key(serial: Option<&str>, cmd: &str) -> String {
        format!("{} {cmd}", serial.unwrap_or("-"))
    }

    /// Maps a rendered command line (plus target serial) to a canned
    /// response. Unscripted commands fail, which doubles as coverage for
    /// the swallow-on-failure paths.
    #[derive(Default)]
    pub struct ScriptedChannel {
        responses: HashMap<String, Result<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, serial: Option<&str>, cmd: &str, output: &str) -> Self {
            self.responses
                .insert(key(serial, cmd), Ok(output.to_string()));
            self
        }

        pub fn fail(mut self, serial: Option<&str>, cmd: &str, output: &str) -> Self {
            self.responses
                .insert(key(serial, cmd), Err(output.to_string()));
            self
        }

        /// How many times the given command line was executed.
        pub fn call_count(&self, serial: Option<&str>, cmd: &str) -> usize {
            let key = key(serial, cmd);
            self.calls.lock().unwrap().iter().filter(|c| **c == key).count()
        }
    }

    #[async_trait]
    impl CommandChannel for ScriptedChannel {
        async fn execute(&self, args: &[String], serial: Option<&str>) -> ChannelResult<String> {
            let k = key(serial, &args.join(" "));
            self.calls.lock().unwrap().push(k.clone());
            match self.responses.get(&k) {
                Some(Ok(output)) => Ok(output.clone()),
                Some(Err(output)) => Err(RemoteCommandError {
                    args: args.to_vec(),
                    output: output.clone(),
                }),
                None => Err(RemoteCommandError {
                    args: args.to_vec(),
                    output: format!("unscripted command: {k}"),
                }),
            }
        }
    }
}
