//! External command execution.
//!
//! Every control-plane call shells out to `protoc`, `grpcurl` or the
//! `xray` CLI. [`CommandRunner`] is the seam; [`ProcessRunner`] runs real
//! processes under a per-call deadline.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::error::XrayError;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Builder: append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builder: append arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builder: feed bytes to the process on stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// File name of the program, for logs and metric labels.
    pub fn program_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.program)
    }

    /// Whether the exact argument is present.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// The argument following `flag`, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external commands and returns their stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// Returns stdout on a zero exit status. Spawn failures map to
    /// [`XrayError::TransportUnavailable`], deadlines to
    /// [`XrayError::Timeout`] and non-zero exits to [`XrayError::Rejected`].
    async fn run(&self, spec: &CommandSpec) -> Result<Vec<u8>, XrayError>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    #[inline]
    async fn run(&self, spec: &CommandSpec) -> Result<Vec<u8>, XrayError> {
        (**self).run(spec).await
    }
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    /// Create a runner that kills commands running longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<Vec<u8>, XrayError> {
        let program = spec.program_name().to_string();
        let started = Instant::now();
        trace!(command = %spec, "spawning");

        let mut child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                lunet_metrics::record_command(&program, "unavailable", 0.0);
                XrayError::TransportUnavailable(format!("failed to spawn {}: {e}", spec.program))
            })?;

        let input = spec.stdin.clone();
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(input), Some(mut pipe)) = (input, pipe) {
                // a child that exits without draining stdin is judged by its exit status
                match pipe.write_all(&input).await {
                    Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
                // pipe dropped here so the child sees EOF
            }
            Ok(())
        };
        let exchange = async move {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            fed?;
            Ok::<_, io::Error>(output)
        };

        // On timeout the future (and the child with it) is dropped; kill_on_drop reaps it.
        let result = tokio::time::timeout(self.timeout, exchange).await;
        let elapsed = started.elapsed().as_secs_f64();

        let output = match result {
            Err(_) => {
                lunet_metrics::record_command(&program, "timeout", elapsed);
                return Err(XrayError::Timeout {
                    program,
                    after: self.timeout,
                });
            }
            Ok(Err(e)) => {
                lunet_metrics::record_command(&program, "unavailable", elapsed);
                return Err(XrayError::TransportUnavailable(format!(
                    "{program} i/o failure: {e}"
                )));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            lunet_metrics::record_command(&program, "rejected", elapsed);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            debug!(program = %program, detail = %detail, "command failed");
            return Err(XrayError::Rejected { program, detail });
        }

        lunet_metrics::record_command(&program, "ok", elapsed);
        Ok(output.stdout)
    }
}
