//! Kernels running as child processes.
//!
//! Provides `ProcessSession` for talking to one kernel process over its
//! stdin/stdout, and `ProcessKernelProvider` for launching them from the
//! kernel registry.

use std::io::{BufRead, BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::payload::Payload;

use super::protocol::{KernelReply, KernelRequest, read_message, write_message};
use super::{KernelProvider, KernelRegistry, KernelSpec, LanguageInfo, Session, SessionInfo};

/// How long a freshly spawned kernel may take to answer its first ping.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// How long to wait for a clean exit before killing.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handle to a kernel process.
///
/// Replies are read on a background thread and forwarded over a channel,
/// so every round-trip can be bounded by a timeout. The process is killed
/// when the handle is dropped.
pub struct ProcessSession {
    info: SessionInfo,
    /// The child process.
    child: Child,
    /// Buffered stdin writer.
    stdin: BufWriter<ChildStdin>,
    /// Reply lines from the reader thread.
    replies: Receiver<std::io::Result<String>>,
    /// Set once the kernel can no longer be trusted with requests.
    closed: bool,
    /// Whether the process has been killed and reaped.
    killed: bool,
}

impl ProcessSession {
    /// Spawn a kernel process and wait until it answers a ping.
    pub fn spawn(name: &str, spec: &KernelSpec) -> Result<Self> {
        let argv = spec.resolved_argv();
        let unavailable = |message: String| Error::SessionUnavailable {
            kernel: name.to_string(),
            message,
        };
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| unavailable("kernel spec has an empty argv".to_string()))?;
        let program = Self::find_executable(program).map_err(unavailable)?;

        let mut child = Command::new(&program)
            .args(args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let kernel stderr pass through for debugging
            .spawn()
            .map_err(|e| unavailable(format!("failed to spawn '{}': {}", program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| unavailable("failed to get kernel stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| unavailable("failed to get kernel stdout".to_string()))?;

        let (tx, replies) = mpsc::channel();
        thread::Builder::new()
            .name(format!("mercury-kernel-{}", name))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let stop = line.is_err();
                    if tx.send(line).is_err() || stop {
                        break;
                    }
                }
            })
            .map_err(|e| unavailable(format!("failed to start reader thread: {}", e)))?;

        let info = SessionInfo {
            kernel: name.to_string(),
            instance_id: super::new_instance_id(),
            display_name: spec.display_name_or(name).to_string(),
            language: spec.language.clone().unwrap_or_default(),
        };

        let mut session = Self {
            info,
            child,
            stdin: BufWriter::new(stdin),
            replies,
            closed: false,
            killed: false,
        };

        match session.round_trip(&KernelRequest::Ping, Some(STARTUP_TIMEOUT))? {
            KernelReply::Pong => {
                tracing::debug!(
                    "Kernel '{}' started (pid {}, instance {})",
                    name,
                    session.child.id(),
                    session.info.instance_id
                );
                Ok(session)
            }
            other => Err(Error::ExecutionFailed(format!(
                "unexpected reply to ping: {:?}",
                other
            ))),
        }
    }

    /// Resolve the kernel executable.
    ///
    /// Paths with a directory component are used as given; bare names are
    /// looked up on `PATH`.
    fn find_executable(program: &str) -> std::result::Result<PathBuf, String> {
        let path = PathBuf::from(program);
        if path.components().count() > 1 {
            return if path.exists() {
                Ok(path)
            } else {
                Err(format!("'{}' does not exist", path.display()))
            };
        }
        which::which(program).map_err(|e| format!("'{}' not found on PATH: {}", program, e))
    }

    /// Send one request and wait for its reply.
    fn round_trip(&mut self, request: &KernelRequest, timeout: Option<Duration>) -> Result<KernelReply> {
        if self.closed {
            return Err(Error::ExecutionFailed("kernel session is closed".to_string()));
        }
        if let Err(e) = write_message(&mut self.stdin, request) {
            self.closed = true;
            return Err(e);
        }

        let received = match timeout {
            Some(limit) => self.replies.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => Error::Timeout(limit),
                RecvTimeoutError::Disconnected => self.exited(),
            }),
            None => self.replies.recv().map_err(|_| self.exited()),
        };

        let reply = match received {
            Ok(Ok(line)) => read_message(&line),
            Ok(Err(e)) => Err(Error::ExecutionFailed(format!("failed to read from kernel: {}", e))),
            Err(e) => Err(e),
        };

        match reply {
            Ok(KernelReply::Error { message }) => Err(Error::ExecutionFailed(message)),
            Ok(reply) => Ok(reply),
            Err(e) => {
                // A late or garbled reply would desynchronize every later request.
                self.closed = true;
                Err(e)
            }
        }
    }

    fn exited(&mut self) -> Error {
        let status = match self.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            _ => "closed its stdout".to_string(),
        };
        Error::ExecutionFailed(format!("kernel '{}' exited: {}", self.info.kernel, status))
    }

    /// Kill the kernel process immediately.
    pub fn kill(&mut self) {
        self.closed = true;
        if self.killed {
            return;
        }
        self.killed = true;
        if let Err(e) = self.child.kill() {
            // InvalidInput means the process already exited
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("Failed to kill kernel: {}", e);
            }
        }
        // Wait to reap zombie
        let _ = self.child.wait();
    }

    /// Process ID of the kernel.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Session for ProcessSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn execute(&mut self, code: &str, timeout: Option<Duration>) -> Result<Vec<Payload>> {
        let request = KernelRequest::Execute {
            code: code.to_string(),
        };
        match self.round_trip(&request, timeout)? {
            KernelReply::ExecuteReply { outputs } => Ok(outputs),
            other => Err(Error::ExecutionFailed(format!(
                "unexpected reply to execute: {:?}",
                other
            ))),
        }
    }

    fn language_info(&mut self) -> Result<LanguageInfo> {
        match self.round_trip(&KernelRequest::LanguageInfo, Some(STARTUP_TIMEOUT))? {
            KernelReply::LanguageInfo { language_info } => Ok(language_info),
            other => Err(Error::ExecutionFailed(format!(
                "unexpected reply to language_info: {:?}",
                other
            ))),
        }
    }

    fn widget_state(&mut self) -> Result<Option<serde_json::Value>> {
        match self.round_trip(&KernelRequest::WidgetState, Some(STARTUP_TIMEOUT))? {
            KernelReply::WidgetState { state } => Ok(state),
            other => Err(Error::ExecutionFailed(format!(
                "unexpected reply to widget_state: {:?}",
                other
            ))),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            self.kill();
            return Ok(());
        }
        let result = match self.round_trip(&KernelRequest::Shutdown, Some(SHUTDOWN_GRACE)) {
            Ok(KernelReply::ShuttingDown) => Ok(()),
            Ok(other) => Err(Error::ExecutionFailed(format!(
                "unexpected reply to shutdown: {:?}",
                other
            ))),
            Err(e) => Err(e),
        };
        self.kill();
        result
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        // Ensure the kernel is killed when the handle is dropped
        self.kill();
    }
}

/// Launches [`ProcessSession`]s from a [`KernelRegistry`].
#[derive(Debug, Clone, Default)]
pub struct ProcessKernelProvider {
    registry: KernelRegistry,
}

impl ProcessKernelProvider {
    pub fn new(registry: KernelRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }
}

impl KernelProvider for ProcessKernelProvider {
    fn has_kernel(&self, name: &str) -> bool {
        self.registry.get(name).is_some()
    }

    fn kernel_names(&self) -> Vec<String> {
        self.registry.names().map(String::from).collect()
    }

    fn start(&self, name: &str) -> Result<Box<dyn Session>> {
        let spec = self.registry.resolve(name)?;
        Ok(Box::new(ProcessSession::spawn(name, spec)?))
    }
}
