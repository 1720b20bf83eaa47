// ABOUTME: Process supervisor for a compose-managed service: up, then attach to its console
// ABOUTME: Frames console output into lines and correlates commands with the next line

use crate::compose::{self, ComposeCli};
use crate::error::{Result, StartFailure, SupervisorError};
use crate::framing::{decode_line, LineFramer, LINE_TERMINATOR};
use crate::service::ServiceDefinition;
use futures::stream::BoxStream;
use std::collections::VecDeque;
use std::fmt;
use std::process::Output;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How long `run` waits for a response line when the caller gives no timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2000);

/// Upper bound on `compose up` unless configured otherwise.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(300);

const READ_CHUNK_SIZE: usize = 8192;

/// Lifecycle of one supervised service instance.
///
/// `Idle -> Starting -> Started`, with `Failed` reachable from `Starting`.
/// `Failed`, `Exited` and `Stopped` are terminal: build a new supervisor to
/// try again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Started {
        instance: String,
    },
    Failed {
        reason: StartFailure,
    },
    /// The attached console ended on its own. The container may still be up,
    /// so the instance name is kept for teardown.
    Exited {
        instance: String,
        code: Option<i32>,
    },
    Stopped,
}

impl SupervisorState {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::Exited { .. } | Self::Stopped
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Started { instance } => write!(f, "started ({instance})"),
            Self::Failed { reason } => write!(f, "failed ({reason})"),
            Self::Exited { code: Some(c), .. } => write!(f, "exited ({c})"),
            Self::Exited { code: None, .. } => write!(f, "exited"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Notifications delivered to subscribers, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Both phases succeeded; the console is attached.
    Started { instance: String },
    /// Startup failed; the supervisor is now `Failed`.
    StartFailed(StartFailure),
    /// A raw chunk from the attached console, exactly as read.
    Output(Vec<u8>),
    /// A complete line that no pending `run` claimed.
    Line(String),
    /// The attached console ended without a shutdown request.
    Exited { code: Option<i32> },
}

/// Tunables for a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Default wait for a command response
    pub command_timeout: Duration,
    /// Limit on `compose up`; `None` waits indefinitely
    pub setup_timeout: Option<Duration>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            setup_timeout: Some(DEFAULT_SETUP_TIMEOUT),
        }
    }
}

/// State touched by both callers and the output pump. Never held across an await.
struct Shared {
    state: SupervisorState,
    framer: LineFramer,
    pending: VecDeque<oneshot::Sender<String>>,
    subscribers: Vec<mpsc::UnboundedSender<SupervisorEvent>>,
}

impl Shared {
    fn emit(&mut self, event: SupervisorEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Hand a line to the oldest waiting `run`, or publish it.
    fn deliver_line(&mut self, mut line: String) {
        while let Some(waiter) = self.pending.pop_front() {
            match waiter.send(line) {
                Ok(()) => return,
                // that caller already timed out
                Err(unclaimed) => line = unclaimed,
            }
        }
        self.emit(SupervisorEvent::Line(line));
    }

    fn exit_code(&self) -> Option<i32> {
        match self.state {
            SupervisorState::Exited { code, .. } => code,
            _ => None,
        }
    }
}

/// Handle on the running output pump.
struct AttachSession {
    kill_tx: oneshot::Sender<()>,
    pump: JoinHandle<()>,
}

impl AttachSession {
    async fn stop(self) {
        let _ = self.kill_tx.send(());
        if let Err(e) = self.pump.await {
            tracing::warn!(error = %e, "Output pump task failed to complete");
        }
    }
}

struct Inner {
    definition: ServiceDefinition,
    cli: ComposeCli,
    options: SupervisorOptions,
    shared: Mutex<Shared>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    session: Mutex<Option<AttachSession>>,
}

/// Supervises one compose service through its two-phase startup and
/// exposes its console as a line-oriented command channel.
///
/// ```no_run
/// # async fn demo() -> hearth_core::error::Result<()> {
/// use hearth_core::{Supervisor, ServiceDefinition};
///
/// let supervisor = Supervisor::with_defaults(ServiceDefinition::new("mc", "~/minecraft-server"));
/// supervisor.start().await?;
/// let reply = supervisor.run("list", None).await?;
/// println!("{}", reply.unwrap_or_default());
/// # Ok(())
/// # }
/// ```
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(definition: ServiceDefinition, cli: ComposeCli, options: SupervisorOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                definition,
                cli,
                options,
                shared: Mutex::new(Shared {
                    state: SupervisorState::Idle,
                    framer: LineFramer::new(),
                    pending: VecDeque::new(),
                    subscribers: Vec::new(),
                }),
                stdin: tokio::sync::Mutex::new(None),
                session: Mutex::new(None),
            }),
        }
    }

    /// Supervisor using `docker` and the default timeouts.
    pub fn with_defaults(definition: ServiceDefinition) -> Self {
        Self::new(definition, ComposeCli::default(), SupervisorOptions::default())
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.inner.definition
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.inner.options
    }

    pub fn state(&self) -> SupervisorState {
        self.inner.shared().state.clone()
    }

    /// Name of the running container; `Some` only while `Started`.
    pub fn instance_identifier(&self) -> Option<String> {
        match &self.inner.shared().state {
            SupervisorState::Started { instance } => Some(instance.clone()),
            _ => None,
        }
    }

    /// Subscribe to supervisor events from this point on.
    ///
    /// Each subscriber gets its own unbounded, ordered stream. A raw chunk is
    /// always delivered before any line derived from it.
    pub fn subscribe(&self) -> BoxStream<'static, SupervisorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.shared().subscribers.push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    /// Bring the service up and attach to its console.
    ///
    /// Runs `compose up -d`, waits for it to exit, finds the started container
    /// in its output and spawns `compose attach` for it. Only valid from
    /// `Idle`. The outcome is reported exactly once, here and as a
    /// `Started`/`StartFailed` event. There is no retry.
    pub async fn start(&self) -> Result<()> {
        {
            let mut shared = self.inner.shared();
            if shared.state != SupervisorState::Idle {
                return Err(SupervisorError::InvalidState {
                    operation: "start",
                    state: shared.state.to_string(),
                });
            }
            shared.state = SupervisorState::Starting;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.bring_up().await;
            let _ = done_tx.send(outcome);
        });

        match done_rx.await {
            Ok(Ok(_instance)) => Ok(()),
            Ok(Err(reason)) => Err(reason.into()),
            Err(_) => {
                let reason = StartFailure::Spawn {
                    phase: "up",
                    message: "startup task ended unexpectedly".to_string(),
                };
                self.inner.fail(reason.clone());
                Err(reason.into())
            }
        }
    }

    /// Send a command to the console and wait for the next line.
    ///
    /// Returns `Ok(None)` when no line arrives within `timeout` (default from
    /// [`SupervisorOptions::command_timeout`]); silence is a normal answer for
    /// many commands. The command is written as-is followed by `\n` and
    /// cannot be recalled after a timeout.
    ///
    /// The timeout covers writing the command as well as waiting for the
    /// reply. A console that stops reading its input also yields `Ok(None)`;
    /// any bytes of the command already written stay in the pipe ahead of the
    /// next command.
    ///
    /// Fails fast with [`SupervisorError::InvalidState`] unless `Started`.
    ///
    /// Correlation is first-come-first-served: overlapping calls each receive
    /// one line in completion order, which is not necessarily the line their
    /// own command produced.
    pub async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        let timeout = timeout.unwrap_or(self.inner.options.command_timeout);
        let deadline = Instant::now() + timeout;

        let response = {
            let mut shared = self.inner.shared();
            if !shared.state.is_started() {
                return Err(SupervisorError::InvalidState {
                    operation: "run",
                    state: shared.state.to_string(),
                });
            }
            shared.pending.retain(|waiter| !waiter.is_closed());
            let (tx, rx) = oneshot::channel();
            shared.pending.push_back(tx);
            rx
        };

        // dropping the write on timeout releases the stdin lock
        match tokio::time::timeout_at(deadline, self.inner.write_line(command)).await {
            Ok(written) => written?,
            Err(_) => {
                tracing::warn!(
                    service = %self.inner.definition.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Console did not accept command before timeout"
                );
                return Ok(None);
            }
        }
        tracing::debug!(service = %self.inner.definition.name, command = %command, "Sent console command");

        match tokio::time::timeout_at(deadline, response).await {
            Ok(Ok(line)) => Ok(Some(line)),
            Ok(Err(_)) => Err(self.inner.released_waiter_error("run")),
            Err(_) => {
                tracing::debug!(
                    service = %self.inner.definition.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "No console response before timeout"
                );
                Ok(None)
            }
        }
    }

    /// Detach from the console and release the attached process.
    ///
    /// With `stop_container`, also runs `compose stop <instance>`. Valid while
    /// `Started` or after the console `Exited`; leaves the supervisor `Stopped`.
    pub async fn shutdown(&self, stop_container: bool) -> Result<()> {
        let instance = {
            let mut shared = self.inner.shared();
            let instance = match &shared.state {
                SupervisorState::Started { instance } | SupervisorState::Exited { instance, .. } => {
                    instance.clone()
                }
                other => {
                    return Err(SupervisorError::InvalidState {
                        operation: "shut down",
                        state: other.to_string(),
                    })
                }
            };
            shared.state = SupervisorState::Stopped;
            shared.framer.clear();
            shared.pending.clear();
            instance
        };

        self.inner.stdin.lock().await.take();
        let session = self.inner.session().take();
        if let Some(session) = session {
            session.stop().await;
        }

        tracing::info!(service = %self.inner.definition.name, instance = %instance, "Detached from console");

        if stop_container {
            self.inner.stop_container(&instance).await?;
        }
        Ok(())
    }
}

impl Inner {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> MutexGuard<'_, Option<AttachSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, reason: StartFailure) {
        let mut shared = self.shared();
        shared.state = SupervisorState::Failed {
            reason: reason.clone(),
        };
        shared.emit(SupervisorEvent::StartFailed(reason));
    }

    async fn bring_up(self: Arc<Self>) -> Result<String, StartFailure> {
        let outcome = self.try_bring_up().await;
        match &outcome {
            Ok(instance) => {
                tracing::info!(service = %self.definition.name, instance = %instance, "Service started");
            }
            Err(reason) => {
                tracing::error!(service = %self.definition.name, reason = %reason, "Service failed to start");
                self.fail(reason.clone());
            }
        }
        outcome
    }

    async fn try_bring_up(self: &Arc<Self>) -> Result<String, StartFailure> {
        let output = self.run_setup().await?;
        if !output.status.success() {
            return Err(StartFailure::SetupExit {
                code: output.status.code(),
            });
        }

        let instance = compose::find_started_container(&output.stdout, &output.stderr)
            .ok_or(StartFailure::SetupOutputParse)?;
        drop(output);

        let directory = self.definition.directory.clone();
        let spawn_err = |message: String| StartFailure::Spawn {
            phase: "attach",
            message,
        };
        let mut child = self
            .cli
            .attach_command(&directory, &instance)
            .spawn()
            .map_err(|e| spawn_err(e.to_string()))?;
        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => return Err(spawn_err("console streams were not captured".to_string())),
        };

        tracing::debug!(service = %self.definition.name, instance = %instance, pid = ?child.id(), "Attached to console");

        *self.stdin.lock().await = Some(stdin);
        {
            let mut shared = self.shared();
            shared.state = SupervisorState::Started {
                instance: instance.clone(),
            };
            shared.emit(SupervisorEvent::Started {
                instance: instance.clone(),
            });
        }

        spawn_stderr_logger(self.definition.name.clone(), stderr);
        let (kill_tx, kill_rx) = oneshot::channel();
        let pump = tokio::spawn(pump_output(Arc::downgrade(self), child, stdout, kill_rx));
        self.install_session(AttachSession { kill_tx, pump }).await;

        Ok(instance)
    }

    /// Keep the pump handle for `shutdown`, or stop it right away when a
    /// shutdown landed between `Started` and this call.
    async fn install_session(&self, session: AttachSession) {
        *self.session() = Some(session);

        let stopped = self.shared().state == SupervisorState::Stopped;
        if stopped {
            let session = self.session().take();
            if let Some(session) = session {
                session.stop().await;
            }
        }
    }

    /// Error for a `run` whose pending slot was dropped without a line.
    fn released_waiter_error(&self, operation: &'static str) -> SupervisorError {
        let shared = self.shared();
        match &shared.state {
            // shutdown released it; the console did not exit
            SupervisorState::Stopped => SupervisorError::InvalidState {
                operation,
                state: shared.state.to_string(),
            },
            _ => SupervisorError::AttachedExited {
                code: shared.exit_code(),
            },
        }
    }

    async fn run_setup(&self) -> Result<Output, StartFailure> {
        let directory = self.definition.directory.clone();
        tracing::info!(service = %self.definition.name, dir = %directory.display(), "Bringing service up");

        let child = self
            .cli
            .up_command(&directory)
            .spawn()
            .map_err(|e| StartFailure::Spawn {
                phase: "up",
                message: e.to_string(),
            })?;

        // dropping the future on timeout kills the child (kill_on_drop)
        let wait = child.wait_with_output();
        let waited = match self.options.setup_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| StartFailure::SetupTimeout {
                    secs: limit.as_secs(),
                })?,
            None => wait.await,
        };
        let output = waited.map_err(|e| StartFailure::Spawn {
            phase: "up",
            message: e.to_string(),
        })?;

        if !output.stderr.is_empty() {
            tracing::debug!(
                service = %self.definition.name,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "compose up stderr"
            );
        }
        Ok(output)
    }

    async fn write_line(&self, command: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(SupervisorError::AttachedExited {
                code: self.shared().exit_code(),
            });
        };
        let mut payload = Vec::with_capacity(command.len() + 1);
        payload.extend_from_slice(command.as_bytes());
        payload.push(LINE_TERMINATOR);
        stdin.write_all(&payload).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn on_chunk(&self, chunk: &[u8]) {
        let mut shared = self.shared();
        shared.emit(SupervisorEvent::Output(chunk.to_vec()));
        for line in shared.framer.push(chunk) {
            let line = decode_line(&line);
            shared.deliver_line(line);
        }
    }

    async fn on_exit(&self, code: Option<i32>) {
        {
            let mut shared = self.shared();
            let instance = match &shared.state {
                SupervisorState::Started { instance } => instance.clone(),
                // shutdown got there first
                _ => return,
            };
            tracing::warn!(service = %self.definition.name, instance = %instance, code = ?code, "Attached process exited");

            let dangling = shared.framer.take_partial();
            if !dangling.is_empty() {
                tracing::debug!(bytes = dangling.len(), "Discarding unterminated console output");
            }
            shared.state = SupervisorState::Exited { instance, code };
            // waiting `run` calls observe AttachedExited
            shared.pending.clear();
            shared.emit(SupervisorEvent::Exited { code });
        }
        self.stdin.lock().await.take();
    }

    async fn stop_container(&self, instance: &str) -> Result<()> {
        let directory = self.definition.directory.clone();
        let output = self
            .cli
            .stop_command(&directory, instance)
            .output()
            .await?;
        if !output.status.success() {
            return Err(SupervisorError::StopExit {
                code: output.status.code(),
            });
        }
        tracing::info!(service = %self.definition.name, instance = %instance, "Container stopped");
        Ok(())
    }
}

/// Read the attached console until EOF or a kill request.
///
/// Holds only a weak reference so dropping the supervisor drops the kill
/// sender, which ends the pump and kills the attached process.
async fn pump_output(
    inner: Weak<Inner>,
    mut child: Child,
    mut stdout: ChildStdout,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let killed = loop {
        tokio::select! {
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break false,
                Ok(n) => match inner.upgrade() {
                    Some(inner) => inner.on_chunk(&buf[..n]),
                    None => break true,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read console output");
                    break false;
                }
            },
            _ = &mut kill_rx => break true,
        }
    };

    if killed {
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "Failed to kill attached process");
        }
        return;
    }

    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait on attached process");
            None
        }
    };
    if let Some(inner) = inner.upgrade() {
        inner.on_exit(code).await;
    }
}

fn spawn_stderr_logger(service: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                tracing::debug!(service = %service, stderr = %line, "compose attach stderr");
            }
        }
    });
}
