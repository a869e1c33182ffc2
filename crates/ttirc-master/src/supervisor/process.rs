// ABOUTME: Spawns and monitors one session-handler child process per connection.
// ABOUTME: Forwards its output into tracing and reports liveness as worker state.

use super::worker::{StateCell, Worker, WorkerFactory};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ttirc_master_core::{ConnectionId, WorkerKind, WorkerState};

/// Placeholder in session arguments replaced by the connection id.
pub const CONNECTION_ID_PLACEHOLDER: &str = "{id}";

/// Environment variable carrying the connection id into the child.
pub const CONNECTION_ID_ENV: &str = "TTIRC_CONNECTION_ID";

/// Program and argument template for session processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SessionCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Arguments with every `{id}` replaced by the connection id.
    pub fn args_for(&self, id: ConnectionId) -> Vec<String> {
        let id = id.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(CONNECTION_ID_PLACEHOLDER, &id))
            .collect()
    }
}

pub struct ProcessWorker {
    id: ConnectionId,
    command: SessionCommand,
    state: StateCell,
    stop: CancellationToken,
    kill: CancellationToken,
    started: AtomicBool,
}

impl ProcessWorker {
    pub fn new(id: ConnectionId, command: SessionCommand) -> Self {
        Self {
            id,
            command,
            state: StateCell::new(),
            stop: CancellationToken::new(),
            kill: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }
}

impl Worker for ProcessWorker {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::External
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut cmd = Command::new(&self.command.program);
        cmd.args(self.command.args_for(self.id))
            .env(CONNECTION_ID_ENV, self.id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so signals also reach anything the session forks.
        #[cfg(unix)]
        cmd.process_group(0);

        tokio::spawn(monitor(
            self.id,
            cmd,
            self.state.clone(),
            self.stop.clone(),
            self.kill.clone(),
        ));
    }

    fn request_stop(&self) {
        self.stop.cancel();
    }

    fn force_kill(&self) {
        self.kill.cancel();
    }

    fn state(&self) -> WorkerState {
        self.state.get()
    }
}

enum Wake {
    Exited(std::io::Result<ExitStatus>),
    Stop,
    Kill,
}

/// Owns the child for its whole life; publishes Terminated only after it has been reaped.
async fn monitor(
    id: ConnectionId,
    mut cmd: Command,
    state: StateCell,
    stop: CancellationToken,
    kill: CancellationToken,
) {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Failed to spawn session process");
            state.advance(WorkerState::Terminated);
            return;
        }
    };

    info!(connection_id = %id, pid = ?child.id(), "Spawned session process");

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(id, "stdout", stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(id, "stderr", stderr));
    }

    state.advance(WorkerState::Running);

    let mut stop_sent = false;
    let status = loop {
        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            _ = stop.cancelled(), if !stop_sent => Wake::Stop,
            _ = kill.cancelled() => Wake::Kill,
        };

        match wake {
            Wake::Exited(status) => break status,
            Wake::Stop => {
                stop_sent = true;
                if let Err(e) = terminate(&mut child) {
                    warn!(connection_id = %id, error = %e, "Failed to signal session process");
                }
            }
            Wake::Kill => {
                if let Err(e) = kill_group(&mut child) {
                    warn!(connection_id = %id, error = %e, "Failed to kill session process group");
                }
                if let Err(e) = child.start_kill() {
                    warn!(connection_id = %id, error = %e, "Failed to kill session process");
                }
                break child.wait().await;
            }
        }
    };

    match status {
        Ok(status) => info!(connection_id = %id, %status, "Session process exited"),
        Err(e) => warn!(connection_id = %id, error = %e, "Failed to wait for session process"),
    }
    drop(child);
    state.advance(WorkerState::Terminated);
}

/// Send `signal` to the child's process group.
#[cfg(unix)]
fn signal_group(child: &mut Child, signal: libc::c_int) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };
    let pgid = i32::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: the child leads its own group and has not been waited on yet,
    // so the group id cannot have been reused.
    #[allow(unsafe_code)]
    let result = unsafe { libc::kill(-pgid, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Ask the session to exit: SIGTERM to its group where available, a hard kill elsewhere.
#[cfg(unix)]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    signal_group(child, libc::SIGTERM)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

#[cfg(unix)]
fn kill_group(child: &mut Child) -> std::io::Result<()> {
    signal_group(child, libc::SIGKILL)
}

/// The direct kill below covers the child; there is no group to reach.
#[cfg(not(unix))]
fn kill_group(_child: &mut Child) -> std::io::Result<()> {
    Ok(())
}

async fn forward_lines<R>(id: ConnectionId, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(connection_id = %id, stream, "{}", line);
    }
}

/// Builds [`ProcessWorker`]s from one command template.
pub struct ProcessWorkerFactory {
    command: SessionCommand,
}

impl ProcessWorkerFactory {
    pub fn new(command: SessionCommand) -> Self {
        Self { command }
    }
}

impl WorkerFactory for ProcessWorkerFactory {
    fn kind(&self) -> WorkerKind {
        WorkerKind::External
    }

    fn create(&self, id: ConnectionId) -> Box<dyn Worker> {
        Box::new(ProcessWorker::new(id, self.command.clone()))
    }
}
