//! Process registry: every external tool runs through here so that cancellation
//! and shutdown can reach it.

use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::domain::model::JobId;
use crate::error::ToolError;

/// How long to wait for killed processes to be reaped during shutdown
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Termination signal sent to tracked processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Signal {
    /// Graceful interrupt (SIGINT)
    #[default]
    Interrupt,
    /// Graceful terminate (SIGTERM)
    Terminate,
    /// Forced kill
    Kill,
}

impl Signal {
    /// Name understood by `kill -s`
    fn kill_name(self) -> &'static str {
        match self {
            Signal::Interrupt => "INT",
            Signal::Terminate => "TERM",
            Signal::Kill => "KILL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.kill_name())
    }
}

/// Program plus arguments, rendered for logs and errors
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a successful tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

struct TrackedProcess {
    pid: Option<u32>,
    program: String,
    signals: mpsc::UnboundedSender<Signal>,
}

#[derive(Default)]
struct ProcessTable {
    jobs: HashMap<JobId, HashMap<u64, TrackedProcess>>,
    /// Jobs that may not start new processes until their next run
    cancelled: HashSet<JobId>,
    /// Set by shutdown; no new process starts afterwards
    closed: bool,
}

impl ProcessTable {
    fn refuses(&self, job_id: &JobId) -> bool {
        self.closed || self.cancelled.contains(job_id)
    }
}

/// Counts from a two-phase shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub interrupted: usize,
    pub killed: usize,
    pub remaining: usize,
}

/// Live external tool invocations, keyed by job id
#[derive(Default)]
pub struct ProcessRegistry {
    processes: Mutex<ProcessTable>,
    next_id: AtomicU64,
    drained: Notify,
}

/// Removes its entry from the registry when the run finishes or is dropped
struct Registration<'a> {
    registry: &'a ProcessRegistry,
    job_id: JobId,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut table = self.registry.table();
        if let Some(job) = table.jobs.get_mut(&self.job_id) {
            job.remove(&self.id);
            if job.is_empty() {
                table.jobs.remove(&self.job_id);
            }
        }
        drop(table);
        self.registry.drained.notify_waiters();
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, ProcessTable> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a process about to be spawned. `None` when the job was
    /// cancelled or the registry shut down.
    fn register(
        &self,
        job_id: &JobId,
        program: String,
    ) -> Option<(Registration<'_>, mpsc::UnboundedReceiver<Signal>)> {
        let mut table = self.table();
        if table.refuses(job_id) {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        table.jobs.entry(job_id.clone()).or_default().insert(
            id,
            TrackedProcess {
                pid: None,
                program,
                signals: tx,
            },
        );
        let registration = Registration {
            registry: self,
            job_id: job_id.clone(),
            id,
        };
        Some((registration, rx))
    }

    fn record_pid(&self, registration: &Registration<'_>, pid: Option<u32>) {
        if let Some(process) = self
            .table()
            .jobs
            .get_mut(&registration.job_id)
            .and_then(|job| job.get_mut(&registration.id))
        {
            process.pid = pid;
        }
    }

    /// Run a tool to completion under `job_id`, capturing stdout and stderr.
    ///
    /// A non-zero exit is [`ToolError::Failed`]; a process that received a
    /// signal from the registry is [`ToolError::Terminated`] however it exited.
    pub async fn run(&self, job_id: &JobId, command: ToolCommand) -> Result<ToolOutput, ToolError> {
        let rendered = command.to_string();

        // Registered before spawning so a cancel can never miss the process
        let Some((registration, mut signals)) = self.register(job_id, command.program()) else {
            debug!(job_id = %job_id, command = %rendered, "Job cancelled, tool not started");
            return Err(ToolError::Terminated {
                command: rendered,
                signal: "cancellation".to_string(),
                stdout: String::new(),
                stderr: String::new(),
            });
        };
        debug!(job_id = %job_id, command = %rendered, "Spawning tool");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: command.program(),
                source,
            })?;

        self.record_pid(&registration, child.id());

        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        let mut received: Option<Signal> = None;
        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|source| ToolError::Io {
                        command: rendered.clone(),
                        source,
                    })?;
                }
                Some(signal) = signals.recv() => {
                    received = received.max(Some(signal));
                    deliver(&mut child, signal).await;
                }
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();

        if let Some(signal) = received {
            debug!(job_id = %job_id, command = %rendered, %signal, %status, "Tool terminated");
            return Err(ToolError::Terminated {
                command: rendered,
                signal: signal.to_string(),
                stdout,
                stderr,
            });
        }
        if !status.success() {
            return Err(ToolError::Failed {
                command: rendered,
                status,
                stdout,
                stderr,
            });
        }
        Ok(ToolOutput {
            status,
            stdout,
            stderr,
        })
    }

    fn signal_where<F>(&self, signal: Signal, mut selector: F) -> usize
    where
        F: FnMut(&JobId) -> bool,
    {
        let table = self.table();
        Self::signal_locked(&table, signal, &mut selector)
    }

    fn signal_locked<F>(table: &ProcessTable, signal: Signal, selector: &mut F) -> usize
    where
        F: FnMut(&JobId) -> bool,
    {
        let mut signalled = 0;
        for (job_id, processes) in table.jobs.iter().filter(|(job_id, _)| selector(job_id)) {
            for process in processes.values() {
                match process.signals.send(signal) {
                    Ok(()) => {
                        signalled += 1;
                        debug!(
                            job_id = %job_id,
                            pid = ?process.pid,
                            program = %process.program,
                            %signal,
                            "Signal queued"
                        );
                    }
                    Err(_) => warn!(
                        job_id = %job_id,
                        pid = ?process.pid,
                        program = %process.program,
                        "Process already gone, signal dropped"
                    ),
                }
            }
        }
        signalled
    }

    /// Signal every live process of one job. Returns how many were signalled.
    pub fn terminate_all(&self, job_id: &JobId, signal: Signal) -> usize {
        let count = self.signal_where(signal, |id| id == job_id);
        if count > 0 {
            info!(job_id = %job_id, %signal, count, "Terminating job processes");
        }
        count
    }

    /// Refuse new processes for `job_id` and signal the live ones, atomically.
    /// Returns how many were signalled.
    pub fn cancel_job(&self, job_id: &JobId, signal: Signal) -> usize {
        let mut table = self.table();
        table.cancelled.insert(job_id.clone());
        let count = Self::signal_locked(&table, signal, &mut |id: &JobId| id == job_id);
        drop(table);
        info!(job_id = %job_id, %signal, count, "Job cancelled in process registry");
        count
    }

    /// Allow `job_id` to start processes again, for a fresh run
    pub fn reset_job(&self, job_id: &JobId) {
        self.table().cancelled.remove(job_id);
    }

    pub fn is_cancelled(&self, job_id: &JobId) -> bool {
        self.table().refuses(job_id)
    }

    /// Signal every live process of every job
    pub fn terminate_everything(&self, signal: Signal) -> usize {
        let count = self.signal_where(signal, |_| true);
        if count > 0 {
            info!(%signal, count, "Terminating all tracked processes");
        }
        count
    }

    /// Live processes of one job, or of all jobs when `job_id` is `None`
    pub fn tracked_count(&self, job_id: Option<&JobId>) -> usize {
        let table = self.table();
        match job_id {
            Some(id) => table.jobs.get(id).map(HashMap::len).unwrap_or(0),
            None => table.jobs.values().map(HashMap::len).sum(),
        }
    }

    /// Wait until no tracked process remains. Returns `false` on timeout.
    pub async fn wait_until_idle(&self, job_id: Option<&JobId>, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let drained = self.drained.notified();
            if self.tracked_count(job_id) == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                return self.tracked_count(job_id) == 0;
            }
        }
    }

    /// Interrupt everything, wait up to `grace`, then kill whatever is left
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.table().closed = true;
        let mut report = ShutdownReport {
            interrupted: self.terminate_everything(Signal::Interrupt),
            ..Default::default()
        };

        if !self.wait_until_idle(None, grace).await {
            report.killed = self.terminate_everything(Signal::Kill);
            if !self.wait_until_idle(None, REAP_TIMEOUT).await {
                warn!(remaining = self.tracked_count(None), "Processes still tracked after kill");
            }
        }

        report.remaining = self.tracked_count(None);
        info!(
            interrupted = report.interrupted,
            killed = report.killed,
            remaining = report.remaining,
            "Process shutdown finished"
        );
        report
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buffer).await {
            debug!(error = %e, read = buffer.len(), "Tool output pipe closed with an error");
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

async fn deliver(child: &mut Child, signal: Signal) {
    let Some(pid) = child.id() else {
        return;
    };

    if signal != Signal::Kill && cfg!(unix) {
        let result = Command::new("kill")
            .args(["-s", signal.kill_name(), &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) if status.success() => return,
            Ok(status) => warn!(pid, %signal, %status, "kill utility failed"),
            Err(e) => warn!(pid, %signal, error = %e, "kill utility unavailable"),
        }
        return;
    }

    if let Err(e) = child.start_kill() {
        warn!(pid, error = %e, "Failed to kill process");
    }
}
