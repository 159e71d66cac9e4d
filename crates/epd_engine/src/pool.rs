use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_error, engine_warn};
use epd_core::{ChunkId, FilterSettings, JobId, Msg};
use thiserror::Error;

use crate::control::ControlSignal;
use crate::filter::{PgnRecordFilter, RecordFilter};
use crate::types::{ControlCommand, WorkerAssignment, WorkerReport};
use crate::worker::{run_chunk, ReportSink};

const JOIN_POLL: Duration = Duration::from_millis(20);
const QUIT_GRACE: Duration = Duration::from_millis(300);

/// Receives the controller messages produced on behalf of workers.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, msg: Msg);
}

pub struct ChannelProgressSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> ChannelProgressSink<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }
}

impl<T: From<Msg> + Send> ProgressSink for ChannelProgressSink<T> {
    fn emit(&self, msg: Msg) {
        let _ = self.tx.send(T::from(msg));
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot start worker '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot hand the assignment to the worker: {0}")]
    Handoff(io::Error),
    #[error("cannot start worker thread: {0}")]
    Thread(io::Error),
}

/// Starts the worker for one chunk.
pub trait WorkerLauncher: Send + Sync {
    /// `signal` is shared by every worker of the job. Launchers whose workers
    /// cannot see it receive the same transitions through [`WorkerHandle::send`].
    fn launch(
        &self,
        assignment: WorkerAssignment,
        signal: Arc<ControlSignal>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Box<dyn WorkerHandle>, LaunchError>;
}

/// A running worker, as seen by the pool.
pub trait WorkerHandle: Send {
    fn chunk_id(&self) -> ChunkId;
    fn send(&mut self, command: ControlCommand);
    fn has_exited(&mut self) -> bool;
    /// Terminates the worker. Returns false if it cannot be terminated.
    fn kill(&mut self) -> bool;
    /// Waits until every report of the worker has been delivered.
    fn finish(self: Box<Self>);
}

/// Runs each chunk in a child process speaking the JSON-lines protocol.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The `epd-worker` binary installed next to the running executable,
    /// falling back to a `PATH` lookup.
    pub fn sibling_worker() -> Self {
        let name = format!("epd-worker{}", std::env::consts::EXE_SUFFIX);
        let program = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
            .filter(|path| path.is_file())
            .unwrap_or_else(|| PathBuf::from(name));
        Self::new(program)
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        assignment: WorkerAssignment,
        _signal: Arc<ControlSignal>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Box<dyn WorkerHandle>, LaunchError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let (job_id, chunk_id) = (assignment.job_id, assignment.chunk.id);
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            terminate(&mut child);
            return Err(LaunchError::Handoff(io::Error::other("worker pipes unavailable")));
        };
        let handoff = serde_json::to_string(&assignment)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(stdin, "{line}"))
            .and_then(|()| stdin.flush());
        if let Err(err) = handoff {
            terminate(&mut child);
            return Err(LaunchError::Handoff(err));
        }

        let reader = thread::Builder::new()
            .name(format!("chunk-{chunk_id}-reports"))
            .spawn(move || read_reports(stdout, job_id, chunk_id, sink.as_ref()));
        let reader = match reader {
            Ok(reader) => reader,
            Err(err) => {
                terminate(&mut child);
                return Err(LaunchError::Thread(err));
            }
        };
        engine_debug!("started worker process {} for chunk {chunk_id}", child.id());

        Ok(Box::new(ProcessHandle {
            chunk_id,
            child,
            stdin: Some(stdin),
            reader: Some(reader),
        }))
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn read_reports(stdout: ChildStdout, job_id: JobId, chunk_id: ChunkId, sink: &dyn ProgressSink) {
    let mut finished = false;
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                engine_warn!("lost report stream of chunk {chunk_id}: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkerReport>(&line) {
            Ok(report) if report.chunk_id() != chunk_id => {
                engine_warn!(
                    "worker for chunk {chunk_id} reported chunk {}",
                    report.chunk_id()
                );
            }
            Ok(report) => {
                finished |= report.is_final();
                sink.emit(report.into_msg(job_id));
            }
            Err(err) => engine_warn!("chunk {chunk_id}: unreadable report {line:?}: {err}"),
        }
    }

    if !finished {
        engine_error!("worker for chunk {chunk_id} exited without a final report");
        sink.emit(Msg::WorkerLost {
            job_id,
            chunk_id,
            message: "worker exited without a final report".to_string(),
        });
    }
}

struct ProcessHandle {
    chunk_id: ChunkId,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
}

impl WorkerHandle for ProcessHandle {
    fn chunk_id(&self) -> ChunkId {
        self.chunk_id
    }

    fn send(&mut self, command: ControlCommand) {
        let Some(stdin) = self.stdin.as_mut() else {
            return;
        };
        let sent = serde_json::to_string(&command)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(stdin, "{line}"))
            .and_then(|()| stdin.flush());
        if let Err(err) = sent {
            engine_debug!("worker for chunk {} stopped listening: {err}", self.chunk_id);
            self.stdin = None;
        }
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(status) => status.is_some(),
            Err(err) => {
                engine_warn!("cannot poll worker for chunk {}: {err}", self.chunk_id);
                true
            }
        }
    }

    fn kill(&mut self) -> bool {
        engine_warn!("killing unresponsive worker for chunk {}", self.chunk_id);
        terminate(&mut self.child);
        true
    }

    fn finish(mut self: Box<Self>) {
        self.stdin = None;
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                engine_error!("report reader of chunk {} panicked", self.chunk_id);
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // Closing stdin asks the worker to stop.
        self.stdin = None;
        let deadline = Instant::now() + QUIT_GRACE;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        terminate(&mut self.child);
    }
}

type FilterFactory = dyn Fn(&FilterSettings) -> Arc<dyn RecordFilter> + Send + Sync;

/// Runs each chunk on a thread of the current process.
///
/// Needed for record filters that cannot be named on a command line. Thread
/// workers cannot be killed; the pool detaches them after the stop timeout.
#[derive(Clone)]
pub struct ThreadLauncher {
    make_filter: Arc<FilterFactory>,
}

impl ThreadLauncher {
    /// Workers filter with [`PgnRecordFilter`] configured from each assignment.
    pub fn pgn() -> Self {
        Self {
            make_filter: Arc::new(|settings: &FilterSettings| {
                Arc::new(PgnRecordFilter::new(settings.clone())) as Arc<dyn RecordFilter>
            }),
        }
    }

    /// Workers share `filter` and ignore the job's filter settings.
    pub fn with_filter(filter: Arc<dyn RecordFilter>) -> Self {
        Self {
            make_filter: Arc::new(move |_: &FilterSettings| filter.clone()),
        }
    }
}

impl Default for ThreadLauncher {
    fn default() -> Self {
        Self::pgn()
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn launch(
        &self,
        assignment: WorkerAssignment,
        signal: Arc<ControlSignal>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Box<dyn WorkerHandle>, LaunchError> {
        let (job_id, chunk_id) = (assignment.job_id, assignment.chunk.id);
        let filter = (self.make_filter)(&assignment.filter);
        let forward = ForwardSink { job_id, sink };

        let thread = thread::Builder::new()
            .name(format!("chunk-{chunk_id}"))
            .spawn(move || {
                let run = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_chunk(
                        &assignment.chunk,
                        &assignment.input_path,
                        filter.as_ref(),
                        &signal,
                        assignment.progress_every,
                        &forward,
                    )
                }));
                if run.is_err() {
                    engine_error!("worker thread for chunk {chunk_id} panicked");
                    forward.sink.emit(Msg::WorkerLost {
                        job_id,
                        chunk_id,
                        message: "worker thread panicked".to_string(),
                    });
                }
            })
            .map_err(LaunchError::Thread)?;

        Ok(Box::new(ThreadHandle {
            chunk_id,
            thread: Some(thread),
        }))
    }
}

struct ForwardSink {
    job_id: JobId,
    sink: Arc<dyn ProgressSink>,
}

impl ReportSink for ForwardSink {
    fn report(&self, report: WorkerReport) {
        self.sink.emit(report.into_msg(self.job_id));
    }
}

struct ThreadHandle {
    chunk_id: ChunkId,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle for ThreadHandle {
    fn chunk_id(&self) -> ChunkId {
        self.chunk_id
    }

    // Thread workers read the shared signal directly.
    fn send(&mut self, _command: ControlCommand) {}

    fn has_exited(&mut self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn kill(&mut self) -> bool {
        false
    }

    fn finish(mut self: Box<Self>) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.is_finished() {
            let _ = thread.join();
        } else {
            engine_warn!("detaching unresponsive worker thread for chunk {}", self.chunk_id);
        }
    }
}

/// The workers of one job and the signal they share.
pub struct WorkerPool {
    signal: Arc<ControlSignal>,
    workers: Vec<Box<dyn WorkerHandle>>,
}

impl WorkerPool {
    /// Launches one worker per assignment. A worker that fails to launch is
    /// reported to `sink` as lost; the others keep running.
    pub fn spawn(
        launcher: &dyn WorkerLauncher,
        assignments: Vec<WorkerAssignment>,
        signal: Arc<ControlSignal>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let mut workers = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let (job_id, chunk_id) = (assignment.job_id, assignment.chunk.id);
            match launcher.launch(assignment, signal.clone(), sink.clone()) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    engine_error!("chunk {chunk_id}: {err}");
                    sink.emit(Msg::WorkerLost {
                        job_id,
                        chunk_id,
                        message: err.to_string(),
                    });
                }
            }
        }
        Self { signal, workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn signal(&self) -> &ControlSignal {
        &self.signal
    }

    pub fn pause(&mut self) {
        self.signal.pause();
        self.broadcast(ControlCommand::Pause);
    }

    pub fn resume(&mut self) {
        self.signal.resume();
        self.broadcast(ControlCommand::Resume);
    }

    pub fn stop(&mut self, save: bool) {
        self.signal.stop(save);
        self.broadcast(ControlCommand::Stop);
    }

    fn broadcast(&mut self, command: ControlCommand) {
        for worker in &mut self.workers {
            worker.send(command);
        }
    }

    /// Waits up to `timeout` for every worker to exit, then kills the rest.
    ///
    /// Returns how many workers were killed. Every report of an exited worker
    /// has been handed to the sink when this returns.
    pub fn join(self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut workers = self.workers;
        while Instant::now() < deadline && workers.iter_mut().any(|w| !w.has_exited()) {
            thread::sleep(JOIN_POLL);
        }

        let mut killed = 0;
        for mut worker in workers {
            if !worker.has_exited() && worker.kill() {
                killed += 1;
            }
            worker.finish();
        }
        killed
    }
}
