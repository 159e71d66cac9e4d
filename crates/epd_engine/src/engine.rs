use std::fmt;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_info};
use epd_core::{
    update, ChunkTask, ControlError, ControllerState, Effect, FinalizeOutcome, Job, JobId,
    JobState, JobView, Msg, Settings, StatusEvent, ValidationError,
};
use thiserror::Error;

use crate::control::ControlSignal;
use crate::filename::chunk_temp_path;
use crate::merge::{discard_chunks, finalize_chunks};
use crate::partition::partition_input;
use crate::persist::{ensure_output_dir, parent_dir, validate_paths, PersistError};
use crate::pool::{ChannelProgressSink, ProcessLauncher, ProgressSink, WorkerLauncher, WorkerPool};
use crate::status::StatusBroadcaster;
use crate::types::WorkerAssignment;

/// Per-controller settings, shared by every job it runs.
#[derive(Clone)]
pub struct EngineConfig {
    /// Where chunk temporaries go; defaults to the output's directory.
    pub scratch_dir: Option<PathBuf>,
    /// How long the join step waits before killing workers.
    pub stop_timeout: Duration,
    /// Minimum spacing of progress-only status events.
    pub status_interval: Duration,
    /// Records between two worker progress reports.
    pub progress_every: u64,
    pub launcher: Arc<dyn WorkerLauncher>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            stop_timeout: Duration::from_secs(10),
            status_interval: Duration::from_millis(100),
            progress_every: 100,
            launcher: Arc::new(ProcessLauncher::sibling_worker()),
        }
    }
}

impl EngineConfig {
    pub fn with_launcher(mut self, launcher: impl WorkerLauncher + 'static) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("scratch_dir", &self.scratch_dir)
            .field("stop_timeout", &self.stop_timeout)
            .field("status_interval", &self.status_interval)
            .field("progress_every", &self.progress_every)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("scratch directory unusable: {0}")]
    Scratch(#[from] PersistError),
}

enum ControllerEvent {
    Msg(Msg),
    Shutdown,
}

impl From<Msg> for ControllerEvent {
    fn from(msg: Msg) -> Self {
        ControllerEvent::Msg(msg)
    }
}

/// Owns the job lifecycle; the only entry point for callers.
///
/// Every method returns promptly. Partitioning, worker IO, joining and
/// merging happen on background threads that report back through a channel
/// drained by a dispatcher thread.
pub struct JobController {
    shared: Arc<Shared>,
    dispatcher: Option<JoinHandle<()>>,
}

struct Shared {
    inner: Mutex<Inner>,
    settled: Condvar,
    config: EngineConfig,
    events: mpsc::Sender<ControllerEvent>,
}

struct Inner {
    state: ControllerState,
    pool: Option<WorkerPool>,
    broadcaster: StatusBroadcaster,
}

impl JobController {
    pub fn new(config: EngineConfig) -> Self {
        let (events, event_rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: ControllerState::new(),
                pool: None,
                broadcaster: StatusBroadcaster::new(config.status_interval),
            }),
            settled: Condvar::new(),
            config,
            events,
        });

        let dispatcher = {
            let shared = shared.clone();
            thread::spawn(move || {
                while let Ok(ControllerEvent::Msg(msg)) = event_rx.recv() {
                    if let Err(err) = shared.apply(msg) {
                        engine_debug!("ignored background message: {err}");
                    }
                }
            })
        };

        Self {
            shared,
            dispatcher: Some(dispatcher),
        }
    }

    /// Validates `settings` and starts a job. Returns its id.
    ///
    /// A start that would be rejected touches nothing on disk.
    pub fn start(&self, settings: Settings) -> Result<JobId, StartError> {
        let mut inner = self.shared.lock();
        inner.state.check_start()?;
        validate_paths(&settings)?;
        if let Some(dir) = &self.shared.config.scratch_dir {
            ensure_output_dir(dir)?;
        }

        self.shared
            .apply_locked(&mut inner, Msg::StartRequested(settings))?;
        Ok(inner.state.job().map(Job::id).unwrap_or_default())
    }

    pub fn pause(&self) -> Result<(), ControlError> {
        self.shared.apply(Msg::PauseRequested)
    }

    pub fn resume(&self) -> Result<(), ControlError> {
        self.shared.apply(Msg::ResumeRequested)
    }

    /// Stops the job; `save` keeps what the workers produced so far.
    pub fn stop(&self, save: bool) -> Result<(), ControlError> {
        self.shared.apply(Msg::StopRequested { save })
    }

    /// Forgets a finished job, returning to idle.
    pub fn reset(&self) -> Result<(), ControlError> {
        self.shared.apply(Msg::ResetRequested)
    }

    pub fn state(&self) -> JobState {
        self.shared.lock().state.state()
    }

    pub fn status(&self) -> StatusEvent {
        self.shared.lock().state.status()
    }

    pub fn view(&self) -> JobView {
        self.shared.lock().state.view()
    }

    /// Status messages of the current job, oldest first.
    pub fn job_log(&self) -> Vec<String> {
        self.shared
            .lock()
            .state
            .job()
            .map(|job| job.log().to_vec())
            .unwrap_or_default()
    }

    /// A new observer. It sees every event published after this call.
    pub fn subscribe(&self) -> mpsc::Receiver<StatusEvent> {
        self.shared.lock().broadcaster.subscribe()
    }

    /// Blocks until the job is terminal with its temporaries gone, or `timeout`
    /// elapses. Returns whether the controller settled.
    pub fn wait_until_settled(&self, timeout: Duration) -> bool {
        let inner = self.shared.lock();
        let (inner, _) = self
            .shared
            .settled
            .wait_timeout_while(inner, timeout, |inner| !inner.state.is_settled())
            .unwrap_or_else(PoisonError::into_inner);
        inner.state.is_settled()
    }
}

impl Default for JobController {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        let _ = self.shared.events.send(ControllerEvent::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }

        let mut inner = self.shared.lock();
        if let Some(mut pool) = inner.pool.take() {
            pool.stop(false);
        }
        if let Some(job) = inner.state.job().filter(|job| !job.is_settled()) {
            engine_info!("controller dropped mid-job; discarding temporaries");
            discard_chunks(job.chunks());
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, msg: Msg) -> Result<(), ControlError> {
        let mut inner = self.lock();
        self.apply_locked(&mut inner, msg)
    }

    fn apply_locked(&self, inner: &mut Inner, msg: Msg) -> Result<(), ControlError> {
        let effects = update(&mut inner.state, msg)?;
        for effect in effects {
            self.run_effect(inner, effect);
        }
        if inner.state.is_settled() {
            self.settled.notify_all();
        }
        Ok(())
    }

    fn run_effect(&self, inner: &mut Inner, effect: Effect) {
        match effect {
            Effect::Partition { job_id, settings } => self.spawn_partition(job_id, settings),
            Effect::SpawnWorkers {
                job_id,
                settings,
                chunks,
            } => {
                let signal = Arc::new(ControlSignal::new());
                if inner.state.state() == JobState::Paused {
                    signal.pause();
                }
                let assignments = chunks
                    .into_iter()
                    .map(|chunk| WorkerAssignment {
                        job_id,
                        chunk,
                        input_path: settings.input_path.clone(),
                        filter: settings.filter(),
                        progress_every: self.config.progress_every,
                        paused: signal.is_paused(),
                    })
                    .collect();
                let sink: Arc<dyn ProgressSink> =
                    Arc::new(ChannelProgressSink::new(self.events.clone()));
                inner.pool = Some(WorkerPool::spawn(
                    self.config.launcher.as_ref(),
                    assignments,
                    signal,
                    sink,
                ));
            }
            Effect::SignalPause => {
                if let Some(pool) = inner.pool.as_mut() {
                    pool.pause();
                }
            }
            Effect::SignalResume => {
                if let Some(pool) = inner.pool.as_mut() {
                    pool.resume();
                }
            }
            Effect::SignalStop { save } => {
                if let Some(pool) = inner.pool.as_mut() {
                    pool.stop(save);
                }
            }
            Effect::JoinWorkers { job_id } => {
                let pool = inner.pool.take();
                let events = self.events.clone();
                let timeout = self.config.stop_timeout;
                thread::spawn(move || {
                    let killed = pool.map_or(0, |pool| pool.join(timeout));
                    let _ = events.send(Msg::WorkersJoined { job_id, killed }.into());
                });
            }
            Effect::Finalize {
                job_id,
                output_path,
                chunks,
                decision,
                dedup,
            } => {
                let events = self.events.clone();
                thread::spawn(move || {
                    let outcome = finalize_chunks(&output_path, &chunks, decision, dedup);
                    if let FinalizeOutcome::Failed { message } = &outcome {
                        engine_error!("job {job_id}: {message}");
                    }
                    let _ = events.send(Msg::Finalized { job_id, outcome }.into());
                });
            }
            Effect::EmitStatus { event, throttle } => {
                if event.state == JobState::Error {
                    engine_error!("[{}] {}% - {}", event.state, event.progress, event.message);
                } else if throttle {
                    engine_debug!("[{}] {}% - {}", event.state, event.progress, event.message);
                } else {
                    engine_info!("[{}] {}% - {}", event.state, event.progress, event.message);
                }
                inner.broadcaster.publish(&event, throttle);
            }
        }
    }

    fn spawn_partition(&self, job_id: JobId, settings: Settings) {
        let scratch = self
            .config
            .scratch_dir
            .clone()
            .unwrap_or_else(|| parent_dir(&settings.output_path));
        let events = self.events.clone();
        thread::spawn(move || {
            let msg = match partition_input(&settings.input_path, settings.workers) {
                Ok(partition) => Msg::Partitioned {
                    job_id,
                    chunks: partition
                        .ranges
                        .iter()
                        .enumerate()
                        .map(|(id, range)| {
                            ChunkTask::new(
                                id,
                                range.start,
                                range.end,
                                range.records,
                                chunk_temp_path(&scratch, &settings.output_path, job_id, id),
                            )
                        })
                        .collect(),
                    total_records: partition.total_records,
                },
                Err(err) => {
                    engine_error!("job {job_id}: {err}");
                    Msg::PartitionFailed {
                        job_id,
                        message: err.to_string(),
                    }
                }
            };
            let _ = events.send(msg.into());
        });
    }
}
