use std::fmt;

use serde::{Deserialize, Serialize};

use crate::view_model::{ChunkRowView, JobView, StatusEvent};
use crate::{ChunkTask, ControlAction, ControlError, ProgressAggregator, Settings};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobState {
    #[default]
    Idle,
    Processing,
    Paused,
    Stopping,
    Complete,
    Stopped,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Stopped | JobState::Error)
    }

    /// Processing or paused: the states a stop request is accepted in.
    pub fn is_running(self) -> bool {
        matches!(self, JobState::Processing | JobState::Paused)
    }

    pub fn label(self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Processing => "processing",
            JobState::Paused => "paused",
            JobState::Stopping => "stopping",
            JobState::Complete => "complete",
            JobState::Stopped => "stopped",
            JobState::Error => "error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobResultKind {
    /// Every chunk was processed and merged.
    Success,
    /// Output of a stopped job was saved.
    Partial,
}

/// Where the job is in its pipeline, independent of the user-facing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Partitioning,
    Running,
    Joining,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    settings: Settings,
    state: JobState,
    pub(crate) phase: Phase,
    pub(crate) chunks: Vec<ChunkTask>,
    pub(crate) progress: ProgressAggregator,
    percent: u8,
    log: Vec<String>,
    result: Option<JobResultKind>,
    pub(crate) stop_save: Option<bool>,
}

impl Job {
    pub(crate) fn new(id: JobId, settings: Settings) -> Self {
        Self {
            id,
            settings,
            state: JobState::Processing,
            phase: Phase::Partitioning,
            chunks: Vec::new(),
            progress: ProgressAggregator::default(),
            percent: 0,
            log: Vec::new(),
            result: None,
            stop_save: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn chunks(&self) -> &[ChunkTask] {
        &self.chunks
    }

    pub fn progress(&self) -> u8 {
        self.percent
    }

    pub fn records_total(&self) -> u64 {
        self.progress.total_records()
    }

    pub fn records_scanned(&self) -> u64 {
        self.progress.scanned()
    }

    pub fn records_kept(&self) -> u64 {
        self.progress.kept()
    }

    /// Status messages in the order they were produced.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn result(&self) -> Option<JobResultKind> {
        self.result
    }

    /// True once the job is terminal and its temporaries are gone.
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() && self.phase == Phase::Done
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
        match state {
            JobState::Complete | JobState::Stopped => self.percent = 100,
            // An error freezes the percentage where it was.
            JobState::Error => {}
            _ => self.percent = self.progress.percent(),
        }
    }

    pub(crate) fn refresh_percent(&mut self) {
        if !self.state.is_terminal() {
            self.percent = self.progress.percent();
        }
    }

    pub(crate) fn set_result(&mut self, result: Option<JobResultKind>) {
        self.result = result;
    }

    pub(crate) fn push_log(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
    }

    pub(crate) fn all_chunks_finished(&self) -> bool {
        self.chunks.iter().all(|chunk| chunk.status.is_finished())
    }

    pub(crate) fn status_event(&self, message: impl Into<String>) -> StatusEvent {
        StatusEvent {
            job_id: Some(self.id),
            state: self.state,
            progress: self.percent,
            message: message.into(),
            is_complete: self.is_settled(),
        }
    }
}

/// Everything the controller knows; mutated only through [`crate::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    next_job_id: JobId,
    pub(crate) job: Option<Job>,
    dirty: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            next_job_id: 1,
            job: None,
            dirty: false,
        }
    }
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> JobState {
        self.job.as_ref().map_or(JobState::Idle, Job::state)
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Whether a start request would be accepted right now.
    ///
    /// Callers with side effects to perform before starting check this first,
    /// so a rejected start leaves nothing behind.
    pub fn check_start(&self) -> Result<(), ControlError> {
        match &self.job {
            None => Ok(()),
            Some(job) if job.state().is_terminal() => Err(ControlError::InvalidState {
                action: ControlAction::Start,
                state: job.state(),
            }),
            Some(job) => Err(ControlError::JobActive { state: job.state() }),
        }
    }

    /// Idle, or terminal with cleanup finished.
    pub fn is_settled(&self) -> bool {
        self.job.as_ref().is_none_or(Job::is_settled)
    }

    /// Snapshot of the externally visible status, repeating the last message.
    pub fn status(&self) -> StatusEvent {
        match &self.job {
            Some(job) => job.status_event(job.log.last().cloned().unwrap_or_default()),
            None => StatusEvent::idle(),
        }
    }

    pub fn view(&self) -> JobView {
        match &self.job {
            Some(job) => JobView {
                job_id: Some(job.id),
                state: job.state,
                progress: job.percent,
                records_total: job.records_total(),
                records_scanned: job.records_scanned(),
                records_kept: job.records_kept(),
                chunks: job
                    .chunks
                    .iter()
                    .map(|chunk| ChunkRowView {
                        chunk_id: chunk.id,
                        start: chunk.start,
                        end: chunk.end,
                        records: chunk.records,
                        scanned: chunk.scanned,
                        kept: chunk.kept,
                        status: chunk.status,
                    })
                    .collect(),
                result: job.result,
                dirty: self.dirty,
            },
            None => JobView {
                dirty: self.dirty,
                ..JobView::default()
            },
        }
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn allocate_job_id(&mut self) -> JobId {
        let id = self.next_job_id;
        self.next_job_id += 1;
        id
    }

    /// The current job, if `job_id` names it. Messages for older jobs are stale.
    pub(crate) fn job_mut(&mut self, job_id: JobId) -> Option<&mut Job> {
        self.job.as_mut().filter(|job| job.id == job_id)
    }
}
