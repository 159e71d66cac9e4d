use serde::{Deserialize, Serialize};

use crate::{ChunkId, ChunkStatus, JobId, JobResultKind, JobState};

/// The unit delivered to status observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub job_id: Option<JobId>,
    pub state: JobState,
    /// Overall progress, 0..=100.
    pub progress: u8,
    pub message: String,
    /// Set on the single event that closes a job's stream.
    pub is_complete: bool,
}

impl StatusEvent {
    pub fn idle() -> Self {
        Self {
            job_id: None,
            state: JobState::Idle,
            progress: 0,
            message: String::new(),
            is_complete: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobView {
    pub job_id: Option<JobId>,
    pub state: JobState,
    pub progress: u8,
    pub records_total: u64,
    pub records_scanned: u64,
    pub records_kept: u64,
    pub chunks: Vec<ChunkRowView>,
    pub result: Option<JobResultKind>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRowView {
    pub chunk_id: ChunkId,
    pub start: u64,
    pub end: u64,
    pub records: u64,
    pub scanned: u64,
    pub kept: u64,
    pub status: ChunkStatus,
}
