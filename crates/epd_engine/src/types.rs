use std::path::PathBuf;

use epd_core::{ChunkId, ChunkOutcome, ChunkTask, FilterSettings, JobId, Msg};
use serde::{Deserialize, Serialize};

/// First line a worker reads: everything it needs to process one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub job_id: JobId,
    pub chunk: ChunkTask,
    pub input_path: PathBuf,
    pub filter: FilterSettings,
    /// Records between two progress reports.
    pub progress_every: u64,
    /// Start suspended; the job was paused before this worker launched.
    #[serde(default)]
    pub paused: bool,
}

/// Lines following the assignment on a worker's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ControlCommand {
    Pause,
    Resume,
    Stop,
}

/// Lines a worker writes to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum WorkerReport {
    Progress {
        chunk_id: ChunkId,
        scanned: u64,
        kept: u64,
    },
    Finished {
        chunk_id: ChunkId,
        scanned: u64,
        kept: u64,
        outcome: ChunkOutcome,
    },
}

impl WorkerReport {
    pub fn chunk_id(&self) -> ChunkId {
        match self {
            WorkerReport::Progress { chunk_id, .. } | WorkerReport::Finished { chunk_id, .. } => {
                *chunk_id
            }
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, WorkerReport::Finished { .. })
    }

    pub fn into_msg(self, job_id: JobId) -> Msg {
        match self {
            WorkerReport::Progress {
                chunk_id,
                scanned,
                kept,
            } => Msg::ChunkProgress {
                job_id,
                chunk_id,
                scanned,
                kept,
                message: None,
            },
            WorkerReport::Finished {
                chunk_id,
                scanned,
                kept,
                outcome,
            } => Msg::ChunkFinished {
                job_id,
                chunk_id,
                scanned,
                kept,
                outcome,
            },
        }
    }
}
