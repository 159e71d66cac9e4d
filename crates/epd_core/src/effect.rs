use std::path::PathBuf;

use crate::{ChunkTask, JobId, Settings, StatusEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Split the input into `settings.workers` chunks, off the caller's thread.
    Partition { job_id: JobId, settings: Settings },
    /// Launch one worker per chunk.
    SpawnWorkers {
        job_id: JobId,
        settings: Settings,
        chunks: Vec<ChunkTask>,
    },
    SignalPause,
    SignalResume,
    SignalStop { save: bool },
    /// Wait (bounded) for every worker to exit.
    JoinWorkers { job_id: JobId },
    /// Merge or discard the chunk temporaries.
    Finalize {
        job_id: JobId,
        output_path: PathBuf,
        chunks: Vec<ChunkTask>,
        decision: MergeDecision,
        /// Drop lines an earlier chunk already contributed.
        dedup: bool,
    },
    /// Forward a status event to observers. Throttled events may be dropped.
    EmitStatus { event: StatusEvent, throttle: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Delete every temporary; do not touch the output.
    Discard,
    /// Concatenate every temporary in partition order.
    SaveAll,
    /// Concatenate only chunks that completed; delete the rest.
    SaveCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Merged { chunks: usize, bytes: u64 },
    Discarded,
    Failed { message: String },
}
