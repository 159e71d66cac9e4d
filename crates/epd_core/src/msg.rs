use crate::{ChunkId, ChunkOutcome, ChunkTask, FinalizeOutcome, JobId, Settings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Caller asked to start a job. Settings were validated already.
    StartRequested(Settings),
    /// Caller asked to pause the running job.
    PauseRequested,
    /// Caller asked to resume a paused job.
    ResumeRequested,
    /// Caller asked to stop, keeping (`save`) or discarding partial output.
    StopRequested { save: bool },
    /// Caller asked to return to idle after a terminal state.
    ResetRequested,
    /// The input was split into record-aligned chunks.
    Partitioned {
        job_id: JobId,
        chunks: Vec<ChunkTask>,
        total_records: u64,
    },
    /// The input could not be partitioned.
    PartitionFailed { job_id: JobId, message: String },
    /// Running counters from one worker.
    ChunkProgress {
        job_id: JobId,
        chunk_id: ChunkId,
        scanned: u64,
        kept: u64,
        message: Option<String>,
    },
    /// Final report of one worker.
    ChunkFinished {
        job_id: JobId,
        chunk_id: ChunkId,
        scanned: u64,
        kept: u64,
        outcome: ChunkOutcome,
    },
    /// A worker could not be launched or went away without a final report.
    WorkerLost {
        job_id: JobId,
        chunk_id: ChunkId,
        message: String,
    },
    /// Every worker of the job has exited; `killed` needed forceful termination.
    WorkersJoined { job_id: JobId, killed: usize },
    /// Temporaries were merged into the output or discarded.
    Finalized {
        job_id: JobId,
        outcome: FinalizeOutcome,
    },
}
