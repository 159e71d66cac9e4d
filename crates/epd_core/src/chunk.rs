use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Index of a chunk in partition order.
pub type ChunkId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl ChunkStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            ChunkStatus::Completed | ChunkStatus::Stopped | ChunkStatus::Failed
        )
    }
}

/// A record-aligned byte range `[start, end)` of the input and its private output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTask {
    pub id: ChunkId,
    pub start: u64,
    pub end: u64,
    /// Records inside the range, counted while partitioning.
    pub records: u64,
    pub temp_path: PathBuf,
    pub scanned: u64,
    pub kept: u64,
    pub status: ChunkStatus,
}

impl ChunkTask {
    pub fn new(id: ChunkId, start: u64, end: u64, records: u64, temp_path: PathBuf) -> Self {
        Self {
            id,
            start,
            end,
            records,
            temp_path,
            scanned: 0,
            kept: 0,
            status: ChunkStatus::Pending,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// How a worker left its chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkOutcome {
    /// The whole byte range was read.
    Completed,
    /// A stop signal ended the loop early.
    Stopped,
    /// A record could not be read, decoded or written.
    Failed { message: String },
}

impl ChunkOutcome {
    pub fn status(&self) -> ChunkStatus {
        match self {
            ChunkOutcome::Completed => ChunkStatus::Completed,
            ChunkOutcome::Stopped => ChunkStatus::Stopped,
            ChunkOutcome::Failed { .. } => ChunkStatus::Failed,
        }
    }
}
