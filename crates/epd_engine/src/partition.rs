use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use engine_logging::engine_debug;
use thiserror::Error;

use crate::boundary::BoundaryTracker;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("at least one chunk is required")]
    NoChunks,
}

/// A record-aligned byte range of the input, before it is assigned to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
    pub records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub ranges: Vec<ChunkRange>,
    pub total_records: u64,
}

/// Splits `path` into `chunks` contiguous ranges that begin on record starts.
///
/// Chunk `i` begins at the first record start at or after `i * len / chunks`;
/// candidates with no record start after them produce empty ranges at EOF.
/// The file is read once, and record counts are collected on the way.
pub fn partition_input(path: &Path, chunks: usize) -> Result<Partition, PartitionError> {
    if chunks == 0 {
        return Err(PartitionError::NoChunks);
    }
    let io_error = |source| PartitionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    let len = file.metadata().map_err(io_error)?.len();
    let candidate = |index: usize| (u128::from(len) * index as u128 / chunks as u128) as u64;

    let mut reader = BufReader::new(file);
    let mut tracker = BoundaryTracker::new();
    let mut starts = vec![0u64];
    let mut counts = vec![0u64; chunks];
    let mut offset = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).map_err(io_error)?;
        if read == 0 {
            break;
        }
        if tracker.feed(&line) {
            while starts.len() < chunks && candidate(starts.len()) <= offset {
                starts.push(offset);
            }
            counts[starts.len() - 1] += 1;
        }
        offset += read as u64;
    }
    starts.resize(chunks, len);

    let ranges: Vec<ChunkRange> = starts
        .iter()
        .enumerate()
        .map(|(index, &start)| ChunkRange {
            start,
            end: starts.get(index + 1).copied().unwrap_or(len),
            records: counts[index],
        })
        .collect();
    let total_records = counts.iter().sum();
    engine_debug!(
        "partitioned {} ({len} bytes, {total_records} records) into {chunks} chunks",
        path.display()
    );

    Ok(Partition {
        ranges,
        total_records,
    })
}
