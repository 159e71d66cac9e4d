use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_warn};
use epd_core::{ChunkStatus, ChunkTask, FinalizeOutcome, MergeDecision};
use thiserror::Error;

use crate::persist::{remove_temp, AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot write '{}': {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("cannot read chunk {chunk} output '{}': {source}", path.display())]
    Chunk {
        chunk: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub chunks: usize,
    pub bytes: u64,
}

/// Applies `decision` to the chunk temporaries. Every temporary is gone afterwards.
///
/// With `dedup` set, a line already written from an earlier chunk is skipped.
pub fn finalize_chunks(
    output: &Path,
    chunks: &[ChunkTask],
    decision: MergeDecision,
    dedup: bool,
) -> FinalizeOutcome {
    let result = match decision {
        MergeDecision::Discard => {
            discard_chunks(chunks);
            return FinalizeOutcome::Discarded;
        }
        MergeDecision::SaveAll => merge_chunks(output, chunks, dedup, |_| true),
        MergeDecision::SaveCompleted => {
            if chunks.iter().any(|c| c.status == ChunkStatus::Completed) {
                merge_chunks(output, chunks, dedup, |c| {
                    c.status == ChunkStatus::Completed
                })
            } else {
                discard_chunks(chunks);
                Ok(MergeSummary { chunks: 0, bytes: 0 })
            }
        }
    };
    match result {
        Ok(summary) => FinalizeOutcome::Merged {
            chunks: summary.chunks,
            bytes: summary.bytes,
        },
        Err(err) => FinalizeOutcome::Failed {
            message: err.to_string(),
        },
    }
}

/// Concatenates the selected chunk outputs into `output` in partition order.
///
/// Each temporary is deleted right after it was copied; unselected ones are
/// deleted unread. A chunk that never started has no temporary and adds
/// nothing. The output is replaced atomically, or not at all on error.
/// With `dedup` set only the first occurrence of each line is written.
pub fn merge_chunks(
    output: &Path,
    chunks: &[ChunkTask],
    dedup: bool,
    include: impl Fn(&ChunkTask) -> bool,
) -> Result<MergeSummary, MergeError> {
    let result = copy_chunks(output, chunks, dedup, include);
    if result.is_err() {
        discard_chunks(chunks);
    }
    result
}

fn copy_chunks(
    output: &Path,
    chunks: &[ChunkTask],
    dedup: bool,
    include: impl Fn(&ChunkTask) -> bool,
) -> Result<MergeSummary, MergeError> {
    let output_error = |source| MergeError::Output {
        path: output.to_path_buf(),
        source,
    };
    let mut writer = AtomicFileWriter::create(output).map_err(output_error)?;
    let mut seen = dedup.then(HashSet::new);
    let mut merged = 0;

    for chunk in chunks {
        if include(chunk) {
            match File::open(&chunk.temp_path) {
                Ok(mut file) => {
                    let bytes = match seen.as_mut() {
                        Some(seen) => {
                            let unique = unique_lines(file, seen).map_err(|source| {
                                MergeError::Chunk {
                                    chunk: chunk.id,
                                    path: chunk.temp_path.clone(),
                                    source,
                                }
                            })?;
                            writer.append_from(&mut unique.as_slice())
                        }
                        None => writer.append_from(&mut file),
                    }
                    .map_err(output_error)?;
                    engine_debug!("merged chunk {} ({bytes} bytes)", chunk.id);
                    merged += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    engine_debug!("chunk {} left no output", chunk.id);
                }
                Err(source) => {
                    return Err(MergeError::Chunk {
                        chunk: chunk.id,
                        path: chunk.temp_path.clone(),
                        source,
                    })
                }
            }
        }
        remove_quietly(&chunk.temp_path);
    }

    let bytes = writer.written();
    writer.commit().map_err(output_error)?;
    Ok(MergeSummary {
        chunks: merged,
        bytes,
    })
}

/// Lines of `file` missing from `seen`, in order; records them as seen.
fn unique_lines(file: File, seen: &mut HashSet<Vec<u8>>) -> io::Result<Vec<u8>> {
    let mut reader = BufReader::new(file);
    let mut unique = Vec::new();
    let mut line = Vec::new();
    while reader.read_until(b'\n', &mut line)? > 0 {
        if !seen.contains(&line) {
            unique.extend_from_slice(&line);
            seen.insert(line.clone());
        }
        line.clear();
    }
    Ok(unique)
}

/// Deletes every chunk temporary, leaving the final output untouched.
pub fn discard_chunks(chunks: &[ChunkTask]) {
    for chunk in chunks {
        remove_quietly(&chunk.temp_path);
    }
}

fn remove_quietly(path: &Path) {
    if let Err(err) = remove_temp(path) {
        engine_warn!("could not remove temporary {}: {err}", path.display());
    }
}
