use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use engine_logging::{engine_debug, engine_info, engine_warn, set_chunk_context};
use epd_core::{ChunkOutcome, ChunkTask};
use thiserror::Error;

use crate::control::{Checkpoint, ControlSignal};
use crate::filter::{PgnRecordFilter, RecordFilter};
use crate::reader::open_chunk;
use crate::types::{ControlCommand, WorkerAssignment, WorkerReport};

/// Receives the reports of a running chunk.
pub trait ReportSink: Send + Sync {
    fn report(&self, report: WorkerReport);
}

/// Writes reports as JSON lines, the worker side of the process protocol.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn report(&self, report: WorkerReport) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *out, &report)
            .map_err(io::Error::from)
            .and_then(|()| out.write_all(b"\n"))
            .and_then(|()| out.flush());
        if let Err(err) = written {
            engine_warn!("dropping report, controller unreachable: {err}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub scanned: u64,
    pub kept: u64,
    pub outcome: ChunkOutcome,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no assignment received")]
    MissingAssignment,
    #[error("invalid assignment: {0}")]
    Assignment(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Processes one chunk until it is exhausted, stopped or fails.
///
/// The temporary output is created up front, so an empty chunk still leaves
/// an (empty) file behind. Each accepted record is appended with one write.
/// The final report is emitted before returning.
pub fn run_chunk(
    chunk: &ChunkTask,
    input: &Path,
    filter: &dyn RecordFilter,
    signal: &ControlSignal,
    progress_every: u64,
    sink: &dyn ReportSink,
) -> ChunkSummary {
    set_chunk_context(Some(chunk.id));
    engine_debug!(
        "processing bytes {}..{} into {}",
        chunk.start,
        chunk.end,
        chunk.temp_path.display()
    );

    let mut counters = Counters::default();
    let outcome = match process(chunk, input, filter, signal, progress_every, sink, &mut counters)
    {
        Ok(outcome) => outcome,
        Err(message) => {
            engine_warn!("stopped early after {} records: {message}", counters.scanned);
            ChunkOutcome::Failed { message }
        }
    };
    let Counters { scanned, kept } = counters;
    engine_info!("{outcome:?}: scanned {scanned}, kept {kept}");

    sink.report(WorkerReport::Finished {
        chunk_id: chunk.id,
        scanned,
        kept,
        outcome: outcome.clone(),
    });
    set_chunk_context(None);

    ChunkSummary {
        scanned,
        kept,
        outcome,
    }
}

#[derive(Debug, Default)]
struct Counters {
    scanned: u64,
    kept: u64,
}

fn process(
    chunk: &ChunkTask,
    input: &Path,
    filter: &dyn RecordFilter,
    signal: &ControlSignal,
    progress_every: u64,
    sink: &dyn ReportSink,
    counters: &mut Counters,
) -> Result<ChunkOutcome, String> {
    let mut out = File::create(&chunk.temp_path)
        .map_err(|err| format!("cannot create {}: {err}", chunk.temp_path.display()))?;
    let mut records = open_chunk(input, chunk.start, chunk.end)
        .map_err(|err| format!("cannot open {}: {err}", input.display()))?;
    let progress_every = progress_every.max(1);

    loop {
        if signal.checkpoint() == Checkpoint::Stop {
            return Ok(ChunkOutcome::Stopped);
        }
        let Some(record) = records
            .next_record()
            .map_err(|err| format!("read error: {err}"))?
        else {
            return Ok(ChunkOutcome::Completed);
        };

        if let Some(output) = filter.filter(&record).map_err(|err| err.to_string())? {
            out.write_all(output.as_bytes())
                .map_err(|err| format!("write error: {err}"))?;
            counters.kept += 1;
        }
        counters.scanned += 1;

        if counters.scanned % progress_every == 0 {
            sink.report(WorkerReport::Progress {
                chunk_id: chunk.id,
                scanned: counters.scanned,
                kept: counters.kept,
            });
        }
    }
}

/// Entry point of a worker process.
///
/// Reads the [`WorkerAssignment`] from the first line of `input`, then keeps
/// applying [`ControlCommand`] lines from a background thread while the chunk
/// is processed. End of input counts as a stop. Reports go to `output`.
pub fn worker_main<R, W>(mut input: R, output: W) -> Result<ChunkSummary, WorkerError>
where
    R: BufRead + Send + 'static,
    W: Write + Send,
{
    let mut first = String::new();
    if input.read_line(&mut first)? == 0 {
        return Err(WorkerError::MissingAssignment);
    }
    let assignment: WorkerAssignment = serde_json::from_str(&first)?;

    let signal = Arc::new(ControlSignal::new());
    if assignment.paused {
        signal.pause();
    }
    {
        let signal = signal.clone();
        thread::spawn(move || follow_commands(input, &signal));
    }

    let filter = PgnRecordFilter::new(assignment.filter.clone());
    let sink = JsonLinesSink::new(output);
    Ok(run_chunk(
        &assignment.chunk,
        &assignment.input_path,
        &filter,
        &signal,
        assignment.progress_every,
        &sink,
    ))
}

fn follow_commands<R: BufRead>(input: R, signal: &ControlSignal) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                engine_warn!("control channel failed: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ControlCommand>(&line) {
            Ok(command) => signal.apply(command),
            Err(err) => engine_warn!("ignoring control line {line:?}: {err}"),
        }
    }
    signal.stop(true);
}
