use crate::state::Phase;
use crate::{
    ChunkId, ChunkOutcome, ChunkStatus, ChunkTask, ControlAction, ControlError, ControllerState,
    Effect, FinalizeOutcome, Job, JobId, JobResultKind, JobState, MergeDecision, Msg,
    ProgressAggregator, Settings, StatusEvent,
};

/// Applies a message to the controller state and returns the effects to run.
///
/// Control requests that are invalid in the current state are rejected with a
/// [`ControlError`] and leave the state untouched. Reports naming a job other
/// than the current one are stale and ignored.
pub fn update(state: &mut ControllerState, msg: Msg) -> Result<Vec<Effect>, ControlError> {
    let effects = match msg {
        Msg::StartRequested(settings) => start(state, settings)?,
        Msg::PauseRequested => pause(state)?,
        Msg::ResumeRequested => resume(state)?,
        Msg::StopRequested { save } => stop(state, save)?,
        Msg::ResetRequested => reset(state)?,
        Msg::Partitioned {
            job_id,
            chunks,
            total_records,
        } => with_job(state, job_id, |job| partitioned(job, chunks, total_records)),
        Msg::PartitionFailed { job_id, message } => {
            with_job(state, job_id, |job| partition_failed(job, &message))
        }
        Msg::ChunkProgress {
            job_id,
            chunk_id,
            scanned,
            kept,
            message,
        } => with_job(state, job_id, |job| {
            chunk_progress(job, chunk_id, scanned, kept, message)
        }),
        Msg::ChunkFinished {
            job_id,
            chunk_id,
            scanned,
            kept,
            outcome,
        } => with_job(state, job_id, |job| {
            chunk_finished(job, chunk_id, scanned, kept, outcome)
        }),
        Msg::WorkerLost {
            job_id,
            chunk_id,
            message,
        } => with_job(state, job_id, |job| worker_lost(job, chunk_id, &message)),
        Msg::WorkersJoined { job_id, killed } => {
            with_job(state, job_id, |job| workers_joined(job, killed))
        }
        Msg::Finalized { job_id, outcome } => {
            with_job(state, job_id, |job| finalized(job, outcome))
        }
    };

    if !effects.is_empty() {
        state.mark_dirty();
    }
    Ok(effects)
}

fn with_job(
    state: &mut ControllerState,
    job_id: JobId,
    apply: impl FnOnce(&mut Job) -> Vec<Effect>,
) -> Vec<Effect> {
    state.job_mut(job_id).map(apply).unwrap_or_default()
}

fn start(state: &mut ControllerState, settings: Settings) -> Result<Vec<Effect>, ControlError> {
    state.check_start()?;

    let job_id = state.allocate_job_id();
    let mut job = Job::new(job_id, settings.clone());
    let message = format!(
        "Starting EPD extraction from '{}'...",
        settings.input_path.display()
    );
    job.push_log(message.clone());
    let status = emit(&job, message);
    state.job = Some(job);

    Ok(vec![Effect::Partition { job_id, settings }, status])
}

fn pause(state: &mut ControllerState) -> Result<Vec<Effect>, ControlError> {
    let job = job_in(state, ControlAction::Pause, |s| s == JobState::Processing)?;
    if matches!(job.phase, Phase::Joining | Phase::Finalizing) {
        return Err(ControlError::Finalizing {
            action: ControlAction::Pause,
        });
    }
    job.set_state(JobState::Paused);
    let message = "Processing paused.";
    job.push_log(message);
    Ok(vec![Effect::SignalPause, emit(job, message)])
}

fn resume(state: &mut ControllerState) -> Result<Vec<Effect>, ControlError> {
    let job = job_in(state, ControlAction::Resume, |s| s == JobState::Paused)?;
    job.set_state(JobState::Processing);
    let message = "Processing resumed.";
    job.push_log(message);
    Ok(vec![Effect::SignalResume, emit(job, message)])
}

fn stop(state: &mut ControllerState, save: bool) -> Result<Vec<Effect>, ControlError> {
    let job = job_in(state, ControlAction::Stop, JobState::is_running)?;
    if job.phase == Phase::Finalizing {
        return Err(ControlError::Finalizing {
            action: ControlAction::Stop,
        });
    }
    job.stop_save = Some(save);
    job.set_state(JobState::Stopping);

    let mut effects = vec![Effect::SignalStop { save }];
    // While partitioning there are no workers yet; `partitioned` finalizes directly.
    if job.phase == Phase::Running {
        job.phase = Phase::Joining;
        effects.push(Effect::JoinWorkers { job_id: job.id() });
    }
    let message = if save {
        "Stopping workers; partial results will be saved..."
    } else {
        "Stopping workers; partial results will be discarded..."
    };
    job.push_log(message);
    effects.push(emit(job, message));
    Ok(effects)
}

fn reset(state: &mut ControllerState) -> Result<Vec<Effect>, ControlError> {
    match state.job() {
        None => Ok(Vec::new()),
        Some(job) if job.is_settled() => {
            state.job = None;
            let mut event = StatusEvent::idle();
            event.message = "Ready.".to_string();
            Ok(vec![Effect::EmitStatus {
                event,
                throttle: false,
            }])
        }
        Some(job) => Err(ControlError::InvalidState {
            action: ControlAction::Reset,
            state: job.state(),
        }),
    }
}

fn job_in(
    state: &mut ControllerState,
    action: ControlAction,
    accepts: impl Fn(JobState) -> bool,
) -> Result<&mut Job, ControlError> {
    let current = state.state();
    match state.job.as_mut() {
        Some(job) if accepts(job.state()) => Ok(job),
        _ => Err(ControlError::InvalidState {
            action,
            state: current,
        }),
    }
}

fn partitioned(job: &mut Job, chunks: Vec<ChunkTask>, total_records: u64) -> Vec<Effect> {
    if job.phase != Phase::Partitioning {
        return Vec::new();
    }
    job.progress = ProgressAggregator::new(total_records);
    job.chunks = chunks;
    let message = format!(
        "Found {total_records} games. Distributing work to {} workers...",
        job.chunks.len()
    );
    job.push_log(message.clone());

    match job.state() {
        JobState::Processing | JobState::Paused => {
            job.phase = Phase::Running;
            for chunk in &mut job.chunks {
                chunk.status = ChunkStatus::Running;
            }
            job.refresh_percent();
            vec![
                Effect::SpawnWorkers {
                    job_id: job.id(),
                    settings: job.settings().clone(),
                    chunks: job.chunks.clone(),
                },
                emit(job, message),
            ]
        }
        JobState::Stopping => {
            job.phase = Phase::Finalizing;
            vec![emit(job, message), finalize(job)]
        }
        _ => Vec::new(),
    }
}

fn partition_failed(job: &mut Job, message: &str) -> Vec<Effect> {
    if job.phase != Phase::Partitioning {
        return Vec::new();
    }
    job.phase = Phase::Done;
    job.set_state(JobState::Error);
    let message = format!("Could not partition input: {message}");
    job.push_log(message.clone());
    vec![emit(job, message)]
}

fn chunk_progress(
    job: &mut Job,
    chunk_id: ChunkId,
    scanned: u64,
    kept: u64,
    message: Option<String>,
) -> Vec<Effect> {
    let Some(chunk) = job.chunks.get_mut(chunk_id) else {
        return Vec::new();
    };
    if chunk.status.is_finished() || !job.progress.apply(chunk, scanned, kept) {
        return Vec::new();
    }
    job.refresh_percent();
    if job.state().is_terminal() {
        return Vec::new();
    }

    let message = match message {
        Some(message) => {
            job.push_log(message.clone());
            message
        }
        None => format!(
            "Scanned {} of {} games ({} kept)",
            job.records_scanned(),
            job.records_total(),
            job.records_kept()
        ),
    };
    vec![Effect::EmitStatus {
        event: job.status_event(message),
        throttle: true,
    }]
}

fn chunk_finished(
    job: &mut Job,
    chunk_id: ChunkId,
    scanned: u64,
    kept: u64,
    outcome: ChunkOutcome,
) -> Vec<Effect> {
    let Some(chunk) = job.chunks.get_mut(chunk_id) else {
        return Vec::new();
    };
    if chunk.status.is_finished() {
        return Vec::new();
    }
    job.progress.apply(chunk, scanned, kept);
    chunk.status = outcome.status();
    job.refresh_percent();

    let mut effects = Vec::new();
    if let ChunkOutcome::Failed { message } = &outcome {
        let text = format!("Chunk {chunk_id} stopped early after {scanned} games: {message}");
        job.push_log(text.clone());
        effects.push(emit(job, text));
    }
    if job.phase == Phase::Running && job.all_chunks_finished() {
        effects.extend(all_chunks_finished(job));
    }
    effects
}

fn all_chunks_finished(job: &mut Job) -> Vec<Effect> {
    job.phase = Phase::Joining;

    let mut non_empty = job.chunks.iter().filter(|chunk| chunk.records > 0).peekable();
    let stalled = non_empty.peek().is_some()
        && non_empty.all(|chunk| chunk.status == ChunkStatus::Failed && chunk.scanned == 0);

    let message = if stalled {
        job.set_state(JobState::Error);
        "No chunk could make progress; the input appears unreadable."
    } else {
        "Processing complete. Waiting for workers to exit..."
    };
    job.push_log(message);
    vec![Effect::JoinWorkers { job_id: job.id() }, emit(job, message)]
}

fn worker_lost(job: &mut Job, chunk_id: ChunkId, message: &str) -> Vec<Effect> {
    let Some(chunk) = job.chunks.get_mut(chunk_id) else {
        return Vec::new();
    };
    if chunk.status.is_finished() {
        return Vec::new();
    }
    chunk.status = ChunkStatus::Failed;
    let text = format!("Worker for chunk {chunk_id} failed: {message}");
    job.push_log(text.clone());

    if job.state().is_running() && job.phase == Phase::Running {
        job.set_state(JobState::Error);
        job.phase = Phase::Joining;
        return vec![
            Effect::SignalStop { save: true },
            Effect::JoinWorkers { job_id: job.id() },
            emit(job, text),
        ];
    }
    vec![emit(job, text)]
}

fn workers_joined(job: &mut Job, killed: usize) -> Vec<Effect> {
    if job.phase != Phase::Joining {
        return Vec::new();
    }
    let mut effects = Vec::new();
    if killed > 0 {
        let text = format!("Forcefully terminated {killed} unresponsive worker(s).");
        job.push_log(text.clone());
        effects.push(emit(job, text));
    }
    // Detached or killed workers never reported; whatever they wrote stays.
    for chunk in &mut job.chunks {
        if !chunk.status.is_finished() && chunk.status != ChunkStatus::Pending {
            chunk.status = ChunkStatus::Stopped;
        }
    }

    job.phase = Phase::Finalizing;
    let message = match merge_decision(job) {
        MergeDecision::Discard => "Discarding temporary files...",
        MergeDecision::SaveAll => "Merging temporary files...",
        MergeDecision::SaveCompleted => "Preserving output of completed chunks...",
    };
    job.push_log(message);
    effects.push(emit(job, message));
    effects.push(finalize(job));
    effects
}

fn finalized(job: &mut Job, outcome: FinalizeOutcome) -> Vec<Effect> {
    if job.phase != Phase::Finalizing {
        return Vec::new();
    }
    job.phase = Phase::Done;
    let output = job.settings().output_path.display().to_string();

    let message = match (job.state(), outcome) {
        (JobState::Error, FinalizeOutcome::Merged { chunks, .. }) if chunks > 0 => {
            format!("Preserved output of {chunks} completed chunk(s) in '{output}'.")
        }
        (JobState::Error, FinalizeOutcome::Failed { message }) => {
            format!("Could not preserve completed chunks: {message}")
        }
        (JobState::Error, _) => "No completed chunks to preserve.".to_string(),
        (_, FinalizeOutcome::Failed { message }) => {
            job.set_state(JobState::Error);
            format!("Could not write output '{output}': {message}")
        }
        (JobState::Stopping, FinalizeOutcome::Merged { .. }) => {
            job.set_result(Some(JobResultKind::Partial));
            job.set_state(JobState::Stopped);
            format!(
                "Processing stopped by user. Partial results ({} games) saved to '{output}'.",
                job.records_kept()
            )
        }
        (_, FinalizeOutcome::Discarded) => {
            job.set_state(JobState::Stopped);
            "Processing stopped by user. Partial results discarded.".to_string()
        }
        (_, FinalizeOutcome::Merged { .. }) => {
            job.set_result(Some(JobResultKind::Success));
            job.set_state(JobState::Complete);
            format!(
                "Success! Kept {} of {} games. Results saved to '{output}'.",
                job.records_kept(),
                job.records_total()
            )
        }
    };
    job.push_log(message.clone());
    vec![emit(job, message)]
}

fn merge_decision(job: &Job) -> MergeDecision {
    match job.state() {
        JobState::Stopping if job.stop_save == Some(true) => MergeDecision::SaveAll,
        JobState::Stopping => MergeDecision::Discard,
        JobState::Error => MergeDecision::SaveCompleted,
        _ => MergeDecision::SaveAll,
    }
}

fn finalize(job: &Job) -> Effect {
    Effect::Finalize {
        job_id: job.id(),
        output_path: job.settings().output_path.clone(),
        chunks: job.chunks.clone(),
        decision: merge_decision(job),
        dedup: job.settings().dedup,
    }
}

fn emit(job: &Job, message: impl Into<String>) -> Effect {
    Effect::EmitStatus {
        event: job.status_event(message),
        throttle: false,
    }
}
