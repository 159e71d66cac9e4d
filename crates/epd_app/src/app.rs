use std::env;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use engine_logging::{engine_info, engine_warn};
use epd_core::{JobState, StatusEvent};
use epd_engine::{EngineConfig, JobController, ProcessLauncher, StartError};

use crate::cli::RunArgs;
use crate::console;
use crate::logging::{self, LogDestination};
use crate::profile::Profile;

/// Extra time, beyond the worker stop timeout, allowed for the final merge.
const MERGE_GRACE: Duration = Duration::from_secs(60);

pub fn run(args: RunArgs) -> Result<ExitCode> {
    logging::initialize(
        LogDestination::from_option(args.log_file.as_deref()),
        args.log_level,
    );

    let profile = match &args.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };
    let settings = profile.settings(&args);
    if let Some(path) = &args.save_profile {
        Profile::from_settings(&settings).save(path)?;
        println!("Profile saved to '{}'.", path.display());
    }

    let exe = env::current_exe().context("could not locate the pgn2epd executable")?;
    let config = EngineConfig {
        scratch_dir: args.scratch_dir.clone(),
        ..EngineConfig::default()
    }
    .with_launcher(ProcessLauncher::new(exe).arg("worker"));
    let stop_timeout = config.stop_timeout;

    let controller = Arc::new(JobController::new(config));
    let events = controller.subscribe();
    install_interrupt_handler(controller.clone());

    let started = Instant::now();
    engine_info!(
        "run started at {} with {:?}",
        Local::now().to_rfc3339(),
        settings
    );
    match controller.start(settings) {
        Ok(_) => {}
        Err(StartError::Validation(err)) => {
            eprintln!("Error: {err}");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    }
    if args.interactive {
        console::spawn(controller.clone());
    }

    for event in events.iter() {
        println!("{}", format_status(&event));
        if event.is_complete {
            break;
        }
    }
    if !controller.wait_until_settled(stop_timeout + MERGE_GRACE) {
        engine_warn!("job did not settle; temporary files may remain");
    }

    let view = controller.view();
    println!(
        "Kept {} of {} games in {}.",
        view.records_kept,
        view.records_total,
        format_elapsed(started.elapsed())
    );
    Ok(exit_code(view.state))
}

/// The first Ctrl-C stops the job and keeps its partial output.
fn install_interrupt_handler(controller: Arc<JobController>) {
    let interrupted = AtomicBool::new(false);
    let installed = ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::Relaxed) {
            eprintln!("Already stopping; waiting for workers to exit ...");
            return;
        }
        eprintln!("Received Ctrl-C: stopping and saving partial results ...");
        if let Err(err) = controller.stop(true) {
            eprintln!("Could not stop: {err}");
        }
    });
    if let Err(err) = installed {
        engine_warn!("could not install Ctrl-C handler: {err}");
    }
}

pub fn format_status(event: &StatusEvent) -> String {
    format!(
        "[{}] {:>3}% - {}",
        event.state.label().to_uppercase(),
        event.progress,
        event.message
    )
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match (secs / 3600, secs / 60 % 60, secs % 60) {
        (0, 0, _) => format!("{:.2}s", elapsed.as_secs_f64()),
        (0, m, s) => format!("{m}m {s:02}s"),
        (h, m, s) => format!("{h}h {m:02}m {s:02}s"),
    }
}

pub fn exit_code(state: JobState) -> ExitCode {
    match state {
        JobState::Complete | JobState::Stopped => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
