//! Worker process: processes the chunk assigned on stdin, reports on stdout.
use std::io::{self, BufReader};
use std::process::ExitCode;

use engine_logging::{engine_error, engine_warn};
use epd_engine::worker_main;
use log::LevelFilter;

fn main() -> ExitCode {
    engine_logging::initialize_for_worker(LevelFilter::Warn);
    // Ctrl-C reaches the whole process group; only the controller may stop us.
    if let Err(err) = ctrlc::set_handler(|| {}) {
        engine_warn!("could not ignore Ctrl-C: {err}");
    }
    match worker_main(BufReader::new(io::stdin()), io::stdout()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            engine_error!("worker failed: {err}");
            ExitCode::from(2)
        }
    }
}
