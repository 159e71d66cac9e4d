mod app;
mod cli;
mod console;
mod logging;
mod profile;

use std::io::{self, BufReader};
use std::process::ExitCode;

use clap::Parser;
use engine_logging::{engine_error, engine_warn};

use cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => match app::run(args) {
            Ok(code) => code,
            Err(err) => {
                engine_error!("{err:#}");
                eprintln!("Error: {err:#}");
                ExitCode::FAILURE
            }
        },
        Command::Worker { log_level } => run_worker(log_level),
    }
}

fn run_worker(level: log::LevelFilter) -> ExitCode {
    engine_logging::initialize_for_worker(level);
    // The controller stops workers over stdin; a terminal Ctrl-C must not.
    if let Err(err) = ctrlc::set_handler(|| {}) {
        engine_warn!("could not ignore Ctrl-C: {err}");
    }
    match epd_engine::worker_main(BufReader::new(io::stdin()), io::stdout()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            engine_error!("worker failed: {err}");
            ExitCode::from(2)
        }
    }
}
