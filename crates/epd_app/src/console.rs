//! Interactive control of a running job through stdin.
use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use engine_logging::engine_debug;
use epd_engine::JobController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    /// Stop and keep what was extracted so far.
    Stop,
    /// Stop and throw the partial output away.
    Abort,
    Status,
    Help,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Ok(ConsoleCommand::Pause),
            "r" | "resume" => Ok(ConsoleCommand::Resume),
            "s" | "stop" => Ok(ConsoleCommand::Stop),
            "a" | "abort" => Ok(ConsoleCommand::Abort),
            "" | "status" => Ok(ConsoleCommand::Status),
            "h" | "help" | "?" => Ok(ConsoleCommand::Help),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

pub const HELP: &str = "commands: pause, resume, stop (save partial output), abort (discard), status";

/// Applies `command`; returns the line to show the user.
pub fn execute(controller: &JobController, command: ConsoleCommand) -> String {
    let result = match command {
        ConsoleCommand::Pause => controller.pause(),
        ConsoleCommand::Resume => controller.resume(),
        ConsoleCommand::Stop => controller.stop(true),
        ConsoleCommand::Abort => controller.stop(false),
        ConsoleCommand::Status => {
            let view = controller.view();
            return format!(
                "{} {}% - scanned {} of {} games, kept {}",
                view.state.label(),
                view.progress,
                view.records_scanned,
                view.records_total,
                view.records_kept
            );
        }
        ConsoleCommand::Help => return HELP.to_string(),
    };
    match result {
        Ok(()) => format!("{command:?} requested."),
        Err(err) => format!("Rejected: {err}"),
    }
}

/// Reads commands from stdin until EOF. The thread is detached: a blocked
/// stdin read must not keep the process alive after the job ends.
pub fn spawn(controller: Arc<JobController>) {
    thread::spawn(move || {
        eprintln!("{HELP}");
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let reply = match line.parse::<ConsoleCommand>() {
                Ok(command) => execute(&controller, command),
                Err(err) => format!("{err}; {HELP}"),
            };
            eprintln!("{reply}");
        }
        engine_debug!("console input closed");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn commands_parse_loosely() {
        assert_eq!("pause".parse(), Ok(ConsoleCommand::Pause));
        assert_eq!("  RESUME \n".parse(), Ok(ConsoleCommand::Resume));
        assert_eq!("s".parse(), Ok(ConsoleCommand::Stop));
        assert_eq!("abort".parse(), Ok(ConsoleCommand::Abort));
        assert_eq!("".parse(), Ok(ConsoleCommand::Status));
        assert!("quit".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn commands_without_a_job_are_rejected() {
        let controller = JobController::default();
        assert!(execute(&controller, ConsoleCommand::Pause).starts_with("Rejected:"));
        assert!(execute(&controller, ConsoleCommand::Abort).starts_with("Rejected:"));
        assert_eq!(
            execute(&controller, ConsoleCommand::Status),
            "idle 0% - scanned 0 of 0 games, kept 0"
        );
    }
}
