//! Command-line surface of `pgn2epd`.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pgn2epd",
    version,
    about = "Extract opening positions from a PGN archive into EPD lines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a PGN file, printing progress until the job ends.
    Run(RunArgs),
    /// Process one chunk assigned on stdin (spawned by `run`).
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value_t = LevelFilter::Warn, value_parser = parse_level)]
        log_level: LevelFilter,
    },
}

/// Flags left unset fall back to the profile, then to built-in defaults.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// PGN archive to read
    pub input: PathBuf,

    /// EPD file to write [default: output_positions.epd]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// First ply to emit a position for [default: 1]
    #[arg(short = 's', long)]
    pub min_ply: Option<u32>,

    /// Last ply to emit a position for [default: 40]
    #[arg(short = 'm', long)]
    pub max_ply: Option<u32>,

    /// Minimum rating of both players; 0 disables the check [default: 2400]
    #[arg(short = 'e', long)]
    pub min_elo: Option<u32>,

    /// Keep only games whose ECO code starts with this prefix
    #[arg(short = 'c', long)]
    pub eco: Option<String>,

    /// Number of worker processes [default: available cores]
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Write a position line again when a later game reaches it
    #[arg(long)]
    pub keep_duplicates: bool,

    /// RON file with default settings
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Write the effective settings to a RON profile before starting
    #[arg(long)]
    pub save_profile: Option<PathBuf>,

    /// Directory for per-chunk temporary files [default: next to the output]
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Also log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Level for the log file (the terminal only shows warnings)
    #[arg(long, default_value_t = LevelFilter::Info, value_parser = parse_level)]
    pub log_level: LevelFilter,

    /// Read pause/resume/stop/abort/status commands from stdin
    #[arg(short, long)]
    pub interactive: bool,
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("unknown log level '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags_match_the_classic_tool() {
        let cli = Cli::try_parse_from([
            "pgn2epd", "run", "games.pgn", "-o", "out.epd", "-s", "2", "-m", "10", "-e", "0",
            "-c", "B9", "-w", "3",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.input, PathBuf::from("games.pgn"));
        assert_eq!(args.output, Some(PathBuf::from("out.epd")));
        assert_eq!(args.min_ply, Some(2));
        assert_eq!(args.max_ply, Some(10));
        assert_eq!(args.min_elo, Some(0));
        assert_eq!(args.eco.as_deref(), Some("B9"));
        assert_eq!(args.workers, Some(3));
        assert!(!args.keep_duplicates);
        assert!(!args.interactive);
    }

    #[test]
    fn worker_subcommand_is_hidden_but_parses() {
        let cli = Cli::try_parse_from(["pgn2epd", "worker"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Worker {
                log_level: LevelFilter::Warn
            }
        ));
        let help = Cli::command().render_help().to_string();
        assert!(!help.contains("worker"));

        let cli = Cli::try_parse_from(["pgn2epd", "worker", "--log-level", "debug"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Worker {
                log_level: LevelFilter::Debug
            }
        ));
        assert!(Cli::try_parse_from(["pgn2epd", "worker", "--log-level", "loud"]).is_err());
    }
}
