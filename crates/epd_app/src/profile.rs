//! RON profiles holding default settings for `pgn2epd run`.
//!
//! Precedence: command-line flag, then profile value, then built-in default.
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use engine_logging::engine_info;
use epd_core::Settings;
use epd_engine::AtomicFileWriter;
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

pub const DEFAULT_OUTPUT: &str = "output_positions.epd";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub output: PathBuf,
    pub min_ply: u32,
    pub max_ply: u32,
    pub min_elo: u32,
    pub eco: String,
    /// Unset means one worker per available core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Write each position line once per job.
    pub dedup: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            min_ply: 1,
            max_ply: 40,
            min_elo: 2400,
            eco: String::new(),
            workers: None,
            dedup: true,
        }
    }
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("could not read profile {}", path.display()))?;
        let profile = ron::from_str(&content)
            .with_context(|| format!("could not parse profile {}", path.display()))?;
        engine_info!("Loaded profile from {:?}", path);
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .context("could not serialize profile")?;
        let mut writer = AtomicFileWriter::create(path)
            .with_context(|| format!("could not create profile {}", path.display()))?;
        writer.append_from(&mut content.as_bytes())?;
        writer.commit()?;
        engine_info!("Saved profile to {:?}", path);
        Ok(())
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            output: settings.output_path.clone(),
            min_ply: settings.min_ply,
            max_ply: settings.max_ply,
            min_elo: settings.min_rating,
            eco: settings.eco_prefix.clone(),
            workers: Some(settings.workers),
            dedup: settings.dedup,
        }
    }

    /// Job settings for `args`, filling unset flags from this profile.
    pub fn settings(&self, args: &RunArgs) -> Settings {
        Settings {
            input_path: args.input.clone(),
            output_path: args.output.clone().unwrap_or_else(|| self.output.clone()),
            min_ply: args.min_ply.unwrap_or(self.min_ply),
            max_ply: args.max_ply.unwrap_or(self.max_ply),
            min_rating: args.min_elo.unwrap_or(self.min_elo),
            eco_prefix: args.eco.clone().unwrap_or_else(|| self.eco.clone()),
            workers: args
                .workers
                .or(self.workers)
                .unwrap_or_else(available_workers),
            dedup: self.dedup && !args.keep_duplicates,
        }
    }
}

fn available_workers() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn args(input: &str) -> RunArgs {
        match Cli::try_parse_from(["pgn2epd", "run", input]).unwrap().command {
            Command::Run(args) => args,
            Command::Worker { .. } => unreachable!(),
        }
    }

    #[test]
    fn missing_fields_take_builtin_defaults() {
        let profile: Profile = ron::from_str("(min_elo: 2000, eco: \"C\")").unwrap();
        assert_eq!(profile.min_elo, 2000);
        assert_eq!(profile.eco, "C");
        assert_eq!(profile.max_ply, 40);
        assert_eq!(profile.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(profile.workers, None);
        assert!(profile.dedup);
    }

    #[test]
    fn duplicates_are_dropped_unless_asked_for() {
        let settings = Profile::default().settings(&args("games.pgn"));
        assert!(settings.dedup);

        let mut keep = args("games.pgn");
        keep.keep_duplicates = true;
        assert!(!Profile::default().settings(&keep).dedup);

        let profile: Profile = ron::from_str("(dedup: false)").unwrap();
        assert!(!profile.settings(&args("games.pgn")).dedup);
    }

    #[test]
    fn flags_override_the_profile() {
        let profile = Profile {
            min_ply: 4,
            max_ply: 12,
            workers: Some(2),
            ..Profile::default()
        };
        let mut args = args("games.pgn");
        args.max_ply = Some(8);
        args.workers = Some(6);

        let settings = profile.settings(&args);
        assert_eq!(settings.input_path, PathBuf::from("games.pgn"));
        assert_eq!(settings.output_path, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!((settings.min_ply, settings.max_ply), (4, 8));
        assert_eq!(settings.min_rating, 2400);
        assert_eq!(settings.workers, 6);
    }

    #[test]
    fn workers_default_to_the_machine() {
        let settings = Profile::default().settings(&args("games.pgn"));
        assert!(settings.workers >= 1);
        settings.validate().unwrap();
    }

    #[test]
    fn saved_profile_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("profiles/blitz.ron");
        let mut settings = Settings::new("games.pgn", "blitz.epd");
        settings.eco_prefix = "B2".to_string();
        settings.workers = 3;
        let profile = Profile::from_settings(&settings);

        profile.save(&path).unwrap();
        assert_eq!(Profile::load(&path).unwrap(), profile);
    }

    #[test]
    fn unreadable_profiles_name_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.ron");
        fs::write(&path, "(min_ply: \"three\")").unwrap();

        let error = Profile::load(&path).unwrap_err();
        assert!(format!("{error:#}").contains("broken.ron"));
        assert!(Profile::load(&temp.path().join("absent.ron")).is_err());
    }
}
