use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters of one extraction job. Immutable once the job has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub min_ply: u32,
    pub max_ply: u32,
    pub min_rating: u32,
    /// ECO code prefix; empty means no opening filter.
    #[serde(default)]
    pub eco_prefix: String,
    pub workers: usize,
    /// Write every output line once per job, keeping its first occurrence.
    #[serde(default = "dedup_by_default")]
    pub dedup: bool,
}

fn dedup_by_default() -> bool {
    true
}

impl Settings {
    /// Settings with the defaults of the command-line tool and a single worker.
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            min_ply: 1,
            max_ply: 40,
            min_rating: 2400,
            eco_prefix: String::new(),
            workers: 1,
            dedup: true,
        }
    }

    /// Checks everything that can be checked without touching the filesystem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.input_path.as_os_str().is_empty() {
            return Err(ValidationError::new(SettingsField::InputPath, "path is empty"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ValidationError::new(SettingsField::OutputPath, "path is empty"));
        }
        if self.output_path == self.input_path {
            return Err(ValidationError::new(
                SettingsField::OutputPath,
                "output must differ from input",
            ));
        }
        if self.min_ply > self.max_ply {
            return Err(ValidationError::new(
                SettingsField::MinPly,
                format!(
                    "min ply {} cannot be greater than max ply {}",
                    self.min_ply, self.max_ply
                ),
            ));
        }
        if !self.eco_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::new(
                SettingsField::EcoPrefix,
                format!("'{}' is not an ECO code prefix", self.eco_prefix),
            ));
        }
        if self.workers == 0 {
            return Err(ValidationError::new(
                SettingsField::Workers,
                "at least one worker is required",
            ));
        }
        Ok(())
    }

    pub fn filter(&self) -> FilterSettings {
        FilterSettings {
            min_ply: self.min_ply,
            max_ply: self.max_ply,
            min_rating: self.min_rating,
            eco_prefix: self.eco_prefix.clone(),
            dedup: self.dedup,
        }
    }
}

/// The part of [`Settings`] a record filter needs; shipped to every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub min_ply: u32,
    pub max_ply: u32,
    pub min_rating: u32,
    #[serde(default)]
    pub eco_prefix: String,
    /// Skip position lines this filter already produced.
    #[serde(default = "dedup_by_default")]
    pub dedup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsField {
    InputPath,
    OutputPath,
    MinPly,
    MaxPly,
    MinRating,
    EcoPrefix,
    Workers,
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettingsField::InputPath => "input path",
            SettingsField::OutputPath => "output path",
            SettingsField::MinPly => "min ply",
            SettingsField::MaxPly => "max ply",
            SettingsField::MinRating => "min rating",
            SettingsField::EcoPrefix => "eco prefix",
            SettingsField::Workers => "workers",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: SettingsField,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: SettingsField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
