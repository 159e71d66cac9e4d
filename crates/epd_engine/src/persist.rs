use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use epd_core::{Settings, SettingsField, ValidationError};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Directory holding `path`; `.` for a bare file name.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Filesystem checks on top of [`Settings::validate`]: the input must be a
/// readable file and the output's directory must exist or be creatable.
pub fn validate_paths(settings: &Settings) -> Result<(), ValidationError> {
    settings.validate()?;

    let input = &settings.input_path;
    match fs::metadata(input) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Err(ValidationError::new(
                SettingsField::InputPath,
                format!("'{}' is not a file", input.display()),
            ))
        }
        Err(err) => {
            return Err(ValidationError::new(
                SettingsField::InputPath,
                format!("'{}': {err}", input.display()),
            ))
        }
    }

    if settings.output_path.is_dir() {
        return Err(ValidationError::new(
            SettingsField::OutputPath,
            format!("'{}' is a directory", settings.output_path.display()),
        ));
    }
    ensure_output_dir(&parent_dir(&settings.output_path))
        .map_err(|err| ValidationError::new(SettingsField::OutputPath, err.to_string()))
}

/// Removes a temporary file; a file that is already gone is not an error.
pub fn remove_temp(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Builds a file next to its target and renames it into place on commit.
///
/// Dropping the writer without committing leaves the target untouched.
pub struct AtomicFileWriter {
    target: PathBuf,
    tmp: NamedTempFile,
    written: u64,
}

impl AtomicFileWriter {
    pub fn create(target: &Path) -> Result<Self, PersistError> {
        let dir = parent_dir(target);
        ensure_output_dir(&dir)?;
        Ok(Self {
            target: target.to_path_buf(),
            tmp: NamedTempFile::new_in(&dir)?,
            written: 0,
        })
    }

    /// Appends everything `source` yields; returns the bytes copied.
    pub fn append_from(&mut self, source: &mut impl Read) -> Result<u64, PersistError> {
        let copied = io::copy(source, self.tmp.as_file_mut())?;
        self.written += copied;
        Ok(copied)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn commit(mut self) -> Result<PathBuf, PersistError> {
        self.tmp.flush()?;
        self.tmp.as_file_mut().sync_all()?;
        self.tmp
            .persist(&self.target)
            .map_err(|e| PersistError::Io(e.error))?;
        Ok(self.target)
    }
}
