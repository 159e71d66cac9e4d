use std::path::{Path, PathBuf};

use epd_core::{ChunkId, JobId};
use sha2::{Digest, Sha256};

/// Deterministic, Windows-safe name of a chunk's temporary output:
/// `{output_stem}--{short_hash(output)}.job{job}.chunk{chunk:04}.tmp`.
///
/// The hash keeps jobs writing different outputs into one scratch directory apart.
pub fn chunk_temp_name(output: &Path, job_id: JobId, chunk_id: ChunkId) -> String {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    let sanitized = sanitize_stem(&stem);
    let hash = short_hash(&output.to_string_lossy());
    format!("{sanitized}--{hash}.job{job_id}.chunk{chunk_id:04}.tmp")
}

pub fn chunk_temp_path(
    scratch_dir: &Path,
    output: &Path,
    job_id: JobId,
    chunk_id: ChunkId,
) -> PathBuf {
    scratch_dir.join(chunk_temp_name(output, job_id, chunk_id))
}

fn sanitize_stem(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        return "output".to_string();
    }
    // Collapse multiple underscores
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c != '_' || !prev_underscore {
            compacted.push(c);
        }
        prev_underscore = c == '_';
    }
    let mut final_name: String = compacted.chars().take(60).collect();
    if is_reserved_windows_name(&final_name) {
        final_name.push('_');
    }
    final_name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
