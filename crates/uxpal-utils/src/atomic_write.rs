//! Atomic file writes
//!
//! Stage artifacts are write-once: each is staged in a temporary file in the
//! target directory, fsynced, then renamed into place. A reader never observes
//! a half-written record.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically write UTF-8 text to `path` (temp file + fsync + rename).
///
/// Line endings are normalized to LF. Parent directories are created.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    write_bytes_atomic(path, normalize_line_endings(content).as_bytes())
}

/// Atomically write raw bytes to `path`, replacing any existing file.
pub fn write_bytes_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    staged(path, bytes)?
        .persist(path.as_std_path())
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to atomically write file: {path}"))?;
    Ok(())
}

/// Atomically create `path` with raw bytes; never replaces an existing file.
///
/// An existing target fails with an `io::Error` of kind `AlreadyExists`,
/// reachable through `anyhow::Error::downcast_ref`. Content is written as
/// given, without line-ending normalization.
pub fn create_bytes_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    staged(path, bytes)?
        .persist_noclobber(path.as_std_path())
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to atomically create file: {path}"))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<()> {
    write_file_atomic(path, &pretty_json(path, value)?)
}

/// Serialize `value` as pretty JSON and create `path`, see [`create_bytes_atomic`].
pub fn create_json_atomic<T: serde::Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<()> {
    create_bytes_atomic(path, pretty_json(path, value)?.as_bytes())
}

/// True when `err` came from creating a file that already exists.
#[must_use]
pub fn is_already_exists(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::AlreadyExists)
    })
}

fn pretty_json<T: serde::Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize JSON for {path}"))?;
    json.push('\n');
    Ok(json)
}

/// Stage `bytes` in a fsynced temp file next to `path`.
fn staged(path: &Utf8Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_str().is_empty() => p,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;

    temp_file
        .write_all(bytes)
        .with_context(|| "Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync temporary file")?;

    Ok(temp_file)
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}
