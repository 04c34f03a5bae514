//! Design-system reference loading
//!
//! Scans produce files named `design-system-raw-data-<timestamp>.json`. The
//! newest scan wins, judged by the timestamp in the name and by file mtime
//! when the name does not parse. Data handed over in memory beats any file.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDateTime, Utc};
use globset::{Glob, GlobMatcher};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Bound in place of design-system data when none is available.
pub const NO_DESIGN_SYSTEM: &str = "No design system data available";

pub const DESIGN_SYSTEM_GLOB: &str = "design-system-raw-data-*.json";

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H-%M-%S",
    "%Y-%m-%dT%H-%M-%S%.fZ",
    "%Y-%m-%dT%H-%M-%S%.f",
    "%Y%m%d_%H%M%S",
];

/// Where the bound design-system text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesignSystemSource {
    InMemory,
    File(Utf8PathBuf),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignSystemData {
    pub text: String,
    pub source: DesignSystemSource,
}

impl DesignSystemData {
    fn unavailable() -> Self {
        Self {
            text: NO_DESIGN_SYSTEM.to_string(),
            source: DesignSystemSource::Unavailable,
        }
    }
}

pub struct DesignSystemLoader {
    dir: Utf8PathBuf,
    matcher: GlobMatcher,
    in_memory: Option<Value>,
}

impl DesignSystemLoader {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Result<Self> {
        let matcher = Glob::new(DESIGN_SYSTEM_GLOB)
            .with_context(|| format!("Invalid design-system pattern: {DESIGN_SYSTEM_GLOB}"))?
            .compile_matcher();
        Ok(Self {
            dir: dir.into(),
            matcher,
            in_memory: None,
        })
    }

    /// Use `data` instead of scanning the directory.
    #[must_use]
    pub fn with_in_memory(mut self, data: Value) -> Self {
        self.in_memory = Some(data);
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Resolve the design-system text to bind. Never fails; unreadable or
    /// missing data falls back to [`NO_DESIGN_SYSTEM`].
    #[must_use]
    pub fn load(&self) -> DesignSystemData {
        if let Some(value) = &self.in_memory {
            let text = match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            };
            info!(chars = text.len(), "Using in-memory design system data");
            return DesignSystemData {
                text,
                source: DesignSystemSource::InMemory,
            };
        }

        let Some(path) = self.newest_file() else {
            debug!(dir = %self.dir, "No design system scans found");
            return DesignSystemData::unavailable();
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                info!(path = %path, chars = text.len(), "Loaded design system data");
                DesignSystemData {
                    text,
                    source: DesignSystemSource::File(path),
                }
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to read design system data");
                DesignSystemData::unavailable()
            }
        }
    }

    /// The newest scan file in the directory.
    #[must_use]
    pub fn newest_file(&self) -> Option<Utf8PathBuf> {
        let entries = match self.dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir, error = %e, "Design system directory not readable");
                return None;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| self.matcher.is_match(entry.file_name()))
            .filter_map(|entry| {
                let path = entry.path().to_path_buf();
                let stamp = scan_timestamp(&path).or_else(|| modified_time(&path))?;
                Some((stamp, path))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, path)| path)
    }
}

/// Timestamp encoded after `-data-` in a scan file's stem.
fn scan_timestamp(path: &Utf8Path) -> Option<DateTime<Utc>> {
    let stem = path.file_stem()?;
    let (_, raw) = stem.split_once("-data-")?;
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn modified_time(path: &Utf8Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn dir(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_newest_by_name_timestamp() {
        let temp = TempDir::new().unwrap();
        let root = dir(&temp);
        // Written last, but named oldest.
        std::fs::write(root.join("design-system-raw-data-2025-08-03T10-46-26.json"), "[2]").unwrap();
        std::fs::write(root.join("design-system-raw-data-2025-07-01T09-00-00.json"), "[1]").unwrap();
        std::fs::write(root.join("unrelated.json"), "[0]").unwrap();

        let loader = DesignSystemLoader::new(root.clone()).unwrap();
        let data = loader.load();

        assert_eq!(data.text, "[2]");
        assert_eq!(
            data.source,
            DesignSystemSource::File(root.join("design-system-raw-data-2025-08-03T10-46-26.json"))
        );
    }

    #[test]
    fn test_unparseable_name_falls_back_to_mtime() {
        let temp = TempDir::new().unwrap();
        let root = dir(&temp);
        std::fs::write(root.join("design-system-raw-data-latest.json"), "[\"mtime\"]").unwrap();

        let path = DesignSystemLoader::new(root.clone()).unwrap().newest_file().unwrap();
        assert!(path.ends_with("design-system-raw-data-latest.json"));
    }

    #[test]
    fn test_in_memory_data_wins() {
        let temp = TempDir::new().unwrap();
        let root = dir(&temp);
        std::fs::write(root.join("design-system-raw-data-2025-08-03T10-46-26.json"), "[]").unwrap();

        let loader = DesignSystemLoader::new(root)
            .unwrap()
            .with_in_memory(json!([{"id": "btn", "name": "Button"}]));
        let data = loader.load();

        assert_eq!(data.source, DesignSystemSource::InMemory);
        assert!(data.text.contains("\"Button\""));
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let loader = DesignSystemLoader::new(dir(&temp).join("nope")).unwrap();
        let data = loader.load();
        assert_eq!(data.text, NO_DESIGN_SYSTEM);
        assert_eq!(data.source, DesignSystemSource::Unavailable);
    }

    #[test]
    fn test_scan_timestamp_formats() {
        let parsed = scan_timestamp(Utf8Path::new("design-system-raw-data-2025-08-03T10-46-26.json"));
        assert_eq!(parsed.unwrap().to_rfc3339(), "2025-08-03T10:46:26+00:00");
        assert!(scan_timestamp(Utf8Path::new("design-system-raw-data-2025-08-03T10-46-26.123Z.json")).is_some());
        assert!(scan_timestamp(Utf8Path::new("design-system-raw-data-soon.json")).is_none());
    }
}
