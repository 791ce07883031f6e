//! Append-only activity log.
//!
//! Entries are appended to a JSONL (JSON Lines) file with file locking so
//! several timer processes can share one log.

use crate::effects::ActivityRecorder;
use crate::{ActivityEntry, Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// JSONL-backed activity recorder with file locking
pub struct JsonlRecorder {
    path: PathBuf,
}

impl JsonlRecorder {
    /// Create a new recorder for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &ActivityEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended {} to activity log", entry.subject_id);
        Ok(())
    }
}

impl ActivityRecorder for JsonlRecorder {
    fn record(&mut self, entry: &ActivityEntry) -> Result<()> {
        self.append(entry)
            .map_err(|e| Error::RecorderWrite(format!("{}: {}", self.path.display(), e)))
    }
}

/// Read all entries from an activity log, newest last
///
/// Malformed lines are skipped with a warning.
pub fn read_entries(path: &Path) -> Result<Vec<ActivityEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut entries = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ActivityEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!("Failed to parse activity at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} activity entries", entries.len());
    Ok(entries)
}
