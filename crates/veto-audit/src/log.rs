//! Append-only JSONL persistence for decision records, adapted from the
//! teacher's write-ahead event log.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// Monotonic identifier assigned to a persisted record on append.
pub type EventId = u64;

/// Errors emitted by [`JsonlLog`].
#[derive(Debug, Error)]
pub enum LogError {
    /// Underlying file I/O failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// A record failed to serialize or deserialize.
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One persisted record: a monotonic id, a timestamp, and a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord<T> {
    /// Monotonic id assigned on append.
    pub id: EventId,
    /// Milliseconds since the UNIX epoch.
    pub ts_ms: u64,
    /// The record payload (an [`crate::ExplanationTrail`] plus decision
    /// metadata, for the audit log).
    pub payload: T,
}

/// A simple JSONL-backed append-only log, one record per line.
#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: String,
}

impl JsonlLog {
    /// Opens or creates a log at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let p = path.as_ref();
        if !p.exists() {
            OpenOptions::new().create(true).write(true).truncate(true).open(p)?;
        }
        Ok(Self { path: p.to_string_lossy().into_owned() })
    }

    /// Appends a payload, returning its assigned id.
    pub fn append<T: Serialize>(&self, id: EventId, ts_ms: u64, payload: &T) -> Result<EventId, LogError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let rec = LogRecord { id, ts_ms, payload };
        let line = serde_json::to_string(&rec)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(id)
    }

    /// Reads records with id in `[start, end)`.
    pub fn read_range<T: for<'de> Deserialize<'de>>(
        &self,
        start: EventId,
        end: EventId,
    ) -> Result<Vec<LogRecord<T>>, LogError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let rec: LogRecord<T> = serde_json::from_str(&line)?;
            if rec.id >= start && rec.id < end {
                out.push(rec);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckResult, ExplanationEntry, ExplanationTrail};

    #[test]
    fn append_and_read_roundtrip() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let log = JsonlLog::open(tmp.path()).unwrap();

        let mut trail = ExplanationTrail::new();
        trail.entries.push(ExplanationEntry {
            rule_id: Some("no-secrets".to_string()),
            rule_name: Some("No Secrets".to_string()),
            constraint: "matches".to_string(),
            path: "arguments.content".to_string(),
            expected: "not matching secret pattern".to_string(),
            actual: "sk-deadbeef".to_string(),
            result: CheckResult::Fail,
            message: "content matched a denied pattern".to_string(),
        });

        log.append(1, 1_700_000_000_000, &trail).unwrap();
        let got: Vec<LogRecord<ExplanationTrail>> = log.read_range(0, 2).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload.entries.len(), 1);
        assert_eq!(got[0].payload.entries[0].result, CheckResult::Fail);
    }
}
